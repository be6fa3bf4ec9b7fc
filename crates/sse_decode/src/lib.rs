//! sse_decode - Incremental decoder for streaming completion responses
//!
//! The completion endpoints stream newline-delimited `data: ` records. This
//! crate turns raw network chunks, in whatever sizes they arrive, into
//! structured [`DeltaEvent`]s. Feed bytes in with [`StreamDecoder::feed`],
//! flush the tail with [`StreamDecoder::finish`].

pub mod decoder;
pub mod event;

pub use decoder::StreamDecoder;
pub use event::{DeltaEvent, Framing};
