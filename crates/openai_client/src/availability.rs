//! Availability - Which chat models a credential can use
//!
//! Settings screens poll this on every keystroke of an API key field, so
//! results are memoized per credential with a freshness window. An empty
//! credential short-circuits to all-unavailable without touching the
//! network.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::debug;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::model::ChatModel;

/// How long a memoized availability result stays fresh.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

struct CacheEntry {
    availability: HashMap<ChatModel, bool>,
    checked_at: Instant,
}

/// Memoized per-credential model availability.
pub struct AvailabilityCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl AvailabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Availability of every chat model for `credential`, fetched from the
    /// models listing and memoized for the freshness window.
    pub async fn check(
        &self,
        http: &Client,
        base_url: &str,
        credential: &str,
    ) -> Result<HashMap<ChatModel, bool>> {
        if credential.is_empty() {
            return Ok(ChatModel::ALL.iter().map(|model| (*model, false)).collect());
        }

        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(credential) {
            if entry.checked_at.elapsed() < self.ttl {
                debug!("returning memoized model availability");
                return Ok(entry.availability.clone());
            }
        }

        let availability = fetch_availability(http, base_url, credential).await?;
        entries.insert(
            credential.to_string(),
            CacheEntry {
                availability: availability.clone(),
                checked_at: Instant::now(),
            },
        );
        Ok(availability)
    }
}

impl Default for AvailabilityCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

async fn fetch_availability(
    http: &Client,
    base_url: &str,
    credential: &str,
) -> Result<HashMap<ChatModel, bool>> {
    let response = http
        .get(format!("{base_url}/models"))
        .header("Authorization", format!("Bearer {credential}"))
        .send()
        .await?;
    let body: Value = response.json().await?;
    let served: Vec<&str> = body
        .get("data")
        .and_then(Value::as_array)
        .map(|data| {
            data.iter()
                .filter_map(|entry| entry.get("id").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    Ok(ChatModel::ALL
        .iter()
        .map(|model| (*model, served.contains(&model.as_str())))
        .collect())
}
