//! Configuration document as persisted in the store and mirrored by the
//! cache. Identity is `id`; uniqueness of (key, exact label set, domain,
//! project) is enforced by the store, never by the cache.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::StoreError;

/// Raw document bytes as handed out by a store. Decoding happens at the
/// cache boundary so a single malformed value never fails a whole batch.
pub type RawDoc = Vec<u8>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigDoc {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,

    /// ini, json, text, yaml, properties
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value_type: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub create_revision: i64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub update_revision: i64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub create_time: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub update_time: String,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl ConfigDoc {
    pub fn decode(raw: &[u8]) -> std::result::Result<Self, StoreError> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn encode(&self) -> std::result::Result<RawDoc, StoreError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Query shape served by the revisioned cache. Only exact-label requests
/// are cache-eligible; everything else falls through to the store.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub domain: String,
    pub project: String,
    pub labels: HashMap<String, String>,
    pub exact_labels: bool,
    pub status: Option<String>,
    pub key_regex: Option<regex::Regex>,
}

/// Result list plus total count, mirroring the store's list responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<ConfigDoc>,
    pub total: usize,
}
