use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::format_labels;
use crate::PubSubError;
use crate::EVENT_STRING_SEPARATOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Action {
    #[default]
    #[serde(rename = "put")]
    Put,
    #[serde(rename = "del", alias = "delete")]
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Put => write!(f, "put"),
            Action::Delete => write!(f, "del"),
        }
    }
}

/// Event exchanged between nodes when a key changes, broadcast over the
/// gossip transport as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChangeEvent {
    #[serde(rename = "Key", default)]
    pub key: String,

    #[serde(rename = "Action", default)]
    pub action: Action,

    #[serde(rename = "Labels", default)]
    pub labels: HashMap<String, String>,

    #[serde(rename = "DomainID", default)]
    pub domain_id: String,

    #[serde(rename = "Project", default)]
    pub project: String,
}

impl ChangeEvent {
    pub fn decode(payload: &[u8]) -> std::result::Result<Self, PubSubError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn encode(&self) -> std::result::Result<Vec<u8>, PubSubError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl fmt::Display for ChangeEvent {
    /// Canonical string form; identical events collapse to identical
    /// strings, which is what the batching handler dedups on.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = EVENT_STRING_SEPARATOR;
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}{sep}{}",
            self.key,
            self.action,
            format_labels(&self.labels),
            self.domain_id,
            self.project,
        )
    }
}
