use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::format_labels;
use crate::labels_equal;
use crate::parse_labels;
use crate::ChangeEvent;
use crate::PubSubError;
use crate::PATTERN_EXACT;

/// Subscription criteria a long-poll request registers under.
///
/// The canonical wire string (see [`Topic::encode`]) doubles as the
/// registry key, so two requests asking for the same thing share one
/// registry entry regardless of label insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Topic {
    /// Exact label constraints; carried on the wire via `labels_format`
    #[serde(skip)]
    pub labels: HashMap<String, String>,

    #[serde(rename = "key", default, skip_serializing_if = "String::is_empty")]
    pub key: String,

    #[serde(rename = "labels", default, skip_serializing_if = "String::is_empty")]
    pub labels_format: String,

    #[serde(rename = "domainID", default, skip_serializing_if = "String::is_empty")]
    pub domain_id: String,

    #[serde(rename = "project", default, skip_serializing_if = "String::is_empty")]
    pub project: String,

    #[serde(rename = "match", default, skip_serializing_if = "String::is_empty")]
    pub match_type: String,
}

impl Topic {
    /// Canonical wire string: labels collapsed to their canonical format,
    /// then JSON-encoded with empty fields omitted.
    pub fn encode(&self) -> std::result::Result<String, PubSubError> {
        let mut t = self.clone();
        t.labels_format = format_labels(&self.labels);
        Ok(serde_json::to_string(&t)?)
    }

    /// Parse a wire string back into structured form, exploding the label
    /// format string into the map.
    pub fn parse(s: &str) -> std::result::Result<Topic, PubSubError> {
        let mut t: Topic = serde_json::from_str(s)?;
        t.labels = parse_labels(&t.labels_format)?;
        Ok(t)
    }

    /// Compare an event with this topic.
    ///
    /// If the match type is set to exact in the long pulling request, only
    /// an update with exactly the same labels as the pulling request will
    /// match and trigger an immediate return.
    ///
    /// If the match type is not set, it matches when the pulling request
    /// labels equal the update labels or a subset of them.
    ///
    /// A key constraint can only ever vote "yes": a key mismatch never
    /// vetoes a topic whose label constraints all hold.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        let mut matched = false;
        if !self.key.is_empty() && self.key == event.key {
            matched = true;
        }
        if self.match_type == PATTERN_EXACT && !labels_equal(&self.labels, &event.labels) {
            return false;
        }
        if self.key.is_empty() && self.labels.is_empty() {
            return true;
        }
        for (k, v) in &self.labels {
            if event.labels.get(k) != Some(v) {
                return false;
            }
            matched = true;
        }
        matched
    }
}
