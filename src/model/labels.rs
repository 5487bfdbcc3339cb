//! Canonical label-string formatting.
//!
//! The canonical form is the backbone of both cache keys and topic wire
//! strings: two maps with identical content must produce byte-identical
//! strings regardless of insertion order.

use std::collections::HashMap;

use crate::PubSubError;
use crate::LABEL_NONE;
use crate::LABEL_PAIR_SEPARATOR;

/// Format a label map to its canonical string: keys sorted ascending,
/// emitted as `key=value` joined by `::`. An empty map yields `"none"`.
pub fn format_labels(labels: &HashMap<String, String>) -> String {
    if labels.is_empty() {
        return LABEL_NONE.to_string();
    }
    let mut keys: Vec<&String> = labels.keys().collect();
    keys.sort();
    let mut out = String::new();
    for (i, k) in keys.iter().enumerate() {
        out.push_str(k);
        out.push('=');
        out.push_str(&labels[*k]);
        if i != keys.len() - 1 {
            out.push_str(LABEL_PAIR_SEPARATOR);
        }
    }
    out
}

/// Explode a canonical label string back into a map. The `"none"` sentinel
/// yields an empty map; a pair without exactly one `=` is an error.
pub fn parse_labels(s: &str) -> std::result::Result<HashMap<String, String>, PubSubError> {
    let mut labels = HashMap::new();
    if s.is_empty() || s == LABEL_NONE {
        return Ok(labels);
    }
    for pair in s.split(LABEL_PAIR_SEPARATOR) {
        let mut kv = pair.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some(k), Some(v)) if !k.is_empty() => {
                labels.insert(k.to_string(), v.to_string());
            }
            _ => return Err(PubSubError::InvalidLabel(pair.to_string())),
        }
    }
    Ok(labels)
}

/// Label-set equality: same keys, same values, no more, no fewer.
pub fn labels_equal(a: &HashMap<String, String>, b: &HashMap<String, String>) -> bool {
    a == b
}
