use std::collections::HashMap;

use crate::format_labels;

/// Canonical cache key for an exact-label query shape. Deterministic and
/// injective with respect to (domain, project, label set) up to map
/// equality.
pub fn cache_key(domain: &str, project: &str, labels: &HashMap<String, String>) -> String {
    format!("/{}/{}/{}", domain, project, format_labels(labels))
}
