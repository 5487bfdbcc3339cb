//! Crate-wide constants shared by the cache and the notification bus.

/// Event-type tag for key-value change events on the broadcast transport.
pub const EVENT_KV_CHANGE: &str = "kv-chg";

/// Store namespace that holds configuration documents.
pub const PREFIX_KVS: &str = "kvs";

/// Canonical form of an empty label set.
pub const LABEL_NONE: &str = "none";

/// Separator between `key=value` pairs in the canonical label string.
pub const LABEL_PAIR_SEPARATOR: &str = "::";

/// Separator between fields in the canonical string form of a change event.
pub const EVENT_STRING_SEPARATOR: &str = ";;";

/// Match type requiring label-set equality between topic and event.
pub const PATTERN_EXACT: &str = "exact";

pub const DEFAULT_EVENT_BATCH_SIZE: usize = 5000;
pub const DEFAULT_EVENT_BATCH_INTERVAL_MS: u64 = 500;

/// Broadcast payload ceiling. The gossip layer only guarantees delivery of
/// small messages; publish rejects anything larger.
pub const DEFAULT_EVENT_PAYLOAD_LIMIT: usize = 512;

/// Buffered capacity of the watch channel between a store and the cache.
pub const WATCH_CHANNEL_SIZE: usize = 64;
