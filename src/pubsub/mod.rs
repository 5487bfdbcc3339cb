//! Cluster-wide change notification.
//!
//! A write on any node becomes a [`ChangeEvent`] broadcast over the
//! transport; every node's [`EventHandler`] matches incoming events against
//! the [`TopicRegistry`] and wakes the long-poll observers that care.
//! Delivery is best-effort: a lost event only costs latency, because
//! clients recover by re-polling with a revision number.

mod bus;
mod event;
mod handler;
mod observer;
mod topic;
pub use bus::*;
pub use event::*;
pub use handler::*;
pub use observer::*;
pub use topic::*;

#[cfg(test)]
mod topic_test;
