//! Local mirror of the authoritative store.
//!
//! [`RevisionedCache`] keeps an in-memory copy of every configuration
//! document current via a list-then-watch protocol and answers exact-label
//! lookups without touching the store. [`PollingCache`] additionally keeps
//! the last long-poll answer per topic so repeated wakeups are cheap.

mod key;
mod polling;
mod revisioned;
pub use key::*;
pub use polling::*;
pub use revisioned::*;

#[cfg(test)]
mod revisioned_test;
