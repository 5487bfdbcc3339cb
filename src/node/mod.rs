//! Node assembly.
//!
//! One [`ConfigNode`] owns one store handle, one revisioned cache and one
//! notification bus, built once at startup and passed by handle to every
//! consumer. Tests build as many independent nodes as they like with
//! in-memory collaborators.

mod builder;
mod node;
pub use builder::*;
pub use node::*;
