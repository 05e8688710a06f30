//! switchboard-middleware
//!
//! Store wrappers layered between the gateway and its SQL store.

mod cache;

pub use crate::cache::CachingStore;
