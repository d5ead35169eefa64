//! In-memory caches

pub mod status;
pub mod ttl;

pub use status::{Lookup, StatusCache};
pub use ttl::TtlCache;
