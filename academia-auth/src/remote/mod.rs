//! Remote Identity Service adapters
//!
//! - `InMemoryIdentityService`: in-process authority for tests and offline demos
//! - `HttpIdentityService`: GoTrue-compatible REST client

pub mod http;
pub mod memory;

pub use http::HttpIdentityService;
pub use memory::{InMemoryIdentityService, ServiceCalls};

/// Buffer of undelivered session-change notifications per subscriber
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 32;
