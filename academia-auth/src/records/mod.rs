//! Record store adapters
//!
//! The role strategies look up loosely-shaped rows by identity id; these
//! adapters provide that lookup over memory or a PostgREST-style HTTP API.

pub mod memory;
pub mod rest;

pub use memory::MemoryRecordStore;
pub use rest::RestRecordStore;
