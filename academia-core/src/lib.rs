//! Academia Core - Shared data structures and collaborator contracts
//!
//! This module defines the identity types, error handling, configuration and
//! logging used by the session layer, together with the traits describing the
//! external collaborators it talks to (remote identity service, record store,
//! local fallback store).

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio;
pub use tracing;
