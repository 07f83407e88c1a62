//! Academia Auth - Session and identity resolution
//!
//! This crate owns the caller's session state for the role-gated application:
//!
//! - **Resolver** (`resolver`): the state machine behind login, register and logout
//! - **Strategy chain** (`strategy`): ordered role lookups, first success wins
//! - **Fallback store** (`fallback`): on-device cache of the last fallback identity
//! - **Adapters** (`remote`, `records`): in-memory and HTTP implementations of the
//!   remote identity service and record store contracts
//!
//! ## Architecture
//!
//! The remote identity service is authoritative whenever it holds a session.
//! The local fallback store is read only when it does not, and written only by a
//! fallback login. Consumers read [`SessionState`] snapshots or subscribe to
//! changes; they never mutate it directly.

pub mod credentials;
pub mod fallback;
pub mod records;
pub mod remote;
pub mod resolver;
pub mod state;
pub mod strategy;

mod transport;

pub use credentials::CredentialTable;
pub use fallback::{FallbackIdentityCache, FileFallbackStore, MemoryFallbackStore};
pub use records::{MemoryRecordStore, RestRecordStore};
pub use remote::{HttpIdentityService, InMemoryIdentityService, ServiceCalls};
pub use resolver::{SessionResolver, SessionResolverBuilder};
pub use state::{SessionPhase, SessionSource, SessionState};
pub use strategy::{
    CredentialTableStrategy, DefaultRoleStrategy, DirectAttributeStrategy,
    ProfileExistenceStrategy, Resolution, ResolvedProfile, RoleResolver, RoleStrategy,
};

pub use academia_core::{AuthError, AuthResult, Identity, Role};
