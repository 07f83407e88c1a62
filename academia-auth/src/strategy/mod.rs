//! Role resolution strategy chain
//!
//! Given the raw user handle of a remote session, the chain decides the
//! caller's role and profile attributes. Strategies run in order and the first
//! one that resolves wins; a strategy error is logged and treated as no data.
//!
//! Standard order:
//! 1. [`DirectAttributeStrategy`]: role attribute record keyed by user id
//! 2. [`ProfileExistenceStrategy`]: a profile record implies `member`
//! 3. [`CredentialTableStrategy`]: preconfigured credential entry by email
//! 4. [`DefaultRoleStrategy`]: `member`, email local part, no avatar

pub mod credentials;
pub mod default;
pub mod records;

pub use credentials::CredentialTableStrategy;
pub use default::DefaultRoleStrategy;
pub use records::{DirectAttributeStrategy, ProfileExistenceStrategy};

use crate::credentials::CredentialTable;
use academia_core::{
    async_trait, AuthError, AuthResult, Identity, RecordStore, RecordsConfig, RemoteUser, Role,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Role and profile attributes produced by a strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub role: Role,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl ResolvedProfile {
    /// Profile carrying `role`, with name and avatar taken from the user metadata
    pub fn from_user(user: &RemoteUser, role: Role) -> Self {
        Self {
            role,
            display_name: user.display_name(),
            avatar_url: user.avatar_url(),
        }
    }

    pub fn into_identity(self, user: &RemoteUser) -> Identity {
        Identity {
            id: user.id.clone(),
            email: user.email.clone(),
            display_name: self.display_name,
            role: self.role,
            avatar_url: self.avatar_url,
        }
    }
}

/// Outcome of a single strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedProfile),
    NoData,
}

/// One role lookup in the chain
#[async_trait]
pub trait RoleStrategy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Errors mean the lookup could not be completed; the chain moves on
    async fn resolve(&self, user: &RemoteUser) -> AuthResult<Resolution>;
}

/// Ordered list of strategies, first success wins
#[derive(Clone)]
pub struct RoleResolver {
    strategies: Vec<Arc<dyn RoleStrategy>>,
}

impl RoleResolver {
    pub fn new(strategies: Vec<Arc<dyn RoleStrategy>>) -> Self {
        Self { strategies }
    }

    /// The four-step chain over the given record store and credential table
    pub fn standard(
        records: Arc<dyn RecordStore>,
        tables: &RecordsConfig,
        credentials: Arc<CredentialTable>,
    ) -> Self {
        let direct = DirectAttributeStrategy::new(records.clone(), tables.role_table.clone());
        let profile = ProfileExistenceStrategy::new(records, tables.profile_table.clone());

        Self::new(vec![
            Arc::new(direct) as Arc<dyn RoleStrategy>,
            Arc::new(profile),
            Arc::new(CredentialTableStrategy::new(credentials)),
            Arc::new(DefaultRoleStrategy),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the chain; never fails
    pub async fn resolve(&self, user: &RemoteUser) -> ResolvedProfile {
        for strategy in &self.strategies {
            match strategy.resolve(user).await {
                Ok(Resolution::Resolved(profile)) => {
                    debug!(
                        strategy = strategy.name(),
                        user_id = %user.id,
                        role = %profile.role,
                        "Role resolved"
                    );
                    return profile;
                }
                Ok(Resolution::NoData) => {
                    debug!(strategy = strategy.name(), user_id = %user.id, "No role data");
                }
                Err(e) => {
                    let incomplete = match e {
                        e @ AuthError::ResolutionIncomplete { .. } => e,
                        other => AuthError::incomplete(strategy.name(), other.to_string()),
                    };
                    warn!(
                        strategy = strategy.name(),
                        user_id = %user.id,
                        error = %incomplete,
                        "Role strategy failed, trying next"
                    );
                }
            }
        }

        DefaultRoleStrategy::profile(user)
    }

    pub async fn resolve_identity(&self, user: &RemoteUser) -> Identity {
        self.resolve(user).await.into_identity(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MemoryRecordStore;
    use academia_core::AuthConfig;
    use serde_json::json;

    fn chain(records: &MemoryRecordStore) -> RoleResolver {
        let config = AuthConfig::default();
        RoleResolver::standard(
            Arc::new(records.clone()),
            &config.records,
            Arc::new(CredentialTable::new(config.fallback.credentials)),
        )
    }

    #[tokio::test]
    async fn test_direct_attribute_short_circuits() {
        let records = MemoryRecordStore::new();
        records.insert("user_auth", "u1", json!({ "id": "u1", "role": "admin" }));
        records.insert("profiles", "u1", json!({ "id": "u1" }));

        let user = RemoteUser::new("u1", "ana@gym.com");
        let profile = chain(&records).resolve(&user).await;

        assert_eq!(profile.role, Role::Admin);
        assert_eq!(records.query_count("user_auth"), 1);
        assert_eq!(records.query_count("profiles"), 0);
    }

    #[tokio::test]
    async fn test_no_data_anywhere_defaults_to_member() {
        let records = MemoryRecordStore::new();
        let user = RemoteUser::new("u9", "carlos@gym.com");

        let identity = chain(&records).resolve_identity(&user).await;
        assert_eq!(identity.role, Role::Member);
        assert_eq!(identity.display_name, "carlos");
        assert_eq!(identity.avatar_url, None);
        assert_eq!(identity.id, "u9");
    }

    #[tokio::test]
    async fn test_malformed_role_falls_through_to_profile() {
        let records = MemoryRecordStore::new();
        records.insert("user_auth", "u1", json!({ "id": "u1", "role": "superuser" }));
        records.insert("profiles", "u1", json!({ "id": "u1" }));

        let user = RemoteUser::new("u1", "ana@gym.com").with_metadata("name", "Ana");
        let profile = chain(&records).resolve(&user).await;

        assert_eq!(profile.role, Role::Member);
        assert_eq!(profile.display_name, "Ana");
        assert_eq!(records.query_count("profiles"), 1);
    }

    #[tokio::test]
    async fn test_failing_tables_reach_credential_table() {
        let records = MemoryRecordStore::new();
        records.fail_table("user_auth");
        records.fail_table("profiles");

        let user = RemoteUser::new("remote-admin", "ADMIN@academia.com");
        let profile = chain(&records).resolve(&user).await;

        assert_eq!(profile.role, Role::Admin);
        assert_eq!(profile.display_name, "Admin User");
    }

    #[tokio::test]
    async fn test_chain_is_reorderable() {
        let records = MemoryRecordStore::new();
        records.insert("user_auth", "u1", json!({ "role": "admin" }));

        let resolver = RoleResolver::new(vec![
            Arc::new(DefaultRoleStrategy) as Arc<dyn RoleStrategy>,
            Arc::new(DirectAttributeStrategy::new(
                Arc::new(records.clone()),
                "user_auth",
            )),
        ]);
        assert_eq!(resolver.strategy_names(), vec!["default", "direct_attribute"]);

        let profile = resolver.resolve(&RemoteUser::new("u1", "ana@gym.com")).await;
        assert_eq!(profile.role, Role::Member);
        assert_eq!(records.query_count("user_auth"), 0);
    }

    #[tokio::test]
    async fn test_empty_chain_applies_hard_default() {
        let resolver = RoleResolver::new(Vec::new());
        let profile = resolver.resolve(&RemoteUser::new("u1", "ana@gym.com")).await;
        assert_eq!(profile.role, Role::Member);
        assert_eq!(profile.display_name, "ana");
    }
}
