//! Strategies backed by the record store

use super::{Resolution, ResolvedProfile, RoleStrategy};
use academia_core::{async_trait, AuthError, AuthResult, RecordStore, RemoteUser, Role};
use serde_json::Value;
use std::sync::Arc;

/// Read the `role` column of a record.
///
/// `Ok(None)` when the column is absent or null.
fn role_attribute(strategy: &str, record: &Value) -> AuthResult<Option<Role>> {
    let fields = record
        .as_object()
        .ok_or_else(|| AuthError::incomplete(strategy, "record is not an object"))?;

    match fields.get("role") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(label)) => label
            .parse::<Role>()
            .map(Some)
            .map_err(|e| AuthError::incomplete(strategy, e)),
        Some(other) => Err(AuthError::incomplete(
            strategy,
            format!("role attribute has unexpected shape: {}", other),
        )),
    }
}

/// Role attribute record keyed by user id
pub struct DirectAttributeStrategy {
    records: Arc<dyn RecordStore>,
    table: String,
}

impl DirectAttributeStrategy {
    pub fn new(records: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        Self {
            records,
            table: table.into(),
        }
    }
}

#[async_trait]
impl RoleStrategy for DirectAttributeStrategy {
    fn name(&self) -> &'static str {
        "direct_attribute"
    }

    async fn resolve(&self, user: &RemoteUser) -> AuthResult<Resolution> {
        let Some(record) = self.records.select_by_id(&self.table, &user.id).await? else {
            return Ok(Resolution::NoData);
        };

        let role = role_attribute(self.name(), &record)?.unwrap_or_default();
        Ok(Resolution::Resolved(ResolvedProfile::from_user(user, role)))
    }
}

/// A profile record without a role still marks the caller as a member
pub struct ProfileExistenceStrategy {
    records: Arc<dyn RecordStore>,
    table: String,
}

impl ProfileExistenceStrategy {
    pub fn new(records: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        Self {
            records,
            table: table.into(),
        }
    }
}

#[async_trait]
impl RoleStrategy for ProfileExistenceStrategy {
    fn name(&self) -> &'static str {
        "profile_existence"
    }

    async fn resolve(&self, user: &RemoteUser) -> AuthResult<Resolution> {
        let Some(record) = self.records.select_by_id(&self.table, &user.id).await? else {
            return Ok(Resolution::NoData);
        };

        // Only existence matters here; a bad label does not disqualify the record
        let role = role_attribute(self.name(), &record)
            .ok()
            .flatten()
            .unwrap_or_default();
        Ok(Resolution::Resolved(ResolvedProfile::from_user(user, role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MemoryRecordStore;
    use serde_json::json;

    fn store() -> MemoryRecordStore {
        MemoryRecordStore::new()
    }

    #[tokio::test]
    async fn test_direct_attribute_verbatim_role() {
        let records = store();
        records.insert("user_auth", "u1", json!({ "role": "admin" }));
        let strategy = DirectAttributeStrategy::new(Arc::new(records), "user_auth");

        let user = RemoteUser::new("u1", "ana@gym.com").with_metadata("avatar_url", "/a.png");
        match strategy.resolve(&user).await.unwrap() {
            Resolution::Resolved(profile) => {
                assert_eq!(profile.role, Role::Admin);
                assert_eq!(profile.display_name, "ana");
                assert_eq!(profile.avatar_url.as_deref(), Some("/a.png"));
            }
            Resolution::NoData => panic!("expected a resolved profile"),
        }
    }

    #[tokio::test]
    async fn test_direct_attribute_missing_record_is_no_data() {
        let strategy = DirectAttributeStrategy::new(Arc::new(store()), "user_auth");
        let result = strategy.resolve(&RemoteUser::new("u1", "a@b.c")).await.unwrap();
        assert_eq!(result, Resolution::NoData);
    }

    #[tokio::test]
    async fn test_direct_attribute_null_role_is_member() {
        let records = store();
        records.insert("user_auth", "u1", json!({ "role": null }));
        let strategy = DirectAttributeStrategy::new(Arc::new(records), "user_auth");

        let result = strategy.resolve(&RemoteUser::new("u1", "a@b.c")).await.unwrap();
        assert!(matches!(result, Resolution::Resolved(p) if p.role == Role::Member));
    }

    #[tokio::test]
    async fn test_direct_attribute_malformed_is_incomplete() {
        let records = store();
        records.insert("user_auth", "u1", json!({ "role": 42 }));
        records.insert("user_auth", "u2", json!(["admin"]));
        let strategy = DirectAttributeStrategy::new(Arc::new(records), "user_auth");

        for id in ["u1", "u2"] {
            let err = strategy.resolve(&RemoteUser::new(id, "a@b.c")).await.unwrap_err();
            assert!(matches!(err, AuthError::ResolutionIncomplete { .. }));
        }
    }

    #[tokio::test]
    async fn test_profile_existence_implies_member() {
        let records = store();
        records.insert("profiles", "u1", json!({ "id": "u1", "full_name": "Ana" }));
        records.insert("profiles", "u2", json!({ "id": "u2", "role": "admin" }));
        records.insert("profiles", "u3", json!({ "id": "u3", "role": "owner" }));
        let strategy = ProfileExistenceStrategy::new(Arc::new(records), "profiles");

        let expect = [("u1", Role::Member), ("u2", Role::Admin), ("u3", Role::Member)];
        for (id, role) in expect {
            let result = strategy.resolve(&RemoteUser::new(id, "a@b.c")).await.unwrap();
            assert!(matches!(result, Resolution::Resolved(p) if p.role == role));
        }
    }

    #[tokio::test]
    async fn test_store_error_propagates_to_chain() {
        let records = store();
        records.fail_table("profiles");
        let strategy = ProfileExistenceStrategy::new(Arc::new(records), "profiles");

        let err = strategy.resolve(&RemoteUser::new("u1", "a@b.c")).await.unwrap_err();
        assert!(err.is_recoverable());
    }
}
