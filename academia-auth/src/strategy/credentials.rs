use super::{Resolution, ResolvedProfile, RoleStrategy};
use crate::credentials::CredentialTable;
use academia_core::{async_trait, AuthResult, RemoteUser};
use std::sync::Arc;

/// Match the user's email against the preconfigured credential table
pub struct CredentialTableStrategy {
    table: Arc<CredentialTable>,
}

impl CredentialTableStrategy {
    pub fn new(table: Arc<CredentialTable>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl RoleStrategy for CredentialTableStrategy {
    fn name(&self) -> &'static str {
        "credential_table"
    }

    async fn resolve(&self, user: &RemoteUser) -> AuthResult<Resolution> {
        Ok(match self.table.find_by_email(&user.email) {
            Some(entry) => Resolution::Resolved(ResolvedProfile {
                role: entry.role,
                display_name: entry.display_name.clone(),
                avatar_url: entry.avatar_url.clone(),
            }),
            None => Resolution::NoData,
        })
    }
}
