use super::{Resolution, ResolvedProfile, RoleStrategy};
use academia_core::{async_trait, email_local_part, AuthResult, RemoteUser, Role};

/// Terminal strategy: `member`, named after the email's local part
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRoleStrategy;

impl DefaultRoleStrategy {
    pub fn profile(user: &RemoteUser) -> ResolvedProfile {
        ResolvedProfile {
            role: Role::Member,
            display_name: email_local_part(&user.email).to_string(),
            avatar_url: None,
        }
    }
}

#[async_trait]
impl RoleStrategy for DefaultRoleStrategy {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn resolve(&self, user: &RemoteUser) -> AuthResult<Resolution> {
        Ok(Resolution::Resolved(Self::profile(user)))
    }
}
