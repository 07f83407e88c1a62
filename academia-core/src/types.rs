//! Core data type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Application role of a caller.
///
/// Serialized as a lowercase label; decoding goes through [`FromStr`] so stored
/// blobs and record attributes accept the same spellings.
///
/// [`FromStr`]: std::str::FromStr
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Role {
    /// Gym administrator
    Admin,
    /// Regular member
    #[default]
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            // "student" is the label older records carry for members
            "member" | "student" => Ok(Role::Member),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        label.parse()
    }
}

/// Resolved, role-bearing representation of a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque identifier, stable for the caller's lifetime
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Portion of an email address before `@` (the whole string when there is none)
pub fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or_default()
}

/// Raw identity handle as delivered by the remote identity service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: String,
    #[serde(default)]
    pub email: String,
    /// Free-form attributes attached at sign-up (`name`, `avatar_url`, `role`, ...)
    #[serde(default, alias = "user_metadata")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RemoteUser {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// `metadata.name`, falling back to the email's local part
    pub fn display_name(&self) -> String {
        self.metadata_str("name")
            .unwrap_or_else(|| email_local_part(&self.email))
            .to_string()
    }

    pub fn avatar_url(&self) -> Option<String> {
        self.metadata_str("avatar_url").map(str::to_string)
    }
}

/// Opaque session handle issued by the remote identity service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: RemoteUser,
}

impl RemoteSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| expires_at <= Utc::now())
            .unwrap_or(false)
    }

    /// Same token issued to the same user
    pub fn same_as(&self, other: &RemoteSession) -> bool {
        self.access_token == other.access_token && self.user.id == other.user.id
    }
}

/// Kind of session-change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Session-change notification pushed by the remote identity service
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    /// `None` means the service holds no active session
    pub session: Option<RemoteSession>,
}

impl SessionEvent {
    pub fn signed_in(session: RemoteSession) -> Self {
        Self {
            kind: SessionEventKind::SignedIn,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: SessionEventKind::SignedOut,
            session: None,
        }
    }

    pub fn token_refreshed(session: RemoteSession) -> Self {
        Self {
            kind: SessionEventKind::TokenRefreshed,
            session: Some(session),
        }
    }
}
