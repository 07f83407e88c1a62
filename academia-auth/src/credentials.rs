//! Preconfigured fallback credential table

use academia_core::FallbackCredential;

/// Fixed-shape credential list consulted when the remote service rejects a login
#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    entries: Vec<FallbackCredential>,
}

impl CredentialTable {
    pub fn new(entries: Vec<FallbackCredential>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry whose email matches, ignoring case and surrounding whitespace
    pub fn find_by_email(&self, email: &str) -> Option<&FallbackCredential> {
        let email = email.trim();
        self.entries
            .iter()
            .find(|entry| entry.email.eq_ignore_ascii_case(email))
    }

    /// Entry matching both email and password
    pub fn verify(&self, email: &str, password: &str) -> Option<&FallbackCredential> {
        self.find_by_email(email)
            .filter(|entry| entry.password == password)
    }
}
