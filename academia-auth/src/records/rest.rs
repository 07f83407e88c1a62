//! PostgREST-style record store
//!
//! `GET {base}/rest/v1/{table}?id=eq.{id}&select=*`, first row wins.

use crate::transport::{endpoint, error_from_response, parse_base_url, transport_error};
use academia_core::{async_trait, with_timeout, AuthError, AuthResult, RecordStore, RemoteConfig};
use serde_json::Value;
use tracing::debug;
use url::Url;

pub struct RestRecordStore {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    timeout_ms: u64,
}

impl RestRecordStore {
    pub fn new(config: &RemoteConfig) -> AuthResult<Self> {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: &RemoteConfig, client: reqwest::Client) -> AuthResult<Self> {
        Ok(Self {
            client,
            base_url: parse_base_url(&config.base_url)?,
            api_key: config.api_key.clone(),
            timeout_ms: config.timeout_ms,
        })
    }
}

fn valid_table_name(table: &str) -> bool {
    !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn select_by_id(&self, table: &str, id: &str) -> AuthResult<Option<Value>> {
        if !valid_table_name(table) {
            return Err(AuthError::rejected(format!("Invalid table name: {:?}", table)));
        }

        let url = endpoint(&self.base_url, &format!("rest/v1/{}", table))?;
        let request = self
            .client
            .get(url)
            .query(&[("id", format!("eq.{}", id).as_str()), ("select", "*")])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json");

        let response = with_timeout(
            async { request.send().await.map_err(transport_error) },
            self.timeout_ms,
            "select_by_id",
        )
        .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let rows: Vec<Value> = response.json().await.map_err(|e| {
            AuthError::rejected(format!("Malformed rows from table {}: {}", table, e))
        })?;

        debug!(table = table, rows = rows.len(), "Record lookup completed");
        Ok(rows.into_iter().next())
    }
}
