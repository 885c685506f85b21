//! HTTP roster source.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{RosterError, RosterSource};
use crate::types::Identity;

/// Reads `GET {base}/users/perms/{group}`.
pub struct HttpRosterSource {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GroupResponse {
    data: Vec<MemberEntry>,
}

#[derive(Debug, Deserialize)]
struct MemberEntry {
    uuid: String,
    mcid: String,
}

impl HttpRosterSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RosterError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RosterError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn group_url(&self, group: &str) -> String {
        format!("{}/users/perms/{}", self.base_url, group)
    }
}

#[async_trait]
impl RosterSource for HttpRosterSource {
    async fn members(&self, group: &str) -> Result<Vec<Identity>, RosterError> {
        let response = self
            .client
            .get(self.group_url(group))
            .send()
            .await
            .map_err(|e| RosterError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RosterError::Status {
                group: group.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: GroupResponse = response
            .json()
            .await
            .map_err(|e| RosterError::InvalidResponse(e.to_string()))?;

        Ok(body
            .data
            .into_iter()
            .map(|m| Identity::new(m.uuid, m.mcid))
            .collect())
    }
}
