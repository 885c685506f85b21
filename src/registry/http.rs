//! REST client for the token registry.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::traits::*;
use crate::types::{ContainerInfo, TokenId, TokenInfo};

/// Bot-authenticated registry client.
pub struct HttpRegistryClient {
    client: Client,
    base_url: String,
    capacity_override: Option<usize>,
}

impl HttpRegistryClient {
    pub fn new(
        base_url: impl Into<String>,
        token: &str,
        capacity_override: Option<usize>,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let auth = header::HeaderValue::from_str(&format!("Bot {}", token))
            .map_err(|e| RegistryError::ParseError(format!("Invalid token: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            capacity_override,
        })
    }

    fn container_url(&self, container: &str) -> String {
        format!("{}/guilds/{}", self.base_url, container)
    }

    fn token_url(&self, container: &str, token: &str) -> String {
        format!("{}/guilds/{}/emojis/{}", self.base_url, container, token)
    }

    /// Fail unless the response carries exactly `expected`.
    async fn expect_status(response: Response, expected: StatusCode) -> Result<Response, RegistryError> {
        if response.status() == expected {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(RegistryError::Status { status, body })
    }
}

#[derive(Debug, Deserialize)]
struct ContainerResponse {
    #[serde(default)]
    emojis: Vec<TokenResponse>,
    #[serde(default)]
    premium_tier: u8,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateTokenRequest<'a> {
    name: &'a str,
    image: String,
}

#[derive(Debug, Serialize)]
struct RenameTokenRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

fn png_data_uri(asset: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(asset)
    )
}

#[async_trait]
impl TokenRegistry for HttpRegistryClient {
    async fn describe(&self, container: &str) -> Result<ContainerInfo, RegistryError> {
        let response = self
            .client
            .get(self.container_url(container))
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        let response = Self::expect_status(response, StatusCode::OK).await?;

        let detail: ContainerResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::ParseError(e.to_string()))?;

        Ok(ContainerInfo {
            id: container.to_string(),
            tokens: detail
                .emojis
                .into_iter()
                .map(|t| TokenInfo {
                    id: t.id,
                    name: t.name.unwrap_or_default(),
                })
                .collect(),
            capacity: self
                .capacity_override
                .unwrap_or_else(|| capacity_for_tier(detail.premium_tier)),
        })
    }

    async fn create(
        &self,
        container: &str,
        name: &str,
        asset: &[u8],
    ) -> Result<TokenId, RegistryError> {
        let request = CreateTokenRequest {
            name,
            image: png_data_uri(asset),
        };

        let response = self
            .client
            .post(format!("{}/emojis", self.container_url(container)))
            .json(&request)
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        let response = Self::expect_status(response, StatusCode::CREATED).await?;

        let created: IdResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::ParseError(e.to_string()))?;
        Ok(created.id)
    }

    async fn rename(&self, container: &str, token: &str, name: &str) -> Result<(), RegistryError> {
        let response = self
            .client
            .post(self.token_url(container, token))
            .json(&RenameTokenRequest { name })
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        Self::expect_status(response, StatusCode::OK).await?;
        Ok(())
    }

    async fn delete(&self, container: &str, token: &str) -> Result<(), RegistryError> {
        let response = self
            .client
            .delete(self.token_url(container, token))
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        Self::expect_status(response, StatusCode::NO_CONTENT).await?;
        Ok(())
    }

    async fn post_message(&self, channel: &str, content: &str) -> Result<String, RegistryError> {
        let response = self
            .client
            .post(format!("{}/channels/{}/messages", self.base_url, channel))
            .json(&MessageRequest { content })
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        let response = Self::expect_status(response, StatusCode::OK).await?;

        let message: IdResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::ParseError(e.to_string()))?;
        Ok(message.id)
    }
}
