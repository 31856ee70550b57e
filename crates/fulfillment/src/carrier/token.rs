//! Bearer tokens for the carrier API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::CarrierError;

/// Supplies the bearer token sent with every carrier request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, CarrierError>;

    /// Drops a cached token after the carrier refused it.
    async fn invalidate(&self) {}
}

/// A token fixed at start-up.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, CarrierError> {
        Ok(self.token.clone())
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Logs in with API-user credentials and caches the token until invalidated.
pub struct LoginTokenProvider {
    client: Client,
    base_url: String,
    email: String,
    password: String,
    cached: RwLock<Option<String>>,
}

impl LoginTokenProvider {
    pub fn new(
        client: Client,
        base_url: &str,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.into(),
            password: password.into(),
            cached: RwLock::new(None),
        }
    }

    async fn login(&self) -> Result<String, CarrierError> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&LoginRequest {
                email: &self.email,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| CarrierError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CarrierError::Auth(format!(
                "login returned HTTP {}",
                response.status()
            )));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| CarrierError::Decode(e.to_string()))?;
        Ok(body.token)
    }
}

#[async_trait]
impl TokenProvider for LoginTokenProvider {
    async fn token(&self) -> Result<String, CarrierError> {
        if let Some(token) = self.cached.read().await.as_ref() {
            return Ok(token.clone());
        }

        let mut cached = self.cached.write().await;
        // Another caller may have logged in while we waited for the lock
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        tracing::debug!("logging in to carrier API");
        let token = self.login().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn invalidate(&self) {
        self.cached.write().await.take();
    }
}
