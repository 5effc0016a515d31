//! Authentication collaborator boundary.
//!
//! The engine never stores credentials: a [`TokenProvider`] supplies the
//! current bearer token on demand and absorbs 401-class failures. The
//! engine's only obligations are to attach the token to every request and
//! to report the first sign of rejection; clearing credentials and
//! prompting re-authentication belong to the provider.

use std::sync::Arc;

use skiff_proto::UserRef;

use crate::{config::ClientConfig, error::ClientError};

/// Supplies the bearer token and absorbs authorization failures.
pub trait TokenProvider: Send + Sync + 'static {
    /// The current bearer token.
    fn token(&self) -> String;

    /// Called on any 401-class response. Such failures are never retried
    /// here; the provider owns credential clearing and recovery.
    fn unauthorized(&self);
}

/// A fixed token, for tools and tests.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    /// Wrap a token string.
    pub fn new(token: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { token: token.into() })
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> String {
        self.token.clone()
    }

    fn unauthorized(&self) {
        tracing::warn!("server rejected the static token");
    }
}

/// Map a response through the shared status policy: 401 notifies the token
/// provider and is terminal, any other non-success status is an HTTP error.
pub(crate) fn require_success(
    response: reqwest::Response,
    tokens: &dyn TokenProvider,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();

    if status.as_u16() == 401 {
        tokens.unauthorized();
        return Err(ClientError::Unauthorized);
    }

    if !status.is_success() {
        return Err(ClientError::Http { status: status.as_u16() });
    }

    Ok(response)
}

/// Validate the token against the REST boundary and fetch the current user.
///
/// Used both at session startup (the engine needs its own user id to place
/// the unread boundary) and before each socket dial.
pub async fn fetch_current_user(
    http: &reqwest::Client,
    config: &ClientConfig,
    tokens: &dyn TokenProvider,
) -> Result<UserRef, ClientError> {
    let response = http
        .get(format!("{}/auth/me", config.api_base))
        .bearer_auth(tokens.token())
        .timeout(config.request_timeout)
        .send()
        .await?;

    let response = require_success(response, tokens)?;
    Ok(response.json::<UserRef>().await?)
}
