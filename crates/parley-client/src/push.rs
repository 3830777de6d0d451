//! Push-notification token bookkeeping. Delivery itself is the push
//! service's business; the client only keeps its device token on its user
//! record so senders can look it up.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_gateway::DocumentStore;
use parley_types::keys;

use crate::auth::current_user_id;
use crate::error::ClientError;
use crate::prefs::PreferenceStore;

/// Source of this device's opaque push token.
#[async_trait]
pub trait PushTokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, ClientError>;
}

/// Always hands out the same, externally supplied token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider(String);

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl PushTokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, ClientError> {
        Ok(self.0.clone())
    }
}

/// A random token generated once per provider, for devices without a push
/// service.
#[derive(Debug, Clone)]
pub struct RandomTokenProvider {
    token: String,
}

impl RandomTokenProvider {
    pub fn new() -> Self {
        let token = format!("local-{}", Uuid::new_v4().simple());
        on_new_token(&token);
        Self { token }
    }
}

impl Default for RandomTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushTokenProvider for RandomTokenProvider {
    async fn token(&self) -> Result<String, ClientError> {
        Ok(self.token.clone())
    }
}

/// Called whenever the push service issues a new token.
pub fn on_new_token(token: &str) {
    debug!(token, "Push token issued");
}

/// A message handed over by the push service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushMessage {
    pub title: Option<String>,
    /// Notification text. Data-only messages have none.
    pub body: Option<String>,
}

/// Called for every message the push service delivers. Returns the
/// notification body, if there is one.
pub fn on_message_received(message: &PushMessage) -> Option<&str> {
    let body = message.body.as_deref();
    match body {
        Some(body) => debug!(body, "Push message received"),
        None => debug!("Push message without a notification body"),
    }
    body
}

/// Store this device's token on the signed-in user's record.
pub async fn register_push_token(
    store: &dyn DocumentStore,
    prefs: &dyn PreferenceStore,
    provider: &dyn PushTokenProvider,
) -> Result<String, ClientError> {
    let user_id = current_user_id(prefs)?;
    let token = provider.token().await?;

    store
        .update_field(keys::COLLECTION_USERS, &user_id, keys::FCM_TOKEN, Value::from(token.as_str()))
        .await
        .inspect_err(|e| warn!(%user_id, "Unable to update token: {}", e))?;

    info!(%user_id, "Token updated successfully");
    Ok(token)
}
