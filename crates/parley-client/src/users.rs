use tracing::{debug, warn};

use parley_gateway::DocumentStore;
use parley_types::keys;
use parley_types::models::User;
use parley_types::query::Query;

use crate::error::ClientError;

/// Everyone the current user can start a chat with.
pub async fn list_users(
    store: &dyn DocumentStore,
    current_user_id: &str,
) -> Result<Vec<User>, ClientError> {
    let docs = store.query(&Query::collection(keys::COLLECTION_USERS)).await?;

    let users: Vec<User> = docs
        .iter()
        .filter(|doc| doc.id != current_user_id)
        .filter_map(|doc| {
            User::try_from(doc)
                .inspect_err(|e| warn!("Skipping user record: {}", e))
                .ok()
        })
        .collect();

    debug!(count = users.len(), "Loaded user directory");
    if users.is_empty() {
        return Err(ClientError::NoUsersAvailable);
    }
    Ok(users)
}

pub async fn find_user(store: &dyn DocumentStore, id: &str) -> Result<User, ClientError> {
    let doc = store
        .get(keys::COLLECTION_USERS, id)
        .await?
        .ok_or_else(|| ClientError::UnknownUser(id.to_string()))?;
    Ok(User::try_from(&doc)?)
}
