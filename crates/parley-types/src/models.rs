use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::keys;

/// A schemaless record as held by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub collection: String,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Reads a timestamp field written by [`timestamp_value`].
    pub fn get_timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get_str(key)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Encodes a timestamp the way chat documents store it.
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("document {id} is missing field '{field}'")]
    MissingField { id: String, field: &'static str },

    #[error("document {id} has an unreadable '{field}' field")]
    InvalidField { id: String, field: &'static str },
}

fn required<'a>(doc: &'a Document, field: &'static str) -> Result<&'a str, DocumentError> {
    doc.get_str(field).ok_or_else(|| DocumentError::MissingField {
        id: doc.id.clone(),
        field,
    })
}

/// A user as listed in the directory. The password hash never leaves the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Base64-encoded profile picture.
    pub image: String,
    pub fcm_token: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl TryFrom<&Document> for User {
    type Error = DocumentError;

    fn try_from(doc: &Document) -> Result<Self, Self::Error> {
        Ok(Self {
            id: doc.id.clone(),
            first_name: doc.get_str(keys::FIRST_NAME).unwrap_or_default().to_string(),
            last_name: doc.get_str(keys::LAST_NAME).unwrap_or_default().to_string(),
            email: required(doc, keys::EMAIL)?.to_string(),
            image: doc.get_str(keys::IMAGE).unwrap_or_default().to_string(),
            fcm_token: doc.get_str(keys::FCM_TOKEN).map(str::to_string),
        })
    }
}

/// One message of a two-party conversation. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Store-assigned document id.
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Fields for a new chat document; the store assigns the id.
    pub fn new_fields(
        sender_id: &str,
        receiver_id: &str,
        body: &str,
        sent_at: DateTime<Utc>,
    ) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(keys::SENDER_ID.into(), Value::from(sender_id));
        fields.insert(keys::RECEIVER_ID.into(), Value::from(receiver_id));
        fields.insert(keys::MESSAGE.into(), Value::from(body));
        fields.insert(keys::TIMESTAMP.into(), timestamp_value(sent_at));
        fields
    }
}

impl TryFrom<&Document> for ChatMessage {
    type Error = DocumentError;

    fn try_from(doc: &Document) -> Result<Self, Self::Error> {
        let sent_at = doc
            .get_timestamp(keys::TIMESTAMP)
            .ok_or_else(|| DocumentError::InvalidField {
                id: doc.id.clone(),
                field: keys::TIMESTAMP,
            })?;

        Ok(Self {
            id: doc.id.clone(),
            sender_id: required(doc, keys::SENDER_ID)?.to_string(),
            receiver_id: required(doc, keys::RECEIVER_ID)?.to_string(),
            body: doc.get_str(keys::MESSAGE).unwrap_or_default().to_string(),
            sent_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn chat_doc(fields: Map<String, Value>) -> Document {
        Document {
            id: "m1".into(),
            collection: keys::COLLECTION_CHAT.into(),
            fields,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn chat_message_reads_back_its_own_fields() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let doc = chat_doc(ChatMessage::new_fields("alice", "bob", "hi", at));

        let msg = ChatMessage::try_from(&doc).unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.sender_id, "alice");
        assert_eq!(msg.receiver_id, "bob");
        assert_eq!(msg.body, "hi");
        assert_eq!(msg.sent_at, at);
    }

    #[test]
    fn chat_message_without_timestamp_is_rejected() {
        let mut fields = ChatMessage::new_fields("alice", "bob", "hi", Utc::now());
        fields.remove(keys::TIMESTAMP);

        let err = ChatMessage::try_from(&chat_doc(fields)).unwrap_err();
        assert_eq!(
            err,
            DocumentError::InvalidField { id: "m1".into(), field: keys::TIMESTAMP }
        );
    }

    #[test]
    fn user_requires_email() {
        let mut fields = Map::new();
        fields.insert(keys::FIRST_NAME.into(), "Ada".into());
        let doc = Document {
            id: "u1".into(),
            collection: keys::COLLECTION_USERS.into(),
            fields,
            created_at: Utc::now(),
        };
        assert!(matches!(
            User::try_from(&doc),
            Err(DocumentError::MissingField { field: keys::EMAIL, .. })
        ));
    }
}
