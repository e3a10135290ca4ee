//! Contract of the three MailHub endpoints the intake relays into.

use crate::error::ApiError;
use crate::intake::{Attachment, ParsedMessage};
use serde::{Deserialize, Serialize};

/// Body of the message-creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub topic: String,
    pub text: String,
    pub sender_email: String,
    pub recipient_email: String,
}

impl From<&ParsedMessage> for NewMessage {
    fn from(message: &ParsedMessage) -> Self {
        Self {
            topic: message.topic.clone(),
            text: message.body_text.clone(),
            sender_email: message.sender_email.clone(),
            recipient_email: message.recipient_email.clone(),
        }
    }
}

/// Message as created by the backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedMessageRecord {
    pub id: u64,
    #[serde(default)]
    pub topic: String,
}

/// MailHub message API
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MessageApi: Send + Sync {
    /// Create the message; everything else hangs off the returned id
    async fn create_message(&self, message: &NewMessage) -> Result<CreatedMessageRecord, ApiError>;

    /// Upload one attachment, returning the stored file id
    async fn store_attachment(&self, attachment: &Attachment) -> Result<u64, ApiError>;

    /// Attach a stored file to a created message
    async fn link_attachment(&self, message_id: u64, file_id: u64) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_wire_format() {
        let message = ParsedMessage {
            topic: "Hello".to_string(),
            body_text: "Hi".to_string(),
            sender_email: "alice@mailhub.su".to_string(),
            recipient_email: "bob@mailhub.su".to_string(),
            attachments: vec![Attachment {
                filename: "a.txt".to_string(),
                content: b"a".to_vec(),
            }],
        };

        let json = serde_json::to_value(NewMessage::from(&message)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "topic": "Hello",
                "text": "Hi",
                "senderEmail": "alice@mailhub.su",
                "recipientEmail": "bob@mailhub.su",
            })
        );
    }

    #[test]
    fn test_created_message_ignores_extra_fields() {
        let record: CreatedMessageRecord = serde_json::from_str(
            r#"{"id": 5, "topic": "Hello", "readStatus": false, "senderEmail": "alice@mailhub.su"}"#,
        )
        .unwrap();
        assert_eq!(
            record,
            CreatedMessageRecord {
                id: 5,
                topic: "Hello".to_string()
            }
        );
    }
}
