use crate::error::{IntakeError, Result};
use crate::intake::types::{Attachment, InboundSubmission, ParsedMessage, DEFAULT_BODY, DEFAULT_TOPIC};
use crate::mime::{decode_header, MimeParser};
use crate::utils::parse_mailbox;
use tracing::debug;

/// Envelope & MIME decoder
///
/// Turns an [`InboundSubmission`] into a [`ParsedMessage`] without touching
/// the network. Steps run in a fixed order and the first failure wins:
/// RFC 822 framing, envelope addresses, subject, MIME body.
pub struct EnvelopeDecoder;

impl EnvelopeDecoder {
    pub fn decode(submission: &InboundSubmission) -> Result<ParsedMessage> {
        let (headers, body) = MimeParser::split_message(&submission.raw_message)?;

        let sender_email = parse_mailbox(&submission.sender)?.address();
        let recipient = submission
            .recipients
            .first()
            .ok_or_else(|| IntakeError::address("", "no recipients"))?;
        let recipient_email = parse_mailbox(recipient)?.address();

        let topic = match headers.get("subject") {
            Some(raw) => decode_header(raw)
                .map_err(|e| IntakeError::SubjectDecode(e.to_string()))?
                .trim()
                .to_string(),
            None => String::new(),
        };
        let topic = if topic.is_empty() {
            DEFAULT_TOPIC.to_string()
        } else {
            topic
        };

        let email = MimeParser::parse_body(&headers, body)?;

        let body_text = email.text();
        let body_text = if body_text.trim().is_empty() {
            DEFAULT_BODY.to_string()
        } else {
            body_text
        };

        let attachments: Vec<Attachment> = email
            .attachments
            .into_iter()
            .map(|part| Attachment {
                filename: part.filename.unwrap_or_default(),
                content: part.body,
            })
            .collect();

        debug!(
            topic = %topic,
            sender = %sender_email,
            recipient = %recipient_email,
            attachments = attachments.len(),
            "Message decoded"
        );

        Ok(ParsedMessage {
            topic,
            body_text,
            sender_email,
            recipient_email,
            attachments,
        })
    }
}
