use std::net::SocketAddr;

/// Topic used when the Subject header is absent or decodes to nothing
pub const DEFAULT_TOPIC: &str = "Без темы";

/// Body used when no readable text can be extracted
pub const DEFAULT_BODY: &str = "Пустое письмо";

/// One message as handed over by the SMTP session after DATA.
#[derive(Debug, Clone)]
pub struct InboundSubmission {
    /// Peer that submitted the message (informational only)
    pub origin: Option<SocketAddr>,
    /// Reverse path from MAIL FROM
    pub sender: String,
    /// Forward paths from RCPT TO, in command order; only the first is used
    pub recipients: Vec<String>,
    /// The complete RFC 822 message after dot-unstuffing
    pub raw_message: Vec<u8>,
}

impl InboundSubmission {
    pub fn new(
        origin: Option<SocketAddr>,
        sender: impl Into<String>,
        recipients: Vec<String>,
        raw_message: Vec<u8>,
    ) -> Self {
        Self {
            origin,
            sender: sender.into(),
            recipients,
            raw_message,
        }
    }
}

/// A MIME part classified as an attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Decoded filename; may be empty and is not unique
    pub filename: String,
    /// Content with the transfer encoding removed
    pub content: Vec<u8>,
}

/// Decoded message ready for delivery.
///
/// `topic` and `body_text` are never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub topic: String,
    pub body_text: String,
    pub sender_email: String,
    pub recipient_email: String,
    pub attachments: Vec<Attachment>,
}
