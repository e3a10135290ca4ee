use thiserror::Error;

/// Fatal errors of the intake pipeline and its surroundings.
///
/// Every variant produced while handling a submission rejects the whole SMTP
/// transaction; see [`IntakeError::smtp_reply`].
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SMTP protocol error: {0}")]
    SmtpProtocol(String),

    #[error("Malformed message: {0}")]
    ProtocolParse(String),

    #[error("Invalid mailbox address {address:?}: {reason}")]
    AddressParse { address: String, reason: String },

    #[error("Recipient {0} is not served by this domain")]
    DomainRejected(String),

    #[error("Cannot decode subject: {0}")]
    SubjectDecode(String),

    #[error("Cannot decode message body: {0}")]
    BodyDecode(String),

    #[error("Message creation failed: {0}")]
    UpstreamCreateFailed(#[source] ApiError),
}

impl IntakeError {
    pub fn address(address: &str, reason: impl Into<String>) -> Self {
        IntakeError::AddressParse {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// SMTP reply line (with CRLF) reporting this error to the submitting client.
    ///
    /// The text is fixed per variant and never echoes client input; details
    /// only go to the log.
    pub fn smtp_reply(&self) -> String {
        let line = match self {
            IntakeError::AddressParse { .. } => "553 5.1.3 Invalid mailbox address",
            IntakeError::DomainRejected(_) => "550 5.7.1 Relay not permitted",
            IntakeError::ProtocolParse(_) => "554 5.6.0 Malformed message",
            IntakeError::SubjectDecode(_) => "554 5.6.0 Cannot decode subject",
            IntakeError::BodyDecode(_) => "554 5.6.0 Cannot decode message body",
            IntakeError::UpstreamCreateFailed(_) => "554 5.3.0 Message could not be delivered",
            IntakeError::Io(_) | IntakeError::Config(_) | IntakeError::SmtpProtocol(_) => {
                "451 4.3.0 Local error in processing"
            }
        };
        format!("{}\r\n", line)
    }
}

/// Failure of a single call to the MailHub API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    Decode(String),
}

/// Per-attachment failure. Logged by the orchestrator, never escalated.
#[derive(Error, Debug)]
pub enum AttachmentError {
    #[error("upload of attachment #{index} {filename:?} failed: {source}")]
    Upload {
        index: usize,
        filename: String,
        #[source]
        source: ApiError,
    },

    #[error("linking file {file_id} (attachment #{index} {filename:?}) to message {message_id} failed: {source}")]
    Link {
        index: usize,
        filename: String,
        message_id: u64,
        file_id: u64,
        #[source]
        source: ApiError,
    },
}

pub type Result<T> = std::result::Result<T, IntakeError>;
