//! intake-rs: inbound SMTP intake for the MailHub webmail platform
//!
//! Accepts mail over SMTP, decodes it (RFC 822, MIME, RFC 2047), refuses
//! recipients outside the local domain and relays the message and its
//! attachments into the MailHub HTTP API.
//!
//! # Pipeline
//!
//! 1. [`smtp`] terminates the protocol and hands each transaction over as an
//!    [`intake::InboundSubmission`]
//! 2. [`intake::EnvelopeDecoder`] produces an [`intake::ParsedMessage`]
//! 3. [`intake::DomainGuard`] checks the recipient
//! 4. [`delivery::DeliveryOrchestrator`] creates the message, then uploads and
//!    links each attachment; attachment failures are logged, not fatal
//!
//! # Example
//!
//! ```no_run
//! use intake_rs::config::Config;
//! use intake_rs::intake::IntakeHandler;
//! use intake_rs::smtp::SmtpServer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let handler = Arc::new(IntakeHandler::from_config(&config)?);
//!
//!     let server = SmtpServer::new(config, handler);
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod delivery;
pub mod error;
pub mod intake;
pub mod mime;
pub mod smtp;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{IntakeError, Result};
