//! The per-message intake pipeline
//!
//! - [`decoder`]: raw submission to [`ParsedMessage`]
//! - [`guard`]: recipient domain check
//! - [`handler`]: [`MessageHandler`], composing decoder, guard and delivery

pub mod decoder;
pub mod guard;
pub mod handler;
pub mod types;

pub use decoder::EnvelopeDecoder;
pub use guard::DomainGuard;
pub use handler::{IntakeHandler, MessageHandler};
pub use types::{Attachment, InboundSubmission, ParsedMessage, DEFAULT_BODY, DEFAULT_TOPIC};
