//! Relaying decoded messages into the MailHub backend
//!
//! - [`api`]: the endpoint contract ([`MessageApi`])
//! - [`http`]: its reqwest implementation
//! - [`orchestrator`]: create-then-attach delivery with per-attachment failure isolation

pub mod api;
pub mod http;
pub mod orchestrator;

pub use api::{CreatedMessageRecord, MessageApi, NewMessage};
pub use http::HttpMessageApi;
pub use orchestrator::{DeliveryOrchestrator, DeliveryReport, LinkOutcome, UploadedFile};
