//! SMTP listener (RFC 5321)
//!
//! - [`server`]: accept loop, one task per connection
//! - [`session`]: SMTP session state machine
//! - [`commands`]: SMTP command parsing
//!
//! Each completed transaction is handed to a [`crate::intake::MessageHandler`].

pub mod commands;
pub mod server;
pub mod session;

pub use commands::{MailFrom, SmtpCommand};
pub use server::SmtpServer;
pub use session::SmtpSession;
