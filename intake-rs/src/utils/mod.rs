//! Utility modules
//!
//! - [`email`]: RFC 5322 mailbox parsing

pub mod email;

pub use email::{parse_mailbox, Mailbox};
