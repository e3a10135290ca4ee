//! MIME message parsing and handling
//!
//! This module splits RFC 822 messages, walks MIME multipart structures,
//! removes transfer encodings and decodes RFC 2047 header words.

pub mod encoded_word;
pub mod parser;
pub mod types;

pub use encoded_word::{decode_header, UnknownCharset};
pub use parser::MimeParser;
pub use types::{strip_html, MimePart, ParsedEmail};
