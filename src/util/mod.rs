//! Utility functions shared by the feed, command and bot layers.
//!
//! - **URL validation**: scheme checks and the private-host guard applied to
//!   every URL a remote user can make the bot fetch
//! - **Text processing**: control-character stripping, status HTML to plain
//!   text, character-bounded truncation and message chunking

mod text;
mod url_validator;

pub use text::{chunk_lines, html_to_text, strip_control_chars, truncate_chars};
pub use url_validator::{validate_url, UrlPolicy, UrlValidationError};
