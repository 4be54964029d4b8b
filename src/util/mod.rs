//! Utility functions shared by the pipeline and the CLI.
//!
//! - **URL helpers**: source URL validation, https→http scheme swap, host extraction
//! - **Text processing**: HTML→text, word-boundary truncation, control-char stripping

mod text;
mod url_validator;

pub use self::text::{html_to_text, strip_control_chars, truncate_at_word, truncate_chars};
pub use self::url_validator::{is_https, to_plain_http, validate_feed_url, website_name, UrlValidationError};
