//! Small helpers shared by the feed adapters and registration.
//!
//! - **Text**: stripping control characters from feed-provided strings
//! - **URL validation**: refusing non-HTTP and internal feed URLs

mod text;
mod url_validator;

pub use text::strip_control_chars;
pub use url_validator::{validate_feed_url, UrlValidationError};
