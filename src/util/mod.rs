//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL validation**: host policy checks on user-supplied feed URLs
//! - **HTML scanning**: tag and attribute extraction without a full HTML parser
//! - **Text processing**: character-based truncation and feed text sanitising
//!
//! # Examples
//!
//! ```
//! use rssbridge::util::{truncate_chars, upgrade_to_https, validate_url};
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.scheme(), "https");
//!
//! assert_eq!(truncate_chars("Long article title", 4), Some("Long"));
//! assert_eq!(upgrade_to_https("http://example.com"), "https://example.com");
//! ```

pub mod html;
mod text;
mod url_validator;

pub use text::{strip_control_chars, truncate_chars, upgrade_to_https, ELLIPSIS};
pub use url_validator::{validate_url, UrlPolicy, UrlValidationError};
