//! Core types shared by the binary: user-facing errors and their presentation.
//!
//! Library modules return their own precise error types; this module gathers them
//! into [`HbscopeError`] and renders them with [`ErrorContext`] for the terminal.
//!
//! ```rust
//! use hbscope::core::{HbscopeError, ErrorContext};
//!
//! let context = ErrorContext::new(HbscopeError::TemplateNotFound {
//!     path: "page.hbs".to_string(),
//! })
//! .with_suggestion("Check the template path");
//! assert!(context.to_string().contains("page.hbs"));
//! ```

pub mod error;

pub use error::{ErrorContext, HbscopeError, user_friendly_error};
