//! Template rendering module.
//!
//! Jinja2-style rendering for notification text and expression conditions.

pub mod jinja;

pub use jinja::TemplateRenderer;
