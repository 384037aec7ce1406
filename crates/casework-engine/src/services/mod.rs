//! External collaborators invoked by step handlers.
//!
//! Both seams are traits injected into the engine so deployments pick the
//! delivery channel and AI provider, and tests use in-process fakes.

pub mod advisor;
pub mod notifier;

pub use advisor::{AiAdvisor, Classification, DisabledAdvisor, HttpAdvisor, ReviewVerdict};
pub use notifier::{Notifier, RecordingNotifier, TracingNotifier};
