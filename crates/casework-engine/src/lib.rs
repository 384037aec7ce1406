//! Casework Workflow Engine Library
//!
//! Drives case records (permits, grants, inspections) through configurable
//! workflows in response to domain events:
//!
//! - **Trigger resolution**: pick the workflow a "case submitted" event starts
//! - **Execution**: advance step by step, skip steps whose conditions fail,
//!   and park on manual steps until a human completes the task
//! - **Step handlers**: AI review and classification, document and payment
//!   checks, notifications, task creation, inspection scheduling, status updates
//! - **Task bridge**: task completion resumes the waiting execution
//!
//! ## Architecture
//!
//! The engine owns only execution state. Case records, definitions, tasks and
//! staff live behind the store traits in [`store`]; notification delivery and
//! AI calls behind the traits in [`services`]. The binary wires them to
//! PostgreSQL, NATS JetStream and an OpenAI-compatible endpoint.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`db`]: Database connectivity and row models
//! - [`engine`]: The execution state machine and step handlers
//! - [`error`]: Engine error types
//! - [`model`]: Cases, definitions, executions and tasks
//! - [`nats`]: Notification publishing and event intake
//! - [`store`]: Persistence seams with in-memory and PostgreSQL adapters
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use casework_engine::{
//!     engine::{Collaborators, WorkflowEngine},
//!     services::{DisabledAdvisor, TracingNotifier},
//!     store::InMemoryStore,
//! };
//!
//! let store = Arc::new(InMemoryStore::new());
//! let engine = WorkflowEngine::new(Collaborators::from_store(
//!     store,
//!     Arc::new(TracingNotifier),
//!     Arc::new(DisabledAdvisor),
//! ));
//! let outcome = engine.start(&case, "case_submitted", None).await?;
//! ```

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod nats;
pub mod result_ext;
pub mod services;
pub mod store;
pub mod template;

pub use error::{EngineError, EngineResult};
pub use result_ext::ResultExt;
