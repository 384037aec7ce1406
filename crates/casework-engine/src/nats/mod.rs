//! NATS integration.
//!
//! - **Publisher**: delivers notifications over JetStream
//! - **Intake**: turns case events, task completions and operator
//!   commands received on NATS into engine calls

pub mod intake;
pub mod publisher;

pub use intake::{CaseEvent, ControlCommand, Intake, TaskCompletedEvent};
pub use publisher::{NatsNotifier, NotificationEnvelope};
