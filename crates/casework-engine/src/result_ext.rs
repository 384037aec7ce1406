//! Logging for errors that have nowhere left to propagate.
//!
//! Detached workflow starts, recovery sweeps and NATS intake handlers end
//! in a `Result` no caller will see; `.log(..)` records it with the call
//! site before it is dropped.

use std::fmt::Display;
use std::panic::Location;

use tracing::error;

pub trait ResultExt<T, E> {
    /// Log an `Err` with `context` and the caller's location, then hand
    /// the result back unchanged.
    ///
    /// ```ignore
    /// use casework_engine::ResultExt;
    ///
    /// let _ = engine.recover().await.log("startup recovery");
    /// ```
    fn log<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let at = Location::caller();
            error!(
                target: "casework_engine",
                error = %e,
                at = %format_args!("{}:{}", at.file(), at.line()),
                context = %context.to_string(),
                "Unhandled engine error"
            );
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_log_passes_ok_through() {
        let result: Result<u32, EngineError> = Ok(3);
        assert_eq!(result.log("advancing").unwrap(), 3);
    }

    #[test]
    fn test_log_keeps_error() {
        let result: Result<u32, EngineError> =
            Err(EngineError::NotFound("execution 7".to_string()));
        assert!(matches!(
            result.log("resuming"),
            Err(EngineError::NotFound(_))
        ));
    }
}
