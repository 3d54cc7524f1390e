use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

/// Error categories reported back to the model or to the task invoker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    UnsupportedAction,
    InvalidArgs,
    OutOfBounds,
    ElementNotFound,
    SurfaceFailure,
    BudgetExceeded,
}

/// Failure of a native input or capture primitive.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The surface (browser connection, display server) is gone; the session cannot continue.
    #[error("surface unavailable: {0}")]
    Unavailable(String),

    #[error("{op} failed: {message}")]
    Primitive { op: &'static str, message: String },

    #[error("{0} is not supported by this surface")]
    Unsupported(&'static str),
}

impl SurfaceError {
    pub fn primitive(op: &'static str, err: impl Display) -> Self {
        SurfaceError::Primitive {
            op,
            message: format!("{:#}", err),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SurfaceError::Unavailable(_))
    }
}

/// Errors raised while executing a single action. All of them are recoverable
/// except a fatal [`SurfaceError`], which ends the session.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("coordinate ({x}, {y}) is outside the {width}x{height} display")]
    OutOfBounds { x: i64, y: i64, width: u32, height: u32 },

    #[error("no element with id {0} in the current index; take a new screenshot to refresh element ids")]
    ElementNotFound(u32),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

impl ActionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ActionError::InvalidArgs(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::UnsupportedAction(_) => ErrorKind::UnsupportedAction,
            ActionError::InvalidArgs(_) => ErrorKind::InvalidArgs,
            ActionError::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            ActionError::ElementNotFound(_) => ErrorKind::ElementNotFound,
            ActionError::Surface(_) => ErrorKind::SurfaceFailure,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ActionError::Surface(e) if e.is_fatal())
    }
}

/// Conditions that terminate the agent loop.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum FatalError {
    #[error("step budget of {limit} exhausted")]
    BudgetExceeded { limit: usize },

    #[error("input surface unavailable: {message}")]
    SurfaceUnavailable { message: String },

    #[error("model request failed: {message}")]
    ModelFailure { message: String },

    #[error("task cancelled")]
    Cancelled,
}

impl FatalError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            FatalError::BudgetExceeded { .. } => Some(ErrorKind::BudgetExceeded),
            FatalError::SurfaceUnavailable { .. } => Some(ErrorKind::SurfaceFailure),
            _ => None,
        }
    }
}

impl From<SurfaceError> for FatalError {
    fn from(err: SurfaceError) -> Self {
        FatalError::SurfaceUnavailable {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_surface_is_fatal() {
        assert!(ActionError::from(SurfaceError::Unavailable("closed".into())).is_fatal());
        assert!(!ActionError::from(SurfaceError::primitive("click", "timeout")).is_fatal());
        assert!(!ActionError::UnsupportedAction("fly".into()).is_fatal());
    }

    #[test]
    fn kinds_map_to_taxonomy() {
        assert_eq!(ActionError::ElementNotFound(3).kind(), ErrorKind::ElementNotFound);
        assert_eq!(
            ActionError::from(SurfaceError::Unsupported("scroll")).kind(),
            ErrorKind::SurfaceFailure
        );
        assert_eq!(
            FatalError::BudgetExceeded { limit: 5 }.kind(),
            Some(ErrorKind::BudgetExceeded)
        );
    }
}
