// Error taxonomy shared by the domain and application layers
use thiserror::Error;

/// Failure of a single Remote Query Service call.
///
/// The controller treats every variant the same way: the owning task falls
/// back to its decomposed plan, or the failing slice degrades to defaults.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("method '{method}' does not exist on '{entity}'")]
    MethodNotFound { entity: String, method: String },

    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("server fault: {0}")]
    Server(String),

    #[error("malformed result: {0}")]
    Malformed(String),
}

impl RemoteError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

/// A task, query or definition that cannot be built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("method '{method}' is not available on '{entity}'")]
    MethodNotAllowed { entity: String, method: String },

    #[error("malformed domain filter: {0}")]
    MalformedDomain(String),

    #[error("task '{task}': {message}")]
    InvalidTask { task: String, message: String },

    #[error("duplicate {kind} '{id}'")]
    Duplicate { kind: &'static str, id: String },

    #[error("refresh rule references unknown task '{0}'")]
    UnknownRefreshTask(String),

    #[error("invalid refresh policy: {0}")]
    InvalidRefresh(String),
}

/// Misuse of the controller lifecycle by the presentation layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    #[error("dashboard '{0}' is not active")]
    NotActive(String),

    #[error("dashboard '{dashboard}' has no task '{task}'")]
    UnknownTask { dashboard: String, task: String },

    #[error("refresh interval must be greater than zero")]
    ZeroInterval,
}
