use shared::{
    domain::{NodeId, RouterId},
    error::{ErrorCode, ShellError},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("no route on {router} matches '{path}'")]
    RouteNotFound { router: RouterId, path: String },
    #[error("route '{pattern}' registered on {router} after navigation started")]
    RegistrationClosed { router: RouterId, pattern: String },
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("{0} has been destroyed")]
    Destroyed(RouterId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("component loader for {node} failed: {message}")]
    Failed { node: NodeId, message: String },
    #[error("{0} no longer exists")]
    Gone(NodeId),
}

impl From<&RouterError> for ShellError {
    fn from(value: &RouterError) -> Self {
        let code = match value {
            RouterError::RouteNotFound { .. } | RouterError::Destroyed(_) => {
                ErrorCode::RouteNotFound
            }
            RouterError::RegistrationClosed { .. } => ErrorCode::RegistrationClosed,
            RouterError::InvalidPattern { .. } => ErrorCode::InvalidPattern,
        };
        ShellError::new(code, value.to_string())
    }
}

impl From<&LoadError> for ShellError {
    fn from(value: &LoadError) -> Self {
        ShellError::new(ErrorCode::LoaderFailure, value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error(transparent)]
    Location(#[from] shared::error::ShellException),
    #[error(transparent)]
    Router(#[from] RouterError),
}

impl From<&NavigationError> for ShellError {
    fn from(value: &NavigationError) -> Self {
        match value {
            NavigationError::Location(err) => ShellError::new(err.code, err.message.clone()),
            NavigationError::Router(err) => err.into(),
        }
    }
}
