//! Gateway-level error taxonomy.

use thiserror::Error;

use crate::contracts::ToolName;
use crate::engine::EngineError;
use crate::schema::ValidationError;
use crate::session::SessionError;

/// Failure of a single tool invocation.
///
/// Every variant is reported to the caller as a tool-execution failure; none
/// of them invalidates the live session.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to initialise Stagehand: {0}")]
    SessionInit(#[source] EngineError),
    #[error("Stagehand page not available")]
    SessionUnavailable,
    #[error("{tool} failed: {source}")]
    EngineOperation {
        tool: ToolName,
        #[source]
        source: EngineError,
    },
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl GatewayError {
    pub fn engine(tool: ToolName, source: impl Into<EngineError>) -> Self {
        GatewayError::EngineOperation {
            tool,
            source: source.into(),
        }
    }
}

impl From<SessionError> for GatewayError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Init(source) => GatewayError::SessionInit(source),
            // Teardown failures are swallowed by the session manager and
            // never reach a tool call.
            SessionError::Unavailable | SessionError::Teardown(_) => {
                GatewayError::SessionUnavailable
            }
        }
    }
}
