use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type PanelResult<T> = Result<T, PanelError>;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Plan not found or inactive")]
    PlanNotFound,

    #[error("Server limit reached")]
    ServerLimitReached,

    #[error("No node with spare capacity is available")]
    NoCapacityAvailable,

    #[error("Port allocation exhausted after {0} attempts")]
    PortAllocationExhausted(u32),

    #[error("Server is suspended")]
    ServerSuspended,

    #[error("Server is running or starting")]
    ServerBusy,

    #[error("Node agent unreachable: {0}")]
    AgentUnreachable(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Rate limit exceeded for {0}")]
    RateLimited(&'static str),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<std::io::Error> for PanelError {
    fn from(err: std::io::Error) -> Self {
        PanelError::Persistence(err.to_string())
    }
}

impl PanelError {
    /// Stable machine-checkable reason code, paired with the human message
    /// in every error response body.
    pub fn code(&self) -> &'static str {
        match self {
            PanelError::Validation(_) => "validation_error",
            PanelError::NotFound(_) => "not_found",
            PanelError::PlanNotFound => "plan_not_found",
            PanelError::ServerLimitReached => "server_limit_reached",
            PanelError::NoCapacityAvailable => "no_capacity",
            PanelError::PortAllocationExhausted(_) => "port_allocation_exhausted",
            PanelError::ServerSuspended => "server_suspended",
            PanelError::ServerBusy => "server_busy",
            PanelError::AgentUnreachable(_) => "agent_unreachable",
            PanelError::Unauthorized => "unauthorized",
            PanelError::InvalidStatus(_) => "invalid_status",
            PanelError::RateLimited(_) => "rate_limited",
            PanelError::Persistence(_) => "persistence_error",
            PanelError::JsonError(_) => "validation_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PanelError::Validation(_) | PanelError::JsonError(_) | PanelError::InvalidStatus(_) => {
                StatusCode::BAD_REQUEST
            }
            PanelError::Unauthorized => StatusCode::UNAUTHORIZED,
            PanelError::NotFound(_) | PanelError::PlanNotFound => StatusCode::NOT_FOUND,
            PanelError::ServerLimitReached
            | PanelError::ServerSuspended
            | PanelError::ServerBusy
            | PanelError::PortAllocationExhausted(_) => StatusCode::CONFLICT,
            PanelError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            PanelError::NoCapacityAvailable | PanelError::AgentUnreachable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PanelError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PanelError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Credential failures stay terse so the response carries no hints
        // about which check tripped.
        let body = if matches!(self, PanelError::Unauthorized) {
            json!({ "error": self.code() })
        } else {
            json!({ "error": self.code(), "message": self.to_string() })
        };
        (status, Json(body)).into_response()
    }
}
