//! Error types for the admin backend and their HTTP mapping.
//!
//! Store-level failures (`StoreError`) are wrapped by the data provider with the
//! resource name and the attempted action before they reach a handler.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures reported by a `TableStore` implementation.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("not authenticated (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },
    #[error("backend HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode backend response: {0}")]
    Decode(String),
}

/// What the adapter was attempting when a call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn verb(self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::List => "list",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    /// Row-level permission the action needs on the backing table.
    pub fn permission(self) -> &'static str {
        match self {
            Action::Get | Action::List => "SELECT",
            Action::Create => "INSERT",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        }
    }
}

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    #[error("invalid {resource}: {message}")]
    Validation { resource: String, message: String },
    #[error("Failed to {} {resource}: {source}", .action.verb())]
    Backend {
        action: Action,
        resource: String,
        #[source]
        source: StoreError,
    },
    #[error("{}", no_rows_message(.action, .resource, .id))]
    NoRows {
        action: Action,
        resource: String,
        id: Option<String>,
    },
    #[error("Configuration with key {0} not found in either table")]
    ConfigNotFound(String),
    #[error("not authenticated: {0}")]
    Unauthorized(String),
    #[error("Failed to update order: {0}")]
    Ordering(String),
    #[error("Failed to get question count: {0}")]
    PoolCount(String),
    #[error("Failed to populate question pool: {0}")]
    PoolPopulate(String),
    #[error("configuration error: {0}")]
    Config(String),
}

fn no_rows_message(action: &Action, resource: &str, id: &Option<String>) -> String {
    let action = *action;
    let subject = match (action, id) {
        (Action::Get, Some(id)) => format!("{resource} with id {id} not found"),
        (_, Some(id)) => format!("Failed to {} {resource} with id {id}", action.verb()),
        (_, None) => format!("Failed to {} {resource}", action.verb()),
    };
    format!(
        "{subject}. This might be due to Row Level Security (RLS) policies. \
         Please ensure you have {} permissions on the {resource} table.",
        action.permission()
    )
}

impl AdminError {
    /// Wrap a store failure with resource context. Authentication failures stay
    /// distinguishable so the dashboard can redirect to its login screen.
    pub fn from_store(action: Action, resource: &str, source: StoreError) -> Self {
        match source {
            StoreError::Unauthorized { message, .. } => AdminError::Unauthorized(message),
            source => AdminError::Backend {
                action,
                resource: resource.to_string(),
                source,
            },
        }
    }

    pub fn validation(resource: &str, message: impl Into<String>) -> Self {
        AdminError::Validation {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AdminError::UnknownResource(_)
            | AdminError::NoRows { .. }
            | AdminError::ConfigNotFound(_) => StatusCode::NOT_FOUND,
            AdminError::Validation { .. } => StatusCode::BAD_REQUEST,
            AdminError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AdminError::Backend { .. }
            | AdminError::Ordering(_)
            | AdminError::PoolCount(_)
            | AdminError::PoolPopulate(_) => StatusCode::BAD_GATEWAY,
            AdminError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<&'static str>,
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status();
        let redirect = matches!(self, AdminError::Unauthorized(_)).then_some("/login");
        if status.is_server_error() {
            tracing::error!(target: "admin_backend", %status, error = %self, "request failed");
        } else {
            tracing::warn!(target: "admin_backend", %status, error = %self, "request rejected");
        }
        let body = Json(ErrorBody {
            message: self.to_string(),
            redirect,
        });
        (status, body).into_response()
    }
}

pub type AdminResult<T> = Result<T, AdminError>;
