//! RFC 7807 problem documents.

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::capacity::CapacityError;
use crate::coordinator::{CoordinatorError, ProvisionError};

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub code: String,
    pub request_id: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
    /// Pipeline step that failed, for provisioning errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    /// Pipeline steps whose effects were left in place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_steps: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://roomvisor.dev/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            instance: None,
            code,
            request_id: "unknown".to_string(),
            retryable: false,
            details: None,
            failed_step: None,
            completed_steps: None,
        }
    }

    fn set_request_id(&mut self, request_id: impl Into<String>) {
        let request_id = request_id.into();
        self.request_id = request_id.clone();
        if self.instance.is_none() {
            self.instance = Some(request_id);
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn with_status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, code, message)
    }

    pub fn bad_gateway(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_GATEWAY, code, message)
    }

    pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::SERVICE_UNAVAILABLE, code, message).retryable()
    }

    pub fn gateway_timeout(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::GATEWAY_TIMEOUT, code, message).retryable()
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.problem.set_request_id(request_id);
        self
    }

    pub fn with_details(mut self, details: Vec<FieldError>) -> Self {
        self.problem.details = Some(details);
        self
    }

    fn retryable(mut self) -> Self {
        self.problem.retryable = true;
        self
    }

    fn with_provision_steps(mut self, err: &ProvisionError) -> Self {
        self.problem.failed_step = Some(err.step.to_string());
        self.problem.completed_steps = Some(err.completed.iter().map(ToString::to_string).collect());
        self
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        let detail = err.to_string();
        match &err {
            CoordinatorError::Queue(_) => Self::service_unavailable("queue_unavailable", detail),
            CoordinatorError::Capacity(CapacityError::NotFound(_)) => {
                Self::not_found("room_not_found", detail)
            }
            CoordinatorError::Capacity(CapacityError::AlreadyExists(_)) => {
                Self::conflict("room_already_running", detail)
            }
            CoordinatorError::Capacity(CapacityError::BackendUnavailable(_)) => {
                Self::service_unavailable("capacity_unavailable", detail)
            }
            CoordinatorError::Provision(e) if e.is_duplicate() => {
                Self::conflict("room_already_running", detail).with_provision_steps(e)
            }
            CoordinatorError::Provision(e) if e.is_timeout() => {
                Self::gateway_timeout("provision_timeout", detail).with_provision_steps(e)
            }
            CoordinatorError::Provision(e) => {
                Self::bad_gateway("provision_failed", detail).with_provision_steps(e)
            }
            CoordinatorError::DeadlineExceeded { .. } => {
                Self::gateway_timeout("deadline_exceeded", detail)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
