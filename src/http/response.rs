//! Response construction.
//!
//! # Responsibilities
//! - Build the plain-text error, redirect and empty responses the dispatcher sends
//! - Map resource errors to HTTP status codes
//!
//! # Design Decisions
//! - Error bodies are plain text, never JSON
//! - Programming errors (unsupported operations) are logged with a backtrace
//!   and answered with a generic 500; their details never reach the client

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::backtrace::Backtrace;

use crate::http::request::RestRequest;
use crate::resource::{MethodSet, ResourceError};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Plain-text response with `status` and `message` as the body.
pub fn plain_text(status: StatusCode, message: impl Into<String>) -> Response {
    let message: String = message.into();
    let mut response = (status, message).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

/// Plain-text response whose body is the status's reason phrase.
pub fn status_text(status: StatusCode) -> Response {
    plain_text(status, status.canonical_reason().unwrap_or_default())
}

pub fn not_found() -> Response {
    status_text(StatusCode::NOT_FOUND)
}

pub fn internal_error() -> Response {
    status_text(StatusCode::INTERNAL_SERVER_ERROR)
}

/// 301 to `location`.
pub fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = status_text(StatusCode::MOVED_PERMANENTLY);
            response.headers_mut().insert(header::LOCATION, value);
            response
        }
        Err(_) => {
            tracing::warn!(location = %location, "Redirect target is not a valid header value");
            not_found()
        }
    }
}

/// 405 with the `Allow` header listing `allowed`.
pub fn method_not_allowed(allowed: &MethodSet) -> Response {
    let mut response = status_text(StatusCode::METHOD_NOT_ALLOWED);
    if let Ok(value) = HeaderValue::from_str(&allowed.allow_header()) {
        response.headers_mut().insert(header::ALLOW, value);
    }
    response
}

pub fn no_content() -> Response {
    empty(StatusCode::NO_CONTENT)
}

/// 201 pointing at the created member.
pub fn created(location: &str) -> Response {
    let mut response = empty(StatusCode::CREATED);
    match HeaderValue::from_str(location) {
        Ok(value) => {
            response.headers_mut().insert(header::LOCATION, value);
        }
        Err(_) => {
            tracing::warn!(location = %location, "Created member URL is not a valid header value");
        }
    }
    response
}

pub fn empty(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// Turn a failed resource operation into a response.
pub fn report_error(err: &ResourceError, req: &RestRequest) -> Response {
    if err.is_programming_error() {
        tracing::error!(
            request_id = %req.request_id(),
            method = %req.method(),
            path = %req.uri().path(),
            error = %err,
            backtrace = %Backtrace::force_capture(),
            "Resource routed an operation it does not implement"
        );
        return internal_error();
    }

    let status = error_status(err);
    tracing::debug!(
        request_id = %req.request_id(),
        status = status.as_u16(),
        error = %err,
        "Resource operation rejected"
    );
    plain_text(status, err.to_string())
}

/// Status for a non-programming error.
pub fn error_status(err: &ResourceError) -> StatusCode {
    match err {
        ResourceError::Status { status, .. } => *status,
        ResourceError::Rejected(message) => {
            status_from_message(message).unwrap_or(StatusCode::BAD_REQUEST)
        }
        ResourceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ResourceError::Body(_) => StatusCode::BAD_REQUEST,
        ResourceError::Unsupported(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A message that begins with an error status code and a space
/// (`"409 name taken"`) or is exactly an error reason phrase (`"Not Found"`)
/// selects that status. Only 4xx and 5xx codes qualify.
pub fn status_from_message(message: &str) -> Option<StatusCode> {
    if let Some((code, _)) = message.split_once(' ') {
        let status = (code.len() == 3)
            .then(|| code.parse::<u16>().ok())
            .flatten()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .filter(|status| is_error(*status) && status.canonical_reason().is_some());
        if status.is_some() {
            return status;
        }
    }
    (400u16..600)
        .filter_map(|code| StatusCode::from_u16(code).ok())
        .find(|status| status.canonical_reason() == Some(message))
}

fn is_error(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}
