//! JSON API under `/api/v1` plus the `/ws` upgrade.
//!
//! Every body is wrapped in `{success, message, data?, error?}`. The acting user comes from
//! the `x-user-id` header; `x-correlation-id` is reused when the caller sends one.

mod applications;
mod chat;
mod groups;
mod issues;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use permitdesk_core::context::RequestContext;
use permitdesk_core::errors::{InterfaceError, WorkflowError};
use permitdesk_core::ids::UserId;
use permitdesk_realtime::RealtimeHub;
use permitdesk_workflow::Services;

pub const USER_HEADER: &str = "x-user-id";
pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    pub services: Services,
    pub hub: Option<Arc<RealtimeHub>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .merge(groups::routes())
        .merge(applications::routes())
        .merge(issues::routes())
        .merge(chat::routes())
        .route("/ws", get(crate::ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Machine-readable error code, present only on failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Envelope<()> {
    pub fn failure(
        message: impl Into<String>,
        code: &'static str,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: Some(code),
            correlation_id: Some(correlation_id.into()),
        }
    }
}

pub type ApiResult<T> = Result<(StatusCode, Json<Envelope<T>>), ApiError>;

pub fn ok<T>(message: impl Into<String>, data: T) -> ApiResult<T> {
    respond(StatusCode::OK, message, Some(data))
}

pub fn created<T>(message: impl Into<String>, data: T) -> ApiResult<T> {
    respond(StatusCode::CREATED, message, Some(data))
}

/// Success without a payload.
pub fn done(message: impl Into<String>) -> ApiResult<()> {
    respond(StatusCode::OK, message, None)
}

fn respond<T>(status: StatusCode, message: impl Into<String>, data: Option<T>) -> ApiResult<T> {
    Ok((status, Json(Envelope {
        success: true,
        message: message.into(),
        data,
        error: None,
        correlation_id: None,
    })))
}

/// User-facing failure. Internal details are logged, never returned.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    pub fn bad_request(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.into(),
        })
    }
}

impl From<InterfaceError> for ApiError {
    fn from(error: InterfaceError) -> Self {
        Self(error)
    }
}

fn error_code(error: &InterfaceError) -> &'static str {
    match error {
        InterfaceError::BadRequest { .. } => "BAD_REQUEST",
        InterfaceError::NotFound { .. } => "NOT_FOUND",
        InterfaceError::Forbidden { .. } => "FORBIDDEN",
        InterfaceError::Conflict { .. } => "CONFLICT",
        InterfaceError::Internal { .. } => "INTERNAL_ERROR",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let status = StatusCode::from_u16(error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match &error {
            InterfaceError::Internal { message, correlation_id } => error!(
                event_name = "api.request.failed",
                correlation_id = %correlation_id,
                error = %message,
                "request failed with an internal error"
            ),
            other => warn!(
                event_name = "api.request.rejected",
                correlation_id = %other.correlation_id(),
                status = status.as_u16(),
                reason = %other.user_message(),
                "request rejected"
            ),
        }

        let body =
            Envelope::failure(error.user_message(), error_code(&error), error.correlation_id());
        (status, Json(body)).into_response()
    }
}

/// Attaches the request's correlation id to a workflow failure.
pub trait InRequest<T> {
    fn in_request(self, ctx: &RequestContext) -> Result<T, ApiError>;
}

impl<T> InRequest<T> for Result<T, WorkflowError> {
    fn in_request(self, ctx: &RequestContext) -> Result<T, ApiError> {
        self.map_err(|error| ApiError(error.into_interface(ctx.correlation_id.clone())))
    }
}

#[derive(Clone, Debug)]
struct CorrelationId(String);

fn header_correlation_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// One id per request: reused from the header or minted once and kept in the extensions.
fn correlation_id(parts: &mut Parts) -> String {
    if let Some(CorrelationId(id)) = parts.extensions.get::<CorrelationId>() {
        return id.clone();
    }
    let id =
        header_correlation_id(&parts.headers).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    parts.extensions.insert(CorrelationId(id.clone()));
    id
}

/// The caller named by `x-user-id`, with the request's correlation id.
pub struct Actor(pub RequestContext);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(parts);
        let user = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ApiError::bad_request(format!("missing {USER_HEADER} header"), correlation_id.clone())
            })?;

        Ok(Self(RequestContext::new(UserId::from(user), correlation_id)))
    }
}

/// JSON body whose rejections use the envelope.
pub struct Body<T>(pub T);

impl<S, T> FromRequest<S> for Body<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = match req.extensions().get::<CorrelationId>() {
            Some(CorrelationId(id)) => id.clone(),
            None => header_correlation_id(req.headers())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        };

        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text(), correlation_id)),
        }
    }
}

/// Query string whose rejections use the envelope.
pub struct Params<T>(pub T);

impl<S, T> FromRequestParts<S> for Params<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(parts);
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text(), correlation_id)),
        }
    }
}
