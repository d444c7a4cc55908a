use axum::{
    async_trait,
    extract::{rejection::JsonRejection, ConnectInfo, FromRequestParts},
    http::request::Parts,
    Json,
};
use std::net::SocketAddr;

use crate::error::LifecycleError;
use crate::identity::Identity;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = LifecycleError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Identity::from_claims(header(parts, USER_ID_HEADER), header(parts, USER_ROLE_HEADER))
    }
}

/// Where a request came from, recorded alongside signatures.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = header(parts, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let ip_address = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        let user_agent = header(parts, "user-agent").map(str::to_string);
        Ok(Self {
            ip_address,
            user_agent,
        })
    }
}

/// Unwraps a JSON body, reporting malformed input as a validation error.
pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, LifecycleError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| LifecycleError::Validation(rejection.body_text()))
}

/// Like [`body`], but a request sent without a JSON body yields `T::default()`.
/// A body that is present and malformed is still rejected.
pub fn optional_body<T: Default>(
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, LifecycleError> {
    match payload {
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        payload => body(payload),
    }
}
