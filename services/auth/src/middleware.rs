//! Middleware for bearer token validation and caller identity resolution

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::debug;
use uuid::Uuid;

use crate::{error::AuthError, jwt::JwtService};

/// Authenticated caller identity
///
/// Inserted into request extensions by [`require_auth`] and passed explicitly
/// into every service call that needs to know who is asking.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

/// Resolve the caller from the `Authorization: Bearer` header
pub async fn require_auth(
    State(jwt_service): State<JwtService>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(AuthError::Unauthenticated)?;

    let claims = jwt_service.verify(bearer.token()).map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        AuthError::Unauthenticated
    })?;

    req.extensions_mut().insert(AuthUser {
        id: claims.sub,
        email: claims.email,
    });

    Ok(next.run(req).await)
}
