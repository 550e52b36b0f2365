use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::{claims::Identity, errors::AuthError, jwt::TokenService};
use crate::state::AppState;

/// Pull the token out of `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}

/// Turn the request headers into a verified identity.
///
/// Every verification failure collapses into one error so callers cannot tell
/// an expired token from a forged one.
pub fn authorize(headers: &HeaderMap, tokens: &TokenService) -> Result<Identity, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::AuthRequired)?;
    tokens.verify(token).ok_or_else(|| {
        warn!("invalid or expired token");
        AuthError::InvalidOrExpiredToken
    })
}

/// Route layer for authenticated endpoints. On success the [`Identity`] is
/// available to handlers as `Extension<Identity>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = authorize(req.headers(), &state.tokens)?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
