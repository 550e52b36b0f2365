use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        claims::Identity,
        dto::{AuthResponse, LoginRequest, ProfileResponse, RegisterRequest},
        errors::AuthError,
        middleware::require_auth,
        services,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn profile_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

/// Unwraps a JSON body without letting axum's rejection text reach the client.
///
/// A request without a JSON content type (including one with no body at all)
/// is read as an empty object, so the field checks in [`services`] report it.
/// Anything else that fails to parse is [`AuthError::InvalidBody`].
fn json_body<T: Default>(body: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    match body {
        Ok(Json(payload)) => Ok(payload),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => {
            warn!(
                status = %rejection.status(),
                reason = %rejection.body_text(),
                "request body rejected"
            );
            Err(AuthError::InvalidBody)
        }
    }
}

#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let res = services::register(&state, json_body(body)?).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AuthError> {
    Ok(Json(services::login(&state, json_body(body)?).await?))
}

#[instrument(skip(state, identity), fields(user_id = %identity.account_id))]
pub async fn profile(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ProfileResponse>, AuthError> {
    let user = services::get_profile(&state, identity.account_id).await?;
    Ok(Json(ProfileResponse { user }))
}
