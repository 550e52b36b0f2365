use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RegisterRequest},
        errors::{AuthError, MISSING_LOGIN_FIELDS, MISSING_REGISTRATION_FIELDS},
        repo::compare_password,
        repo_types::PublicUser,
    },
    state::AppState,
};

/// Treat absent and empty strings alike.
fn present(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.is_empty())
}

pub async fn register(state: &AppState, req: RegisterRequest) -> Result<AuthResponse, AuthError> {
    let (Some(name), Some(email), Some(password)) =
        (present(req.name), present(req.email), present(req.password))
    else {
        return Err(AuthError::MissingFields(MISSING_REGISTRATION_FIELDS));
    };

    if state.accounts.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AuthError::DuplicateEmail);
    }

    // the store's unique constraint still settles concurrent registrations
    let account = state.accounts.create(&name, &email, &password).await?;
    let token = state.tokens.issue(&account)?;

    info!(user_id = %account.id, email = %account.email, "user registered");
    Ok(AuthResponse {
        user: account.into(),
        token,
    })
}

pub async fn login(state: &AppState, req: LoginRequest) -> Result<AuthResponse, AuthError> {
    let (Some(email), Some(password)) = (present(req.email), present(req.password)) else {
        return Err(AuthError::MissingFields(MISSING_LOGIN_FIELDS));
    };

    let Some(account) = state.accounts.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AuthError::AccountNotFound);
    };

    if !compare_password(&account, &password).await? {
        warn!(user_id = %account.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    let token = state.tokens.issue(&account)?;
    info!(user_id = %account.id, "user logged in");
    Ok(AuthResponse {
        user: account.into(),
        token,
    })
}

pub async fn get_profile(state: &AppState, account_id: Uuid) -> Result<PublicUser, AuthError> {
    match state.accounts.find_by_id(account_id).await? {
        Some(account) => Ok(account.into()),
        None => {
            warn!(user_id = %account_id, "token subject no longer exists");
            Err(AuthError::AccountNotFound)
        }
    }
}
