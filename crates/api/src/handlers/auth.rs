//! Handlers for the `/auth` resource (register, login, profile).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use darkroom_core::error::CoreError;
use darkroom_db::models::user::{CreateUser, User, UserResponse};
use darkroom_db::repositories::UserRepo;

use crate::auth::jwt::generate_access_token;
use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Minimum accepted username length in characters.
const MIN_USERNAME_LEN: usize = 3;

/// Maximum accepted username length in characters.
const MAX_USERNAME_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/register` and `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

/// Successful authentication response returned by register and login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserResponse,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/register
///
/// Create an account and log it in. Returns 201 with an access token.
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<CredentialsRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let username = input.username.trim();

    // 1. Validate credentials before touching the database.
    validate_username(username).map_err(|msg| AppError::Core(CoreError::Validation(msg)))?;
    validate_password_strength(&input.password)
        .map_err(|msg| AppError::Core(CoreError::Validation(msg)))?;

    // 2. Hash the password.
    let password_hash = hash_password(&input.password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;

    // 3. Create the user. A duplicate username trips the unique
    //    constraint and surfaces as 409.
    let user = UserRepo::create(
        &state.pool,
        &CreateUser {
            username: username.to_string(),
            password_hash,
        },
    )
    .await?;

    tracing::info!(user_id = user.id, "User registered");

    // 4. Issue an access token so registration doubles as login.
    let response = auth_response(&state, user)?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/auth/login
///
/// Authenticate with username + password. Returns an access token.
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<CredentialsRequest>,
) -> AppResult<Json<AuthResponse>> {
    // 1. Find the user. Lookup misses and bad passwords produce the same
    //    message so usernames cannot be probed.
    let user = UserRepo::find_by_username(&state.pool, input.username.trim())
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid username or password".into(),
            ))
        })?;

    // 2. Verify the password.
    let password_valid = verify_password(&input.password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;

    if !password_valid {
        return Err(AppError::Core(CoreError::Unauthorized(
            "Invalid username or password".into(),
        )));
    }

    // 3. Issue an access token.
    let response = auth_response(&state, user)?;
    Ok(Json(response))
}

/// GET /api/v1/auth/profile
///
/// Return the authenticated user's public profile.
pub async fn profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<DataResponse<UserResponse>>> {
    let user = UserRepo::find_by_id(&state.pool, auth_user.user_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "User".to_string(),
            id: auth_user.user_id,
        })?;

    Ok(Json(DataResponse { data: user.into() }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Generate an access token and assemble the authentication response.
fn auth_response(state: &AppState, user: User) -> AppResult<AuthResponse> {
    let access_token = generate_access_token(user.id, &user.username, &state.config.jwt)
        .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;

    Ok(AuthResponse {
        access_token,
        expires_in: state.config.jwt.access_token_expiry_mins * 60,
        user: user.into(),
    })
}

/// Validate username length and character set.
fn validate_username(username: &str) -> Result<(), String> {
    if username.len() < MIN_USERNAME_LEN || username.len() > MAX_USERNAME_LEN {
        return Err(format!(
            "Username must be between {MIN_USERNAME_LEN} and {MAX_USERNAME_LEN} characters long"
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err("Username may only contain letters, digits, '_', '-', and '.'".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_length_bounds() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username("abc").is_ok());
        assert!(validate_username(&"a".repeat(64)).is_ok());
        assert!(validate_username(&"a".repeat(65)).is_err());
    }

    #[test]
    fn username_character_set() {
        assert!(validate_username("ansel.adams-76_x").is_ok());
        assert!(validate_username("no spaces").is_err());
        assert!(validate_username("no/slash").is_err());
    }
}
