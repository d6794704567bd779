use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::{error, info};
use uuid::Uuid;

use parley_db::models::UserRow;
use parley_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};
use parley_types::models::UserProfile;

use crate::state::AppState;

pub const DEFAULT_PROFILE_PIC: &str =
    "https://icon-library.com/images/anonymous-avatar-icon/anonymous-avatar-icon-25.jpg";

const TOKEN_LIFETIME_DAYS: i64 = 30;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = req.name.trim();
    let email = req.email.trim().to_lowercase();

    // Validate input
    if name.is_empty() || name.chars().count() > 64 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !email.contains('@') {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Check if email is taken
    if state
        .db
        .get_user_by_email(&email)
        .map_err(internal)?
        .is_some()
    {
        return Err(StatusCode::CONFLICT);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .to_string();

    let profile_pic = req
        .profile_pic
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE_PIC.to_string());

    // A concurrent registration may have taken the email since the check.
    let user_id = Uuid::new_v4();
    let created = state
        .db
        .create_user(&user_id.to_string(), name, &email, &password_hash, &profile_pic)
        .map_err(internal)?;
    if !created {
        return Err(StatusCode::CONFLICT);
    }

    let token = create_token(&state.jwt_secret, user_id, name).map_err(internal)?;
    info!("Registered {} ({})", name, user_id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserProfile {
                id: user_id,
                name: name.to_string(),
                email,
                profile_pic,
            },
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = state
        .db
        .get_user_by_email(&req.email.trim().to_lowercase())
        .map_err(internal)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Verify password
    let parsed_hash =
        PasswordHash::new(&user.password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let profile = profile(user)?;
    let token = create_token(&state.jwt_secret, profile.id, &profile.name).map_err(internal)?;

    Ok(Json(AuthResponse { user: profile, token }))
}

pub fn create_token(secret: &str, user_id: Uuid, name: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn profile(user: UserRow) -> Result<UserProfile, StatusCode> {
    Ok(UserProfile {
        id: user.id.parse().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
        name: user.name,
        email: user.email,
        profile_pic: user.profile_pic,
    })
}

fn internal(e: anyhow::Error) -> StatusCode {
    error!("Auth store failure: {:#}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}
