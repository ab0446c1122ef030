use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{generate_token, hash_password, verify_password, Role};
use crate::db::User;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if req.username.trim().is_empty() || req.email.trim().is_empty() {
        return Err(AppError::Validation(
            "Username and email are required".to_string(),
        ));
    }
    if req.password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if state.db.get_user_by_email(&req.email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    // Self-service registration never grants admin
    let role = match req.role {
        Some(Role::Admin) | None => Role::Student,
        Some(role) => role,
    };

    let password_hash = hash_password(&req.password)?;
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: req.username.trim().to_string(),
        email: req.email.trim().to_string(),
        password_hash,
        role: role.as_str().to_string(),
        created_at: None,
    };
    state.db.create_user(&user).await?;

    let token = generate_token(&user.id, role, &state.config.auth)?;

    Ok(Json(AuthResponse {
        token,
        user_id: user.id,
        username: user.username,
        role,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = state
        .db
        .get_user_by_email(&req.email)
        .await?
        .ok_or_else(|| AppError::Auth("Invalid email or password".to_string()))?;

    verify_password(&req.password, &user.password_hash)?;

    let role = Role::parse(&user.role)
        .ok_or_else(|| AppError::Internal(format!("Invalid role in database: {}", user.role)))?;
    let token = generate_token(&user.id, role, &state.config.auth)?;

    Ok(Json(AuthResponse {
        token,
        user_id: user.id,
        username: user.username,
        role,
    }))
}
