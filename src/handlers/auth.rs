use axum::{
    extract::{Extension, State},
    response::Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use validator::Validate;

use crate::{
    middleware::auth::AuthUser,
    models::user::{CreateUserRequest, LoginRequest, LoginResponse, User, UserResponse, UserRole},
    utils::{errors::AppError, jwt::create_jwt},
    AppState,
};

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    payload.validate()?;

    let password_hash = hash(&payload.password, DEFAULT_COST)
        .map_err(|_| AppError::InternalServerError("Falha ao gerar hash da senha".to_string()))?;

    // Self-registration is always a consultant; privileged roles are
    // granted through the admin endpoint.
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, password_hash, name, role)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(&payload.email)
    .bind(&password_hash)
    .bind(&payload.name)
    .bind(UserRole::Consultant)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(UserResponse::from(user)))
}

pub async fn register_user_admin(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    if !auth_user.is_admin() {
        return Err(AppError::Forbidden(
            "Apenas administradores podem criar usuários com papel".to_string(),
        ));
    }

    payload.validate()?;

    let password_hash = hash(&payload.password, DEFAULT_COST)
        .map_err(|_| AppError::InternalServerError("Falha ao gerar hash da senha".to_string()))?;

    let role = payload.role.unwrap_or(UserRole::Consultant);

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, password_hash, name, role)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(&payload.email)
    .bind(&password_hash)
    .bind(&payload.name)
    .bind(role)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(UserResponse::from(user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1 AND is_active = TRUE")
        .bind(&payload.email)
        .fetch_one(&state.db)
        .await
        .map_err(|_| AppError::Unauthorized("Email ou senha inválidos".to_string()))?;

    let is_valid = verify(&payload.password, &user.password_hash)
        .map_err(|_| AppError::InternalServerError("Falha ao verificar senha".to_string()))?;

    if !is_valid {
        return Err(AppError::Unauthorized("Email ou senha inválidos".to_string()));
    }

    let token = create_jwt(user.id, user.role.as_str(), &state.jwt_secret)
        .map_err(|_| AppError::InternalServerError("Falha ao criar token".to_string()))?;

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}
