use axum::{
    extract::{Extension, Path, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    middleware::auth::AuthUser,
    models::establishment::{CreateEstablishmentRequest, Establishment, EstablishmentResponse},
    services::analytics::{AnalyticsError, AnalyticsResponse, AnalyticsService},
    utils::{errors::AppError, logger::LOGGER},
    AppState,
};

pub async fn get_analytics(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<AnalyticsResponse>, AppError> {
    if auth_user.is_consultant() {
        LOGGER.log_business_event(
            "unauthorized_analytics_access",
            Some(auth_user.user_id),
            std::collections::HashMap::new(),
        );
        return Err(AppError::Forbidden(
            "Painel disponível apenas para gestores".to_string(),
        ));
    }

    let service = AnalyticsService::new(state.db.clone());
    match service.get_dashboard().await {
        Ok(dashboard) => Ok(Json(dashboard)),
        Err(AnalyticsError::DatabaseError(msg)) => {
            let mut context = std::collections::HashMap::new();
            context.insert(
                "error_type".to_string(),
                serde_json::Value::String("database".to_string()),
            );
            LOGGER.log_error(&msg, context);
            Err(AppError::InternalServerError(
                "Falha ao montar o painel".to_string(),
            ))
        }
    }
}

pub async fn create_establishment(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<CreateEstablishmentRequest>,
) -> Result<Json<EstablishmentResponse>, AppError> {
    if !auth_user.is_admin() {
        return Err(AppError::Forbidden(
            "Apenas administradores podem criar estabelecimentos".to_string(),
        ));
    }
    payload.validate()?;

    let establishment = sqlx::query_as::<_, Establishment>(
        r#"
        INSERT INTO establishments (name, code, responsible_name, responsible_phone, responsible_email)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.code)
    .bind(&payload.responsible_name)
    .bind(&payload.responsible_phone)
    .bind(&payload.responsible_email)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(EstablishmentResponse::from(establishment)))
}

pub async fn list_establishments(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<Vec<EstablishmentResponse>>, AppError> {
    let establishments = if auth_user.is_consultant() {
        sqlx::query_as::<_, Establishment>(
            r#"
            SELECT e.* FROM establishments e
            JOIN consultant_establishments ce ON ce.establishment_id = e.id
            WHERE ce.user_id = $1 AND e.is_active = TRUE
            ORDER BY e.name
            "#,
        )
        .bind(auth_user.user_id)
        .fetch_all(&state.db)
        .await?
    } else {
        sqlx::query_as::<_, Establishment>(
            "SELECT * FROM establishments WHERE is_active = TRUE ORDER BY name",
        )
        .fetch_all(&state.db)
        .await?
    };

    Ok(Json(
        establishments
            .into_iter()
            .map(EstablishmentResponse::from)
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct AssignConsultantRequest {
    pub user_id: Uuid,
}

pub async fn assign_consultant(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(establishment_id): Path<Uuid>,
    Json(payload): Json<AssignConsultantRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !auth_user.is_admin() {
        return Err(AppError::Forbidden(
            "Apenas administradores podem vincular consultores".to_string(),
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO consultant_establishments (user_id, establishment_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(payload.user_id)
    .bind(establishment_id)
    .execute(&state.db)
    .await?;

    Ok(Json(serde_json::json!({
        "message": "Consultor vinculado ao estabelecimento."
    })))
}
