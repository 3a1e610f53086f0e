use axum::{
    extract::{Extension, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    middleware::auth::AuthUser,
    models::inspection::{Inspection, InspectionResponse, InspectionStatus},
    services::notification::NotificationService,
    utils::errors::AppError,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub days: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct NotificationTriggerResponse {
    pub message: String,
    pub stale_reviews: usize,
    pub stale_verifications: usize,
}

pub async fn trigger_notifications(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationTriggerResponse>, AppError> {
    if !auth_user.is_admin() {
        return Err(AppError::Forbidden(
            "Apenas administradores podem disparar notificações".to_string(),
        ));
    }

    let service = NotificationService::new(state.db.clone());
    let days = query.days.unwrap_or(7);

    let stale_reviews = service
        .find_stale_reviews(days)
        .await
        .map_err(|_| AppError::InternalServerError("Falha ao buscar inspeções".to_string()))?;
    let stale_verifications = service
        .find_stale_verifications(days)
        .await
        .map_err(|_| AppError::InternalServerError("Falha ao buscar inspeções".to_string()))?;

    service
        .process_stale_notifications_with_days(days)
        .await
        .map_err(|_| AppError::InternalServerError("Falha ao processar notificações".to_string()))?;

    Ok(Json(NotificationTriggerResponse {
        message: format!("Notificações processadas para inspeções paradas há mais de {days} dias"),
        stale_reviews: stale_reviews.len(),
        stale_verifications: stale_verifications.len(),
    }))
}

pub async fn get_stale_inspections(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<InspectionResponse>>, AppError> {
    let service = NotificationService::new(state.db.clone());
    let days = query.days.unwrap_or(7);

    let stale = if auth_user.is_consultant() {
        // Consultants see their establishments' stalled verifications.
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days as i64);
        sqlx::query_as::<_, Inspection>(
            r#"
            SELECT i.* FROM inspections i
            JOIN consultant_establishments ce ON ce.establishment_id = i.establishment_id
            WHERE ce.user_id = $1 AND i.status IN ($2, $3) AND i.updated_at < $4
            ORDER BY i.updated_at ASC
            "#,
        )
        .bind(auth_user.user_id)
        .bind(InspectionStatus::Approved)
        .bind(InspectionStatus::PendingConsultantVerification)
        .bind(cutoff)
        .fetch_all(&state.db)
        .await?
    } else {
        service
            .find_stale_reviews(days)
            .await
            .map_err(|_| AppError::InternalServerError("Falha ao buscar inspeções".to_string()))?
    };

    Ok(Json(stale.into_iter().map(InspectionResponse::from).collect()))
}
