use axum::{
    extract::{Extension, Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    middleware::auth::AuthUser,
    models::{
        action_plan::ActionPlanResponse,
        inspection::{Inspection, InspectionResponse, InspectionStatus},
    },
    services::{
        lifecycle::LifecycleService,
        plan::{PlanError, PlanService},
        tracker::{self, TrackerData},
    },
    utils::errors::AppError,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct InspectionListQuery {
    pub status: Option<String>,
}

/// Load an inspection and enforce visibility: managers and admins see
/// everything, consultants only inspections of their establishments.
pub async fn load_inspection_checked(
    state: &AppState,
    auth_user: &AuthUser,
    inspection_id: Uuid,
) -> Result<Inspection, AppError> {
    let inspection = sqlx::query_as::<_, Inspection>("SELECT * FROM inspections WHERE id = $1")
        .bind(inspection_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Inspeção '{inspection_id}' não encontrada")))?;

    if auth_user.is_consultant() {
        let assigned: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM consultant_establishments WHERE user_id = $1 AND establishment_id = $2",
        )
        .bind(auth_user.user_id)
        .bind(inspection.establishment_id)
        .fetch_one(&state.db)
        .await?;
        if assigned == 0 {
            return Err(AppError::Forbidden(
                "Consultor não vinculado a este estabelecimento".to_string(),
            ));
        }
    }

    Ok(inspection)
}

pub async fn list_inspections(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<InspectionListQuery>,
) -> Result<Json<Vec<InspectionResponse>>, AppError> {
    // Status filters arrive as strings; unknown values are an error, not a
    // silent no-match.
    let status_filter = match query.status.as_deref() {
        Some(raw) => Some(
            InspectionStatus::try_from(raw).map_err(AppError::BadRequest)?,
        ),
        None => None,
    };

    let inspections = if auth_user.is_consultant() {
        sqlx::query_as::<_, Inspection>(
            r#"
            SELECT i.* FROM inspections i
            JOIN consultant_establishments ce ON ce.establishment_id = i.establishment_id
            WHERE ce.user_id = $1 AND ($2::inspection_status IS NULL OR i.status = $2)
            ORDER BY i.created_at DESC
            "#,
        )
        .bind(auth_user.user_id)
        .bind(status_filter)
        .fetch_all(&state.db)
        .await?
    } else {
        sqlx::query_as::<_, Inspection>(
            r#"
            SELECT * FROM inspections
            WHERE ($1::inspection_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(status_filter)
        .fetch_all(&state.db)
        .await?
    };

    Ok(Json(
        inspections.into_iter().map(InspectionResponse::from).collect(),
    ))
}

pub async fn get_inspection(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<InspectionResponse>, AppError> {
    let inspection = load_inspection_checked(&state, &auth_user, id).await?;

    let plan_service = PlanService::new(state.db.clone());
    let mut response = InspectionResponse::from(inspection);
    match plan_service.get_plan(id).await {
        Ok(plan) => response.plan = Some(plan),
        Err(PlanError::PlanNotFound) => {}
        Err(e) => return Err(e.into()),
    }

    Ok(Json(response))
}

pub async fn get_tracker(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<TrackerData>, AppError> {
    let inspection = load_inspection_checked(&state, &auth_user, id).await?;

    let has_plan: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM action_plans WHERE inspection_id = $1")
            .bind(id)
            .fetch_one(&state.db)
            .await?;

    Ok(Json(tracker::tracker_data(&inspection, has_plan > 0)))
}

pub async fn cancel_inspection(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<InspectionResponse>, AppError> {
    if !auth_user.is_admin() {
        return Err(AppError::Forbidden(
            "Apenas administradores podem cancelar inspeções".to_string(),
        ));
    }

    let lifecycle = LifecycleService::new(state.db.clone());
    let inspection = lifecycle.cancel(id).await?;

    Ok(Json(InspectionResponse::from(inspection)))
}

#[derive(Debug, Serialize)]
pub struct CompletedReportResponse {
    pub inspection_id: Uuid,
    pub establishment_name: String,
    pub status: InspectionStatus,
    pub approved_by_name: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
    pub plan: ActionPlanResponse,
}

/// Precondition of the completed-report view: anything short of COMPLETED
/// is refused, whether or not items already carry evidence.
fn ensure_report_available(status: InspectionStatus) -> Result<(), AppError> {
    if status == InspectionStatus::Completed {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "Relatório final disponível apenas para inspeções concluídas (status atual: '{status}')"
        )))
    }
}

/// Final report of a completed inspection. Evidence becomes visible here
/// and only here.
pub async fn get_completed_report(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompletedReportResponse>, AppError> {
    let inspection = load_inspection_checked(&state, &auth_user, id).await?;

    ensure_report_available(inspection.status)?;

    let establishment_name: String =
        sqlx::query_scalar("SELECT name FROM establishments WHERE id = $1")
            .bind(inspection.establishment_id)
            .fetch_one(&state.db)
            .await?;

    let approved_by_name: Option<String> = match inspection.approved_by {
        Some(approver_id) => {
            sqlx::query_scalar("SELECT name FROM users WHERE id = $1")
                .bind(approver_id)
                .fetch_optional(&state.db)
                .await?
        }
        None => None,
    };

    let plan = PlanService::new(state.db.clone()).get_plan(id).await?;

    Ok(Json(CompletedReportResponse {
        inspection_id: inspection.id,
        establishment_name,
        status: inspection.status,
        approved_by_name,
        approved_at: inspection.approved_at,
        completed_at: inspection.updated_at,
        plan,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_refuses_unfinished_verification_even_with_evidence_saved() {
        // An item can carry evidence while the consultant never invoked the
        // explicit finish action; the report must still refuse to render.
        let err = ensure_report_available(InspectionStatus::PendingConsultantVerification)
            .unwrap_err();
        match err {
            AppError::Conflict(message) => {
                assert!(message.contains("PENDING_CONSULTANT_VERIFICATION"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn report_is_available_only_when_completed() {
        for status in InspectionStatus::ALL {
            let available = ensure_report_available(status).is_ok();
            assert_eq!(available, status == InspectionStatus::Completed, "{status}");
        }
    }
}
