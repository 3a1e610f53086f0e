use axum::{
    extract::{Extension, Path, State},
    response::Json,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    handlers::inspections::load_inspection_checked,
    middleware::auth::AuthUser,
    models::{
        action_plan::{ActionPlanResponse, PlanSaveRequest},
        establishment::Establishment,
        inspection::InspectionResponse,
    },
    services::{lifecycle::LifecycleService, plan::PlanService, whatsapp},
    utils::errors::AppError,
    AppState,
};

#[derive(Debug, Serialize)]
pub struct PlanSaveResponse {
    pub message: String,
    pub plan: ActionPlanResponse,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub message: String,
    pub inspection: InspectionResponse,
    pub whatsapp_link: Option<String>,
}

/// Manager plan edits: item upserts, removals, reordering and deadline
/// changes. The deadline capture keeps the AI suggestion untouched.
pub async fn save_plan(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PlanSaveRequest>,
) -> Result<Json<PlanSaveResponse>, AppError> {
    if auth_user.is_consultant() {
        return Err(AppError::Forbidden(
            "Apenas gestores podem editar o plano de ação".to_string(),
        ));
    }
    payload.validate()?;

    // Existence/visibility check before touching the plan.
    load_inspection_checked(&state, &auth_user, id).await?;

    let plan = PlanService::new(state.db.clone()).save_plan(id, &payload).await?;

    Ok(Json(PlanSaveResponse {
        message: "Plano salvo com sucesso!".to_string(),
        plan,
    }))
}

/// Manager approval: PENDING_MANAGER_REVIEW → APPROVED, with the approval
/// stamps written in the same transaction, plus a WhatsApp share link when
/// the establishment has a responsible phone on file.
pub async fn approve_plan(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApproveResponse>, AppError> {
    if auth_user.is_consultant() {
        return Err(AppError::Forbidden(
            "Apenas gestores podem aprovar o plano de ação".to_string(),
        ));
    }

    let inspection = load_inspection_checked(&state, &auth_user, id).await?;

    let plan_exists: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM action_plans WHERE inspection_id = $1")
            .bind(id)
            .fetch_one(&state.db)
            .await?;
    if plan_exists == 0 {
        return Err(AppError::NotFound("Plano de ação não encontrado".to_string()));
    }

    let lifecycle = LifecycleService::new(state.db.clone());
    let approved = lifecycle.approve(id, auth_user.user_id).await?;

    let establishment =
        sqlx::query_as::<_, Establishment>("SELECT * FROM establishments WHERE id = $1")
            .bind(inspection.establishment_id)
            .fetch_one(&state.db)
            .await?;

    let whatsapp_link = whatsapp::build_share_link(
        establishment.responsible_phone.as_deref(),
        establishment.responsible_name.as_deref(),
        &establishment.name,
    );

    Ok(Json(ApproveResponse {
        message: "Plano aprovado com sucesso!".to_string(),
        inspection: InspectionResponse::from(approved),
        whatsapp_link,
    }))
}
