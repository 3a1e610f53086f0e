use axum::{
    extract::{Extension, Path, State},
    response::Json,
};
use uuid::Uuid;

use crate::{
    handlers::inspections::load_inspection_checked,
    middleware::auth::AuthUser,
    models::job::{Job, JobResponse},
    utils::errors::AppError,
    AppState,
};

/// Job status and cost detail. The job row is the durable handle clients
/// poll while AI processing runs in the background.
pub async fn get_job(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, AppError> {
    let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job '{id}' não encontrado")))?;

    // Consultants only see jobs of inspections they can see.
    if let Some(inspection_id) = job.inspection_id {
        load_inspection_checked(&state, &auth_user, inspection_id).await?;
    } else if auth_user.is_consultant() {
        return Err(AppError::Forbidden(
            "Job não vinculado às suas inspeções".to_string(),
        ));
    }

    Ok(Json(JobResponse::from(job)))
}
