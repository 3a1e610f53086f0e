use axum::{
    extract::{Extension, Multipart, Path, State},
    response::Json,
};
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

use crate::{
    handlers::inspections::load_inspection_checked,
    middleware::auth::AuthUser,
    models::{
        action_plan::VerificationSaveRequest,
        inspection::{InspectionResponse, InspectionStatus},
    },
    services::{lifecycle::LifecycleService, plan::PlanService},
    utils::errors::AppError,
    AppState,
};

const MAX_EVIDENCE_SIZE: usize = 10 * 1024 * 1024; // 10MB

#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    pub message: String,
    pub inspection: InspectionResponse,
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub struct EvidenceResponse {
    pub message: String,
    pub evidence_image_url: String,
    pub inspection: InspectionResponse,
    pub completed: bool,
}

/// Consultant begins the field visit: APPROVED → PENDING_CONSULTANT_VERIFICATION.
pub async fn start_verification(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<VerificationResponse>, AppError> {
    load_inspection_checked(&state, &auth_user, id).await?;

    let lifecycle = LifecycleService::new(state.db.clone());
    let inspection = lifecycle.start_verification(id).await?;

    Ok(Json(VerificationResponse {
        message: "Verificação de campo iniciada.".to_string(),
        completed: false,
        inspection: InspectionResponse::from(inspection),
    }))
}

/// Save per-item verification results. Saving the first evidence completes
/// the inspection in the same transaction.
pub async fn save_verification(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerificationSaveRequest>,
) -> Result<Json<VerificationResponse>, AppError> {
    load_inspection_checked(&state, &auth_user, id).await?;

    let inspection = PlanService::new(state.db.clone())
        .save_verification(id, &payload)
        .await?;
    let completed = inspection.status == InspectionStatus::Completed;

    Ok(Json(VerificationResponse {
        message: if completed {
            "Evidência registrada. Verificação concluída!".to_string()
        } else {
            "Verificação salva com sucesso!".to_string()
        },
        completed,
        inspection: InspectionResponse::from(inspection),
    }))
}

/// Upload a photo evidence file for one plan item.
pub async fn upload_evidence(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    mut multipart: Multipart,
) -> Result<Json<EvidenceResponse>, AppError> {
    load_inspection_checked(&state, &auth_user, id).await?;

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut extension = "jpg".to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::BadRequest("Falha ao ler formulário multipart".to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        if let Some(filename) = field.file_name() {
            if let Some(ext) = PathBuf::from(filename)
                .extension()
                .and_then(|e| e.to_str())
            {
                extension = ext.to_lowercase();
            }
        }
        let data = field
            .bytes()
            .await
            .map_err(|_| AppError::BadRequest("Falha ao ler arquivo".to_string()))?;
        file_bytes = Some(data.to_vec());
    }

    let file_bytes =
        file_bytes.ok_or_else(|| AppError::BadRequest("Arquivo não enviado".to_string()))?;

    if file_bytes.len() > MAX_EVIDENCE_SIZE {
        return Err(AppError::PayloadTooLarge(
            "Evidência excede o limite de 10MB".to_string(),
        ));
    }
    match infer::get(&file_bytes) {
        Some(kind) if kind.mime_type().starts_with("image/") => {}
        _ => {
            return Err(AppError::UnsupportedMediaType(
                "Evidência deve ser uma imagem".to_string(),
            ))
        }
    }

    let stored_filename = format!("{}.{}", Uuid::new_v4(), extension);
    let file_path = PathBuf::from(&state.upload_dir).join(&stored_filename);
    fs::write(&file_path, &file_bytes)
        .await
        .map_err(|_| AppError::InternalServerError("Falha ao gravar arquivo".to_string()))?;

    let evidence_url = format!("/files/{stored_filename}");
    let inspection = PlanService::new(state.db.clone())
        .attach_evidence(id, item_id, &evidence_url)
        .await?;
    let completed = inspection.status == InspectionStatus::Completed;

    Ok(Json(EvidenceResponse {
        message: "Evidência registrada. Verificação concluída!".to_string(),
        evidence_image_url: evidence_url,
        completed,
        inspection: InspectionResponse::from(inspection),
    }))
}

/// Explicit finish action: PENDING_CONSULTANT_VERIFICATION → COMPLETED.
pub async fn finish_verification(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<VerificationResponse>, AppError> {
    load_inspection_checked(&state, &auth_user, id).await?;

    let lifecycle = LifecycleService::new(state.db.clone());
    let inspection = lifecycle.finish_verification(id).await?;

    Ok(Json(VerificationResponse {
        message: "Verificação finalizada!".to_string(),
        completed: true,
        inspection: InspectionResponse::from(inspection),
    }))
}
