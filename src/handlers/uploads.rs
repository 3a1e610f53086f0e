use axum::{
    extract::{Extension, Multipart, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

use crate::{
    middleware::auth::AuthUser,
    models::{
        establishment::Establishment,
        inspection::{Inspection, InspectionStatus},
        job::{JobStatus, JOB_TYPE_PROCESS_REPORT},
    },
    services::processor::ProcessorService,
    utils::{errors::AppError, logger::LOGGER},
    AppState,
};

const MAX_PDF_SIZE: usize = 25 * 1024 * 1024; // 25MB

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub skipped: bool,
    pub inspection_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub establishment_name: Option<String>,
}

fn validate_pdf(data: &[u8]) -> Result<(), AppError> {
    if data.len() > MAX_PDF_SIZE {
        return Err(AppError::PayloadTooLarge(
            "Arquivo excede o limite de 25MB".to_string(),
        ));
    }
    let kind = infer::get(data);
    match kind {
        Some(k) if k.mime_type() == "application/pdf" => Ok(()),
        _ => Err(AppError::UnsupportedMediaType(
            "Apenas arquivos PDF são aceitos".to_string(),
        )),
    }
}

async fn ensure_establishment_access(
    state: &AppState,
    auth_user: &AuthUser,
    establishment_id: Uuid,
) -> Result<Establishment, AppError> {
    let establishment = sqlx::query_as::<_, Establishment>(
        "SELECT * FROM establishments WHERE id = $1 AND is_active = TRUE",
    )
    .bind(establishment_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Estabelecimento não encontrado".to_string()))?;

    if auth_user.is_consultant() {
        let assigned: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM consultant_establishments WHERE user_id = $1 AND establishment_id = $2",
        )
        .bind(auth_user.user_id)
        .bind(establishment_id)
        .fetch_one(&state.db)
        .await?;
        if assigned == 0 {
            return Err(AppError::Forbidden(
                "Consultor não vinculado a este estabelecimento".to_string(),
            ));
        }
    }

    Ok(establishment)
}

/// Accept an inspection PDF: validate, dedup by content hash, create the
/// inspection in PROCESSING plus its job, and hand off to the background
/// processor. The HTTP call never waits for the AI.
pub async fn upload_inspection(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_filename = String::new();
    let mut establishment_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::BadRequest("Falha ao ler formulário multipart".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                original_filename = field
                    .file_name()
                    .ok_or_else(|| AppError::BadRequest("Arquivo sem nome".to_string()))?
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::BadRequest("Falha ao ler arquivo".to_string()))?;
                file_bytes = Some(data.to_vec());
            }
            "establishment_id" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::BadRequest("Campo inválido".to_string()))?;
                let text = String::from_utf8(data.to_vec())
                    .map_err(|_| AppError::BadRequest("Campo inválido".to_string()))?;
                establishment_id = Some(
                    Uuid::parse_str(text.trim())
                        .map_err(|_| AppError::BadRequest("establishment_id inválido".to_string()))?,
                );
            }
            _ => {}
        }
    }

    let file_bytes =
        file_bytes.ok_or_else(|| AppError::BadRequest("Arquivo não enviado".to_string()))?;
    let establishment_id = establishment_id
        .ok_or_else(|| AppError::BadRequest("establishment_id é obrigatório".to_string()))?;

    validate_pdf(&file_bytes)?;
    let establishment = ensure_establishment_access(&state, &auth_user, establishment_id).await?;

    let file_hash = format!("{:x}", md5::compute(&file_bytes));

    // Same content already in the pipeline (any non-terminal-failure state)
    // is reported as skipped instead of creating a second inspection.
    let duplicate: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM inspections WHERE file_hash = $1 AND status NOT IN ($2, $3)",
    )
    .bind(&file_hash)
    .bind(InspectionStatus::Rejected)
    .bind(InspectionStatus::Canceled)
    .fetch_one(&state.db)
    .await?;

    if duplicate > 0 {
        sqlx::query(
            "INSERT INTO jobs (job_type, status, input_payload) VALUES ($1, $2, $3)",
        )
        .bind(JOB_TYPE_PROCESS_REPORT)
        .bind(JobStatus::Skipped)
        .bind(json!({
            "filename": original_filename,
            "file_hash": file_hash,
            "establishment_id": establishment_id,
            "reason": "duplicate",
        }))
        .execute(&state.db)
        .await?;

        return Ok((
            StatusCode::OK,
            Json(UploadResponse {
                message: "Este arquivo já foi enviado anteriormente.".to_string(),
                skipped: true,
                inspection_id: None,
                job_id: None,
                establishment_name: Some(establishment.name),
            }),
        ));
    }

    let upload_id = Uuid::new_v4();
    let stored_filename = format!("{upload_id}.pdf");
    let file_path = PathBuf::from(&state.upload_dir).join(&stored_filename);
    fs::write(&file_path, &file_bytes)
        .await
        .map_err(|_| AppError::InternalServerError("Falha ao gravar arquivo".to_string()))?;

    let mut tx = state.db.begin().await?;
    let inspection = sqlx::query_as::<_, Inspection>(
        r#"
        INSERT INTO inspections (establishment_id, source_file_id, stored_filename, file_hash)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(establishment_id)
    .bind(format!("upload:{upload_id}"))
    .bind(&stored_filename)
    .bind(&file_hash)
    .fetch_one(&mut *tx)
    .await?;

    let job_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO jobs (inspection_id, job_type, status, input_payload)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(inspection.id)
    .bind(JOB_TYPE_PROCESS_REPORT)
    .bind(JobStatus::Pending)
    .bind(json!({
        "filename": original_filename,
        "stored_filename": stored_filename,
        "establishment_id": establishment_id,
        "establishment_name": establishment.name,
    }))
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    LOGGER.log_business_event(
        "inspection_uploaded",
        Some(auth_user.user_id),
        [
            (
                "inspection_id".to_string(),
                json!(inspection.id.to_string()),
            ),
            ("filename".to_string(), json!(original_filename)),
        ]
        .into_iter()
        .collect(),
    );

    let processor = ProcessorService::new(
        state.db.clone(),
        state.analyzer.clone(),
        state.upload_dir.clone(),
    );
    let inspection_id = inspection.id;
    tokio::spawn(async move {
        processor.run(job_id, inspection_id).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            message: "Arquivo recebido. Processamento iniciado.".to_string(),
            skipped: false,
            inspection_id: Some(inspection.id),
            job_id: Some(job_id),
            establishment_name: Some(establishment.name),
        }),
    ))
}
