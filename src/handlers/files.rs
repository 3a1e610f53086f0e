use axum::{
    body::Body,
    extract::{Extension, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
};
use serde::Deserialize;
use sqlx::PgPool;
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

use crate::{middleware::auth::AuthUser, utils::jwt::verify_jwt, AppState};

fn content_type_for(path: &std::path::Path) -> mime::Mime {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("pdf") => mime::APPLICATION_PDF,
        Some("jpg") | Some("jpeg") => mime::IMAGE_JPEG,
        Some("png") => mime::IMAGE_PNG,
        Some("gif") => mime::IMAGE_GIF,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

async fn serve(state: &AppState, filename: &str) -> Result<Response<Body>, StatusCode> {
    let file_path = PathBuf::from(&state.upload_dir).join(filename);

    // No path separators: stored names are always flat uuids.
    if filename.contains('/') || filename.contains("..") {
        return Err(StatusCode::FORBIDDEN);
    }

    if !file_path.exists() {
        return Err(StatusCode::NOT_FOUND);
    }

    let file_content = fs::read(&file_path)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let content_type = content_type_for(&file_path);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CONTENT_LENGTH, file_content.len())
        .body(Body::from(file_content))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// A consultant may read a file when it is the source PDF or an evidence
/// image of an inspection in one of their establishments.
async fn check_file_ownership(
    db: &PgPool,
    filename: &str,
    user_id: Uuid,
) -> Result<bool, StatusCode> {
    let evidence_url = format!("/files/{filename}");

    let result = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM inspections i
        JOIN consultant_establishments ce ON ce.establishment_id = i.establishment_id
        LEFT JOIN action_plans ap ON ap.inspection_id = i.id
        LEFT JOIN action_plan_items it ON it.action_plan_id = ap.id
        WHERE ce.user_id = $1
        AND (i.stored_filename = $2 OR it.evidence_image_url = $3)
        "#,
    )
    .bind(user_id)
    .bind(filename)
    .bind(&evidence_url)
    .fetch_one(db)
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(result > 0)
}

pub async fn serve_file(
    Extension(auth_user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response<Body>, StatusCode> {
    let can_access = if auth_user.is_consultant() {
        check_file_ownership(&state.db, &filename, auth_user.user_id).await?
    } else {
        true
    };

    if !can_access {
        return Err(StatusCode::FORBIDDEN);
    }

    serve(&state, &filename).await
}

#[derive(Deserialize)]
pub struct FileQuery {
    token: String,
}

/// Token-in-query variant for links shared outside the app (PDF download
/// buttons, WhatsApp messages).
pub async fn serve_file_with_token(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(params): Query<FileQuery>,
) -> Result<Response<Body>, StatusCode> {
    let claims = verify_jwt(&params.token, &state.jwt_secret)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let can_access = if claims.role == "CONSULTANT" {
        check_file_ownership(&state.db, &filename, claims.sub).await?
    } else {
        true
    };

    if !can_access {
        return Err(StatusCode::FORBIDDEN);
    }

    serve(&state, &filename).await
}
