use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Establishment {
    pub id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub responsible_name: Option<String>,
    pub responsible_phone: Option<String>,
    pub responsible_email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEstablishmentRequest {
    #[validate(length(min = 1))]
    pub name: String,
    pub code: Option<String>,
    pub responsible_name: Option<String>,
    pub responsible_phone: Option<String>,
    #[validate(email)]
    pub responsible_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EstablishmentResponse {
    pub id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub responsible_name: Option<String>,
    pub responsible_phone: Option<String>,
    pub responsible_email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Establishment> for EstablishmentResponse {
    fn from(est: Establishment) -> Self {
        Self {
            id: est.id,
            name: est.name,
            code: est.code,
            responsible_name: est.responsible_name,
            responsible_phone: est.responsible_phone,
            responsible_email: est.responsible_email,
            is_active: est.is_active,
            created_at: est.created_at,
        }
    }
}
