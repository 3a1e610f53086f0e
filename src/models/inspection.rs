use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Workflow status of an inspection.
///
/// upload → PROCESSING → PENDING_MANAGER_REVIEW → APPROVED →
/// PENDING_CONSULTANT_VERIFICATION → COMPLETED, with REJECTED on AI
/// failure and CANCELED reachable from any active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "inspection_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InspectionStatus {
    Processing,
    PendingManagerReview,
    Approved,
    PendingConsultantVerification,
    Completed,
    Rejected,
    Canceled,
}

impl InspectionStatus {
    pub const ALL: [InspectionStatus; 7] = [
        InspectionStatus::Processing,
        InspectionStatus::PendingManagerReview,
        InspectionStatus::Approved,
        InspectionStatus::PendingConsultantVerification,
        InspectionStatus::Completed,
        InspectionStatus::Rejected,
        InspectionStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionStatus::Processing => "PROCESSING",
            InspectionStatus::PendingManagerReview => "PENDING_MANAGER_REVIEW",
            InspectionStatus::Approved => "APPROVED",
            InspectionStatus::PendingConsultantVerification => "PENDING_CONSULTANT_VERIFICATION",
            InspectionStatus::Completed => "COMPLETED",
            InspectionStatus::Rejected => "REJECTED",
            InspectionStatus::Canceled => "CANCELED",
        }
    }

    pub fn label_pt(&self) -> &'static str {
        match self {
            InspectionStatus::Processing => "Processando",
            InspectionStatus::PendingManagerReview => "Aguardando Revisão",
            InspectionStatus::Approved => "Aprovado",
            InspectionStatus::PendingConsultantVerification => "Aguardando Verificação",
            InspectionStatus::Completed => "Concluído",
            InspectionStatus::Rejected => "Rejeitado",
            InspectionStatus::Canceled => "Cancelado",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InspectionStatus::Completed | InspectionStatus::Rejected | InspectionStatus::Canceled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Legal successor statuses. Everything not listed here is an invalid
    /// transition, including self-transitions.
    pub fn can_transition_to(&self) -> &'static [InspectionStatus] {
        match self {
            InspectionStatus::Processing => &[
                InspectionStatus::PendingManagerReview,
                InspectionStatus::Rejected,
                InspectionStatus::Canceled,
            ],
            InspectionStatus::PendingManagerReview => {
                &[InspectionStatus::Approved, InspectionStatus::Canceled]
            }
            InspectionStatus::Approved => &[
                InspectionStatus::PendingConsultantVerification,
                InspectionStatus::Canceled,
            ],
            InspectionStatus::PendingConsultantVerification => {
                &[InspectionStatus::Completed, InspectionStatus::Canceled]
            }
            InspectionStatus::Completed
            | InspectionStatus::Rejected
            | InspectionStatus::Canceled => &[],
        }
    }

    pub fn allows(&self, target: InspectionStatus) -> bool {
        self.can_transition_to().contains(&target)
    }
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fail-closed coercion for status strings arriving from outside the enum
/// boundary (query params, stored payloads). Unknown values are an error,
/// never a pass-through.
impl TryFrom<&str> for InspectionStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        InspectionStatus::ALL
            .into_iter()
            .find(|s| s.as_str() == value)
            .ok_or_else(|| format!("status de inspeção desconhecido: '{}'", value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Inspection {
    pub id: Uuid,
    pub establishment_id: Uuid,
    pub source_file_id: String,
    pub stored_filename: Option<String>,
    pub file_hash: Option<String>,
    pub status: InspectionStatus,
    pub ai_raw_response: Option<serde_json::Value>,
    pub processing_logs: serde_json::Value,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct InspectionResponse {
    pub id: Uuid,
    pub establishment_id: Uuid,
    pub source_file_id: String,
    pub stored_filename: Option<String>,
    pub status: InspectionStatus,
    pub status_label: String,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub plan: Option<crate::models::action_plan::ActionPlanResponse>,
}

impl From<Inspection> for InspectionResponse {
    fn from(inspection: Inspection) -> Self {
        Self {
            id: inspection.id,
            establishment_id: inspection.establishment_id,
            source_file_id: inspection.source_file_id,
            stored_filename: inspection.stored_filename,
            status: inspection.status,
            status_label: inspection.status.label_pt().to_string(),
            approved_by: inspection.approved_by,
            approved_at: inspection.approved_at,
            created_at: inspection.created_at,
            updated_at: inspection.updated_at,
            plan: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_lifecycle_table() {
        use InspectionStatus::*;

        assert!(Processing.allows(PendingManagerReview));
        assert!(Processing.allows(Rejected));
        assert!(PendingManagerReview.allows(Approved));
        assert!(Approved.allows(PendingConsultantVerification));
        assert!(PendingConsultantVerification.allows(Completed));
    }

    #[test]
    fn cancel_is_reachable_from_every_active_state_only() {
        for status in InspectionStatus::ALL {
            assert_eq!(
                status.allows(InspectionStatus::Canceled),
                status.is_active(),
                "cancel from {status}"
            );
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        use InspectionStatus::*;
        for status in [Completed, Rejected, Canceled] {
            assert!(status.is_terminal());
            assert!(status.can_transition_to().is_empty());
        }
    }

    #[test]
    fn every_pair_outside_the_table_is_rejected() {
        use InspectionStatus::*;

        let legal: &[(InspectionStatus, InspectionStatus)] = &[
            (Processing, PendingManagerReview),
            (Processing, Rejected),
            (Processing, Canceled),
            (PendingManagerReview, Approved),
            (PendingManagerReview, Canceled),
            (Approved, PendingConsultantVerification),
            (Approved, Canceled),
            (PendingConsultantVerification, Completed),
            (PendingConsultantVerification, Canceled),
        ];

        for from in InspectionStatus::ALL {
            for to in InspectionStatus::ALL {
                let expected = legal.contains(&(from, to));
                assert_eq!(from.allows(to), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn review_cannot_skip_straight_to_completed() {
        assert!(!InspectionStatus::PendingManagerReview.allows(InspectionStatus::Completed));
    }

    #[test]
    fn status_strings_coerce_fail_closed() {
        assert_eq!(
            InspectionStatus::try_from("PENDING_MANAGER_REVIEW"),
            Ok(InspectionStatus::PendingManagerReview)
        );
        assert!(InspectionStatus::try_from("WAITING_APPROVAL").is_err());
        assert!(InspectionStatus::try_from("pending_manager_review").is_err());
        assert!(InspectionStatus::try_from("").is_err());
    }
}
