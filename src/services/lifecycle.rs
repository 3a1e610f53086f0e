//! The inspection lifecycle state machine.
//!
//! This service is the sole writer of `inspections.status`. Every
//! transition runs inside a transaction with the inspection row locked, so
//! a status change and its side effects (approval stamps, plan creation,
//! rejection details) commit or roll back together.

use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::models::inspection::{Inspection, InspectionStatus};
use crate::utils::logger::LOGGER;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("não é possível mudar a inspeção de '{from}' para '{to}'")]
    InvalidTransition {
        from: InspectionStatus,
        to: InspectionStatus,
    },
    #[error("inspeção '{0}' não encontrada")]
    InspectionNotFound(Uuid),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Reject any move that is not an edge of the lifecycle table.
pub fn guard(
    from: InspectionStatus,
    to: InspectionStatus,
) -> Result<(), LifecycleError> {
    if from.allows(to) {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition { from, to })
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleService {
    db: PgPool,
}

impl LifecycleService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Load an inspection with a row lock, pinning its status for the
    /// duration of the surrounding transaction.
    pub async fn lock_inspection(
        tx: &mut Transaction<'_, Postgres>,
        inspection_id: Uuid,
    ) -> Result<Inspection, LifecycleError> {
        sqlx::query_as::<_, Inspection>("SELECT * FROM inspections WHERE id = $1 FOR UPDATE")
            .bind(inspection_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(LifecycleError::InspectionNotFound(inspection_id))
    }

    /// Guarded status change inside an already-open transaction. Used by
    /// collaborators that need the transition to commit atomically with
    /// their own writes (plan creation, evidence save).
    pub async fn transition_locked(
        tx: &mut Transaction<'_, Postgres>,
        inspection: &Inspection,
        to: InspectionStatus,
    ) -> Result<Inspection, LifecycleError> {
        guard(inspection.status, to)?;

        let updated = sqlx::query_as::<_, Inspection>(
            "UPDATE inspections SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(to)
        .bind(inspection.id)
        .fetch_one(&mut **tx)
        .await?;

        tracing::info!(
            inspection_id = %inspection.id,
            from = %inspection.status,
            to = %to,
            "inspection status transition"
        );

        Ok(updated)
    }

    /// AI extraction succeeded: store the raw response snapshot and move to
    /// manager review. The snapshot is written exactly once, here.
    pub async fn mark_review_ready(
        tx: &mut Transaction<'_, Postgres>,
        inspection: &Inspection,
        ai_raw_response: &serde_json::Value,
    ) -> Result<Inspection, LifecycleError> {
        guard(inspection.status, InspectionStatus::PendingManagerReview)?;

        let updated = sqlx::query_as::<_, Inspection>(
            r#"
            UPDATE inspections
            SET status = $1, ai_raw_response = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(InspectionStatus::PendingManagerReview)
        .bind(ai_raw_response)
        .bind(inspection.id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(updated)
    }

    /// AI extraction failed: the inspection surfaces as REJECTED; the error
    /// detail lives on the job record.
    pub async fn mark_rejected(
        tx: &mut Transaction<'_, Postgres>,
        inspection: &Inspection,
    ) -> Result<Inspection, LifecycleError> {
        Self::transition_locked(tx, inspection, InspectionStatus::Rejected).await
    }

    /// Manager approval. Status, `approved_by` and `approved_at` are set in
    /// a single UPDATE so no partial approval is ever observable.
    pub async fn approve(
        &self,
        inspection_id: Uuid,
        approver_id: Uuid,
    ) -> Result<Inspection, LifecycleError> {
        let mut tx = self.db.begin().await?;
        let inspection = Self::lock_inspection(&mut tx, inspection_id).await?;
        guard(inspection.status, InspectionStatus::Approved)?;

        let updated = sqlx::query_as::<_, Inspection>(
            r#"
            UPDATE inspections
            SET status = $1, approved_by = $2, approved_at = NOW(), updated_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(InspectionStatus::Approved)
        .bind(approver_id)
        .bind(inspection_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        LOGGER.log_business_event(
            "inspection_approved",
            Some(approver_id),
            [(
                "inspection_id".to_string(),
                serde_json::Value::String(inspection_id.to_string()),
            )]
            .into_iter()
            .collect(),
        );

        Ok(updated)
    }

    /// Consultant begins the field visit.
    pub async fn start_verification(
        &self,
        inspection_id: Uuid,
    ) -> Result<Inspection, LifecycleError> {
        self.simple_transition(inspection_id, InspectionStatus::PendingConsultantVerification)
            .await
    }

    /// Explicit "finish" action from the consultant.
    pub async fn finish_verification(
        &self,
        inspection_id: Uuid,
    ) -> Result<Inspection, LifecycleError> {
        self.simple_transition(inspection_id, InspectionStatus::Completed)
            .await
    }

    /// Administrative cancel, legal from any active state.
    pub async fn cancel(&self, inspection_id: Uuid) -> Result<Inspection, LifecycleError> {
        self.simple_transition(inspection_id, InspectionStatus::Canceled)
            .await
    }

    async fn simple_transition(
        &self,
        inspection_id: Uuid,
        to: InspectionStatus,
    ) -> Result<Inspection, LifecycleError> {
        let mut tx = self.db.begin().await?;
        let inspection = Self::lock_inspection(&mut tx, inspection_id).await?;
        let updated = Self::transition_locked(&mut tx, &inspection, to).await?;
        tx.commit().await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_accepts_table_edges() {
        assert!(guard(
            InspectionStatus::Processing,
            InspectionStatus::PendingManagerReview
        )
        .is_ok());
        assert!(guard(
            InspectionStatus::PendingConsultantVerification,
            InspectionStatus::Completed
        )
        .is_ok());
    }

    #[test]
    fn guard_error_names_both_states() {
        let err = guard(
            InspectionStatus::PendingManagerReview,
            InspectionStatus::Completed,
        )
        .unwrap_err();

        match &err {
            LifecycleError::InvalidTransition { from, to } => {
                assert_eq!(*from, InspectionStatus::PendingManagerReview);
                assert_eq!(*to, InspectionStatus::Completed);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let message = err.to_string();
        assert!(message.contains("PENDING_MANAGER_REVIEW"));
        assert!(message.contains("COMPLETED"));
    }

    #[test]
    fn guard_rejects_moves_out_of_terminal_states() {
        for terminal in [
            InspectionStatus::Completed,
            InspectionStatus::Rejected,
            InspectionStatus::Canceled,
        ] {
            for target in InspectionStatus::ALL {
                assert!(guard(terminal, target).is_err(), "{terminal} -> {target}");
            }
        }
    }
}
