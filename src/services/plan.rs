//! Plan editing and field verification.
//!
//! Manager edits are only structural while the plan waits for review;
//! after approval the item set is frozen and only field-level corrections
//! go through. Consultant verification saves evidence and resolution marks,
//! and the first saved evidence completes the inspection in the same
//! transaction (the single evidence-visibility policy of this system).

use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::models::action_plan::{
    self, ActionPlan, ActionPlanItem, ActionPlanItemStatus, ActionPlanResponse,
    ItemUpsertRequest, PlanSaveRequest, SeverityLevel, VerificationSaveRequest,
};
use crate::models::inspection::{Inspection, InspectionStatus};
use crate::services::deadline;
use crate::services::lifecycle::{LifecycleError, LifecycleService};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plano de ação não encontrado")]
    PlanNotFound,
    #[error("item '{0}' não pertence a este plano")]
    ItemNotFound(Uuid),
    #[error("este plano já foi aprovado e sua estrutura não pode mais ser alterada")]
    StructureFrozen,
    #[error("edição não permitida no status '{0}'")]
    NotEditable(InspectionStatus),
    #[error("a verificação de campo não está aberta (status atual: '{0}')")]
    VerificationNotOpen(InspectionStatus),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

fn item_status_from_label(label: &str) -> ActionPlanItemStatus {
    match label {
        "Corrigido" => ActionPlanItemStatus::Resolved,
        "Em Andamento" | "Em Verificação" => ActionPlanItemStatus::InProgress,
        _ => ActionPlanItemStatus::Open,
    }
}

#[derive(Clone)]
pub struct PlanService {
    db: PgPool,
}

impl PlanService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get_plan(&self, inspection_id: Uuid) -> Result<ActionPlanResponse, PlanError> {
        let plan = sqlx::query_as::<_, ActionPlan>(
            "SELECT * FROM action_plans WHERE inspection_id = $1",
        )
        .bind(inspection_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(PlanError::PlanNotFound)?;

        let items = sqlx::query_as::<_, ActionPlanItem>(
            "SELECT * FROM action_plan_items WHERE action_plan_id = $1",
        )
        .bind(plan.id)
        .fetch_all(&self.db)
        .await?;

        Ok(ActionPlanResponse::assemble(plan, items))
    }

    /// Manager plan save: summary/strengths, item upserts, removals and
    /// reordering. Structure changes require PENDING_MANAGER_REVIEW; once
    /// approved, only per-item field corrections are accepted.
    pub async fn save_plan(
        &self,
        inspection_id: Uuid,
        data: &PlanSaveRequest,
    ) -> Result<ActionPlanResponse, PlanError> {
        let mut tx = self.db.begin().await?;

        let inspection = LifecycleService::lock_inspection(&mut tx, inspection_id).await?;
        let structural_edit_allowed = match inspection.status {
            InspectionStatus::PendingManagerReview => true,
            InspectionStatus::Approved => false,
            other => return Err(PlanError::NotEditable(other)),
        };

        let plan = sqlx::query_as::<_, ActionPlan>(
            "SELECT * FROM action_plans WHERE inspection_id = $1",
        )
        .bind(inspection_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PlanError::PlanNotFound)?;

        if !structural_edit_allowed {
            let wants_structure = !data.removed_item_ids.is_empty()
                || data.items.iter().any(|i| i.id.is_none())
                || data.summary_text.is_some()
                || data.strengths_text.is_some();
            if wants_structure {
                return Err(PlanError::StructureFrozen);
            }
        }

        if data.summary_text.is_some() || data.strengths_text.is_some() {
            sqlx::query(
                r#"
                UPDATE action_plans
                SET summary_text = COALESCE($1, summary_text),
                    strengths_text = COALESCE($2, strengths_text),
                    updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(&data.summary_text)
            .bind(&data.strengths_text)
            .bind(plan.id)
            .execute(&mut *tx)
            .await?;
        }

        for removed_id in &data.removed_item_ids {
            sqlx::query("DELETE FROM action_plan_items WHERE id = $1 AND action_plan_id = $2")
                .bind(removed_id)
                .bind(plan.id)
                .execute(&mut *tx)
                .await?;
        }

        for item_data in &data.items {
            match item_data.id {
                Some(item_id) => {
                    Self::update_item(&mut tx, plan.id, item_id, item_data).await?;
                }
                None => {
                    Self::create_item(&mut tx, plan.id, item_data).await?;
                }
            }
        }

        Self::update_responsible_info(&mut tx, &inspection, data).await?;
        Self::refresh_stats(&mut tx, plan.id).await?;

        let items = sqlx::query_as::<_, ActionPlanItem>(
            "SELECT * FROM action_plan_items WHERE action_plan_id = $1",
        )
        .bind(plan.id)
        .fetch_all(&mut *tx)
        .await?;
        let plan = sqlx::query_as::<_, ActionPlan>("SELECT * FROM action_plans WHERE id = $1")
            .bind(plan.id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ActionPlanResponse::assemble(plan, items))
    }

    /// Consultant verification save. Evidence and resolution marks are only
    /// meaningful during PENDING_CONSULTANT_VERIFICATION; the first evidence
    /// saved completes the inspection within this same transaction.
    pub async fn save_verification(
        &self,
        inspection_id: Uuid,
        data: &VerificationSaveRequest,
    ) -> Result<Inspection, PlanError> {
        let mut tx = self.db.begin().await?;

        let inspection = LifecycleService::lock_inspection(&mut tx, inspection_id).await?;
        if inspection.status != InspectionStatus::PendingConsultantVerification {
            return Err(PlanError::VerificationNotOpen(inspection.status));
        }

        let plan = sqlx::query_as::<_, ActionPlan>(
            "SELECT * FROM action_plans WHERE inspection_id = $1",
        )
        .bind(inspection_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PlanError::PlanNotFound)?;

        let mut evidence_saved = false;
        for update in &data.items {
            let item = sqlx::query_as::<_, ActionPlanItem>(
                "SELECT * FROM action_plan_items WHERE id = $1 AND action_plan_id = $2",
            )
            .bind(update.id)
            .bind(plan.id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(PlanError::ItemNotFound(update.id))?;

            let current_status = update
                .current_status
                .clone()
                .or(item.current_status.clone());
            let status = current_status
                .as_deref()
                .map(item_status_from_label)
                .unwrap_or(item.status);
            let evidence_url = update
                .evidence_image_url
                .clone()
                .or(item.evidence_image_url.clone());

            if update
                .evidence_image_url
                .as_deref()
                .map(|url| !url.trim().is_empty())
                .unwrap_or(false)
            {
                evidence_saved = true;
            }

            sqlx::query(
                r#"
                UPDATE action_plan_items
                SET current_status = $1,
                    status = $2,
                    manager_notes = COALESCE($3, manager_notes),
                    evidence_image_url = $4,
                    updated_at = NOW()
                WHERE id = $5
                "#,
            )
            .bind(&current_status)
            .bind(status)
            .bind(&update.manager_notes)
            .bind(&evidence_url)
            .bind(item.id)
            .execute(&mut *tx)
            .await?;
        }

        Self::refresh_stats(&mut tx, plan.id).await?;

        let inspection = if evidence_saved {
            LifecycleService::transition_locked(&mut tx, &inspection, InspectionStatus::Completed)
                .await?
        } else {
            inspection
        };

        tx.commit().await?;
        Ok(inspection)
    }

    /// Attach an uploaded evidence file to one item. Same completion policy
    /// as `save_verification`.
    pub async fn attach_evidence(
        &self,
        inspection_id: Uuid,
        item_id: Uuid,
        evidence_url: &str,
    ) -> Result<Inspection, PlanError> {
        let mut tx = self.db.begin().await?;

        let inspection = LifecycleService::lock_inspection(&mut tx, inspection_id).await?;
        if inspection.status != InspectionStatus::PendingConsultantVerification {
            return Err(PlanError::VerificationNotOpen(inspection.status));
        }

        let plan = sqlx::query_as::<_, ActionPlan>(
            "SELECT * FROM action_plans WHERE inspection_id = $1",
        )
        .bind(inspection_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PlanError::PlanNotFound)?;

        let updated = sqlx::query(
            r#"
            UPDATE action_plan_items
            SET evidence_image_url = $1, updated_at = NOW()
            WHERE id = $2 AND action_plan_id = $3
            "#,
        )
        .bind(evidence_url)
        .bind(item_id)
        .bind(plan.id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(PlanError::ItemNotFound(item_id));
        }

        let inspection =
            LifecycleService::transition_locked(&mut tx, &inspection, InspectionStatus::Completed)
                .await?;

        tx.commit().await?;
        Ok(inspection)
    }

    async fn update_item(
        tx: &mut Transaction<'_, Postgres>,
        plan_id: Uuid,
        item_id: Uuid,
        data: &ItemUpsertRequest,
    ) -> Result<(), PlanError> {
        let mut item = sqlx::query_as::<_, ActionPlanItem>(
            "SELECT * FROM action_plan_items WHERE id = $1 AND action_plan_id = $2",
        )
        .bind(item_id)
        .bind(plan_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(PlanError::ItemNotFound(item_id))?;

        if let Some(problem) = &data.problem_description {
            item.problem_description = problem.clone();
        }
        if let Some(action) = &data.corrective_action {
            item.corrective_action = action.clone();
        }
        if let Some(legal_basis) = &data.legal_basis {
            item.legal_basis = Some(legal_basis.clone());
        }
        if let Some(sector) = &data.sector {
            item.sector = Some(sector.clone());
        }
        if let Some(severity) = &data.severity {
            item.severity = SeverityLevel::parse_or_medium(severity);
        }
        if let Some(current_status) = &data.current_status {
            item.current_status = Some(current_status.clone());
            item.status = item_status_from_label(current_status);
        }
        if let Some(notes) = &data.manager_notes {
            item.manager_notes = Some(notes.clone());
        }
        if let Some(order_index) = data.order_index {
            item.order_index = Some(order_index);
        }
        if let Some(deadline_input) = &data.deadline {
            if !deadline_input.trim().is_empty() {
                deadline::apply_deadline_edit(&mut item, deadline_input);
            }
        }

        sqlx::query(
            r#"
            UPDATE action_plan_items
            SET problem_description = $1,
                corrective_action = $2,
                legal_basis = $3,
                sector = $4,
                severity = $5,
                status = $6,
                current_status = $7,
                deadline_date = $8,
                deadline_text = $9,
                manager_notes = $10,
                order_index = $11,
                updated_at = NOW()
            WHERE id = $12
            "#,
        )
        .bind(&item.problem_description)
        .bind(&item.corrective_action)
        .bind(&item.legal_basis)
        .bind(&item.sector)
        .bind(item.severity)
        .bind(item.status)
        .bind(&item.current_status)
        .bind(item.deadline_date)
        .bind(&item.deadline_text)
        .bind(&item.manager_notes)
        .bind(item.order_index)
        .bind(item.id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn create_item(
        tx: &mut Transaction<'_, Postgres>,
        plan_id: Uuid,
        data: &ItemUpsertRequest,
    ) -> Result<(), PlanError> {
        let severity = data
            .severity
            .as_deref()
            .map(SeverityLevel::parse_or_medium)
            .unwrap_or(SeverityLevel::Medium);

        // Manager-created items carry no AI suggestion; the free text goes
        // straight into the override fields.
        let deadline_text = data
            .deadline
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string);
        let deadline_date = deadline_text.as_deref().and_then(deadline::parse_deadline);

        let order_index = match data.order_index {
            Some(index) => Some(index),
            None => {
                let max: Option<i32> = sqlx::query_scalar(
                    "SELECT MAX(order_index) FROM action_plan_items WHERE action_plan_id = $1",
                )
                .bind(plan_id)
                .fetch_one(&mut **tx)
                .await?;
                Some(max.map_or(0, |m| m + 1))
            }
        };

        sqlx::query(
            r#"
            INSERT INTO action_plan_items
                (action_plan_id, problem_description, corrective_action, legal_basis,
                 sector, severity, current_status, deadline_date, deadline_text, order_index)
            VALUES ($1, $2, $3, $4, $5, $6, 'Pendente', $7, $8, $9)
            "#,
        )
        .bind(plan_id)
        .bind(data.problem_description.as_deref().unwrap_or_default())
        .bind(data.corrective_action.as_deref().unwrap_or_default())
        .bind(&data.legal_basis)
        .bind(&data.sector)
        .bind(severity)
        .bind(deadline_date)
        .bind(&deadline_text)
        .bind(order_index)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn update_responsible_info(
        tx: &mut Transaction<'_, Postgres>,
        inspection: &Inspection,
        data: &PlanSaveRequest,
    ) -> Result<(), sqlx::Error> {
        if data.responsible_name.is_none()
            && data.responsible_phone.is_none()
            && data.responsible_email.is_none()
        {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE establishments
            SET responsible_name = COALESCE($1, responsible_name),
                responsible_phone = COALESCE($2, responsible_phone),
                responsible_email = COALESCE($3, responsible_email)
            WHERE id = $4
            "#,
        )
        .bind(&data.responsible_name)
        .bind(&data.responsible_phone)
        .bind(&data.responsible_email)
        .bind(inspection.establishment_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn refresh_stats(
        tx: &mut Transaction<'_, Postgres>,
        plan_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        let items = sqlx::query_as::<_, ActionPlanItem>(
            "SELECT * FROM action_plan_items WHERE action_plan_id = $1",
        )
        .bind(plan_id)
        .fetch_all(&mut **tx)
        .await?;

        let stats = action_plan::calculate_stats(&items);
        sqlx::query("UPDATE action_plans SET stats_json = $1, updated_at = NOW() WHERE id = $2")
            .bind(&stats)
            .bind(plan_id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_map_to_item_status() {
        assert_eq!(
            item_status_from_label("Corrigido"),
            ActionPlanItemStatus::Resolved
        );
        assert_eq!(
            item_status_from_label("Em Verificação"),
            ActionPlanItemStatus::InProgress
        );
        assert_eq!(
            item_status_from_label("Pendente"),
            ActionPlanItemStatus::Open
        );
        assert_eq!(
            item_status_from_label("qualquer outra coisa"),
            ActionPlanItemStatus::Open
        );
    }
}
