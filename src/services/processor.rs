//! Background runner for AI-processing jobs.
//!
//! Uploads return immediately; this service runs in a spawned task, drives
//! the job record through PROCESSING → COMPLETED/FAILED and applies the
//! matching inspection transition. Success (plan + items + raw snapshot +
//! status) and failure (rejection + error log) each commit as one
//! transaction.

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::models::action_plan::{self, ActionPlanItem, SeverityLevel};
use crate::models::inspection::Inspection;
use crate::models::job::JobStatus;
use crate::services::analyzer::{AnalysisReport, ReportAnalyzer};
use crate::services::lifecycle::LifecycleService;

// Per-million-token pricing used for job cost accounting.
const USD_PER_MTOK_INPUT: f64 = 3.0;
const USD_PER_MTOK_OUTPUT: f64 = 15.0;

pub type SharedAnalyzer = Arc<dyn ReportAnalyzer>;

#[derive(Clone)]
pub struct ProcessorService {
    db: PgPool,
    analyzer: SharedAnalyzer,
    upload_dir: String,
}

impl ProcessorService {
    pub fn new(db: PgPool, analyzer: SharedAnalyzer, upload_dir: String) -> Self {
        Self {
            db,
            analyzer,
            upload_dir,
        }
    }

    /// Entry point for the spawned task. Never panics the runtime: errors
    /// are logged and, best effort, recorded on the job.
    pub async fn run(&self, job_id: Uuid, inspection_id: Uuid) {
        if let Err(e) = self.process(job_id, inspection_id).await {
            tracing::error!(%job_id, %inspection_id, error = %e, "processing job crashed");
            let _ = sqlx::query(
                r#"
                UPDATE jobs
                SET status = $1, error_log = $2, finished_at = NOW()
                WHERE id = $3 AND status = $4
                "#,
            )
            .bind(JobStatus::Failed)
            .bind(format!("{e:#}"))
            .bind(job_id)
            .bind(JobStatus::Processing)
            .execute(&self.db)
            .await;
        }
    }

    async fn process(&self, job_id: Uuid, inspection_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = $1, attempts = attempts + 1 WHERE id = $2",
        )
        .bind(JobStatus::Processing)
        .bind(job_id)
        .execute(&self.db)
        .await?;

        let inspection = sqlx::query_as::<_, Inspection>(
            "SELECT * FROM inspections WHERE id = $1",
        )
        .bind(inspection_id)
        .fetch_one(&self.db)
        .await?;

        let filename = inspection
            .stored_filename
            .clone()
            .unwrap_or_else(|| format!("{}.pdf", inspection.id));
        let file_path = PathBuf::from(&self.upload_dir).join(&filename);

        self.append_processing_log(inspection_id, "Processamento IA iniciado", "ai_process")
            .await?;

        let started = Instant::now();
        let document = tokio::fs::read(&file_path).await;

        let outcome = match document {
            Ok(bytes) => self.analyzer.analyze(&filename, &bytes).await,
            Err(e) => {
                self.fail(job_id, inspection_id, &format!("arquivo ilegível: {e}"), started)
                    .await?;
                return Ok(());
            }
        };

        match outcome {
            Ok(report) => {
                self.succeed(job_id, inspection_id, report, started).await?;
            }
            Err(e) => {
                self.fail(job_id, inspection_id, &e.to_string(), started).await?;
            }
        }

        Ok(())
    }

    async fn succeed(
        &self,
        job_id: Uuid,
        inspection_id: Uuid,
        report: AnalysisReport,
        started: Instant,
    ) -> anyhow::Result<()> {
        let mut tx = self.db.begin().await?;

        let inspection = LifecycleService::lock_inspection(&mut tx, inspection_id).await?;
        LifecycleService::mark_review_ready(&mut tx, &inspection, &report.raw).await?;

        let plan_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO action_plans (inspection_id, summary_text, strengths_text)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(inspection_id)
        .bind(&report.summary)
        .bind(&report.strengths)
        .fetch_one(&mut *tx)
        .await?;

        let mut items: Vec<ActionPlanItem> = Vec::with_capacity(report.findings.len());
        for (index, finding) in report.findings.iter().enumerate() {
            let severity = finding
                .severity
                .as_deref()
                .map(SeverityLevel::parse_or_medium)
                .unwrap_or(SeverityLevel::Medium);

            // ai_suggested_deadline is written exactly once, here.
            let item = sqlx::query_as::<_, ActionPlanItem>(
                r#"
                INSERT INTO action_plan_items
                    (action_plan_id, problem_description, corrective_action, legal_basis,
                     sector, severity, current_status, ai_suggested_deadline, order_index)
                VALUES ($1, $2, $3, $4, $5, $6, 'Pendente', $7, $8)
                RETURNING *
                "#,
            )
            .bind(plan_id)
            .bind(&finding.problem)
            .bind(&finding.action)
            .bind(&finding.legal_basis)
            .bind(&finding.sector)
            .bind(severity)
            .bind(&finding.deadline)
            .bind(index as i32)
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);
        }

        let stats = action_plan::calculate_stats(&items);
        sqlx::query("UPDATE action_plans SET stats_json = $1, updated_at = NOW() WHERE id = $2")
            .bind(&stats)
            .bind(plan_id)
            .execute(&mut *tx)
            .await?;

        let elapsed = started.elapsed().as_secs_f64();
        let input_tokens = report.usage.input_tokens;
        let output_tokens = report.usage.output_tokens;
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1,
                cost_tokens_input = $2,
                cost_tokens_output = $3,
                cost_input_usd = $4,
                cost_output_usd = $5,
                execution_time_seconds = $6,
                api_calls_count = api_calls_count + $7,
                result_payload = $8,
                finished_at = NOW()
            WHERE id = $9
            "#,
        )
        .bind(JobStatus::Completed)
        .bind(input_tokens)
        .bind(output_tokens)
        .bind(input_tokens as f64 / 1_000_000.0 * USD_PER_MTOK_INPUT)
        .bind(output_tokens as f64 / 1_000_000.0 * USD_PER_MTOK_OUTPUT)
        .bind(elapsed)
        .bind(report.usage.api_calls)
        .bind(json!({
            "plan_id": plan_id,
            "items_created": items.len(),
        }))
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        Self::append_processing_log_tx(&mut tx, inspection_id, "Plano de ação gerado", "plan_gen")
            .await?;

        tx.commit().await?;

        tracing::info!(%job_id, %inspection_id, items = items.len(), "processing job completed");
        Ok(())
    }

    async fn fail(
        &self,
        job_id: Uuid,
        inspection_id: Uuid,
        error: &str,
        started: Instant,
    ) -> anyhow::Result<()> {
        let mut tx = self.db.begin().await?;

        let inspection = LifecycleService::lock_inspection(&mut tx, inspection_id).await?;
        LifecycleService::mark_rejected(&mut tx, &inspection).await?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1, error_log = $2, execution_time_seconds = $3, finished_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(JobStatus::Failed)
        .bind(error)
        .bind(started.elapsed().as_secs_f64())
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        Self::append_processing_log_tx(&mut tx, inspection_id, "Falha no processamento", "ai_process")
            .await?;

        tx.commit().await?;

        tracing::warn!(%job_id, %inspection_id, error, "processing job failed");
        Ok(())
    }

    async fn append_processing_log(
        &self,
        inspection_id: Uuid,
        message: &str,
        stage: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE inspections SET processing_logs = processing_logs || $1::jsonb WHERE id = $2",
        )
        .bind(json!([{
            "message": message,
            "stage": stage,
            "timestamp": Utc::now().to_rfc3339(),
        }]))
        .bind(inspection_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn append_processing_log_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        inspection_id: Uuid,
        message: &str,
        stage: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE inspections SET processing_logs = processing_logs || $1::jsonb WHERE id = $2",
        )
        .bind(json!([{
            "message": message,
            "stage": stage,
            "timestamp": Utc::now().to_rfc3339(),
        }]))
        .bind(inspection_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
