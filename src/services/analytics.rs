use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use sqlx::{PgPool, Row};

use crate::models::job::{Job, JobResponse, JobStatus};
use crate::utils::logger::LOGGER;

#[derive(Debug, Serialize)]
pub struct CostSummary {
    pub total_jobs: i64,
    pub failed_jobs: i64,
    pub tokens_input: i64,
    pub tokens_output: i64,
    pub total_usd: f64,
    pub avg_execution_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct EstablishmentStats {
    pub establishment: String,
    pub inspection_count: i64,
    pub completed_count: i64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub total_inspections: i64,
    pub total_establishments: i64,
    pub status_breakdown: HashMap<String, i64>,
    pub processing_costs: CostSummary,
    pub establishment_stats: Vec<EstablishmentStats>,
    pub recent_failures: Vec<JobResponse>,
}

#[derive(Debug)]
pub enum AnalyticsError {
    DatabaseError(String),
}

#[derive(Debug)]
pub struct AnalyticsService {
    pool: PgPool,
}

impl AnalyticsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_dashboard(&self) -> Result<AnalyticsResponse, AnalyticsError> {
        let start_time = Instant::now();

        let total_inspections: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inspections")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AnalyticsError::DatabaseError(e.to_string()))?;

        let total_establishments: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM establishments WHERE is_active = TRUE")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AnalyticsError::DatabaseError(e.to_string()))?;

        let status_rows = sqlx::query(
            "SELECT status::text AS status, COUNT(*) AS count FROM inspections GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AnalyticsError::DatabaseError(e.to_string()))?;

        let mut status_breakdown = HashMap::new();
        for row in &status_rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            status_breakdown.insert(status, count);
        }

        let cost_row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_jobs,
                COUNT(*) FILTER (WHERE status = 'FAILED') AS failed_jobs,
                COALESCE(SUM(cost_tokens_input), 0)::bigint AS tokens_input,
                COALESCE(SUM(cost_tokens_output), 0)::bigint AS tokens_output,
                COALESCE(SUM(cost_input_usd + cost_output_usd), 0)::double precision AS total_usd,
                COALESCE(AVG(execution_time_seconds), 0)::double precision AS avg_execution_seconds
            FROM jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AnalyticsError::DatabaseError(e.to_string()))?;

        let processing_costs = CostSummary {
            total_jobs: cost_row.get("total_jobs"),
            failed_jobs: cost_row.get("failed_jobs"),
            tokens_input: cost_row.get("tokens_input"),
            tokens_output: cost_row.get("tokens_output"),
            total_usd: cost_row.get("total_usd"),
            avg_execution_seconds: cost_row.get("avg_execution_seconds"),
        };

        let establishment_rows = sqlx::query(
            r#"
            SELECT e.name AS establishment,
                   COUNT(i.id) AS inspection_count,
                   COUNT(i.id) FILTER (WHERE i.status = 'COMPLETED') AS completed_count
            FROM establishments e
            LEFT JOIN inspections i ON i.establishment_id = e.id
            GROUP BY e.name
            ORDER BY inspection_count DESC
            LIMIT 20
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AnalyticsError::DatabaseError(e.to_string()))?;

        let establishment_stats = establishment_rows
            .iter()
            .map(|row| EstablishmentStats {
                establishment: row.get("establishment"),
                inspection_count: row.get("inspection_count"),
                completed_count: row.get("completed_count"),
            })
            .collect();

        let recent_failures = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE status = $1 ORDER BY created_at DESC LIMIT 10",
        )
        .bind(JobStatus::Failed)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AnalyticsError::DatabaseError(e.to_string()))?
        .into_iter()
        .map(JobResponse::from)
        .collect();

        LOGGER.log_database_query(
            "admin analytics dashboard",
            start_time.elapsed().as_millis(),
            Some(status_breakdown.len()),
        );

        Ok(AnalyticsResponse {
            total_inspections,
            total_establishments,
            status_breakdown,
            processing_costs,
            establishment_stats,
            recent_failures,
        })
    }
}
