use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One asynchronous processing attempt. The job row is the durable handle
/// other actors poll while the AI call runs outside the request cycle.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub inspection_id: Option<Uuid>,
    pub job_type: String,
    pub status: JobStatus,
    pub attempts: i32,
    pub cost_tokens_input: i64,
    pub cost_tokens_output: i64,
    pub cost_input_usd: f64,
    pub cost_output_usd: f64,
    pub execution_time_seconds: f64,
    pub api_calls_count: i32,
    pub input_payload: Option<serde_json::Value>,
    pub result_payload: Option<serde_json::Value>,
    pub error_log: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    Skipped,
    Canceled,
}

pub const JOB_TYPE_PROCESS_REPORT: &str = "PROCESS_REPORT";

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub inspection_id: Option<Uuid>,
    pub job_type: String,
    pub status: JobStatus,
    pub attempts: i32,
    pub cost_tokens_input: i64,
    pub cost_tokens_output: i64,
    pub cost_input_usd: f64,
    pub cost_output_usd: f64,
    pub execution_time_seconds: f64,
    pub error_log: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            inspection_id: job.inspection_id,
            job_type: job.job_type,
            status: job.status,
            attempts: job.attempts,
            cost_tokens_input: job.cost_tokens_input,
            cost_tokens_output: job.cost_tokens_output,
            cost_input_usd: job.cost_input_usd,
            cost_output_usd: job.cost_output_usd,
            execution_time_seconds: job.execution_time_seconds,
            error_log: job.error_log,
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}
