//! Progress-tracker steps shown while an upload is being processed.

use serde::Serialize;

use crate::models::inspection::{Inspection, InspectionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Current,
    Completed,
    Error,
}

#[derive(Debug, Serialize)]
pub struct TrackerStep {
    pub key: &'static str,
    pub label: &'static str,
    pub status: StepStatus,
}

#[derive(Debug, Serialize)]
pub struct TrackerData {
    pub inspection_id: uuid::Uuid,
    pub filename: String,
    pub status: InspectionStatus,
    pub steps: Vec<TrackerStep>,
    pub logs: Vec<String>,
}

/// Derive the five tracker steps from the inspection state. Upload is
/// always done by the time a row exists; the rest follows status and the
/// presence of a generated plan.
pub fn tracker_steps(status: InspectionStatus, has_plan: bool) -> Vec<TrackerStep> {
    let mut ai_process = StepStatus::Pending;
    let mut db_save = StepStatus::Pending;
    let mut plan_gen = StepStatus::Pending;
    let mut analysis = StepStatus::Pending;

    if status != InspectionStatus::Processing {
        ai_process = StepStatus::Completed;
    }
    if has_plan {
        ai_process = StepStatus::Completed;
        db_save = StepStatus::Completed;
        plan_gen = StepStatus::Completed;
    }

    match status {
        InspectionStatus::PendingManagerReview => {
            analysis = StepStatus::Current;
        }
        InspectionStatus::Approved
        | InspectionStatus::PendingConsultantVerification
        | InspectionStatus::Completed => {
            analysis = StepStatus::Completed;
        }
        InspectionStatus::Rejected => {
            let failed = if db_save == StepStatus::Completed {
                &mut plan_gen
            } else {
                &mut ai_process
            };
            *failed = StepStatus::Error;
        }
        InspectionStatus::Processing | InspectionStatus::Canceled => {}
    }

    vec![
        TrackerStep {
            key: "upload",
            label: "Upload Recebido",
            status: StepStatus::Completed,
        },
        TrackerStep {
            key: "ai_process",
            label: "Processamento IA",
            status: ai_process,
        },
        TrackerStep {
            key: "db_save",
            label: "Estruturação de Dados",
            status: db_save,
        },
        TrackerStep {
            key: "plan_gen",
            label: "Geração do Plano",
            status: plan_gen,
        },
        TrackerStep {
            key: "analysis",
            label: "Análise do Gestor",
            status: analysis,
        },
    ]
}

/// Full tracker payload: steps plus the last few processing log messages.
pub fn tracker_data(inspection: &Inspection, has_plan: bool) -> TrackerData {
    let logs = inspection
        .processing_logs
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .rev()
                .take(5)
                .rev()
                .filter_map(|entry| entry.get("message").and_then(|m| m.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    TrackerData {
        inspection_id: inspection.id,
        filename: inspection
            .stored_filename
            .clone()
            .unwrap_or_else(|| "Arquivo".to_string()),
        status: inspection.status,
        steps: tracker_steps(inspection.status, has_plan),
        logs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step<'a>(steps: &'a [TrackerStep], key: &str) -> &'a TrackerStep {
        steps.iter().find(|s| s.key == key).unwrap()
    }

    #[test]
    fn fresh_upload_only_has_upload_completed() {
        let steps = tracker_steps(InspectionStatus::Processing, false);
        assert_eq!(step(&steps, "upload").status, StepStatus::Completed);
        assert_eq!(step(&steps, "ai_process").status, StepStatus::Pending);
        assert_eq!(step(&steps, "analysis").status, StepStatus::Pending);
    }

    #[test]
    fn pending_review_marks_analysis_current() {
        let steps = tracker_steps(InspectionStatus::PendingManagerReview, true);
        assert_eq!(step(&steps, "plan_gen").status, StepStatus::Completed);
        assert_eq!(step(&steps, "analysis").status, StepStatus::Current);
    }

    #[test]
    fn approved_and_completed_mark_analysis_done() {
        for status in [
            InspectionStatus::Approved,
            InspectionStatus::PendingConsultantVerification,
            InspectionStatus::Completed,
        ] {
            let steps = tracker_steps(status, true);
            assert_eq!(step(&steps, "analysis").status, StepStatus::Completed);
        }
    }

    #[test]
    fn rejection_flags_the_failing_step() {
        let steps = tracker_steps(InspectionStatus::Rejected, false);
        assert_eq!(step(&steps, "ai_process").status, StepStatus::Error);

        let steps = tracker_steps(InspectionStatus::Rejected, true);
        assert_eq!(step(&steps, "plan_gen").status, StepStatus::Error);
    }
}
