use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::services::deadline;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActionPlan {
    pub id: Uuid,
    pub inspection_id: Uuid,
    pub summary_text: Option<String>,
    pub strengths_text: Option<String>,
    pub stats_json: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "severity_level", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Low => "LOW",
            SeverityLevel::Medium => "MEDIUM",
            SeverityLevel::High => "HIGH",
            SeverityLevel::Critical => "CRITICAL",
        }
    }

    /// Lenient coercion for severity strings coming from AI output or
    /// manager forms. Unknown values fall back to MEDIUM, matching how
    /// plans were always persisted.
    pub fn parse_or_medium(value: &str) -> SeverityLevel {
        match value {
            "LOW" => SeverityLevel::Low,
            "MEDIUM" => SeverityLevel::Medium,
            "HIGH" => SeverityLevel::High,
            "CRITICAL" => SeverityLevel::Critical,
            _ => SeverityLevel::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "action_plan_item_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionPlanItemStatus {
    Open,
    InProgress,
    Resolved,
}

impl ActionPlanItemStatus {
    pub fn label_pt(&self) -> &'static str {
        match self {
            ActionPlanItemStatus::Open => "Pendente",
            ActionPlanItemStatus::InProgress => "Em Andamento",
            ActionPlanItemStatus::Resolved => "Corrigido",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActionPlanItem {
    pub id: Uuid,
    pub action_plan_id: Uuid,
    pub problem_description: String,
    pub corrective_action: String,
    pub legal_basis: Option<String>,
    pub sector: Option<String>,
    pub severity: SeverityLevel,
    pub status: ActionPlanItemStatus,
    pub current_status: Option<String>,
    pub ai_suggested_deadline: Option<String>,
    pub deadline_date: Option<NaiveDate>,
    pub deadline_text: Option<String>,
    pub manager_notes: Option<String>,
    pub order_index: Option<i32>,
    pub evidence_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActionPlanItem {
    pub fn is_resolved(&self) -> bool {
        self.status == ActionPlanItemStatus::Resolved
            || self.current_status.as_deref() == Some("Corrigido")
    }

    pub fn has_evidence(&self) -> bool {
        self.evidence_image_url
            .as_deref()
            .map(|url| !url.is_empty())
            .unwrap_or(false)
    }
}

/// One item upsert inside a manager plan save. Items without an `id` are
/// created; items with an `id` are updated in place.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ItemUpsertRequest {
    pub id: Option<Uuid>,
    pub problem_description: Option<String>,
    pub corrective_action: Option<String>,
    pub legal_basis: Option<String>,
    pub sector: Option<String>,
    pub severity: Option<String>,
    pub current_status: Option<String>,
    pub deadline: Option<String>,
    pub manager_notes: Option<String>,
    pub order_index: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PlanSaveRequest {
    pub summary_text: Option<String>,
    pub strengths_text: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemUpsertRequest>,
    #[serde(default)]
    pub removed_item_ids: Vec<Uuid>,
    pub responsible_name: Option<String>,
    pub responsible_phone: Option<String>,
    #[validate(email)]
    pub responsible_email: Option<String>,
}

/// One item update inside a consultant verification save.
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationItemUpdate {
    pub id: Uuid,
    pub current_status: Option<String>,
    pub manager_notes: Option<String>,
    pub evidence_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerificationSaveRequest {
    #[serde(default)]
    pub items: Vec<VerificationItemUpdate>,
}

#[derive(Debug, Serialize)]
pub struct ActionPlanItemResponse {
    pub id: Uuid,
    pub problem_description: String,
    pub corrective_action: String,
    pub legal_basis: Option<String>,
    pub sector: Option<String>,
    pub severity: SeverityLevel,
    pub status: ActionPlanItemStatus,
    pub current_status: Option<String>,
    pub ai_suggested_deadline: Option<String>,
    pub deadline_date: Option<NaiveDate>,
    pub deadline_text: Option<String>,
    pub display_deadline: String,
    pub manager_notes: Option<String>,
    pub evidence_image_url: Option<String>,
    pub order_index: Option<i32>,
    pub is_corrected: bool,
}

impl From<ActionPlanItem> for ActionPlanItemResponse {
    fn from(item: ActionPlanItem) -> Self {
        let display_deadline = deadline::display_deadline(&item);
        let is_corrected = item.is_resolved();
        Self {
            id: item.id,
            problem_description: item.problem_description,
            corrective_action: item.corrective_action,
            legal_basis: item.legal_basis,
            sector: item.sector,
            severity: item.severity,
            status: item.status,
            current_status: item.current_status,
            ai_suggested_deadline: item.ai_suggested_deadline,
            deadline_date: item.deadline_date,
            deadline_text: item.deadline_text,
            display_deadline,
            manager_notes: item.manager_notes,
            evidence_image_url: item.evidence_image_url,
            order_index: item.order_index,
            is_corrected,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActionPlanResponse {
    pub id: Uuid,
    pub inspection_id: Uuid,
    pub summary_text: Option<String>,
    pub strengths_text: Option<String>,
    pub stats: Option<serde_json::Value>,
    pub items: Vec<ActionPlanItemResponse>,
}

impl ActionPlanResponse {
    pub fn assemble(plan: ActionPlan, mut items: Vec<ActionPlanItem>) -> Self {
        deadline::sort_items(&mut items);
        Self {
            id: plan.id,
            inspection_id: plan.inspection_id,
            summary_text: plan.summary_text,
            strengths_text: plan.strengths_text,
            stats: plan.stats_json,
            items: items.into_iter().map(ActionPlanItemResponse::from).collect(),
        }
    }
}

/// Resolution statistics over a plan's items: totals, percentage and
/// breakdowns by severity and sector.
pub fn calculate_stats(items: &[ActionPlanItem]) -> serde_json::Value {
    if items.is_empty() {
        return json!({});
    }

    let total = items.len();
    let resolved = items.iter().filter(|i| i.is_resolved()).count();

    let mut by_severity = serde_json::Map::new();
    let mut by_sector = serde_json::Map::new();

    for item in items {
        let sev_entry = by_severity
            .entry(item.severity.as_str().to_string())
            .or_insert_with(|| json!({"total": 0, "resolved": 0}));
        sev_entry["total"] = json!(sev_entry["total"].as_i64().unwrap_or(0) + 1);
        if item.is_resolved() {
            sev_entry["resolved"] = json!(sev_entry["resolved"].as_i64().unwrap_or(0) + 1);
        }

        let sector = item.sector.clone().unwrap_or_else(|| "Geral".to_string());
        let sector_entry = by_sector
            .entry(sector)
            .or_insert_with(|| json!({"total": 0, "resolved": 0}));
        sector_entry["total"] = json!(sector_entry["total"].as_i64().unwrap_or(0) + 1);
        if item.is_resolved() {
            sector_entry["resolved"] = json!(sector_entry["resolved"].as_i64().unwrap_or(0) + 1);
        }
    }

    json!({
        "total_items": total,
        "resolved_items": resolved,
        "resolution_percentage": (resolved as f64 / total as f64) * 100.0,
        "by_severity": by_severity,
        "by_sector": by_sector,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_item(sector: Option<&str>, severity: SeverityLevel, resolved: bool) -> ActionPlanItem {
        ActionPlanItem {
            id: Uuid::new_v4(),
            action_plan_id: Uuid::new_v4(),
            problem_description: "Piso com rachaduras".to_string(),
            corrective_action: "Reparar o piso".to_string(),
            legal_basis: None,
            sector: sector.map(str::to_string),
            severity,
            status: if resolved {
                ActionPlanItemStatus::Resolved
            } else {
                ActionPlanItemStatus::Open
            },
            current_status: None,
            ai_suggested_deadline: None,
            deadline_date: None,
            deadline_text: None,
            manager_notes: None,
            order_index: None,
            evidence_image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stats_of_empty_plan_are_empty() {
        assert_eq!(calculate_stats(&[]), json!({}));
    }

    #[test]
    fn stats_count_resolution_by_severity_and_sector() {
        let items = vec![
            make_item(Some("Cozinha"), SeverityLevel::High, true),
            make_item(Some("Cozinha"), SeverityLevel::High, false),
            make_item(None, SeverityLevel::Low, false),
            make_item(Some("Estoque"), SeverityLevel::Critical, true),
        ];

        let stats = calculate_stats(&items);
        assert_eq!(stats["total_items"], json!(4));
        assert_eq!(stats["resolved_items"], json!(2));
        assert_eq!(stats["resolution_percentage"], json!(50.0));
        assert_eq!(stats["by_severity"]["HIGH"]["total"], json!(2));
        assert_eq!(stats["by_severity"]["HIGH"]["resolved"], json!(1));
        assert_eq!(stats["by_sector"]["Geral"]["total"], json!(1));
        assert_eq!(stats["by_sector"]["Estoque"]["resolved"], json!(1));
    }

    #[test]
    fn corrigido_label_counts_as_resolved() {
        let mut item = make_item(None, SeverityLevel::Medium, false);
        item.current_status = Some("Corrigido".to_string());
        assert!(item.is_resolved());
    }

    #[test]
    fn unknown_severity_falls_back_to_medium() {
        assert_eq!(SeverityLevel::parse_or_medium("HIGH"), SeverityLevel::High);
        assert_eq!(
            SeverityLevel::parse_or_medium("URGENTE"),
            SeverityLevel::Medium
        );
    }
}
