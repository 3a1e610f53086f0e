//! Deadline capture and display for action plan items.
//!
//! Manager edits never overwrite the AI's original suggestion: the
//! suggestion is the training signal for future fine-tuning, the override
//! lives in `deadline_text`, and `deadline_date` is filled in only when the
//! override happens to parse as a date. "Imediato" is a valid deadline.

use chrono::NaiveDate;

use crate::models::action_plan::ActionPlanItem;

const ISO_FORMAT: &str = "%Y-%m-%d";
const BR_FORMAT: &str = "%d/%m/%Y";

/// Try ISO (`YYYY-MM-DD`) first, then Brazilian (`DD/MM/YYYY`).
pub fn parse_deadline(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(text, ISO_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(text, BR_FORMAT))
        .ok()
}

/// Apply a manager's free-text deadline edit to an item.
///
/// A value equal to the AI suggestion records nothing. Anything else is
/// kept verbatim in `deadline_text`, and `deadline_date` is updated only
/// when the new value parses; parse failure leaves it untouched.
/// `ai_suggested_deadline` is never mutated here.
pub fn apply_deadline_edit(item: &mut ActionPlanItem, new_value: &str) {
    if item.ai_suggested_deadline.as_deref() == Some(new_value) {
        return;
    }

    item.deadline_text = Some(new_value.to_string());

    if let Some(date) = parse_deadline(new_value) {
        item.deadline_date = Some(date);
    }
}

/// Display value for an item's deadline, by fixed priority:
/// manager override text, then structured date as `DD/MM/YYYY`, then the
/// AI suggestion, then `"N/A"`. Total — never fails, never mutates.
pub fn display_deadline(item: &ActionPlanItem) -> String {
    if let Some(text) = item.deadline_text.as_deref() {
        if !text.trim().is_empty() {
            return text.to_string();
        }
    }
    if let Some(date) = item.deadline_date {
        return date.format(BR_FORMAT).to_string();
    }
    if let Some(suggested) = item.ai_suggested_deadline.as_deref() {
        if !suggested.is_empty() {
            return suggested.to_string();
        }
    }
    "N/A".to_string()
}

/// Manager-controlled display order: `order_index` ascending with unset
/// items last, item id as the stable tie-break.
pub fn sort_items(items: &mut [ActionPlanItem]) {
    items.sort_by_key(|item| (item.order_index.map_or(i64::MAX, i64::from), item.id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::action_plan::{ActionPlanItemStatus, SeverityLevel};
    use chrono::Utc;
    use uuid::Uuid;

    fn make_item(ai_suggested: Option<&str>) -> ActionPlanItem {
        ActionPlanItem {
            id: Uuid::new_v4(),
            action_plan_id: Uuid::new_v4(),
            problem_description: "Lixeira sem tampa".to_string(),
            corrective_action: "Substituir lixeira".to_string(),
            legal_basis: None,
            sector: None,
            severity: SeverityLevel::Medium,
            status: ActionPlanItemStatus::Open,
            current_status: None,
            ai_suggested_deadline: ai_suggested.map(str::to_string),
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
    fn parses_iso_then_brazilian() {
        assert_eq!(
            parse_deadline("2026-02-15"),
            NaiveDate::from_ymd_opt(2026, 2, 15)
        );
        assert_eq!(
            parse_deadline("15/02/2026"),
            NaiveDate::from_ymd_opt(2026, 2, 15)
        );
        assert_eq!(parse_deadline("Imediato"), None);
        assert_eq!(parse_deadline(""), None);
        assert_eq!(parse_deadline("15-02-2026"), None);
    }

    #[test]
    fn brazilian_date_round_trips_through_edit_and_display() {
        let mut item = make_item(Some("30 dias"));
        apply_deadline_edit(&mut item, "15/02/2026");

        assert_eq!(item.deadline_text.as_deref(), Some("15/02/2026"));
        assert_eq!(item.deadline_date, NaiveDate::from_ymd_opt(2026, 2, 15));
        assert_eq!(display_deadline(&item), "15/02/2026");
    }

    #[test]
    fn unparseable_edit_is_kept_as_text_only() {
        let mut item = make_item(Some("30 dias"));
        apply_deadline_edit(&mut item, "Imediato");

        assert_eq!(item.deadline_text.as_deref(), Some("Imediato"));
        assert_eq!(item.deadline_date, None);
        assert_eq!(display_deadline(&item), "Imediato");
    }

    #[test]
    fn edit_equal_to_ai_suggestion_records_nothing() {
        let mut item = make_item(Some("30 dias"));
        apply_deadline_edit(&mut item, "30 dias");

        assert_eq!(item.deadline_text, None);
        assert_eq!(item.deadline_date, None);
        assert_eq!(display_deadline(&item), "30 dias");
    }

    #[test]
    fn parse_failure_leaves_existing_date_unchanged() {
        let mut item = make_item(Some("30 dias"));
        apply_deadline_edit(&mut item, "2026-02-15");
        assert_eq!(item.deadline_date, NaiveDate::from_ymd_opt(2026, 2, 15));

        apply_deadline_edit(&mut item, "assim que possível");
        assert_eq!(item.deadline_date, NaiveDate::from_ymd_opt(2026, 2, 15));
        assert_eq!(display_deadline(&item), "assim que possível");
    }

    #[test]
    fn ai_suggestion_is_never_mutated_by_edit_sequences() {
        let mut item = make_item(Some("30 dias"));
        let edits = [
            "15/02/2026",
            "Imediato",
            "2026-03-01",
            "",
            "30 dias",
            "60 dias",
        ];
        for edit in edits {
            apply_deadline_edit(&mut item, edit);
            assert_eq!(item.ai_suggested_deadline.as_deref(), Some("30 dias"));
        }
    }

    #[test]
    fn display_is_total_and_idempotent_over_all_field_combinations() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 15);
        let texts = [None, Some("Imediato")];
        let dates = [None, date];
        let suggestions = [None, Some("30 dias")];

        for text in texts {
            for d in dates {
                for suggestion in suggestions {
                    let mut item = make_item(suggestion);
                    item.deadline_text = text.map(str::to_string);
                    item.deadline_date = d;

                    let first = display_deadline(&item);
                    let second = display_deadline(&item);
                    assert_eq!(first, second);

                    let expected = match (text, d, suggestion) {
                        (Some(t), _, _) => t.to_string(),
                        (None, Some(_), _) => "15/02/2026".to_string(),
                        (None, None, Some(s)) => s.to_string(),
                        (None, None, None) => "N/A".to_string(),
                    };
                    assert_eq!(first, expected);
                }
            }
        }
    }

    #[test]
    fn structured_date_displays_in_brazilian_format() {
        let mut item = make_item(None);
        item.deadline_date = NaiveDate::from_ymd_opt(2026, 2, 15);
        assert_eq!(display_deadline(&item), "15/02/2026");
    }

    #[test]
    fn unset_order_index_sorts_last_with_id_tie_break() {
        let id_a = Uuid::from_u128(1);
        let id_b = Uuid::from_u128(2);
        let id_c = Uuid::from_u128(3);

        let mut a = make_item(None);
        a.id = id_a;
        a.order_index = None;
        let mut b = make_item(None);
        b.id = id_b;
        b.order_index = Some(2);
        let mut c = make_item(None);
        c.id = id_c;
        c.order_index = Some(1);

        let mut items = vec![a, b, c];
        sort_items(&mut items);

        let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![id_c, id_b, id_a]);
    }

    #[test]
    fn unset_items_keep_deterministic_order_among_themselves() {
        let id_a = Uuid::from_u128(10);
        let id_b = Uuid::from_u128(20);

        let mut a = make_item(None);
        a.id = id_a;
        let mut b = make_item(None);
        b.id = id_b;

        let mut items = vec![b, a];
        sort_items(&mut items);

        let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![id_a, id_b]);
    }
}
