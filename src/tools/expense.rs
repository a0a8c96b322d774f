//! Typed views of expense tool results.
//!
//! Gateway results are opaque JSON; these decoders let a caller (the
//! presentation layer, typically) recover structure from `list_expenses`
//! and `summarize_expenses` payloads when it wants more than raw text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single expense row as returned by `list_expenses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub date: String,
    pub amount: f64,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Per-category aggregate as returned by `summarize_expenses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseSummary {
    pub category: String,
    pub total_amount: f64,
    pub count: u64,
}

/// Decode a `list_expenses` result payload.
pub fn expenses_from_result(result: &Value) -> Result<Vec<Expense>, serde_json::Error> {
    serde_json::from_value(result.clone())
}

/// Decode a `summarize_expenses` result payload.
pub fn summaries_from_result(result: &Value) -> Result<Vec<ExpenseSummary>, serde_json::Error> {
    serde_json::from_value(result.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_expense_list() {
        let result = json!([
            {"id": "e1", "date": "2024-01-15", "amount": 50.0, "category": "groceries"},
            {"id": "e2", "date": "2024-01-16", "amount": 12.5, "category": "transport",
             "subcategory": "bus", "note": "to work", "created_at": "2024-01-16T08:00:00Z"}
        ]);
        let expenses = expenses_from_result(&result).unwrap();
        assert_eq!(expenses.len(), 2);
        assert_eq!(expenses[0].category, "groceries");
        assert!(expenses[0].note.is_none());
        assert_eq!(expenses[1].subcategory.as_deref(), Some("bus"));
    }

    #[test]
    fn decode_summary_list() {
        let result = json!([
            {"category": "groceries", "total_amount": 230.4, "count": 7},
            {"category": "transport", "total_amount": 55.0, "count": 4}
        ]);
        let summaries = summaries_from_result(&result).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].count, 7);
        assert!((summaries[1].total_amount - 55.0).abs() < f64::EPSILON);
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        assert!(expenses_from_result(&json!({"not": "a list"})).is_err());
        assert!(summaries_from_result(&json!("plain text")).is_err());
    }
}
