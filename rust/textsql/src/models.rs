//! Request and response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub sql_query: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub sql_query: Option<String>,
}

/// One result row keyed by column name, in column order.
pub type RowRecord = Map<String, Value>;

/// Successful outcome of running a statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExecutionOutcome {
    Rows(RowSet),
    Affected(AffectedRows),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowSet {
    pub success: bool,
    pub columns: Vec<String>,
    pub data: Vec<RowRecord>,
    pub row_count: usize,
}

impl RowSet {
    pub fn new(columns: Vec<String>, data: Vec<RowRecord>) -> Self {
        Self {
            success: true,
            row_count: data.len(),
            columns,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffectedRows {
    pub success: bool,
    pub message: String,
    pub affected_rows: u64,
}

impl AffectedRows {
    pub fn new(affected_rows: u64) -> Self {
        Self {
            success: true,
            message: format!("Query executed successfully. {affected_rows} row(s) affected."),
            affected_rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionReport {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: Some("Database connection successful".to_string()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn row_set_serializes_with_success_flag_and_count() {
        let mut row = RowRecord::new();
        row.insert("id".into(), json!(1));
        row.insert("name".into(), json!("Ada"));
        let outcome = ExecutionOutcome::Rows(RowSet::new(
            vec!["id".into(), "name".into()],
            vec![row],
        ));

        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "success": true,
                "columns": ["id", "name"],
                "data": [{"id": 1, "name": "Ada"}],
                "row_count": 1
            })
        );
    }

    #[test]
    fn affected_rows_carry_message() {
        let outcome = ExecutionOutcome::Affected(AffectedRows::new(3));
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "success": true,
                "message": "Query executed successfully. 3 row(s) affected.",
                "affected_rows": 3
            })
        );
    }

    #[test]
    fn row_records_keep_column_order() {
        let mut row = RowRecord::new();
        row.insert("zeta".into(), json!(1));
        row.insert("alpha".into(), json!(2));
        let text = serde_json::to_string(&row).unwrap();
        assert_eq!(text, r#"{"zeta":1,"alpha":2}"#);
    }

    #[test]
    fn connection_report_omits_unused_field() {
        assert_eq!(
            serde_json::to_value(ConnectionReport::failed("boom")).unwrap(),
            json!({"success": false, "error": "boom"})
        );
        assert_eq!(
            serde_json::to_value(ConnectionReport::ok()).unwrap(),
            json!({"success": true, "message": "Database connection successful"})
        );
    }
}
