//! Append-only log of completed exchanges, kept per tab and exported
//! with `.aitxt` files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::ActionKind;

/// Log entry of one completed exchange with the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "assistant", rename_all = "camelCase")]
pub struct HistoryRecord {
    pub user_message: String,
    pub editor_snapshot: String,
    pub assistant_response: String,
    /// `regenerate`, `append`, or `none`
    #[serde(default = "none_taken")]
    pub action_taken: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

fn none_taken() -> String {
    "none".to_string()
}

impl HistoryRecord {
    pub fn new(
        user_message: impl Into<String>,
        editor_snapshot: impl Into<String>,
        assistant_response: impl Into<String>,
        action: Option<ActionKind>,
    ) -> Self {
        Self {
            user_message: user_message.into(),
            editor_snapshot: editor_snapshot.into(),
            assistant_response: assistant_response.into(),
            action_taken: action.map_or_else(none_taken, |k| k.as_str().to_string()),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only, chronological record of a tab's exchanges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog {
    records: Vec<HistoryRecord>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, record: HistoryRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryRecord> {
        self.records.last()
    }
}

impl From<Vec<HistoryRecord>> for HistoryLog {
    fn from(records: Vec<HistoryRecord>) -> Self {
        Self { records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_with_type_tag() {
        let record = HistoryRecord::new("hi", "", "hello", Some(ActionKind::Append));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "assistant");
        assert_eq!(json["userMessage"], "hi");
        assert_eq!(json["actionTaken"], "append");
    }

    #[test]
    fn test_no_action_is_none() {
        let record = HistoryRecord::new("hi", "doc", "hello", None);
        assert_eq!(record.action_taken, "none");
    }

    #[test]
    fn test_log_keeps_order() {
        let mut log = HistoryLog::new();
        log.append(HistoryRecord::new("one", "", "a", None));
        log.append(HistoryRecord::new("two", "", "b", None));
        let users: Vec<&str> = log.records().iter().map(|r| r.user_message.as_str()).collect();
        assert_eq!(users, vec!["one", "two"]);
        assert_eq!(log.last().unwrap().user_message, "two");
    }
}
