use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Label id the provider uses to mark a message unread.
pub const UNREAD_LABEL: &str = "UNREAD";
/// Label id (and name) of the inbox.
pub const INBOX_LABEL: &str = "INBOX";

/// Locally stored copy of one provider message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: String,
    pub thread_id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub snippet: String,
    #[serde(default)]
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    #[serde(default)]
    pub label_ids: BTreeSet<String>,
}

impl EmailRecord {
    /// Text used for the `message` rule field: the plain-text body, or the
    /// preview snippet when the message has no plain-text part.
    pub fn message_text(&self) -> &str {
        if self.body.is_empty() {
            &self.snippet
        } else {
            &self.body
        }
    }
}

/// Partial update produced by the action applier and written back by the
/// batch processor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub is_read: Option<bool>,
    pub label_ids: Option<BTreeSet<String>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.is_read.is_none() && self.label_ids.is_none()
    }

    pub fn apply_to(&self, record: &mut EmailRecord) {
        if let Some(is_read) = self.is_read {
            record.is_read = is_read;
        }
        if let Some(ref label_ids) = self.label_ids {
            record.label_ids = label_ids.clone();
        }
    }
}

#[cfg(test)]
pub(crate) fn test_record(id: &str) -> EmailRecord {
    EmailRecord {
        id: id.to_string(),
        thread_id: format!("t-{}", id),
        from: "Alice <alice@example.com>".to_string(),
        to: "me@example.com".to_string(),
        subject: "Hello world".to_string(),
        snippet: "Quick preview".to_string(),
        body: String::new(),
        received_at: Utc::now() - chrono::Duration::days(1),
        is_read: false,
        label_ids: [INBOX_LABEL, UNREAD_LABEL]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}
