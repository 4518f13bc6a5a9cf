use super::{Action, ActionDef, RuleError};
use crate::config::ProcessingConfig;
use crate::record::{EmailRecord, RecordPatch, INBOX_LABEL, UNREAD_LABEL};
use std::collections::{BTreeSet, HashMap};

/// Label operations the rule engine needs from the mailbox provider.
pub trait MailboxClient {
    /// Label name to label id for the whole account.
    fn label_map(&self) -> Result<HashMap<String, String>, String>;
    /// Id of the label called `name`, creating it if it does not exist.
    fn ensure_label(&self, name: &str) -> Result<String, String>;
    /// Add and remove label ids on one message in a single call.
    fn modify_labels(&self, message_id: &str, add: &[String], remove: &[String])
        -> Result<(), String>;
}

/// Pending label changes for one rule-set application. The latest request
/// for a label id wins: adding an id cancels an earlier removal of the same
/// id and vice versa, so `add` and `remove` never overlap.
#[derive(Debug, Default)]
struct LabelDelta {
    add: Vec<String>,
    remove: Vec<String>,
}

impl LabelDelta {
    fn add(&mut self, id: &str) {
        self.remove.retain(|r| r != id);
        if !self.add.iter().any(|a| a == id) {
            self.add.push(id.to_string());
        }
    }

    fn remove(&mut self, id: &str) {
        self.add.retain(|a| a != id);
        if !self.remove.iter().any(|r| r == id) {
            self.remove.push(id.to_string());
        }
    }

    fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    fn applied_to(&self, current: &BTreeSet<String>) -> BTreeSet<String> {
        let mut labels = current.clone();
        labels.extend(self.add.iter().cloned());
        for id in &self.remove {
            labels.remove(id);
        }
        labels
    }
}

pub struct ActionApplier<'a, C: MailboxClient + ?Sized> {
    client: &'a C,
    config: &'a ProcessingConfig,
}

impl<'a, C: MailboxClient + ?Sized> ActionApplier<'a, C> {
    pub fn new(client: &'a C, config: &'a ProcessingConfig) -> Self {
        ActionApplier { client, config }
    }

    /// Apply a rule-set's actions to one message. Issues at most one label
    /// mutation on the provider and returns the local changes for the caller
    /// to persist.
    pub fn apply(&self, record: &EmailRecord, defs: &[ActionDef]) -> Result<RecordPatch, RuleError> {
        // Validate the whole list before touching the provider.
        let actions = defs
            .iter()
            .map(Action::from_def)
            .collect::<Result<Vec<_>, _>>()?;

        let mut patch = RecordPatch::default();
        if actions.is_empty() {
            return Ok(patch);
        }

        let labels = self
            .client
            .label_map()
            .map_err(|e| RuleError::External(format!("failed to list labels: {}", e)))?;
        let mut delta = LabelDelta::default();

        for action in &actions {
            match action {
                Action::MarkAsRead => {
                    match labels.get(UNREAD_LABEL) {
                        Some(id) => delta.remove(id),
                        None => log_debug!("[Rules] No {} label; mark_as_read only updates the local flag", UNREAD_LABEL),
                    }
                    patch.is_read = Some(true);
                }
                Action::MarkAsUnread => {
                    match labels.get(UNREAD_LABEL) {
                        Some(id) => delta.add(id),
                        None => log_warn!("[Rules] No {} label; cannot mark email {} unread on the server", UNREAD_LABEL, record.id),
                    }
                    patch.is_read = Some(false);
                }
                Action::MoveMessage { label } => {
                    let target = label
                        .as_deref()
                        .unwrap_or(self.config.default_move_label.as_str());
                    let target_id = match labels.get(target) {
                        Some(id) => id.clone(),
                        None => self.client.ensure_label(target).map_err(|e| {
                            RuleError::External(format!(
                                "failed to create label '{}': {}",
                                target, e
                            ))
                        })?,
                    };
                    delta.add(&target_id);
                    if let Some(inbox_id) = labels.get(INBOX_LABEL) {
                        if *inbox_id != target_id {
                            delta.remove(inbox_id);
                        }
                    }
                }
            }
        }

        if !delta.is_empty() {
            self.client
                .modify_labels(&record.id, &delta.add, &delta.remove)
                .map_err(|e| {
                    RuleError::External(format!(
                        "failed to modify labels on email {}: {}",
                        record.id, e
                    ))
                })?;
            patch.label_ids = Some(delta.applied_to(&record.label_ids));
        }

        Ok(patch)
    }
}
