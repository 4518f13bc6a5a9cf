use super::actions::{ActionApplier, MailboxClient};
use super::matcher::matches_at;
use super::{detail, RuleError, RuleSet};
use crate::config::ProcessingConfig;
use crate::store::{Store, StoreError};
use chrono::Utc;

pub struct Processor<'a, C: MailboxClient + ?Sized> {
    store: &'a Store,
    applier: ActionApplier<'a, C>,
}

impl<'a, C: MailboxClient + ?Sized> Processor<'a, C> {
    pub fn new(store: &'a Store, client: &'a C, config: &'a ProcessingConfig) -> Self {
        Processor {
            store,
            applier: ActionApplier::new(client, config),
        }
    }

    /// Run every rule-set against every stored record and return the number
    /// of (record, rule-set) matches. With `stop_after_first_match`, a record
    /// stops at the first rule-set that matches it.
    ///
    /// A validation error drops only that rule-set's application. A provider
    /// or store error aborts the run; changes already applied on the provider
    /// are committed locally before the error is returned.
    pub fn process(
        &self,
        rulesets: &[RuleSet],
        stop_after_first_match: bool,
    ) -> Result<usize, RuleError> {
        let now = Utc::now();
        let mut records = self
            .store
            .all_records()
            .map_err(|e| RuleError::External(e.to_string()))?;

        log_info!(
            "[Rules] Evaluating {} rule-set(s) against {} email(s) (stop after first match: {})",
            rulesets.len(),
            records.len(),
            stop_after_first_match
        );

        let mut matched = 0usize;
        let mut dirty = vec![false; records.len()];
        let mut failure = None;

        'records: for (idx, record) in records.iter_mut().enumerate() {
            for (rs_idx, ruleset) in rulesets.iter().enumerate() {
                let is_match = match matches_at(record, ruleset, now) {
                    Ok(m) => m,
                    Err(RuleError::Validation(e)) => {
                        log_warn!(
                            "[Rules] Skipping rule-set {} for email {}: {}",
                            rs_idx + 1,
                            record.id,
                            e
                        );
                        continue;
                    }
                    Err(e) => {
                        failure = Some(e);
                        break 'records;
                    }
                };
                if !is_match {
                    continue;
                }

                match self.applier.apply(record, &ruleset.actions) {
                    Ok(patch) => {
                        if !patch.is_empty() {
                            patch.apply_to(record);
                            dirty[idx] = true;
                        }
                        matched += 1;
                        log_info!(
                            "[Rules] Email {} subject='{}' matched rule-set {}",
                            record.id,
                            record.subject,
                            rs_idx + 1
                        );
                    }
                    Err(RuleError::Validation(e)) => {
                        log_warn!(
                            "[Rules] Discarding actions of rule-set {} for email {}: {}",
                            rs_idx + 1,
                            record.id,
                            e
                        );
                        continue;
                    }
                    Err(e) => {
                        log_error!(
                            "[Rules] Aborting run at email {} (rule-set {}): {}",
                            record.id,
                            rs_idx + 1,
                            e
                        );
                        failure = Some(e);
                        break 'records;
                    }
                }

                if stop_after_first_match {
                    break;
                }
            }
        }

        let changed: Vec<_> = records
            .into_iter()
            .zip(dirty)
            .filter_map(|(record, dirty)| dirty.then_some(record))
            .collect();
        if let Some(ref e) = failure {
            log_error!(
                "[Rules] Run aborted after {} match(es): {}; committing {} email(s) changed so far",
                matched,
                e,
                changed.len()
            );
        }
        if let Err(e) = self.store.put_records(&changed) {
            return Err(commit_failure(failure, &e, changed.len()));
        }

        if let Some(e) = failure {
            return Err(e);
        }

        log_info!(
            "[Rules] Run complete: {} match(es), {} email(s) updated",
            matched,
            changed.len()
        );
        Ok(matched)
    }
}

/// Error for a failed commit, keeping the provider error that stopped the
/// run (if any) ahead of the store error.
fn commit_failure(aborted_by: Option<RuleError>, err: &StoreError, pending: usize) -> RuleError {
    let commit = format!("failed to commit {} changed email(s): {}", pending, err);
    match aborted_by {
        Some(cause) => RuleError::External(format!("{}; {}", detail(cause), commit)),
        None => RuleError::External(commit),
    }
}
