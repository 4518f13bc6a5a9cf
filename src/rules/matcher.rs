use super::{
    Combinator, DatePredicate, Field, Predicate, RuleCondition, RuleError, RuleSet, TextPredicate,
};
use crate::record::EmailRecord;
use chrono::{DateTime, Months, SecondsFormat, Utc};

const SECONDS_PER_DAY: i64 = 86_400;

enum FieldValue<'a> {
    Text(&'a str),
    Timestamp(DateTime<Utc>),
}

fn resolve_field(field: Field, record: &EmailRecord) -> FieldValue<'_> {
    match field {
        Field::From => FieldValue::Text(&record.from),
        Field::To => FieldValue::Text(&record.to),
        Field::Subject => FieldValue::Text(&record.subject),
        Field::Message => FieldValue::Text(record.message_text()),
        Field::Received => FieldValue::Timestamp(record.received_at),
    }
}

/// Evaluate a rule-set against one record at `now`. Every condition is
/// evaluated before combining, so an invalid condition is reported no matter
/// where it sits in the list. The batch processor passes one clock for the
/// whole run.
pub fn matches_at(
    record: &EmailRecord,
    ruleset: &RuleSet,
    now: DateTime<Utc>,
) -> Result<bool, RuleError> {
    let results = ruleset
        .rules
        .iter()
        .map(|condition| evaluate_condition(condition, record, now))
        .collect::<Result<Vec<bool>, _>>()?;

    Ok(match ruleset.predicate {
        Combinator::All => results.iter().all(|&r| r),
        Combinator::Any => results.iter().any(|&r| r),
    })
}

pub fn evaluate_condition(
    condition: &RuleCondition,
    record: &EmailRecord,
    now: DateTime<Utc>,
) -> Result<bool, RuleError> {
    let field = Field::from_name(&condition.field)?;
    let value = resolve_field(field, record);

    match Predicate::from_name(&condition.predicate)? {
        Predicate::Date(predicate) => {
            let amount = match condition.value.as_amount() {
                Some(n) if n >= 0 => n,
                _ => {
                    return Err(RuleError::Validation(format!(
                        "{} needs a non-negative whole number, got {}",
                        condition.predicate, condition.value
                    )))
                }
            };
            Ok(match value {
                FieldValue::Timestamp(received) => match_date(received, predicate, amount, now),
                FieldValue::Text(_) => false,
            })
        }
        Predicate::Text(predicate) => {
            let text = match value {
                FieldValue::Text(text) => text.to_string(),
                FieldValue::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            };
            Ok(match_string(&text, predicate, &condition.value.as_text()))
        }
    }
}

fn match_string(value: &str, predicate: TextPredicate, target: &str) -> bool {
    let value = value.to_lowercase();
    let target = target.to_lowercase();
    match predicate {
        TextPredicate::Contains => value.contains(&target),
        TextPredicate::DoesNotContain => !value.contains(&target),
        TextPredicate::Equals => value == target,
        TextPredicate::DoesNotEqual => value != target,
    }
}

fn match_date(
    received: DateTime<Utc>,
    predicate: DatePredicate,
    amount: i64,
    now: DateTime<Utc>,
) -> bool {
    match predicate {
        DatePredicate::LessThanDays => elapsed_days(received, now) < amount,
        DatePredicate::GreaterThanDays => elapsed_days(received, now) > amount,
        // A cutoff before the earliest representable date: everything is newer.
        DatePredicate::LessThanMonths => match months_before(now, amount) {
            Some(cutoff) => received > cutoff,
            None => true,
        },
        DatePredicate::GreaterThanMonths => match months_before(now, amount) {
            Some(cutoff) => received < cutoff,
            None => false,
        },
    }
}

/// Whole days from `received` to `now`, floored, so a message dated a few
/// hours in the future is -1 days old rather than 0.
fn elapsed_days(received: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - received).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// `now` shifted back by whole calendar months; the day is clamped to the
/// end of shorter months (Mar 31 minus 1 month is Feb 28/29). `None` when
/// the result falls outside chrono's range.
fn months_before(now: DateTime<Utc>, amount: i64) -> Option<DateTime<Utc>> {
    u32::try_from(amount)
        .ok()
        .and_then(|months| now.checked_sub_months(Months::new(months)))
}
