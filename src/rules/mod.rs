pub mod actions;
pub mod matcher;
pub mod processor;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum RuleError {
    /// Malformed rule document or a rule that cannot be validated at load.
    Config(String),
    /// Unrecognized predicate, field or action met while evaluating.
    Validation(String),
    /// The mailbox provider or the record store failed.
    External(String),
}

impl std::fmt::Display for RuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleError::Config(e) => write!(f, "rule configuration error: {}", e),
            RuleError::Validation(e) => write!(f, "rule validation error: {}", e),
            RuleError::External(e) => write!(f, "external service error: {}", e),
        }
    }
}

// --- Rule document types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Combinator {
    #[default]
    All,
    Any,
}

impl<'de> Deserialize<'de> for Combinator {
    /// Anything other than "Any" (including null) means `All`.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(match raw {
            Some(Value::String(s)) if s.eq_ignore_ascii_case("any") => Combinator::Any,
            _ => Combinator::All,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(serde_json::Number),
    Text(String),
}

impl ConditionValue {
    pub fn as_text(&self) -> String {
        match self {
            ConditionValue::Number(n) => n.to_string(),
            ConditionValue::Text(s) => s.clone(),
        }
    }

    /// Integer amount for date predicates; numeric strings are accepted.
    pub fn as_amount(&self) -> Option<i64> {
        match self {
            ConditionValue::Number(n) => n.as_i64(),
            ConditionValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionValue::Number(n) => write!(f, "{}", n),
            ConditionValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: String,
    pub predicate: String,
    pub value: ConditionValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDef {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub predicate: Combinator,
    #[serde(default)]
    pub rules: Vec<RuleCondition>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

// --- Resolved vocabulary ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    From,
    To,
    Subject,
    Message,
    Received,
}

impl Field {
    pub fn from_name(name: &str) -> Result<Field, RuleError> {
        match name.to_lowercase().as_str() {
            "from" => Ok(Field::From),
            "to" => Ok(Field::To),
            "subject" => Ok(Field::Subject),
            "message" => Ok(Field::Message),
            "received" => Ok(Field::Received),
            _ => Err(RuleError::Validation(format!("unsupported field '{}'", name))),
        }
    }
}

/// Comparisons on the lowercased text of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextPredicate {
    Contains,
    DoesNotContain,
    Equals,
    DoesNotEqual,
}

/// Age comparisons on the received timestamp, in whole days or calendar
/// months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePredicate {
    LessThanDays,
    GreaterThanDays,
    LessThanMonths,
    GreaterThanMonths,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Text(TextPredicate),
    Date(DatePredicate),
}

impl Predicate {
    /// Predicate names are matched exactly.
    pub fn from_name(name: &str) -> Result<Predicate, RuleError> {
        match name {
            "Contains" => Ok(Predicate::Text(TextPredicate::Contains)),
            "DoesNotContain" => Ok(Predicate::Text(TextPredicate::DoesNotContain)),
            "Equals" => Ok(Predicate::Text(TextPredicate::Equals)),
            "DoesNotEqual" => Ok(Predicate::Text(TextPredicate::DoesNotEqual)),
            "LessThanDays" => Ok(Predicate::Date(DatePredicate::LessThanDays)),
            "GreaterThanDays" => Ok(Predicate::Date(DatePredicate::GreaterThanDays)),
            "LessThanMonths" => Ok(Predicate::Date(DatePredicate::LessThanMonths)),
            "GreaterThanMonths" => Ok(Predicate::Date(DatePredicate::GreaterThanMonths)),
            _ => Err(RuleError::Validation(format!(
                "unknown predicate '{}'",
                name
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    MarkAsRead,
    MarkAsUnread,
    MoveMessage { label: Option<String> },
}

impl Action {
    pub fn from_def(def: &ActionDef) -> Result<Action, RuleError> {
        match def.action_type.as_str() {
            "mark_as_read" => Ok(Action::MarkAsRead),
            "mark_as_unread" => Ok(Action::MarkAsUnread),
            "move_message" => Ok(Action::MoveMessage {
                label: def.label.clone().filter(|l| !l.trim().is_empty()),
            }),
            other => Err(RuleError::Validation(format!(
                "unknown action type '{}'",
                other
            ))),
        }
    }
}

// --- Loading ---

pub fn load_rules(path: &Path) -> Result<Vec<RuleSet>, RuleError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RuleError::Config(format!(
            "failed to read rules file {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_rules(&content)
}

/// Parse a rule document (one rule-set object or an array of them) and
/// validate every field, predicate, date amount and action type.
pub fn parse_rules(content: &str) -> Result<Vec<RuleSet>, RuleError> {
    let document: Value = serde_json::from_str(content)
        .map_err(|e| RuleError::Config(format!("failed to parse rules JSON: {}", e)))?;

    let rulesets = match document {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| {
                serde_json::from_value::<RuleSet>(item)
                    .map_err(|e| RuleError::Config(format!("rule-set {}: {}", idx + 1, e)))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Value::Object(_) => vec![serde_json::from_value::<RuleSet>(document)
            .map_err(|e| RuleError::Config(format!("rule-set 1: {}", e)))?],
        _ => {
            return Err(RuleError::Config(
                "rules document must be an object or an array of objects".to_string(),
            ))
        }
    };

    for (idx, ruleset) in rulesets.iter().enumerate() {
        validate_ruleset(ruleset)
            .map_err(|e| RuleError::Config(format!("rule-set {}: {}", idx + 1, detail(e))))?;
    }

    Ok(rulesets)
}

fn detail(err: RuleError) -> String {
    match err {
        RuleError::Config(e) | RuleError::Validation(e) | RuleError::External(e) => e,
    }
}

pub fn validate_ruleset(ruleset: &RuleSet) -> Result<(), RuleError> {
    for (idx, condition) in ruleset.rules.iter().enumerate() {
        let wrap = |e: RuleError| RuleError::Validation(format!("rule {}: {}", idx + 1, detail(e)));
        Field::from_name(&condition.field).map_err(wrap)?;
        let predicate = Predicate::from_name(&condition.predicate).map_err(wrap)?;
        if let Predicate::Date(_) = predicate {
            match condition.value.as_amount() {
                Some(n) if n >= 0 => {}
                _ => {
                    return Err(RuleError::Validation(format!(
                        "rule {}: {} needs a non-negative whole number, got {}",
                        idx + 1,
                        condition.predicate,
                        condition.value
                    )))
                }
            }
        }
    }
    for (idx, def) in ruleset.actions.iter().enumerate() {
        Action::from_def(def)
            .map_err(|e| RuleError::Validation(format!("action {}: {}", idx + 1, detail(e))))?;
    }
    Ok(())
}

// --- Display ---

pub fn format_rules_for_display(rulesets: &[RuleSet]) -> String {
    if rulesets.is_empty() {
        return "No rule-sets defined.\n".to_string();
    }

    let mut out = String::new();
    for (idx, ruleset) in rulesets.iter().enumerate() {
        out.push_str(&format!(
            "Rule-set {} ({}):\n",
            idx + 1,
            match ruleset.predicate {
                Combinator::All => "all conditions",
                Combinator::Any => "any condition",
            }
        ));
        if ruleset.rules.is_empty() {
            out.push_str("  Match: (no conditions)\n");
        }
        for condition in &ruleset.rules {
            out.push_str(&format!(
                "  Match: {} {} {}\n",
                condition.field, condition.predicate, condition.value
            ));
        }
        out.push_str(&format!(
            "  Actions: {}\n",
            format_actions_for_display(&ruleset.actions)
        ));
    }
    out
}

fn format_actions_for_display(actions: &[ActionDef]) -> String {
    if actions.is_empty() {
        return "(none)".to_string();
    }
    actions
        .iter()
        .map(|a| match a.label {
            Some(ref label) => format!("{}={}", a.action_type, label),
            None => a.action_type.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
