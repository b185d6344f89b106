//! Strict parsing of oracle output.
//!
//! Diary kinds produce free text; task extraction must produce a JSON array of
//! `{description, priority, sourceLogId}` records. Models often wrap JSON in a
//! markdown fence, which is stripped before parsing.

use crate::model::LogId;
use crate::oracle::{OracleError, OracleResult};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static CODE_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*\n?(.*?)\n?\s*```$").expect("valid fence regex")
});
static LOG_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i:log)?\s*#?\s*(\d+)$").expect("valid log ref regex"));

/// Task candidate returned by the oracle, before dedup and validation
/// against the analyzed log set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCandidate {
    pub description: String,
    /// Raw priority label; `None` when absent or not a string.
    pub priority: Option<String>,
    pub source_log_id: Option<LogId>,
}

/// Validates free-text diary output.
pub fn parse_diary_text(raw: &str) -> OracleResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(OracleError::Format("empty diary text".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Parses task-extraction output into candidates.
///
/// # Errors
/// - `OracleError::Format` when the output is not a JSON array.
///
/// Array items that are not objects or carry no usable description are
/// dropped with a warning; the rest of the array is kept.
pub fn parse_task_candidates(raw: &str) -> OracleResult<Vec<TaskCandidate>> {
    let body = strip_code_fence(raw.trim());
    let value: Value = serde_json::from_str(body)
        .map_err(|err| OracleError::Format(format!("task output is not JSON: {err}")))?;
    let Value::Array(items) = value else {
        return Err(OracleError::Format(
            "task output must be a JSON array".to_string(),
        ));
    };

    let mut candidates = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match candidate_from_value(&item) {
            Some(candidate) => candidates.push(candidate),
            None => warn!(
                "event=oracle_parse module=oracle status=skipped kind=task-extract index={}",
                index
            ),
        }
    }
    Ok(candidates)
}

fn strip_code_fence(body: &str) -> &str {
    CODE_FENCE_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map_or(body, |m| m.as_str().trim())
}

fn candidate_from_value(item: &Value) -> Option<TaskCandidate> {
    let object = item.as_object()?;
    let description = object.get("description")?.as_str()?.trim();
    if description.is_empty() {
        return None;
    }

    Some(TaskCandidate {
        description: description.to_string(),
        priority: object
            .get("priority")
            .and_then(Value::as_str)
            .map(str::to_string),
        source_log_id: object.get("sourceLogId").and_then(parse_log_ref),
    })
}

/// Reads a log reference given as `7`, `"7"`, `"Log7"` or `"log #7"`.
pub(crate) fn parse_log_ref(value: &Value) -> Option<LogId> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => LOG_REF_RE
            .captures(text.trim())
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok()),
        _ => None,
    }
}
