//! OpenAI-compatible chat-completions oracle over HTTP.
//!
//! # Responsibility
//! - Render prompts for each oracle kind.
//! - Map transport, status and body-read failures (timeouts included) to
//!   `Unavailable`; a body that arrives but is not the expected JSON is
//!   `Format`.
//!
//! # Invariants
//! - Log content is sent to the configured endpoint only, never logged.

use crate::config::OracleConfig;
use crate::oracle::{
    Oracle, OracleError, OracleKind, OraclePayload, OracleResult, UnconfiguredOracle,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use std::time::Instant;

const DIARY_SYSTEM_PROMPT: &str = "You are a thoughtful diary writer. \
You either CREATE a new diary entry for a date from the provided logs, or UPDATE \
an existing entry by weaving newly provided logs into it.

When creating: turn chaotic, possibly misspelled notes into one coherent entry, \
keep chronological order where possible, focus on experiences, emotions and \
insights, and write in the first person with a reflective tone.

When updating: read the existing entry carefully, place each new log where it \
fits chronologically, keep the existing tone and style, preserve important \
details from both the entry and the new logs, and return the whole updated \
entry as one cohesive text.

Return only the diary text.";

const TASK_SYSTEM_PROMPT: &str = "You identify tasks, to-dos and action items \
mentioned directly or indirectly in the provided logs.

Look for direct mentions (\"need to\", \"should\", \"must\", \"remember to\", \
\"have to\"), indirect ones (\"running low on\" implies restocking, \"forgot to\" \
implies doing it later), action verbs (buy, call, finish, schedule, book) and \
deadlines.

For each task give a clear actionable description, a priority of High \
(urgent/important), Medium (important) or Low (nice to have), and the id of the \
log it came from.

Return ONLY a JSON array shaped exactly like:
[{\"description\": \"task description\", \"priority\": \"High|Medium|Low\", \"sourceLogId\": 1}]
Return [] when there are no tasks. No other text.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Sampling settings per oracle kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Sampling {
    pub fn for_kind(kind: OracleKind) -> Self {
        match kind {
            OracleKind::DiaryCreate | OracleKind::DiaryUpdate => Self {
                max_tokens: 1500,
                temperature: 0.7,
            },
            OracleKind::TaskExtract => Self {
                max_tokens: 1000,
                temperature: 0.3,
            },
        }
    }
}

/// Configuration summary reported by the `status` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleStatus {
    pub configured: bool,
    pub endpoint: String,
    pub model: String,
}

/// Reports whether an oracle is configured; the key itself is never exposed.
pub fn oracle_status(config: &OracleConfig) -> OracleStatus {
    OracleStatus {
        configured: config.is_configured(),
        endpoint: config.endpoint.clone(),
        model: config.model.clone(),
    }
}

/// Builds the HTTP oracle, or [`UnconfiguredOracle`] when no key is set.
pub fn build_oracle(config: &OracleConfig) -> Arc<dyn Oracle> {
    match ChatCompletionsOracle::from_config(config) {
        Ok(oracle) => Arc::new(oracle),
        Err(_) => {
            warn!("event=oracle_config module=oracle status=unconfigured");
            Arc::new(UnconfiguredOracle)
        }
    }
}

/// HTTP oracle speaking the `/chat/completions` protocol.
pub struct ChatCompletionsOracle {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatCompletionsOracle {
    /// Builds an oracle from config.
    ///
    /// # Errors
    /// - `OracleError::NotConfigured` when no API key is present.
    pub fn from_config(config: &OracleConfig) -> OracleResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(OracleError::NotConfigured)?;

        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self {
            agent,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: api_key.to_string(),
        })
    }
}

impl Oracle for ChatCompletionsOracle {
    fn invoke(&self, kind: OracleKind, payload: &OraclePayload) -> OracleResult<String> {
        let started_at = Instant::now();
        let user_prompt = render_user_prompt(kind, payload);
        let sampling = Sampling::for_kind(kind);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt(kind),
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            max_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
        };

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(&request);

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                warn!(
                    "event=oracle_invoke module=oracle status=error kind={} http_status={} duration_ms={}",
                    kind.as_str(),
                    code,
                    started_at.elapsed().as_millis()
                );
                return Err(OracleError::Unavailable(format!("HTTP status {code}")));
            }
            Err(ureq::Error::Transport(transport)) => {
                warn!(
                    "event=oracle_invoke module=oracle status=error kind={} error_code=transport duration_ms={}",
                    kind.as_str(),
                    started_at.elapsed().as_millis()
                );
                return Err(OracleError::Unavailable(transport.to_string()));
            }
        };

        let body: ChatResponse = response.into_json().map_err(|err| {
            let mapped = body_read_error(err);
            if let OracleError::Unavailable(_) = mapped {
                warn!(
                    "event=oracle_invoke module=oracle status=error kind={} error_code=body_read duration_ms={}",
                    kind.as_str(),
                    started_at.elapsed().as_millis()
                );
            }
            mapped
        })?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| OracleError::Format("response has no message content".to_string()))?;

        info!(
            "event=oracle_invoke module=oracle status=ok kind={} logs={} duration_ms={}",
            kind.as_str(),
            payload.logs.len(),
            started_at.elapsed().as_millis()
        );
        Ok(content)
    }
}

fn system_prompt(kind: OracleKind) -> &'static str {
    match kind {
        OracleKind::DiaryCreate | OracleKind::DiaryUpdate => DIARY_SYSTEM_PROMPT,
        OracleKind::TaskExtract => TASK_SYSTEM_PROMPT,
    }
}

/// Renders the user message for one call.
pub fn render_user_prompt(kind: OracleKind, payload: &OraclePayload) -> String {
    let logs_text = payload
        .logs
        .iter()
        .map(|log| format!("Log {}: {}", log.id, log.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    let date = payload.date.format("%Y-%m-%d");

    match kind {
        OracleKind::DiaryCreate => format!(
            "LOGS for {date}:\n{logs_text}\n\nPlease create a cohesive diary entry from these logs."
        ),
        OracleKind::DiaryUpdate => format!(
            "EXISTING DIARY ENTRY for {date}:\n{}\n\nNEW LOGS to incorporate:\n{logs_text}\n\n\
             Please update the existing diary entry by seamlessly incorporating the new logs \
             while maintaining narrative flow.",
            payload.existing_diary.as_deref().unwrap_or_default()
        ),
        OracleKind::TaskExtract => format!("Analyze these logs and extract tasks:\n\n{logs_text}"),
    }
}

/// Classifies a failure while reading the response body.
///
/// ureq reports JSON decoding problems as `InvalidData`; every other kind is
/// the connection failing mid-body.
fn body_read_error(err: io::Error) -> OracleError {
    match err.kind() {
        io::ErrorKind::InvalidData => {
            OracleError::Format(format!("unreadable response body: {err}"))
        }
        _ => OracleError::Unavailable(format!("response body interrupted: {err}")),
    }
}
