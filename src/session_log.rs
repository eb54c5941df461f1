/// JSONL session log replay: fold an OpenClaw session event stream into
/// token, cost, model and thinking-level totals.
use serde_json::Value;
use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};

/// Hard upper bound for a single log line. Tool results can be large, so
/// this is well above the 1 MiB lines seen in practice; a longer line
/// fails the file rather than the whole scrape.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Reasoning effort selected for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThinkingLevel {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

impl ThinkingLevel {
    /// Parse a level name as written in `thinking_level_change` events.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "off" => Some(ThinkingLevel::Off),
            "low" => Some(ThinkingLevel::Low),
            "medium" => Some(ThinkingLevel::Medium),
            "high" => Some(ThinkingLevel::High),
            _ => None,
        }
    }

    /// Ordinal exported as the thinking level gauge (0 = off … 3 = high).
    pub fn ordinal(self) -> u8 {
        match self {
            ThinkingLevel::Off => 0,
            ThinkingLevel::Low => 1,
            ThinkingLevel::Medium => 2,
            ThinkingLevel::High => 3,
        }
    }
}

/// Accumulated state of one session, rebuilt from its log on every scrape.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SessionState {
    pub message_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    /// Total cost in USD.
    pub total_cost: f64,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub thinking_level: ThinkingLevel,
    /// Lines that were not valid JSON and were skipped.
    pub skipped_lines: u64,
}

impl SessionState {
    /// Input + output + cache reads, each counted once. Saturates at `u64::MAX`.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_read_tokens)
    }

    /// Apply one decoded event. Unknown event types are ignored.
    pub fn apply(&mut self, event: &Value) {
        match event.get("type").and_then(|t| t.as_str()) {
            Some("message") => self.apply_message(event),
            Some("model_change") => {
                set_if_present(&mut self.model, event.get("modelId"));
                set_if_present(&mut self.provider, event.get("provider"));
            }
            Some("thinking_level_change") => {
                if let Some(level) = event
                    .get("thinkingLevel")
                    .and_then(|l| l.as_str())
                    .and_then(ThinkingLevel::from_name)
                {
                    self.thinking_level = level;
                }
            }
            _ => {}
        }
    }

    fn apply_message(&mut self, event: &Value) {
        self.message_count = self.message_count.saturating_add(1);

        let message = match event.get("message") {
            Some(m) if m.is_object() => m,
            _ => return,
        };

        set_if_present(&mut self.model, message.get("model"));
        set_if_present(&mut self.provider, message.get("provider"));

        let usage = match message.get("usage") {
            Some(u) if u.is_object() => u,
            _ => return,
        };

        self.input_tokens = self.input_tokens.saturating_add(token_count(usage, "input"));
        self.output_tokens = self.output_tokens.saturating_add(token_count(usage, "output"));
        self.cache_read_tokens = self
            .cache_read_tokens
            .saturating_add(token_count(usage, "cacheRead"));
        if let Some(cost) = usage
            .get("cost")
            .and_then(|c| c.get("total"))
            .and_then(|t| t.as_f64())
        {
            self.total_cost += cost;
        }
    }
}

/// Last write wins, but empty strings never clear a known value.
fn set_if_present(slot: &mut Option<String>, value: Option<&Value>) {
    if let Some(s) = value.and_then(|v| v.as_str()).filter(|s| !s.is_empty()) {
        *slot = Some(s.to_string());
    }
}

fn token_count(usage: &Value, field: &str) -> u64 {
    usage.get(field).and_then(|t| t.as_u64()).unwrap_or(0)
}

/// Errors that fail a single session log.
#[derive(Debug)]
pub enum SessionLogError {
    /// Failed to open or read the log.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A line exceeded [`MAX_LINE_BYTES`].
    LineTooLong {
        path: PathBuf,
        line: u64,
        limit: usize,
    },
}

impl SessionLogError {
    /// True when the log simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionLogError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl std::fmt::Display for SessionLogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionLogError::Io { path, source } => {
                write!(f, "failed to read session log {}: {}", path.display(), source)
            }
            SessionLogError::LineTooLong { path, line, limit } => {
                write!(
                    f,
                    "session log {} line {} exceeds {} bytes",
                    path.display(),
                    line,
                    limit
                )
            }
        }
    }
}

impl std::error::Error for SessionLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionLogError::Io { source, .. } => Some(source),
            SessionLogError::LineTooLong { .. } => None,
        }
    }
}

/// Open a session log and replay it.
pub fn parse_session_log(path: &Path) -> Result<SessionState, SessionLogError> {
    let file = std::fs::File::open(path).map_err(|e| SessionLogError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let state = replay(std::io::BufReader::new(file), path, MAX_LINE_BYTES)?;
    if state.skipped_lines > 0 {
        tracing::debug!(
            path = %path.display(),
            skipped = state.skipped_lines,
            "skipped malformed session log lines"
        );
    }
    Ok(state)
}

/// Replay an event stream line by line.
///
/// Empty lines and lines that are not valid JSON are skipped; a line
/// longer than `limit` bytes fails the whole stream.
pub fn replay<R: BufRead>(
    mut reader: R,
    path: &Path,
    limit: usize,
) -> Result<SessionState, SessionLogError> {
    let mut state = SessionState::default();
    let mut buf = Vec::with_capacity(64 * 1024);
    let mut line_no = 0u64;

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(limit as u64 + 1)
            .read_until(b'\n', &mut buf)
            .map_err(|e| SessionLogError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        if read == 0 {
            break;
        }
        line_no += 1;

        if buf.last() == Some(&b'\n') {
            buf.pop();
        } else if buf.len() > limit {
            return Err(SessionLogError::LineTooLong {
                path: path.to_path_buf(),
                line: line_no,
                limit,
            });
        }

        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_slice::<Value>(line) {
            Ok(event) => state.apply(&event),
            Err(_) => state.skipped_lines += 1,
        }
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay_str(input: &str) -> SessionState {
        replay(input.as_bytes(), Path::new("test.jsonl"), MAX_LINE_BYTES).unwrap()
    }

    const MESSAGE: &str = r#"{"type":"message","message":{"usage":{"input":10,"output":5,"cacheRead":0}}}"#;

    #[test]
    fn three_messages_accumulate_usage() {
        let log = format!("{MESSAGE}\n{MESSAGE}\n{MESSAGE}\n");
        let state = replay_str(&log);
        assert_eq!(state.message_count, 3);
        assert_eq!(state.input_tokens, 30);
        assert_eq!(state.output_tokens, 15);
        assert_eq!(state.cache_read_tokens, 0);
        assert_eq!(state.total_tokens(), 45);
    }

    #[test]
    fn huge_usage_values_saturate() {
        let log = concat!(
            r#"{"type":"message","message":{"usage":{"input":18446744073709551615,"output":7}}}"#,
            "\n",
            r#"{"type":"message","message":{"usage":{"input":1,"cacheRead":18446744073709551615}}}"#,
            "\n",
        );
        let state = replay_str(log);
        assert_eq!(state.message_count, 2);
        assert_eq!(state.input_tokens, u64::MAX);
        assert_eq!(state.cache_read_tokens, u64::MAX);
        assert_eq!(state.total_tokens(), u64::MAX);
    }

    #[test]
    fn corrupt_line_is_skipped() {
        let clean = replay_str(&format!("{MESSAGE}\n{MESSAGE}\n"));
        let dirty = replay_str(&format!("{MESSAGE}\n{{\"type\":\"mess\n{MESSAGE}\n"));
        assert_eq!(dirty.total_tokens(), clean.total_tokens());
        assert_eq!(dirty.message_count, clean.message_count);
        assert_eq!(dirty.skipped_lines, 1);
    }

    #[test]
    fn empty_lines_and_missing_trailing_newline() {
        let state = replay_str(&format!("\n\n{MESSAGE}\r\n\n{MESSAGE}"));
        assert_eq!(state.message_count, 2);
        assert_eq!(state.skipped_lines, 0);
    }

    #[test]
    fn cache_reads_and_cost() {
        let log = r#"{"type":"message","message":{"usage":{"input":100,"output":20,"cacheRead":400,"cost":{"total":0.25}}}}
{"type":"message","message":{"usage":{"input":1,"output":2,"cacheRead":3,"cost":{"total":0.5}}}}"#;
        let state = replay_str(log);
        assert_eq!(state.cache_read_tokens, 403);
        assert_eq!(state.total_tokens(), 526);
        assert!((state.total_cost - 0.75).abs() < 1e-9);
    }

    #[test]
    fn message_without_usage_still_counts() {
        let log = r#"{"type":"message","message":{"role":"user"}}
{"type":"message"}"#;
        let state = replay_str(log);
        assert_eq!(state.message_count, 2);
        assert_eq!(state.total_tokens(), 0);
    }

    #[test]
    fn model_and_provider_last_write_wins() {
        let log = r#"{"type":"model_change","provider":"anthropic","modelId":"claude-a"}
{"type":"message","message":{"provider":"openai","model":"gpt-x"}}
{"type":"model_change","modelId":"claude-b"}
{"type":"message","message":{"model":""}}"#;
        let state = replay_str(log);
        assert_eq!(state.model.as_deref(), Some("claude-b"));
        assert_eq!(state.provider.as_deref(), Some("openai"));
    }

    #[test]
    fn no_model_observed() {
        let state = replay_str(MESSAGE);
        assert!(state.model.is_none());
        assert!(state.provider.is_none());
    }

    #[test]
    fn thinking_level_mapping() {
        for (name, ordinal) in [("off", 0), ("low", 1), ("medium", 2), ("high", 3)] {
            let log = format!(r#"{{"type":"thinking_level_change","thinkingLevel":"{name}"}}"#);
            assert_eq!(replay_str(&log).thinking_level.ordinal(), ordinal);
        }
    }

    #[test]
    fn unknown_thinking_level_keeps_previous() {
        let log = r#"{"type":"thinking_level_change","thinkingLevel":"medium"}
{"type":"thinking_level_change","thinkingLevel":"extreme"}
{"type":"thinking_level_change"}"#;
        assert_eq!(replay_str(log).thinking_level, ThinkingLevel::Medium);
        assert_eq!(
            replay_str(r#"{"type":"thinking_level_change","thinkingLevel":"max"}"#).thinking_level,
            ThinkingLevel::Off
        );
    }

    #[test]
    fn other_event_types_ignored() {
        let log = r#"{"type":"session","id":"abc"}
{"type":"compaction","summary":"..."}
[1,2,3]
"just a string""#;
        let state = replay_str(log);
        assert_eq!(state, SessionState::default());
    }

    #[test]
    fn large_line_within_limit() {
        let padding = "x".repeat(2 * 1024 * 1024);
        let log = format!(
            r#"{{"type":"message","message":{{"content":"{padding}","usage":{{"input":7}}}}}}"#
        );
        let state = replay_str(&format!("{log}\n{MESSAGE}\n"));
        assert_eq!(state.message_count, 2);
        assert_eq!(state.input_tokens, 17);
    }

    #[test]
    fn line_over_limit_fails_the_file() {
        let log = format!("{MESSAGE}\n{}\n{MESSAGE}\n", "y".repeat(200));
        let err = replay(log.as_bytes(), Path::new("big.jsonl"), 128).unwrap_err();
        assert!(matches!(err, SessionLogError::LineTooLong { line: 2, .. }));
        assert!(err.to_string().contains("big.jsonl"));
    }

    #[test]
    fn line_exactly_at_limit_is_accepted() {
        let state = replay(
            format!("{MESSAGE}\n").as_bytes(),
            Path::new("edge.jsonl"),
            MESSAGE.len(),
        )
        .unwrap();
        assert_eq!(state.message_count, 1);
    }

    #[test]
    fn parse_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_session_log(&dir.path().join("gone.jsonl")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn parse_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        std::fs::write(&path, format!("{MESSAGE}\nnot json\n")).unwrap();
        let state = parse_session_log(&path).unwrap();
        assert_eq!(state.message_count, 1);
        assert_eq!(state.skipped_lines, 1);
    }
}
