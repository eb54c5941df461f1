//! Translate the published workspace snapshot and a fresh session walk
//! into the `openclaw_*` metric families.

use crate::metrics::{Exposition, LatencyHistogram, MetricKind};
use crate::sessions::{SessionFacts, SessionsReport};
use crate::store::Published;

/// Label used for the session scrape flag when no agent could be listed.
const UNKNOWN_AGENT: &str = "unknown";

fn bool_value(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// The `openclaw_response_duration_seconds` histogram shared by the scan
/// loop and the scrape handler.
pub fn response_latency() -> LatencyHistogram {
    LatencyHistogram::new(
        "openclaw_response_duration_seconds",
        "Response latency in seconds",
    )
}

/// Render one complete scrape.
pub fn render(published: &Published, sessions: &SessionsReport, latency: &LatencyHistogram) -> String {
    let mut out = Exposition::new();
    render_workspace(&mut out, published);
    render_sessions(&mut out, sessions);
    latency.render(&mut out);
    out.finish()
}

fn render_workspace(out: &mut Exposition, published: &Published) {
    let snapshot = &published.snapshot;

    out.family(
        "openclaw_file_size_bytes",
        "Size of openclaw files in bytes",
        MetricKind::Gauge,
    );
    for fact in &snapshot.file_facts {
        out.sample(
            "openclaw_file_size_bytes",
            &[("file", fact.name.as_str())],
            fact.size_bytes as f64,
        );
    }

    out.family(
        "openclaw_file_mtime_seconds",
        "Last modification time of openclaw files in seconds since epoch",
        MetricKind::Gauge,
    );
    for fact in &snapshot.file_facts {
        out.sample(
            "openclaw_file_mtime_seconds",
            &[("file", fact.name.as_str())],
            fact.mtime_unix as f64,
        );
    }

    out.family(
        "openclaw_workspace_file_exists",
        "Whether workspace files exist (AGENTS.md, SOUL.md, TOOLS.md, IDENTITY.md, USER.md, HEARTBEAT.md, BOOTSTRAP.md, MEMORY.md)",
        MetricKind::Gauge,
    );
    for file in &snapshot.workspace_files {
        out.sample(
            "openclaw_workspace_file_exists",
            &[("file", file.name.as_str())],
            bool_value(file.exists),
        );
    }

    out.single(
        "openclaw_context_length_total",
        "Total size of context files in bytes (includes conversation history, tool results, and attachments)",
        MetricKind::Gauge,
        snapshot.context_length_bytes as f64,
    );
    out.single(
        "openclaw_skills_total",
        "Total number of skills in workspace and managed directories",
        MetricKind::Gauge,
        snapshot.skills_count as f64,
    );
    out.single(
        "openclaw_agents_total",
        "Total number of agents (counts agent definitions in agent.md, falling back to AGENTS.md)",
        MetricKind::Gauge,
        snapshot.agents_count as f64,
    );
    out.single(
        "openclaw_memory_files_total",
        "Total number of daily memory files in memory/ directory",
        MetricKind::Gauge,
        snapshot.memory_file_count as f64,
    );
    out.single(
        "openclaw_scrape_success",
        "Whether the last scrape was successful",
        MetricKind::Gauge,
        bool_value(snapshot.scrape_success),
    );
    out.single(
        "openclaw_scan_duration_seconds",
        "Duration of the last background scan in seconds",
        MetricKind::Gauge,
        published.last_duration.as_secs_f64(),
    );
    out.single(
        "openclaw_scan_errors_total",
        "Total number of background scan errors",
        MetricKind::Counter,
        published.scan_errors_total as f64,
    );
}

/// A per-session family: header, then one sample per session that has it.
struct SessionFamily {
    name: &'static str,
    help: &'static str,
    value: fn(&SessionFacts) -> Option<f64>,
}

const SESSION_FAMILIES: &[SessionFamily] = &[
    SessionFamily {
        name: "openclaw_session_active",
        help: "Number of active sessions",
        value: |_| Some(1.0),
    },
    SessionFamily {
        name: "openclaw_session_updated_timestamp",
        help: "Last update timestamp of session",
        value: |s| Some(s.updated_at_secs as f64),
    },
    SessionFamily {
        name: "openclaw_session_compactions",
        help: "Number of context compactions recorded for session",
        value: |s| Some(s.compaction_count as f64),
    },
    SessionFamily {
        name: "openclaw_session_messages_total",
        help: "Total number of messages in current session",
        value: |s| s.state.as_ref().map(|st| st.message_count as f64),
    },
    SessionFamily {
        name: "openclaw_session_tokens_input_total",
        help: "Total input tokens used in session",
        value: |s| s.state.as_ref().map(|st| st.input_tokens as f64),
    },
    SessionFamily {
        name: "openclaw_session_tokens_output_total",
        help: "Total output tokens used in session",
        value: |s| s.state.as_ref().map(|st| st.output_tokens as f64),
    },
    SessionFamily {
        name: "openclaw_session_tokens_cache_read_total",
        help: "Total cache read tokens in session",
        value: |s| s.state.as_ref().map(|st| st.cache_read_tokens as f64),
    },
    SessionFamily {
        name: "openclaw_session_tokens_total",
        help: "Total tokens used in session (input + output + cache)",
        value: |s| s.state.as_ref().map(|st| st.total_tokens() as f64),
    },
    SessionFamily {
        name: "openclaw_session_cost_total",
        help: "Total cost in USD for session",
        value: |s| s.state.as_ref().map(|st| st.total_cost),
    },
    SessionFamily {
        name: "openclaw_thinking_level",
        help: "Current thinking level (0=off, 1=low, 2=medium, 3=high)",
        value: |s| s.state.as_ref().map(|st| st.thinking_level.ordinal() as f64),
    },
];

fn render_sessions(out: &mut Exposition, report: &SessionsReport) {
    for family in SESSION_FAMILIES {
        out.family(family.name, family.help, MetricKind::Gauge);
        for agent in &report.agents {
            for session in &agent.sessions {
                if let Some(value) = (family.value)(session) {
                    out.sample(
                        family.name,
                        &[("agent", agent.agent.as_str()), ("session_id", session.session_id.as_str())],
                        value,
                    );
                }
            }
        }
    }

    out.family(
        "openclaw_model_info",
        "Current model information",
        MetricKind::Gauge,
    );
    for agent in &report.agents {
        for session in &agent.sessions {
            let Some(state) = &session.state else { continue };
            let Some(model) = &state.model else { continue };
            out.sample(
                "openclaw_model_info",
                &[
                    ("agent", agent.agent.as_str()),
                    ("session_id", session.session_id.as_str()),
                    ("provider", state.provider.as_deref().unwrap_or("")),
                    ("model", model.as_str()),
                ],
                1.0,
            );
        }
    }

    out.family(
        "openclaw_session_scrape_success",
        "Whether session scrape was successful",
        MetricKind::Gauge,
    );
    if !report.agents_dir_ok {
        out.sample(
            "openclaw_session_scrape_success",
            &[("agent", UNKNOWN_AGENT)],
            0.0,
        );
    }
    for agent in &report.agents {
        out.sample(
            "openclaw_session_scrape_success",
            &[("agent", agent.agent.as_str())],
            bool_value(agent.success),
        );
    }
}
