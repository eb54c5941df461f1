//! Session directory walker: enumerate per-agent session registries under
//! the OpenClaw home and replay each live session's log.
//!
//! Nothing here is cached. Every scrape walks the registries again, so the
//! cost of a scrape grows with the size of the live session logs.

use crate::layout::OpenclawHome;
use crate::session_log::{self, SessionState};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Prefix of registry keys that denote live sessions (e.g. `agent:main:main`).
const LIVE_SESSION_PREFIX: &str = "agent:";

/// One entry of an agent's `sessions.json`, keyed by session key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryEntry {
    #[serde(deserialize_with = "null_as_default")]
    pub session_id: String,
    /// Milliseconds since the epoch.
    #[serde(deserialize_with = "null_as_default")]
    pub updated_at: i64,
    pub session_file: Option<PathBuf>,
    #[serde(deserialize_with = "null_as_default")]
    pub compaction_count: u64,
}

/// A JSON `null` decodes as the field's zero value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Facts emitted for one live session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFacts {
    pub session_id: String,
    /// Seconds since the epoch.
    pub updated_at_secs: i64,
    pub compaction_count: u64,
    /// Derived from the session log; `None` when there is no readable log.
    pub state: Option<SessionState>,
}

/// All live sessions of one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSessions {
    pub agent: String,
    pub success: bool,
    pub sessions: Vec<SessionFacts>,
}

/// Result of one walk over the agents directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionsReport {
    /// False when the agents directory itself could not be listed.
    pub agents_dir_ok: bool,
    pub agents: Vec<AgentSessions>,
}

/// Errors reading an agent's session registry.
#[derive(Debug)]
pub enum RegistryError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            RegistryError::Parse { path, source } => {
                write!(f, "failed to parse {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Io { source, .. } => Some(source),
            RegistryError::Parse { source, .. } => Some(source),
        }
    }
}

/// Load an agent registry. Keys come back sorted.
pub fn load_registry(
    path: &std::path::Path,
) -> Result<BTreeMap<String, RegistryEntry>, RegistryError> {
    let data = std::fs::read(path).map_err(|e| RegistryError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&data).map_err(|e| RegistryError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Walk every agent under `home` and collect its live sessions.
///
/// Agents without a registry are skipped silently. An unreadable or
/// malformed registry is logged and the agent reported as failed, without
/// affecting the other agents.
pub fn walk(home: &OpenclawHome) -> SessionsReport {
    let agents_dir = home.agents_dir();
    let entries = match std::fs::read_dir(&agents_dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(
                path = %agents_dir.display(),
                error = %e,
                "failed to read agents directory"
            );
            return SessionsReport::default();
        }
    };

    let mut agent_names: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    agent_names.sort();

    let agents = agent_names
        .into_iter()
        .filter_map(|agent| walk_agent(home, agent))
        .collect();

    SessionsReport {
        agents_dir_ok: true,
        agents,
    }
}

fn walk_agent(home: &OpenclawHome, agent: String) -> Option<AgentSessions> {
    let registry_path = home.session_registry(&agent);
    let registry = match load_registry(&registry_path) {
        Ok(r) => r,
        Err(RegistryError::Io { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            return None;
        }
        Err(e) => {
            tracing::warn!(agent = %agent, error = %e, "skipping agent sessions");
            return Some(AgentSessions {
                agent,
                success: false,
                sessions: Vec::new(),
            });
        }
    };

    let mut success = true;
    let sessions: Vec<SessionFacts> = live_entries(registry)
        .into_iter()
        .map(|entry| {
            let state = entry
                .session_file
                .as_deref()
                .filter(|p| !p.as_os_str().is_empty())
                .and_then(|recorded| {
                    let path = home.session_log(&agent, recorded);
                    match session_log::parse_session_log(&path) {
                        Ok(state) => Some(state),
                        Err(e) if e.is_not_found() => {
                            tracing::debug!(agent = %agent, error = %e, "session log missing");
                            None
                        }
                        Err(e) => {
                            tracing::warn!(agent = %agent, error = %e, "failed to replay session log");
                            success = false;
                            None
                        }
                    }
                });

            SessionFacts {
                session_id: entry.session_id,
                updated_at_secs: entry.updated_at / 1000,
                compaction_count: entry.compaction_count,
                state,
            }
        })
        .collect();

    Some(AgentSessions {
        agent,
        success,
        sessions,
    })
}

/// Keep entries under `agent:` keys with a session id, one per session id.
///
/// When several keys point at the same session id, the most recently
/// updated entry wins.
fn live_entries(registry: BTreeMap<String, RegistryEntry>) -> Vec<RegistryEntry> {
    let mut by_id: BTreeMap<String, RegistryEntry> = BTreeMap::new();
    for (key, entry) in registry {
        if !key.starts_with(LIVE_SESSION_PREFIX) || entry.session_id.is_empty() {
            continue;
        }
        match by_id.get(&entry.session_id) {
            Some(existing) if existing.updated_at >= entry.updated_at => {}
            _ => {
                by_id.insert(entry.session_id.clone(), entry);
            }
        }
    }
    by_id.into_values().collect()
}
