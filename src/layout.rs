use std::path::{Path, PathBuf};

/// Canonical workspace files, in the order file facts are reported.
/// Legacy lowercase names follow their canonical counterparts so that
/// the first match wins during case-insensitive deduplication.
pub const TRACKED_FILES: &[&str] = &[
    "AGENTS.md",
    "SOUL.md",
    "TOOLS.md",
    "IDENTITY.md",
    "USER.md",
    "HEARTBEAT.md",
    "BOOTSTRAP.md",
    "BOOT.md",
    "MEMORY.md",
    "soul.md",
    "skill.md",
    "agent.md",
];

/// Files whose presence is always reported, present or not.
pub const WORKSPACE_FILES: &[&str] = &[
    "AGENTS.md",
    "SOUL.md",
    "TOOLS.md",
    "IDENTITY.md",
    "USER.md",
    "HEARTBEAT.md",
    "BOOTSTRAP.md",
    "MEMORY.md",
];

/// Descriptor file that marks a subdirectory as a skill.
pub const SKILL_DESCRIPTOR: &str = "SKILL.md";

/// Extension of daily memory files.
pub const MEMORY_EXTENSION: &str = "md";

/// The OpenClaw workspace directory layout.
///
/// All workspace artifacts live directly under a single root. This struct
/// provides accessors for each well-known path the scanner inspects.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to a named file at the workspace root.
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Directory holding daily memory files.
    pub fn memory_dir(&self) -> PathBuf {
        self.root.join("memory")
    }

    /// Workspace-local skills directory.
    pub fn skills_dir(&self) -> PathBuf {
        self.root.join("skills")
    }

    /// Glob pattern matching context shards (`context*.md`).
    ///
    /// The root is escaped so that metacharacters in the directory name
    /// are matched literally.
    pub fn context_pattern(&self) -> String {
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        format!("{}/context*.md", root.trim_end_matches('/'))
    }

    /// Legacy single-file skill listing.
    pub fn legacy_skills_file(&self) -> PathBuf {
        self.root.join("skill.md")
    }

    /// Legacy single-file agent listing.
    pub fn legacy_agents_file(&self) -> PathBuf {
        self.root.join("agent.md")
    }

    /// Canonical agents document, used when the legacy listing is absent.
    pub fn agents_file(&self) -> PathBuf {
        self.root.join("AGENTS.md")
    }
}

/// The OpenClaw home directory layout (default `~/.openclaw`).
#[derive(Debug, Clone)]
pub struct OpenclawHome {
    root: PathBuf,
}

impl OpenclawHome {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one subdirectory per agent.
    pub fn agents_dir(&self) -> PathBuf {
        self.root.join("agents")
    }

    /// Sessions directory of a single agent.
    pub fn sessions_dir(&self, agent: &str) -> PathBuf {
        self.agents_dir().join(agent).join("sessions")
    }

    /// Session registry of a single agent (`sessions/sessions.json`).
    pub fn session_registry(&self, agent: &str) -> PathBuf {
        self.sessions_dir(agent).join("sessions.json")
    }

    /// Resolve a session log path recorded in an agent's registry.
    ///
    /// Absolute paths are returned unchanged; relative paths are taken
    /// relative to the agent's sessions directory.
    pub fn session_log(&self, agent: &str, recorded: &Path) -> PathBuf {
        if recorded.is_absolute() {
            recorded.to_path_buf()
        } else {
            self.sessions_dir(agent).join(recorded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_paths() {
        let ws = Workspace::new("/srv/openclaw/workspace");
        assert_eq!(ws.root(), Path::new("/srv/openclaw/workspace"));
        assert_eq!(
            ws.file("SOUL.md"),
            PathBuf::from("/srv/openclaw/workspace/SOUL.md")
        );
        assert_eq!(
            ws.memory_dir(),
            PathBuf::from("/srv/openclaw/workspace/memory")
        );
        assert_eq!(
            ws.skills_dir(),
            PathBuf::from("/srv/openclaw/workspace/skills")
        );
        assert_eq!(
            ws.legacy_agents_file(),
            PathBuf::from("/srv/openclaw/workspace/agent.md")
        );
    }

    #[test]
    fn context_pattern_escapes_root() {
        let ws = Workspace::new("/tmp/odd[dir]");
        let pattern = ws.context_pattern();
        assert!(pattern.ends_with("/context*.md"));
        assert!(pattern.starts_with("/tmp/odd[[]dir[]]"));
    }

    #[test]
    fn context_pattern_trailing_slash() {
        let ws = Workspace::new("/srv/ws/");
        assert_eq!(ws.context_pattern(), "/srv/ws/context*.md");
    }

    #[test]
    fn tracked_files_list_canonical_before_legacy() {
        let canonical = TRACKED_FILES.iter().position(|f| *f == "SOUL.md");
        let legacy = TRACKED_FILES.iter().position(|f| *f == "soul.md");
        assert!(canonical < legacy);
    }

    #[test]
    fn home_paths() {
        let home = OpenclawHome::new("/home/u/.openclaw");
        assert_eq!(
            home.session_registry("main"),
            PathBuf::from("/home/u/.openclaw/agents/main/sessions/sessions.json")
        );
    }

    #[test]
    fn session_log_resolution() {
        let home = OpenclawHome::new("/home/u/.openclaw");
        assert_eq!(
            home.session_log("main", Path::new("/var/log/s.jsonl")),
            PathBuf::from("/var/log/s.jsonl")
        );
        assert_eq!(
            home.session_log("main", Path::new("abc.jsonl")),
            PathBuf::from("/home/u/.openclaw/agents/main/sessions/abc.jsonl")
        );
    }
}
