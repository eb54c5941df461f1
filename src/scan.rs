//! Workspace scanner: six independent sub-scans over the workspace
//! directory, folded into one immutable [`WorkspaceSnapshot`].
//!
//! Each sub-scan returns its own value or error. A failing sub-scan is
//! logged and counted, contributes an empty value, and never stops the
//! others. The snapshot under construction is a local value; only the
//! finished snapshot leaves [`WorkspaceScanner::scan`].

use crate::layout::{self, Workspace};
use crate::markdown;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;

/// One independently failable unit of a scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubScan {
    FileFacts,
    WorkspaceFiles,
    ContextLength,
    MemoryFiles,
    Skills,
    Agents,
}

impl SubScan {
    pub const ALL: [SubScan; 6] = [
        SubScan::FileFacts,
        SubScan::WorkspaceFiles,
        SubScan::ContextLength,
        SubScan::MemoryFiles,
        SubScan::Skills,
        SubScan::Agents,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SubScan::FileFacts => "file_facts",
            SubScan::WorkspaceFiles => "workspace_files",
            SubScan::ContextLength => "context_length",
            SubScan::MemoryFiles => "memory_files",
            SubScan::Skills => "skills",
            SubScan::Agents => "agents",
        }
    }
}

impl std::fmt::Display for SubScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that fail a single sub-scan.
#[derive(Debug)]
pub enum ScanError {
    /// A filesystem operation failed for a reason other than absence.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The context glob pattern could not be compiled.
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },
    /// The cycle deadline passed while the sub-scan was running.
    Timeout { sub_scan: SubScan },
    /// The process is shutting down.
    Cancelled { sub_scan: SubScan },
}

impl ScanError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        ScanError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            ScanError::Pattern { pattern, source } => {
                write!(f, "invalid pattern {pattern}: {source}")
            }
            ScanError::Timeout { sub_scan } => write!(f, "{sub_scan} timed out"),
            ScanError::Cancelled { sub_scan } => write!(f, "{sub_scan} cancelled"),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::Io { source, .. } => Some(source),
            ScanError::Pattern { source, .. } => Some(source),
            ScanError::Timeout { .. } | ScanError::Cancelled { .. } => None,
        }
    }
}

/// Cancellation signal shared by all sub-scans of one cycle.
///
/// Sub-scans call [`ScanContext::check`] before every filesystem operation
/// inside their loops, so an expired deadline stops them promptly.
#[derive(Debug, Clone)]
pub struct ScanContext {
    deadline: Option<Instant>,
    shutdown: CancellationToken,
}

impl ScanContext {
    pub fn new(timeout: Duration, shutdown: CancellationToken) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            shutdown,
        }
    }

    pub fn check(&self, sub_scan: SubScan) -> Result<(), ScanError> {
        if self.shutdown.is_cancelled() {
            return Err(ScanError::Cancelled { sub_scan });
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ScanError::Timeout { sub_scan }),
            _ => Ok(()),
        }
    }
}

/// Size and modification time of one tracked workspace file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFact {
    pub name: String,
    pub size_bytes: u64,
    pub mtime_unix: i64,
}

/// Presence of one canonical workspace file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFile {
    pub name: String,
    pub exists: bool,
}

/// Point-in-time facts about the workspace. Never mutated once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceSnapshot {
    pub file_facts: Vec<FileFact>,
    pub workspace_files: Vec<WorkspaceFile>,
    pub context_length_bytes: u64,
    pub memory_file_count: u64,
    pub skills_count: u64,
    pub agents_count: u64,
    /// False if any sub-scan failed in this cycle.
    pub scrape_success: bool,
    /// Number of sub-scans that failed in this cycle.
    pub error_count: u64,
}

impl WorkspaceSnapshot {
    /// Snapshot for a cycle in which no sub-scan produced a result.
    pub fn failed() -> Self {
        Self {
            error_count: SubScan::ALL.len() as u64,
            ..Default::default()
        }
    }
}

/// Scans one workspace plus the user and system skill directories.
#[derive(Debug, Clone)]
pub struct WorkspaceScanner {
    workspace: Workspace,
    user_skills_dir: Option<PathBuf>,
    system_skills_dir: Option<PathBuf>,
}

impl WorkspaceScanner {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            user_skills_dir: None,
            system_skills_dir: None,
        }
    }

    pub fn with_user_skills_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.user_skills_dir = dir;
        self
    }

    pub fn with_system_skills_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.system_skills_dir = dir;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Run every sub-scan and fold the results into a fresh snapshot.
    pub fn scan(&self, ctx: &ScanContext) -> WorkspaceSnapshot {
        let mut errors = 0;

        let file_facts = settle(SubScan::FileFacts, self.file_facts(ctx), &mut errors);
        let workspace_files =
            settle(SubScan::WorkspaceFiles, self.workspace_files(ctx), &mut errors);
        let context_length_bytes =
            settle(SubScan::ContextLength, self.context_length(ctx), &mut errors);
        let memory_file_count = settle(SubScan::MemoryFiles, self.memory_files(ctx), &mut errors);
        let skills_count = settle(SubScan::Skills, self.skills(ctx), &mut errors);
        let agents_count = settle(SubScan::Agents, self.agents(ctx), &mut errors);

        WorkspaceSnapshot {
            file_facts,
            workspace_files,
            context_length_bytes,
            memory_file_count,
            skills_count,
            agents_count,
            scrape_success: errors == 0,
            error_count: errors,
        }
    }

    /// Stat every tracked file that exists, reporting a legacy lowercase
    /// name only when no earlier name with the same lowercase form was found.
    fn file_facts(&self, ctx: &ScanContext) -> Result<Vec<FileFact>, ScanError> {
        let mut reported = HashSet::new();
        let mut facts = Vec::new();

        for name in layout::TRACKED_FILES {
            ctx.check(SubScan::FileFacts)?;

            let key = name.to_lowercase();
            if reported.contains(&key) {
                continue;
            }

            let path = self.workspace.file(name);
            let meta = match std::fs::metadata(&path) {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ScanError::io(&path, e)),
            };
            let modified = meta.modified().map_err(|e| ScanError::io(&path, e))?;

            reported.insert(key);
            facts.push(FileFact {
                name: name.to_string(),
                size_bytes: meta.len(),
                mtime_unix: unix_seconds(modified),
            });
        }

        Ok(facts)
    }

    fn workspace_files(&self, ctx: &ScanContext) -> Result<Vec<WorkspaceFile>, ScanError> {
        let mut files = Vec::with_capacity(layout::WORKSPACE_FILES.len());

        for name in layout::WORKSPACE_FILES {
            ctx.check(SubScan::WorkspaceFiles)?;

            let path = self.workspace.file(name);
            let exists = match std::fs::metadata(&path) {
                Ok(_) => true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => return Err(ScanError::io(&path, e)),
            };
            files.push(WorkspaceFile {
                name: name.to_string(),
                exists,
            });
        }

        Ok(files)
    }

    /// Total size of the `context*.md` shards.
    fn context_length(&self, ctx: &ScanContext) -> Result<u64, ScanError> {
        ctx.check(SubScan::ContextLength)?;

        let pattern = self.workspace.context_pattern();
        let paths = glob::glob(&pattern).map_err(|e| ScanError::Pattern {
            pattern: pattern.clone(),
            source: e,
        })?;

        let mut total = 0;
        for entry in paths {
            ctx.check(SubScan::ContextLength)?;

            // Shards that vanish or cannot be stat'ed mid-scan are skipped.
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable context match");
                    continue;
                }
            };
            match std::fs::metadata(&path) {
                Ok(meta) if meta.is_file() => total += meta.len(),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping context shard");
                }
            }
        }

        Ok(total)
    }

    /// Count `*.md` files directly inside `memory/`. A missing directory is zero.
    fn memory_files(&self, ctx: &ScanContext) -> Result<u64, ScanError> {
        ctx.check(SubScan::MemoryFiles)?;

        let dir = self.workspace.memory_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(ScanError::io(&dir, e)),
        };

        let mut count = 0;
        for entry in entries {
            ctx.check(SubScan::MemoryFiles)?;

            let entry = entry.map_err(|e| ScanError::io(&dir, e))?;
            let path = entry.path();
            let is_dir = entry
                .file_type()
                .map_err(|e| ScanError::io(&path, e))?
                .is_dir();
            let is_memory =
                path.extension().and_then(|x| x.to_str()) == Some(layout::MEMORY_EXTENSION);
            if !is_dir && is_memory {
                count += 1;
            }
        }

        Ok(count)
    }

    /// Legacy `skill.md` sections plus skill directories at every scope.
    fn skills(&self, ctx: &ScanContext) -> Result<u64, ScanError> {
        ctx.check(SubScan::Skills)?;

        let legacy = self.workspace.legacy_skills_file();
        let mut total =
            markdown::count_sections_or_zero(&legacy).map_err(|e| ScanError::io(&legacy, e))?;

        let workspace_dir = self.workspace.skills_dir();
        let scopes = std::iter::once(workspace_dir.as_path())
            .chain(self.user_skills_dir.as_deref())
            .chain(self.system_skills_dir.as_deref());
        for dir in scopes {
            total += count_skill_dirs(ctx, dir)?;
        }

        Ok(total)
    }

    /// Sections of the legacy `agent.md`, or of `AGENTS.md` when the legacy
    /// listing does not exist.
    fn agents(&self, ctx: &ScanContext) -> Result<u64, ScanError> {
        ctx.check(SubScan::Agents)?;

        let legacy = self.workspace.legacy_agents_file();
        match markdown::count_sections(&legacy) {
            Ok(count) => Ok(count),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ctx.check(SubScan::Agents)?;
                let canonical = self.workspace.agents_file();
                markdown::count_sections_or_zero(&canonical)
                    .map_err(|e| ScanError::io(&canonical, e))
            }
            Err(e) => Err(ScanError::io(&legacy, e)),
        }
    }
}

/// Count subdirectories of `dir` that contain a skill descriptor.
/// A missing directory is zero.
fn count_skill_dirs(ctx: &ScanContext, dir: &Path) -> Result<u64, ScanError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(ScanError::io(dir, e)),
    };

    let mut count = 0;
    for entry in entries {
        ctx.check(SubScan::Skills)?;

        let entry = entry.map_err(|e| ScanError::io(dir, e))?;
        let path = entry.path();
        let is_dir = entry
            .file_type()
            .map_err(|e| ScanError::io(&path, e))?
            .is_dir();
        if is_dir && path.join(layout::SKILL_DESCRIPTOR).is_file() {
            count += 1;
        }
    }

    Ok(count)
}

/// Unwrap a sub-scan result, logging and counting the failure.
fn settle<T: Default>(sub_scan: SubScan, result: Result<T, ScanError>, errors: &mut u64) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(sub_scan = sub_scan.name(), error = %e, "sub-scan failed");
            *errors += 1;
            T::default()
        }
    }
}

fn unix_seconds(time: SystemTime) -> i64 {
    chrono::DateTime::<chrono::Utc>::from(time).timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ScanContext {
        ScanContext::new(Duration::from_secs(30), CancellationToken::new())
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    fn scanner(root: &Path) -> WorkspaceScanner {
        WorkspaceScanner::new(Workspace::new(root))
    }

    #[test]
    fn empty_workspace_scans_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let snap = scanner(dir.path()).scan(&ctx());

        assert!(snap.scrape_success);
        assert_eq!(snap.error_count, 0);
        assert!(snap.file_facts.is_empty());
        assert_eq!(snap.workspace_files.len(), layout::WORKSPACE_FILES.len());
        assert!(snap.workspace_files.iter().all(|f| !f.exists));
        assert_eq!(snap.context_length_bytes, 0);
        assert_eq!(snap.memory_file_count, 0);
        assert_eq!(snap.skills_count, 0);
        assert_eq!(snap.agents_count, 0);
    }

    #[test]
    fn file_facts_record_size_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "TOOLS.md", "12345");
        filetime::set_file_mtime(
            dir.path().join("TOOLS.md"),
            filetime::FileTime::from_unix_time(1_700_000_000, 0),
        )
        .unwrap();

        let snap = scanner(dir.path()).scan(&ctx());
        assert_eq!(
            snap.file_facts,
            vec![FileFact {
                name: "TOOLS.md".to_string(),
                size_bytes: 5,
                mtime_unix: 1_700_000_000,
            }]
        );
    }

    #[test]
    fn canonical_name_suppresses_legacy_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "SOUL.md", "canonical soul");
        write(dir.path(), "soul.md", "legacy");

        let snap = scanner(dir.path()).scan(&ctx());
        let souls: Vec<_> = snap
            .file_facts
            .iter()
            .filter(|f| f.name.eq_ignore_ascii_case("soul.md"))
            .collect();
        assert_eq!(souls.len(), 1);
        assert_eq!(souls[0].name, "SOUL.md");
        assert_eq!(souls[0].size_bytes, 14);
    }

    #[test]
    fn legacy_name_reported_when_canonical_absent() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "skill.md", "## a\n");
        write(dir.path(), "AGENTS.md", "# agents\n");

        let snap = scanner(dir.path()).scan(&ctx());
        let names: Vec<_> = snap.file_facts.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["AGENTS.md", "skill.md"]);
    }

    #[test]
    fn workspace_files_report_absence() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "MEMORY.md", "m");
        write(dir.path(), "BOOT.md", "not in the existence list");

        let snap = scanner(dir.path()).scan(&ctx());
        let names: Vec<_> = snap.workspace_files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, layout::WORKSPACE_FILES.to_vec());
        for file in &snap.workspace_files {
            assert_eq!(file.exists, file.name == "MEMORY.md", "{}", file.name);
        }
    }

    #[test]
    fn context_length_sums_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "context.md", "abcd");
        write(dir.path(), "context-01.md", "0123456789");
        write(dir.path(), "context-notes.txt", "ignored");
        write(dir.path(), "other.md", "ignored");
        std::fs::create_dir(dir.path().join("context-dir.md")).unwrap();

        let snap = scanner(dir.path()).scan(&ctx());
        assert_eq!(snap.context_length_bytes, 14);
        assert!(snap.scrape_success);
    }

    #[test]
    fn memory_counts_markdown_files_only() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "memory/2026-01-01.md", "day one");
        write(dir.path(), "memory/2026-01-02.md", "day two");
        write(dir.path(), "memory/index.json", "{}");
        std::fs::create_dir(dir.path().join("memory/archive.md")).unwrap();

        let snap = scanner(dir.path()).scan(&ctx());
        assert_eq!(snap.memory_file_count, 2);
    }

    #[test]
    fn missing_memory_dir_is_zero_and_successful() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "SOUL.md", "s");

        let snap = scanner(dir.path()).scan(&ctx());
        assert_eq!(snap.memory_file_count, 0);
        assert!(snap.scrape_success);
    }

    #[test]
    fn memory_path_that_is_a_file_fails_only_that_sub_scan() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "memory", "not a directory");
        write(dir.path(), "context.md", "abc");

        let snap = scanner(dir.path()).scan(&ctx());
        assert!(!snap.scrape_success);
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.memory_file_count, 0);
        assert_eq!(snap.context_length_bytes, 3);
    }

    #[test]
    fn skills_across_all_scopes() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("ws");
        let user = dir.path().join("user-skills");
        let system = dir.path().join("system-skills");

        write(&ws, "skill.md", "## legacy one\n## legacy two\n");
        write(&ws, "skills/weather/SKILL.md", "weather");
        write(&ws, "skills/draft/notes.md", "no descriptor");
        write(&ws, "skills/loose-file", "not a dir");
        write(&user, "github/SKILL.md", "gh");
        write(&system, "browser/SKILL.md", "b");
        write(&system, "search/SKILL.md", "s");

        let snap = scanner(&ws)
            .with_user_skills_dir(Some(user))
            .with_system_skills_dir(Some(system))
            .scan(&ctx());
        assert_eq!(snap.skills_count, 2 + 1 + 1 + 2);
        assert!(snap.scrape_success);
    }

    #[test]
    fn skills_path_that_is_a_file_fails_only_that_sub_scan() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "skills", "not a directory");
        write(dir.path(), "memory/a.md", "a");

        let snap = scanner(dir.path()).scan(&ctx());
        assert!(!snap.scrape_success);
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.skills_count, 0);
        assert_eq!(snap.memory_file_count, 1);
    }

    #[test]
    fn missing_skill_scopes_are_zero() {
        let dir = tempfile::tempdir().unwrap();
        let snap = scanner(dir.path())
            .with_user_skills_dir(Some(dir.path().join("nope")))
            .with_system_skills_dir(Some(dir.path().join("also-nope")))
            .scan(&ctx());
        assert_eq!(snap.skills_count, 0);
        assert!(snap.scrape_success);
    }

    #[test]
    fn agents_fall_back_to_agents_md() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "AGENTS.md", "# Agents\n## main\n## helper\n");

        let snap = scanner(dir.path()).scan(&ctx());
        assert_eq!(snap.agents_count, 2);
    }

    #[test]
    fn non_utf8_listing_still_counts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("agent.md"), b"## caf\xe9\n## two\n").unwrap();

        let snap = scanner(dir.path()).scan(&ctx());
        assert_eq!(snap.agents_count, 2);
        assert!(snap.scrape_success);
        assert_eq!(snap.error_count, 0);
    }

    #[test]
    fn legacy_agent_md_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "AGENTS.md", "## main\n## helper\n");
        write(dir.path(), "agent.md", "## only\n");

        let snap = scanner(dir.path()).scan(&ctx());
        assert_eq!(snap.agents_count, 1);
    }

    #[test]
    fn rescanning_unchanged_tree_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "SOUL.md", "soul");
        write(dir.path(), "context.md", "ctx");
        write(dir.path(), "memory/a.md", "a");
        write(dir.path(), "skills/x/SKILL.md", "x");
        write(dir.path(), "agent.md", "## a\n");

        let scanner = scanner(dir.path());
        assert_eq!(scanner.scan(&ctx()), scanner.scan(&ctx()));
    }

    #[test]
    fn expired_deadline_fails_every_sub_scan() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "SOUL.md", "soul");

        let ctx = ScanContext::new(Duration::ZERO, CancellationToken::new());
        let snap = scanner(dir.path()).scan(&ctx);
        assert!(!snap.scrape_success);
        assert_eq!(snap.error_count, SubScan::ALL.len() as u64);
        assert!(snap.file_facts.is_empty());
        assert!(snap.workspace_files.is_empty());
    }

    #[test]
    fn timeout_and_cancel_errors() {
        let expired = ScanContext::new(Duration::ZERO, CancellationToken::new());
        assert!(matches!(
            expired.check(SubScan::Skills),
            Err(ScanError::Timeout {
                sub_scan: SubScan::Skills
            })
        ));

        let token = CancellationToken::new();
        let ctx = ScanContext::new(Duration::from_secs(60), token.clone());
        assert!(ctx.check(SubScan::Agents).is_ok());
        token.cancel();
        let err = ctx.check(SubScan::Agents).unwrap_err();
        assert!(matches!(err, ScanError::Cancelled { .. }));
        assert_eq!(err.to_string(), "agents cancelled");
    }

    #[test]
    fn failed_snapshot_counts_every_sub_scan() {
        let snap = WorkspaceSnapshot::failed();
        assert!(!snap.scrape_success);
        assert_eq!(snap.error_count, 6);
    }
}
