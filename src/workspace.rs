//! Workspace context resolution.
//!
//! Each proxied call may carry an `X-Workspace-Alias` header. The alias is
//! chosen by trying [`WorkspaceStrategy`] values in order:
//!
//! 1. `Explicit`: the `workspace` argument of the current request
//! 2. `Project`: a `.docs-mcp.json` binding in the working directory or an ancestor
//! 3. `GlobalDefault`: the alias cached in the global config file
//!
//! If all are absent no header is sent and the backend picks a default.
//!
//! An explicit alias becomes the new global default only when no project
//! binding exists, so a one-off override never clobbers a pinned project,
//! while ad-hoc usage outside projects sticks to the last workspace named.
//! The project file is re-read on every resolution and never copied into
//! the global cache.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::config::PROJECT_FILE_NAME;
use crate::error::StoreError;
use crate::store::ConfigStore;

/// Where a resolved alias came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceSource {
    /// Named in the request arguments.
    Explicit,
    /// Pinned by a project binding file.
    Project,
    /// Cached global default.
    Global,
}

/// One link in the workspace precedence chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceStrategy {
    /// Alias supplied with the request.
    Explicit,
    /// Project binding file.
    Project,
    /// Cached global default.
    GlobalDefault,
}

/// The standard precedence chain.
pub const DEFAULT_STRATEGIES: [WorkspaceStrategy; 3] = [
    WorkspaceStrategy::Explicit,
    WorkspaceStrategy::Project,
    WorkspaceStrategy::GlobalDefault,
];

/// A resolved workspace alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedWorkspace {
    /// Alias to send in `X-Workspace-Alias`.
    pub alias: String,
    /// Strategy that produced it.
    pub source: WorkspaceSource,
}

/// A project-level workspace pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectBinding {
    /// The binding file.
    pub path: PathBuf,
    /// Pinned alias.
    pub alias: String,
}

/// Finds the nearest project binding file at or above `start`.
///
/// The nearest file wins. An empty, malformed or alias-less file counts as
/// no binding at all.
#[must_use]
pub fn find_project_binding(start: &Path) -> Option<ProjectBinding> {
    let path = start
        .ancestors()
        .map(|dir| dir.join(PROJECT_FILE_NAME))
        .find(|candidate| candidate.is_file())?;

    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable project file");
            return None;
        }
    };

    let alias = serde_json::from_str::<Value>(&contents)
        .ok()
        .as_ref()
        .and_then(Value::as_object)
        .and_then(|obj| {
            ["workspace", "workspaceAlias", "workspace_alias"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
        })
        .and_then(normalize_alias);

    match alias {
        Some(alias) => Some(ProjectBinding { path, alias }),
        None => {
            tracing::debug!(path = %path.display(), "Project file has no workspace binding");
            None
        }
    }
}

fn normalize_alias(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Resolves the workspace alias for outgoing requests.
#[derive(Debug, Clone)]
pub struct WorkspaceResolver {
    strategies: Vec<WorkspaceStrategy>,
    config: ConfigStore,
    project_dir: PathBuf,
}

impl WorkspaceResolver {
    /// Creates a resolver using the standard chain.
    ///
    /// `project_dir` is where the project file search starts, normally the
    /// process working directory.
    #[must_use]
    pub fn new(config: ConfigStore, project_dir: impl Into<PathBuf>) -> Self {
        Self::with_strategies(DEFAULT_STRATEGIES.to_vec(), config, project_dir)
    }

    /// Creates a resolver with a custom chain.
    #[must_use]
    pub fn with_strategies(
        strategies: Vec<WorkspaceStrategy>,
        config: ConfigStore,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            strategies,
            config,
            project_dir: project_dir.into(),
        }
    }

    /// Current project binding, read fresh from disk.
    #[must_use]
    pub fn project_binding(&self) -> Option<ProjectBinding> {
        find_project_binding(&self.project_dir)
    }

    /// Cached global default. Read errors are logged and treated as absent.
    #[must_use]
    pub fn global_default(&self) -> Option<String> {
        match self.config.workspace_alias() {
            Ok(alias) => alias.as_deref().and_then(normalize_alias),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable global config");
                None
            }
        }
    }

    /// Replaces the cached global default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn set_global_default(&self, alias: Option<&str>) -> Result<(), StoreError> {
        let alias = alias.and_then(normalize_alias);
        self.config.set_workspace_alias(alias.as_deref())
    }

    /// Resolves the alias for one request.
    ///
    /// An explicit alias is cached as the global default unless a project
    /// binding exists. Cache write failures are logged, never returned.
    #[must_use]
    pub fn resolve(&self, explicit: Option<&str>) -> Option<ResolvedWorkspace> {
        let explicit = explicit.and_then(normalize_alias);
        // Read at most once per resolution.
        let mut binding: Option<Option<ProjectBinding>> = None;
        let mut project = || {
            binding
                .get_or_insert_with(|| self.project_binding())
                .clone()
        };

        for strategy in &self.strategies {
            let resolved = match strategy {
                WorkspaceStrategy::Explicit => explicit.clone().map(|alias| {
                    if project().is_none() {
                        self.remember(&alias);
                    }
                    ResolvedWorkspace {
                        alias,
                        source: WorkspaceSource::Explicit,
                    }
                }),
                WorkspaceStrategy::Project => project().map(|b| ResolvedWorkspace {
                    alias: b.alias,
                    source: WorkspaceSource::Project,
                }),
                WorkspaceStrategy::GlobalDefault => {
                    self.global_default().map(|alias| ResolvedWorkspace {
                        alias,
                        source: WorkspaceSource::Global,
                    })
                }
            };
            if resolved.is_some() {
                tracing::debug!(workspace = ?resolved, "Resolved workspace");
                return resolved;
            }
        }
        None
    }

    fn remember(&self, alias: &str) {
        if self.global_default().as_deref() == Some(alias) {
            return;
        }
        match self.config.set_workspace_alias(Some(alias)) {
            Ok(()) => tracing::info!(workspace = alias, "Cached workspace as default"),
            Err(e) => tracing::warn!(error = %e, "Failed to cache workspace default"),
        }
    }
}
