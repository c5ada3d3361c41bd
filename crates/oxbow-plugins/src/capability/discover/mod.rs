//! Workspace discovery capability (`repo.discover`).
//!
//! Enumerates files under a start directory with optional depth pruning
//! and extension filtering, and scans the three fixed dependency
//! manifests at the workspace root (`package.json`, `requirements.txt`,
//! `Cargo.lock`). A manifest that is absent or unparseable contributes
//! nothing; it is never a protocol error.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::capability::{
    CallResult, Capability, CapabilityHandler, CapabilityMethod, HostSink, elapsed_ms,
};
use crate::error::CallError;
use crate::state::PluginState;

/// Tracing target for discovery operations.
const DISCOVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::discover");

/// Parameters of a `repo.discover` call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct DiscoverParams {
    path: String,
    extensions: Vec<String>,
    max_depth: Option<u32>,
    include_manifests: bool,
}

impl Default for DiscoverParams {
    fn default() -> Self {
        Self {
            path: String::from("."),
            extensions: Vec::new(),
            max_depth: None,
            include_manifests: true,
        }
    }
}

/// A discovered file, workspace-relative when it falls under the root.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileRef {
    path: String,
}

impl FileRef {
    /// Returns the reported path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// An external dependency reference, `scheme:name` for package entries or
/// a bare relative path for manifest-reference entries.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExternalDependency {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
}

impl ExternalDependency {
    fn package(scheme: &str, name: &str, language: &str) -> Self {
        Self {
            path: format!("{scheme}:{name}"),
            language: Some(language.to_owned()),
        }
    }

    fn manifest(relative: &str) -> Self {
        Self {
            path: relative.to_owned(),
            language: None,
        }
    }

    /// Returns the dependency path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the language hint, absent for manifest references.
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

/// Handler for the discover capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscoverCapability;

impl DiscoverCapability {
    /// Creates the handler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn discover(&self, state: &PluginState, params: &Value) -> CallResult {
        let started = Instant::now();
        let params: DiscoverParams = if params.is_null() {
            DiscoverParams::default()
        } else {
            serde_json::from_value(params.clone()).map_err(CallError::invalid_params)?
        };

        let root = normalise(state.workspace_root());
        let start = normalise(&state.resolve(&params.path));
        let files = enumerate_files(&root, &start, &params.extensions, params.max_depth);
        let external = scan_manifests(&root, params.include_manifests);

        debug!(
            target: DISCOVER_TARGET,
            files = files.len(),
            external = external.len(),
            "workspace scan complete"
        );

        Ok(json!({
            "files": files,
            "external": external,
            "metrics": {
                "files_found": files.len(),
                "scan_time_ms": elapsed_ms(started),
            },
        }))
    }
}

impl CapabilityHandler for DiscoverCapability {
    fn capability(&self) -> Capability {
        Capability::Discover
    }

    fn methods(&self) -> &'static [CapabilityMethod] {
        &[CapabilityMethod::RepoDiscover]
    }

    fn handle(
        &self,
        method: CapabilityMethod,
        state: &mut PluginState,
        _host: &mut dyn HostSink,
        params: &Value,
    ) -> CallResult {
        match method {
            CapabilityMethod::RepoDiscover => self.discover(state, params),
            other => Err(CallError::unknown_method(Some(other.as_str()))),
        }
    }
}

/// Resolves symlinks and `..` components where the path exists; falls back
/// to the path as given so containment checks degrade to component
/// comparison rather than failing.
fn normalise(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn enumerate_files(
    root: &Path,
    start: &Path,
    extensions: &[String],
    max_depth: Option<u32>,
) -> Vec<FileRef> {
    let mut paths = Vec::new();
    collect(start, 0, max_depth, &mut paths);

    paths
        .into_iter()
        .filter(|path| matches_extension(path, extensions))
        .map(|path| FileRef {
            path: report_path(root, &path),
        })
        .collect()
}

/// Depth-first walk. Depth is directory nesting below the start directory;
/// directories beyond `max_depth` are pruned from descent entirely, not
/// merely filtered. Unreadable directories contribute nothing.
fn collect(dir: &Path, depth: u32, max_depth: Option<u32>, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_file() {
            out.push(path);
        } else if file_type.is_dir() {
            if max_depth.is_none_or(|limit| depth < limit) {
                collect(&path, depth + 1, max_depth, out);
            }
        } else if file_type.is_symlink() {
            // Follow symlinks to files but never to directories, so a
            // cyclic link cannot loop the walk.
            if fs::metadata(&path).is_ok_and(|meta| meta.is_file()) {
                out.push(path);
            }
        }
    }
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let Some(name) = path.file_name().map(|name| name.to_string_lossy().to_lowercase()) else {
        return false;
    };
    extensions
        .iter()
        .any(|ext| name.ends_with(&ext.to_lowercase()))
}

/// Reports a path relative to the workspace root when containment holds
/// (component-wise prefix, both sides normalised), absolute otherwise.
fn report_path(root: &Path, file: &Path) -> String {
    file.strip_prefix(root).map_or_else(
        |_| file.to_string_lossy().into_owned(),
        |relative| relative.to_string_lossy().into_owned(),
    )
}

// ---------------------------------------------------------------------------
// Manifest scanning
// ---------------------------------------------------------------------------

const PACKAGE_JSON: &str = "package.json";
const REQUIREMENTS_TXT: &str = "requirements.txt";
const CARGO_LOCK: &str = "Cargo.lock";

const NPM_SECTIONS: [&str; 3] = ["dependencies", "devDependencies", "peerDependencies"];

fn scan_manifests(root: &Path, include_manifests: bool) -> Vec<ExternalDependency> {
    let mut external = Vec::new();

    for name in npm_dependencies(&root.join(PACKAGE_JSON)) {
        external.push(ExternalDependency::package("npm", &name, "javascript"));
    }
    for name in pip_dependencies(&root.join(REQUIREMENTS_TXT)) {
        external.push(ExternalDependency::package("pip", &name, "python"));
    }
    for name in cargo_dependencies(&root.join(CARGO_LOCK)) {
        external.push(ExternalDependency::package("cargo", &name, "rust"));
    }

    if include_manifests {
        for manifest in [PACKAGE_JSON, REQUIREMENTS_TXT, CARGO_LOCK] {
            if root.join(manifest).is_file() {
                external.push(ExternalDependency::manifest(manifest));
            }
        }
    }

    external
}

/// Names under the npm dependency sections. A missing or malformed
/// `package.json` produces no entries.
fn npm_dependencies(path: &Path) -> Vec<String> {
    let Ok(text) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let Ok(document) = serde_json::from_str::<Value>(&text) else {
        debug!(target: DISCOVER_TARGET, path = %path.display(), "skipping unparseable package.json");
        return Vec::new();
    };

    let mut names = Vec::new();
    for section in NPM_SECTIONS {
        if let Some(map) = document.get(section).and_then(Value::as_object) {
            names.extend(map.keys().cloned());
        }
    }
    names
}

/// One name per non-blank line, with any `==` version pin stripped.
fn pip_dependencies(path: &Path) -> Vec<String> {
    let Ok(text) = fs::read_to_string(path) else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| {
            let name = line.trim().split("==").next().unwrap_or_default().trim();
            (!name.is_empty()).then(|| name.to_owned())
        })
        .collect()
}

/// Package names from `name = "..."` lines.
fn cargo_dependencies(path: &Path) -> Vec<String> {
    let Ok(text) = fs::read_to_string(path) else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("name = ")?;
            Some(rest.trim().trim_matches('"').to_owned())
        })
        .collect()
}
