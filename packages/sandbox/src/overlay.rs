// ABOUTME: Directory-based scoped overlay: a per-sandbox working copy of one project scope
// ABOUTME: Computes content diffs against the lower scope and applies or discards them

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Result, SandboxError};
use crate::types::{ChangeKind, FileChange};

pub const UPPER_DIR: &str = "upper";

/// Reject absolute scopes and any `..` component.
pub fn validate_scope(scope_path: &str) -> Result<PathBuf> {
    let scope = Path::new(scope_path);
    if scope.is_absolute() {
        return Err(SandboxError::InvalidScope(format!(
            "scope path must be relative: {}",
            scope_path
        )));
    }
    for component in scope.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(SandboxError::InvalidScope(format!(
                    "scope path escapes the project root: {}",
                    scope_path
                )))
            }
        }
    }
    Ok(scope.to_path_buf())
}

#[derive(Debug, Clone)]
pub struct Overlay {
    root: PathBuf,
    lower: PathBuf,
}

impl Overlay {
    /// Bind `<baseDir>/<sandboxId>` to `<projectRoot>/<scopePath>` without touching disk.
    pub fn open(
        base_dir: &Path,
        sandbox_id: &str,
        project_root: &Path,
        scope_path: &str,
    ) -> Result<Self> {
        let scope = validate_scope(scope_path)?;
        Ok(Self {
            root: base_dir.join(sandbox_id),
            lower: project_root.join(scope),
        })
    }

    /// Validate the scope and populate the upper layer from it.
    pub fn create(
        base_dir: &Path,
        sandbox_id: &str,
        project_root: &Path,
        scope_path: &str,
    ) -> Result<Self> {
        let overlay = Self::open(base_dir, sandbox_id, project_root, scope_path)?;
        if !overlay.lower.is_dir() {
            return Err(SandboxError::InvalidScope(format!(
                "scope is not a directory: {}",
                overlay.lower.display()
            )));
        }

        let upper = overlay.upper_dir();
        fs::create_dir_all(&upper).map_err(|e| SandboxError::io(&upper, e))?;
        copy_tree(&overlay.lower, &upper)?;
        Ok(overlay)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lower_dir(&self) -> &Path {
        &self.lower
    }

    pub fn upper_dir(&self) -> PathBuf {
        self.root.join(UPPER_DIR)
    }

    pub fn exists(&self) -> bool {
        self.upper_dir().is_dir()
    }

    /// Files that differ between the upper layer and the lower scope, by path.
    pub fn diff(&self) -> Result<Vec<FileChange>> {
        let upper = self.upper_dir();
        let upper_files = list_files(&upper)?;
        let lower_files = list_files(&self.lower)?;

        let mut changes = Vec::new();
        for path in upper_files.union(&lower_files) {
            let kind = match (upper_files.contains(path), lower_files.contains(path)) {
                (true, false) => ChangeKind::Added,
                (false, true) => ChangeKind::Deleted,
                _ => {
                    if same_content(&upper.join(path), &self.lower.join(path))? {
                        continue;
                    }
                    ChangeKind::Modified
                }
            };
            changes.push(FileChange {
                path: path.clone(),
                kind,
            });
        }
        Ok(changes)
    }

    /// Write every upper-layer change into the lower scope.
    pub fn apply(&self) -> Result<Vec<FileChange>> {
        let changes = self.diff()?;
        let upper = self.upper_dir();

        for change in &changes {
            let target = self.lower.join(&change.path);
            match change.kind {
                ChangeKind::Added | ChangeKind::Modified => {
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent).map_err(|e| SandboxError::io(parent, e))?;
                    }
                    let source = upper.join(&change.path);
                    fs::copy(&source, &target).map_err(|e| SandboxError::io(&target, e))?;
                }
                ChangeKind::Deleted => match fs::remove_file(&target) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(SandboxError::io(&target, e)),
                },
            }
        }
        Ok(changes)
    }

    /// Drop the upper layer. Idempotent.
    pub fn discard(&self) -> Result<()> {
        let upper = self.upper_dir();
        match fs::remove_dir_all(&upper) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SandboxError::io(&upper, e)),
        }
    }

    /// Discard the upper layer and remove the sandbox directory once it is empty.
    pub fn remove(&self) -> Result<()> {
        self.discard()?;
        // Still holds retained logs when it is not empty
        let _ = fs::remove_dir(&self.root);
        Ok(())
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|e| walk_error(from, e))?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| SandboxError::io(&target, e))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).map_err(|e| SandboxError::io(&target, e))?;
        }
    }
    Ok(())
}

/// Regular files under `dir`, relative and `/`-separated. A missing dir is empty.
fn list_files(dir: &Path) -> Result<BTreeSet<String>> {
    let mut files = BTreeSet::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.insert(parts.join("/"));
    }
    Ok(files)
}

fn same_content(a: &Path, b: &Path) -> Result<bool> {
    let meta_a = fs::metadata(a).map_err(|e| SandboxError::io(a, e))?;
    let meta_b = fs::metadata(b).map_err(|e| SandboxError::io(b, e))?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    let bytes_a = fs::read(a).map_err(|e| SandboxError::io(a, e))?;
    let bytes_b = fs::read(b).map_err(|e| SandboxError::io(b, e))?;
    Ok(bytes_a == bytes_b)
}

fn walk_error(root: &Path, err: walkdir::Error) -> SandboxError {
    let path = err.path().unwrap_or(root).to_path_buf();
    SandboxError::io(&path, std::io::Error::from(err))
}
