//! Build-directory lifecycle and per-task path allocation.

use crate::error::{HarnessError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::info;
use uuid::Uuid;

/// Owns the build root for one harness run.
///
/// [`Workspace::prepare`] wipes whatever a previous generation left behind
/// (crashed runs included) before creating the new tree, so stale artifacts
/// can never leak across generations. Every concurrent task gets its own
/// subtree via [`Workspace::path_for`]; the allocator is the only shared
/// mutation point.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    generation: Uuid,
    alloc: Mutex<PathAllocator>,
}

#[derive(Debug, Default)]
struct PathAllocator {
    next: u64,
    assigned: HashMap<String, PathBuf>,
}

impl Workspace {
    /// Remove any existing build root, then recreate it empty.
    ///
    /// Failures here are fatal to the whole run: nothing else may start
    /// without a usable workspace.
    pub fn prepare(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        // Anchor relative roots now: workers execute artifacts with a
        // per-case cwd, so every artifact path must stay valid from
        // anywhere.
        let root = if root.is_absolute() {
            root
        } else {
            let cwd = std::env::current_dir().map_err(|source| HarnessError::Workspace {
                path: root.clone(),
                source,
            })?;
            cwd.join(root)
        };

        if root.is_dir() {
            fs::remove_dir_all(&root).map_err(|source| HarnessError::Workspace {
                path: root.clone(),
                source,
            })?;
        } else if root.exists() {
            // A crashed run may have left a plain file in the way.
            fs::remove_file(&root).map_err(|source| HarnessError::Workspace {
                path: root.clone(),
                source,
            })?;
        }

        let cases = root.join("cases");
        fs::create_dir_all(&cases).map_err(|source| HarnessError::Workspace {
            path: cases.clone(),
            source,
        })?;

        let generation = Uuid::new_v4();
        info!(root = %root.display(), %generation, "workspace prepared");

        Ok(Self {
            root,
            generation,
            alloc: Mutex::new(PathAllocator::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identity of this build generation; artifact paths are unique within
    /// it.
    pub fn generation(&self) -> Uuid {
        self.generation
    }

    /// Directory the native build system configures and builds into.
    pub fn build_dir(&self) -> Result<PathBuf> {
        self.ensure_subdir("compiler-build")
    }

    /// Directory the stdlib artifact is emitted into.
    pub fn stdlib_dir(&self) -> Result<PathBuf> {
        self.ensure_subdir("stdlib")
    }

    /// Output directory for one task: deterministic for a given task id
    /// within this generation, distinct across task ids, created on first
    /// allocation.
    pub fn path_for(&self, task_id: &str) -> Result<PathBuf> {
        let mut alloc = self.alloc.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(path) = alloc.assigned.get(task_id) {
            return Ok(path.clone());
        }

        let seq = alloc.next;
        alloc.next += 1;
        let dir = self
            .root
            .join("cases")
            .join(format!("case-{seq}-{}", sanitize(task_id)));
        fs::create_dir_all(&dir).map_err(|source| HarnessError::Workspace {
            path: dir.clone(),
            source,
        })?;
        alloc.assigned.insert(task_id.to_string(), dir.clone());

        Ok(dir)
    }

    fn ensure_subdir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.root.join(name);
        fs::create_dir_all(&dir).map_err(|source| HarnessError::Workspace {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
