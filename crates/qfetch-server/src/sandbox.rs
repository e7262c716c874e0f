//! Base directory confinement.
//!
//! Every requested name is resolved under one canonical root. The join is
//! lexical first (so `..` cannot climb out), then the result is canonicalized
//! when it exists so a symlink cannot point out either.

use std::path::{Component, Path, PathBuf};

use qfetch_core::error::{Error, Result};

/// The single directory the server exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseDir {
    root: PathBuf,
}

impl BaseDir {
    /// Canonicalize `path` and check that it is a directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let root = path.canonicalize().map_err(|e| Error::Config {
            message: format!("cannot open base directory {}: {}", path.display(), e),
        })?;

        if !root.is_dir() {
            return Err(Error::Config {
                message: format!("base directory {} is not a directory", root.display()),
            });
        }

        Ok(Self { root })
    }

    /// Canonical root path.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve an untrusted request name to a path inside the root.
    ///
    /// Root and prefix components in `name` are ignored, so absolute names are
    /// taken relative to the base directory.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let escape = || Error::PathEscape {
            path: name.to_string(),
        };

        let mut resolved = self.root.clone();
        for comp in Path::new(name).components() {
            match comp {
                Component::Normal(part) => resolved.push(part),
                Component::ParentDir => {
                    if resolved == self.root {
                        return Err(escape());
                    }
                    resolved.pop();
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }

        if let Ok(real) = resolved.canonicalize() {
            return if real.starts_with(&self.root) {
                Ok(real)
            } else {
                Err(escape())
            };
        }

        // Missing names still resolve, but the deepest existing ancestor must
        // stay inside so a symlinked directory cannot reveal what lies beyond.
        if !self.existing_ancestor_inside(&resolved) {
            return Err(escape());
        }
        Ok(resolved)
    }

    fn existing_ancestor_inside(&self, path: &Path) -> bool {
        path.ancestors()
            .find_map(|ancestor| ancestor.canonicalize().ok())
            .is_some_and(|real| real.starts_with(&self.root))
    }
}
