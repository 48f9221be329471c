//! Config path resolution and drive-letter translation.
//!
//! The supervised binary runs on a POSIX-style runtime layered over a
//! drive-letter filesystem, so `D:\cfg\x.conf` has to reach it as
//! `/mnt/d/cfg/x.conf`. Translation is a pure string function; only
//! resolution of relative paths consults the current directory, and
//! never the filesystem contents.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path contains a NUL byte: {0:?}")]
    InvalidCharacter(String),

    #[error("path escapes its root: {0}")]
    EscapesRoot(String),

    #[error("cannot make {0} absolute: {1}")]
    NotAbsolute(String, String),
}

/// Outcome of resolving a config path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Absolute path in host syntax
    pub absolute: PathBuf,
    /// Same path in the child's POSIX syntax
    pub translated: String,
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    mount_root: String,
}

impl PathResolver {
    pub fn new(mount_root: impl Into<String>) -> Self {
        Self {
            mount_root: mount_root.into(),
        }
    }

    /// Resolve `raw` against `base` and derive the translated form.
    ///
    /// Absolute inputs are kept as they are; relative ones are joined with
    /// `base` and `.`/`..` segments are folded away lexically.
    ///
    /// A `..` that would climb above the root is rejected with
    /// [`PathError::EscapesRoot`]; it is never clamped at the root the way
    /// POSIX treats `/..`.
    pub fn resolve(
        &self,
        raw: impl AsRef<Path>,
        base: impl AsRef<Path>,
    ) -> Result<ResolvedPath, PathError> {
        let raw = raw.as_ref();
        let text = raw.to_string_lossy();
        check_syntax(&text)?;

        let absolute = if has_drive_prefix(&text) || raw.is_absolute() {
            raw.to_path_buf()
        } else {
            let base = base.as_ref();
            let base_text = base.to_string_lossy();
            check_syntax(&base_text)?;

            if has_drive_prefix(&base_text) {
                PathBuf::from(normalize_drive_path(&format!("{base_text}\\{text}"))?)
            } else {
                let base = std::path::absolute(base).map_err(|e| {
                    PathError::NotAbsolute(base_text.to_string(), e.to_string())
                })?;
                normalize_native(&base.join(raw))?
            }
        };

        let translated = self.translate(&absolute.to_string_lossy());
        Ok(ResolvedPath {
            absolute,
            translated,
        })
    }

    /// Rewrite `X:\a\b` as `<mount_root>/x/a/b`. Paths without a drive
    /// letter are returned unchanged.
    pub fn translate(&self, absolute: &str) -> String {
        if !has_drive_prefix(absolute) {
            return absolute.to_string();
        }

        let drive = absolute[..1].to_ascii_lowercase();
        let rest = absolute[2..].replace('\\', "/");
        let mut translated = format!("{}/{drive}", self.mount_root.trim_end_matches('/'));
        if rest != "/" {
            translated.push_str(&rest);
        }
        translated
    }
}

/// `X:` followed by a separator or nothing
pub fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'\\' || bytes[2] == b'/')
}

fn check_syntax(text: &str) -> Result<(), PathError> {
    if text.is_empty() {
        return Err(PathError::Empty);
    }
    if text.contains('\0') {
        return Err(PathError::InvalidCharacter(text.replace('\0', "\\0")));
    }
    Ok(())
}

fn normalize_drive_path(text: &str) -> Result<String, PathError> {
    let (drive, rest) = text.split_at(2);
    let mut segments: Vec<&str> = Vec::new();

    for segment in rest.split(['\\', '/']) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::EscapesRoot(text.to_string()));
                }
            }
            other => segments.push(other),
        }
    }

    Ok(format!("{drive}\\{}", segments.join("\\")))
}

fn normalize_native(path: &Path) -> Result<PathBuf, PathError> {
    let mut normalized = PathBuf::new();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(PathError::EscapesRoot(path.display().to_string()));
                }
                normalized.pop();
                depth -= 1;
            }
            Component::Normal(segment) => {
                normalized.push(segment);
                depth += 1;
            }
        }
    }

    Ok(normalized)
}
