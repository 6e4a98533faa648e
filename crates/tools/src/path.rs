//! Workspace path confinement for file-writing tools.
//!
//! Relative paths are resolved against the workspace root. The result must
//! stay under that root and must not fall under a forbidden prefix.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("Path '{path}' is empty")]
    Empty { path: String },

    #[error("Path traversal detected in '{path}'")]
    Traversal { path: String },

    #[error("Path '{path}' is outside the workspace")]
    OutsideWorkspace { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    Forbidden { path: String, pattern: String },
}

/// Resolve `requested` inside `workspace`.
///
/// `..` components are rejected outright rather than normalized, so a path
/// never climbs out and back in. The workspace itself is canonicalized when
/// it exists so symlinked roots compare correctly.
pub fn resolve_in_workspace(
    workspace: &Path,
    requested: &str,
    forbidden_paths: &[String],
) -> Result<PathBuf, PathError> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(PathError::Empty {
            path: requested.into(),
        });
    }

    let input = Path::new(trimmed);
    if input.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(PathError::Traversal {
            path: requested.into(),
        });
    }

    let root = workspace
        .canonicalize()
        .unwrap_or_else(|_| workspace.to_path_buf());

    let resolved = if input.is_absolute() {
        input.to_path_buf()
    } else {
        root.join(input)
    };

    if !resolved.starts_with(&root) {
        return Err(PathError::OutsideWorkspace {
            path: requested.into(),
        });
    }

    let normalized = normalize(&resolved);
    for pattern in forbidden_paths {
        let prefix = normalize(Path::new(&expand_tilde(pattern)));
        if !prefix.is_empty() && path_has_prefix(&normalized, &prefix) {
            return Err(PathError::Forbidden {
                path: requested.into(),
                pattern: pattern.clone(),
            });
        }
    }

    Ok(resolved)
}

/// Lowercased, forward-slashed form used for prefix comparison.
fn normalize(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .trim_end_matches('/')
        .to_lowercase()
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_joins_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_in_workspace(dir.path(), "src/main.rs", &[]).unwrap();
        assert!(resolved.ends_with("src/main.rs"));
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["../escape.txt", "a/../../b", ".."] {
            assert!(
                matches!(
                    resolve_in_workspace(dir.path(), bad, &[]),
                    Err(PathError::Traversal { .. })
                ),
                "{bad}"
            );
        }
    }

    #[test]
    fn absolute_path_outside_workspace_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolve_in_workspace(dir.path(), "/etc/passwd", &[]);
        assert!(matches!(result, Err(PathError::OutsideWorkspace { .. })));
    }

    #[test]
    fn absolute_path_inside_workspace_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let inside = root.join("index.html");
        let resolved = resolve_in_workspace(dir.path(), inside.to_str().unwrap(), &[]).unwrap();
        assert_eq!(resolved, inside);
    }

    #[test]
    fn forbidden_prefix_inside_workspace_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let secrets = root.join("secrets").to_string_lossy().to_string();
        let result = resolve_in_workspace(dir.path(), "secrets/key.pem", &[secrets.clone()]);
        assert!(matches!(result, Err(PathError::Forbidden { pattern, .. }) if pattern == secrets));

        // A sibling sharing the prefix text is not under it
        assert!(resolve_in_workspace(dir.path(), "secrets-public/a.txt", &[secrets]).is_ok());
    }

    #[test]
    fn empty_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_in_workspace(dir.path(), "  ", &[]),
            Err(PathError::Empty { .. })
        ));
    }
}
