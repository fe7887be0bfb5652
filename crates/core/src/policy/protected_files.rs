// Protected-file guard (spec §4.6). Every filesystem-mutating tool resolves
// its target to an absolute, symlink-resolved path and rejects anything
// under a protected prefix. The policy kernel's own source and the vault
// files are always protected regardless of user configuration.

use crate::atoms::error::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// Paths that are protected no matter what the user configures. Enforced in
/// addition to (never instead of) `Config::protected_paths`.
pub const MANDATORY_PROTECTED_PATHS: &[&str] = &["./data/vault.enc", "./data/vault.salt", "./data/agent.db"];

pub fn is_protected(target: &Path, protected_prefixes: &[String]) -> bool {
    let resolved = resolve_best_effort(target);
    protected_prefixes.iter().any(|prefix| {
        let prefix_resolved = resolve_best_effort(Path::new(prefix));
        resolved.starts_with(&prefix_resolved)
    })
}

pub fn check_write(target: &Path, protected_prefixes: &[String]) -> CoreResult<()> {
    if is_protected(target, protected_prefixes) {
        Err(CoreError::Permission(format!(
            "refusing to modify protected path: {}",
            target.display()
        )))
    } else {
        Ok(())
    }
}

/// Best-effort absolute-path resolution: canonicalize if the path exists,
/// otherwise normalize lexically against the current directory so
/// not-yet-created files still compare correctly against a prefix.
fn resolve_best_effort(path: &Path) -> PathBuf {
    if let Ok(canon) = path.canonicalize() {
        return canon;
    }
    let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    let joined = if path.is_absolute() { path.to_path_buf() } else { base.join(path) };
    normalize_lexically(&joined)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_exact_and_nested_matches() {
        let prefixes = vec!["/home/owner/secrets".to_string()];
        assert!(is_protected(Path::new("/home/owner/secrets/key.pem"), &prefixes));
        assert!(is_protected(Path::new("/home/owner/secrets"), &prefixes));
    }

    #[test]
    fn allows_sibling_paths() {
        let prefixes = vec!["/home/owner/secrets".to_string()];
        assert!(!is_protected(Path::new("/home/owner/secrets-backup"), &prefixes));
        assert!(!is_protected(Path::new("/home/owner/public/notes.md"), &prefixes));
    }

    #[test]
    fn dot_dot_cannot_escape_the_check() {
        let prefixes = vec!["/home/owner/secrets".to_string()];
        let sneaky = Path::new("/home/owner/public/../secrets/key.pem");
        assert!(is_protected(sneaky, &prefixes));
    }

    #[test]
    fn check_write_returns_permission_error() {
        let prefixes = vec!["/protected".to_string()];
        let err = check_write(Path::new("/protected/x"), &prefixes).unwrap_err();
        matches!(err, CoreError::Permission(_));
    }
}
