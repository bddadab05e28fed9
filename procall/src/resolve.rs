//! Command path resolution.
//!
//! Maps a bare command name to an executable on `PATH`. Names that already
//! contain a directory component are checked in place and never searched.

use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Locate `name` using the current process `PATH`.
pub fn which(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH");
    which_in(name, path.as_deref())
}

/// Locate `name` using an explicit `PATH`-style search list.
///
/// Returns `None` when the search list is absent or nothing qualifies.
pub fn which_in(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    std::env::split_paths(search_path?)
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

/// Resolve a command name, falling back to a hyphenated spelling.
///
/// `git_log` resolves to `git-log` when no `git_log` binary exists.
pub fn resolve_command(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH");
    resolve_command_in(name, path.as_deref())
}

/// [`resolve_command`] against an explicit search list.
pub fn resolve_command_in(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    which_in(name, search_path).or_else(|| {
        if name.contains('_') {
            which_in(&name.replace('_', "-"), search_path)
        } else {
            None
        }
    })
}

/// A regular file (after following symlinks) with an execute bit set.
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;
    use tempfile::TempDir;

    fn make_file(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn search_list(dirs: &[&Path]) -> OsString {
        std::env::join_paths(dirs).unwrap()
    }

    #[test]
    fn test_finds_executable_on_path() {
        let dir = TempDir::new().unwrap();
        let exe = make_file(dir.path(), "tool", 0o755);
        let path = search_list(&[dir.path()]);

        assert_eq!(which_in("tool", Some(&path)), Some(exe));
    }

    #[test]
    fn test_first_directory_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let expected = make_file(first.path(), "tool", 0o755);
        make_file(second.path(), "tool", 0o755);
        let path = search_list(&[first.path(), second.path()]);

        assert_eq!(which_in("tool", Some(&path)), Some(expected));
    }

    #[test]
    fn test_skips_non_executable_and_directories() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        make_file(first.path(), "tool", 0o644);
        fs::create_dir(second.path().join("tool")).unwrap();
        let path = search_list(&[first.path(), second.path()]);

        assert_eq!(which_in("tool", Some(&path)), None);
    }

    #[test]
    fn test_path_with_separator_is_checked_directly() {
        let dir = TempDir::new().unwrap();
        let exe = make_file(dir.path(), "direct", 0o700);
        let name = exe.to_str().unwrap();

        // Not found on the (empty) search list, but the path itself qualifies.
        assert_eq!(which_in(name, None), Some(exe.clone()));

        let missing = dir.path().join("missing");
        assert_eq!(which_in(missing.to_str().unwrap(), None), None);
    }

    #[test]
    fn test_follows_symlinks() {
        let dir = TempDir::new().unwrap();
        let exe = make_file(dir.path(), "real", 0o755);
        let link = dir.path().join("alias");
        std::os::unix::fs::symlink(&exe, &link).unwrap();
        let path = search_list(&[dir.path()]);

        assert_eq!(which_in("alias", Some(&path)), Some(link));
    }

    #[test]
    fn test_missing_path_variable() {
        assert_eq!(which_in("sh", None), None);
        assert_eq!(which_in("", None), None);
    }

    #[test]
    fn test_underscore_fallback() {
        let dir = TempDir::new().unwrap();
        let exe = make_file(dir.path(), "git-log", 0o755);
        let path = search_list(&[dir.path()]);

        assert_eq!(resolve_command_in("git_log", Some(&path)), Some(exe));
        assert_eq!(resolve_command_in("git-log-extra", Some(&path)), None);
    }

    #[test]
    fn test_literal_name_preferred_over_fallback() {
        let dir = TempDir::new().unwrap();
        let literal = make_file(dir.path(), "my_tool", 0o755);
        make_file(dir.path(), "my-tool", 0o755);
        let path = search_list(&[dir.path()]);

        assert_eq!(resolve_command_in("my_tool", Some(&path)), Some(literal));
    }

    #[test]
    fn test_resolves_system_shell() {
        assert!(which("sh").is_some());
    }
}
