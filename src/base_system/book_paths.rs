use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::base_system::context::{Config, safe_fs_name};

pub fn book_folder_name(book_id: &str) -> String {
    safe_fs_name(book_id, "_", 120)
}

pub fn book_folder_path(config: &Config, book_id: &str) -> PathBuf {
    config.default_save_dir().join(book_folder_name(book_id))
}

/// 输出目录：显式指定的 `-d` 优先（支持 `~`），否则为 `save_path/<book_id>`。
pub fn resolve_output_dir(config: &Config, book_id: &str, explicit: Option<&str>) -> PathBuf {
    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => expand_user(raw),
        None => book_folder_path(config, book_id),
    }
}

pub fn expand_user(raw: &str) -> PathBuf {
    let rest = if raw == "~" {
        Some("")
    } else {
        raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\"))
    };
    match (rest, home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirState {
    Missing,
    Empty,
    NonEmpty,
}

pub fn inspect_dir(path: &Path) -> io::Result<DirState> {
    if !path.exists() {
        return Ok(DirState::Missing);
    }
    let mut entries = fs::read_dir(path)?;
    Ok(if entries.next().is_none() {
        DirState::Empty
    } else {
        DirState::NonEmpty
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_dir_is_named_after_book() {
        let mut config = Config::default();
        config.save_path = "/data/books".to_string();
        assert_eq!(
            resolve_output_dir(&config, "bookX", None),
            PathBuf::from("/data/books/bookX")
        );
        assert_eq!(
            resolve_output_dir(&config, "bookX", Some("  ")),
            PathBuf::from("/data/books/bookX")
        );
    }

    #[test]
    fn explicit_output_dir_wins() {
        let config = Config::default();
        assert_eq!(
            resolve_output_dir(&config, "bookX", Some("/tmp/pages")),
            PathBuf::from("/tmp/pages")
        );
    }

    #[test]
    fn dir_state_tracks_contents() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(inspect_dir(&missing).unwrap(), DirState::Missing);
        assert_eq!(inspect_dir(dir.path()).unwrap(), DirState::Empty);
        fs::write(dir.path().join("1.jpg"), b"x").unwrap();
        assert_eq!(inspect_dir(dir.path()).unwrap(), DirState::NonEmpty);
    }

    #[test]
    fn tilde_is_expanded_when_home_is_known() {
        let Some(home) = home_dir() else {
            return;
        };
        assert_eq!(expand_user("~"), home);
        assert_eq!(expand_user("~/scans"), home.join("scans"));
        assert_eq!(expand_user("~other/x"), PathBuf::from("~other/x"));
    }
}
