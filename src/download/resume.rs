//! 断点续传判定：决定某一页是否需要重新下载。

use std::path::{Path, PathBuf};

/// 第 `index` 页（0 起始）在输出目录中的文件：`<index + 1>.jpg`。
pub fn page_path(output_dir: &Path, index: usize) -> PathBuf {
    output_dir.join(format!("{}.jpg", index + 1))
}

pub trait ResumePolicy {
    fn should_fetch(&self, output_dir: &Path, index: usize) -> bool;
}

/// 以“下一页文件是否存在”作为当前页写入完整的依据。
///
/// 下载严格按页码递增进行，中断时最多只有正在写的那一页处于未知状态，
/// 而它的下一页还没开始写。所以：
/// - 当前页不存在：下载；
/// - 当前页存在但下一页不存在：当前页可能被截断，重新下载；
/// - 两页都存在：跳过。
///
/// 局限：这只是启发式判断，不校验内容。若某次运行截断了第 N 页，而更早
/// 的一次运行已经写好了第 N+1 页，第 N 页会被当作完整而跳过。需要更强
/// 的校验（远端给出的大小或校验和）时，实现另一个 [`ResumePolicy`] 即可。
#[derive(Debug, Clone, Copy, Default)]
pub struct NextPageSentinel {
    pub force_redownload: bool,
}

impl NextPageSentinel {
    pub fn new(force_redownload: bool) -> Self {
        Self { force_redownload }
    }
}

impl ResumePolicy for NextPageSentinel {
    fn should_fetch(&self, output_dir: &Path, index: usize) -> bool {
        if self.force_redownload {
            return true;
        }
        let cur = page_path(output_dir, index);
        let next = page_path(output_dir, index + 1);
        !(cur.is_file() && next.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"\xff\xd8jpeg").unwrap();
    }

    #[test]
    fn page_files_are_one_based() {
        assert_eq!(page_path(Path::new("out"), 0), Path::new("out").join("1.jpg"));
        assert_eq!(page_path(Path::new("out"), 41), Path::new("out").join("42.jpg"));
    }

    #[test]
    fn missing_page_is_fetched() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NextPageSentinel::new(false).should_fetch(dir.path(), 4));
    }

    #[test]
    fn page_without_successor_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "5.jpg");
        assert!(NextPageSentinel::new(false).should_fetch(dir.path(), 4));
    }

    #[test]
    fn page_with_successor_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "5.jpg");
        touch(dir.path(), "6.jpg");
        assert!(!NextPageSentinel::new(false).should_fetch(dir.path(), 4));
    }

    #[test]
    fn force_redownload_ignores_disk_state() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "5.jpg");
        touch(dir.path(), "6.jpg");
        assert!(NextPageSentinel::new(true).should_fetch(dir.path(), 4));
    }

    #[test]
    fn successor_alone_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "6.jpg");
        assert!(NextPageSentinel::new(false).should_fetch(dir.path(), 4));
    }

    #[test]
    fn directory_named_like_a_page_is_not_a_page() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("5.jpg")).unwrap();
        touch(dir.path(), "6.jpg");
        assert!(NextPageSentinel::new(false).should_fetch(dir.path(), 4));
    }
}
