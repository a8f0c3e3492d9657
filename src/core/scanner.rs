use crate::core::filter::PathFilter;
use crate::core::path::{join_rel, join_root};
use crate::error::{Result, SyncError};
use crate::storage::{cancellable, RemoteFs};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 目录树快照
///
/// key 均为相对扫描根目录的路径，`""` 表示根目录本身，始终在 `dirs` 中。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSnapshot {
    pub files: BTreeMap<String, i64>,
    pub dirs: BTreeSet<String>,
}

impl TreeSnapshot {
    /// 只含根目录的空快照
    pub fn empty() -> Self {
        Self {
            files: BTreeMap::new(),
            dirs: BTreeSet::from([String::new()]),
        }
    }
}

impl Default for TreeSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// 远端目录扫描器，按广度优先遍历
pub struct TreeScanner<'a> {
    fs: &'a dyn RemoteFs,
    filter: &'a PathFilter,
    cancel: &'a CancellationToken,
}

impl<'a> TreeScanner<'a> {
    pub fn new(fs: &'a dyn RemoteFs, filter: &'a PathFilter, cancel: &'a CancellationToken) -> Self {
        Self { fs, filter, cancel }
    }

    /// 扫描 `root` 并返回快照
    ///
    /// 命中黑名单的条目既不记录也不入队，目录命中时整个子树被剪掉。
    pub async fn scan(&self, root: &str) -> Result<TreeSnapshot> {
        let mut snap = TreeSnapshot::empty();
        let mut queue = VecDeque::from([String::new()]);
        let mut excluded = 0usize;

        while let Some(rel_dir) = queue.pop_front() {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let abs_dir = join_root(root, &rel_dir);
            debug!("scanning directory: {}", abs_dir);

            let entries = cancellable(self.cancel, self.fs.list_all(&abs_dir))
                .await
                .map_err(|source| SyncError::Scan {
                    dir: abs_dir.clone(),
                    source,
                })?;

            for entry in entries {
                let rel_path = join_rel(&rel_dir, &entry.name);
                if self.filter.is_match(&rel_path) {
                    debug!("skip by blacklist: {}", rel_path);
                    excluded += 1;
                    continue;
                }
                if entry.is_dir {
                    snap.dirs.insert(rel_path.clone());
                    queue.push_back(rel_path);
                    continue;
                }
                snap.files.insert(rel_path, entry.size);
            }
        }

        info!(
            "scan {} done: {} files, {} dirs, {} excluded",
            root,
            snap.files.len(),
            snap.dirs.len() - 1,
            excluded
        );
        Ok(snap)
    }
}
