use crate::core::path::{join_root, normalize, parent};
use crate::error::ApiError;
use crate::storage::{cancellable, RemoteFs};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 已确认存在的目标目录（绝对路径）
#[derive(Debug, Default, Clone)]
pub struct KnownDirs {
    dirs: HashSet<String>,
}

impl KnownDirs {
    /// 由目标快照的目录集合和目标根目录初始化
    pub fn seeded<'a, I>(root: &str, rel_dirs: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut dirs: HashSet<String> = rel_dirs.into_iter().map(|rel| join_root(root, rel)).collect();
        dirs.insert(normalize(root));
        Self { dirs }
    }

    pub fn contains(&self, abs_dir: &str) -> bool {
        self.dirs.contains(abs_dir)
    }

    pub fn insert(&mut self, abs_dir: String) {
        self.dirs.insert(abs_dir);
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

/// 确保目录及其所有祖先存在
///
/// 向上找到第一个已知祖先，再自顶向下逐级创建。“已存在”错误视为成功，
/// 每个创建成功的目录都会记入 `known`。
pub async fn ensure_dir(
    fs: &dyn RemoteFs,
    cancel: &CancellationToken,
    abs_dir: &str,
    known: &mut KnownDirs,
) -> Result<(), ApiError> {
    let mut chain = Vec::new();
    let mut current = normalize(abs_dir);
    while !known.contains(&current) {
        let up = parent(&current);
        let at_root = up == current;
        chain.push(current);
        if at_root {
            break;
        }
        current = up;
    }

    while let Some(dir) = chain.pop() {
        debug!("mkdir {}", dir);
        if let Err(err) = cancellable(cancel, fs.mkdir(&dir)).await {
            if !err.is_already_exists() {
                return Err(err);
            }
            debug!("dir already exists: {}", dir);
        }
        known.insert(dir);
    }
    Ok(())
}
