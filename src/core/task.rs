//! 未完成复制任务的去重
//!
//! OpenList 的复制任务名形如 `copy [srcMount](srcActual) to [dstMount](dstActual)`，
//! 其中路径有时相对于用户的 base path，有时相对于存储根目录。

use crate::core::path::{clean, normalize};
use crate::error::ApiError;
use crate::storage::{cancellable, PendingTask, RemoteFs};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;

fn copy_task_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^copy \[(.+)\]\((.+)\) to \[(.+)\]\((.+)\)$").expect("copy task regex")
    })
}

/// 归一化后的 `srcFile->dstDir`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn build_task_key(src_file: &str, dst_dir: &str) -> TaskKey {
    TaskKey(format!("{}->{}", normalize(src_file), normalize(dst_dir)))
}

/// 解析复制任务名，格式不符时返回 `None`
pub fn parse_copy_task_key(task_name: &str) -> Option<TaskKey> {
    let caps = copy_task_name_re().captures(task_name.trim())?;
    let src = join_mount_and_actual(&caps[1], &caps[2]);
    let dst = join_mount_and_actual(&caps[3], &caps[4]);
    Some(build_task_key(&src, &dst))
}

fn join_mount_and_actual(mount_path: &str, actual_path: &str) -> String {
    let mount_path = normalize(mount_path);
    let actual_path = actual_path.trim();
    let actual_path = if actual_path.starts_with('/') {
        clean(actual_path)
    } else {
        clean(&format!("/{}", actual_path))
    };

    if mount_path == "/" {
        return actual_path;
    }
    if actual_path == "/" {
        return mount_path;
    }
    normalize(&format!(
        "{}/{}",
        mount_path.trim_end_matches('/'),
        actual_path.trim_start_matches('/')
    ))
}

/// 给路径加上 base path，已以 base path 开头的保持不变
fn with_base_path(path: &str, base_path: &str) -> String {
    let path = normalize(path);
    if path.starts_with(base_path) {
        return path;
    }
    normalize(&format!("{}{}", base_path, path))
}

/// 计算候选复制对应的可接受任务 key
pub struct TaskMatcher {
    base_path: Option<String>,
}

impl TaskMatcher {
    /// `base_path` 为空或 `/` 时只使用字面 key
    pub fn new(base_path: &str) -> Self {
        let base_path = normalize(base_path);
        Self {
            base_path: (base_path != "/").then_some(base_path),
        }
    }

    pub fn candidate_keys(&self, src_file: &str, dst_dir: &str) -> Vec<TaskKey> {
        let mut keys = vec![build_task_key(src_file, dst_dir)];
        if let Some(base) = &self.base_path {
            let prefixed = build_task_key(
                &with_base_path(src_file, base),
                &with_base_path(dst_dir, base),
            );
            if !keys.contains(&prefixed) {
                keys.push(prefixed);
            }
        }
        keys
    }

    /// 实时拉取任务列表并检查是否已有等价的复制任务
    pub async fn has_same_undone_copy_task(
        &self,
        fs: &dyn RemoteFs,
        cancel: &CancellationToken,
        src_file: &str,
        dst_dir: &str,
    ) -> Result<bool, ApiError> {
        let tasks = cancellable(cancel, fs.list_undone_copy_tasks()).await?;
        let pending = PendingCopyTasks::from_tasks(&tasks);
        Ok(pending.contains_any(&self.candidate_keys(src_file, dst_dir)))
    }
}

/// 一次拉取的未完成复制任务 key 集合
#[derive(Debug, Default)]
pub struct PendingCopyTasks {
    keys: HashSet<TaskKey>,
}

impl PendingCopyTasks {
    /// 非复制类的任务名直接忽略
    pub fn from_tasks(tasks: &[PendingTask]) -> Self {
        Self {
            keys: tasks
                .iter()
                .filter_map(|t| parse_copy_task_key(&t.name))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains_any(&self, keys: &[TaskKey]) -> bool {
        keys.iter().any(|k| self.keys.contains(k))
    }
}
