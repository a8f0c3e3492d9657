//! 测试用的内存远端

use super::{FsEntry, PendingTask, RemoteFs};
use crate::core::path::{normalize, parent};
use crate::error::ApiError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub(crate) struct State {
    pub files: BTreeMap<String, i64>,
    pub dirs: BTreeSet<String>,
    pub tasks: Vec<PendingTask>,
    pub mkdir_calls: Vec<String>,
    pub copy_calls: Vec<(String, String, String)>,
    pub list_calls: Vec<String>,
    pub task_list_calls: usize,
    pub fail_mkdir: HashSet<String>,
    /// mkdir 返回指定的错误信息
    pub mkdir_errors: BTreeMap<String, String>,
    pub fail_copy: HashSet<String>,
    pub fail_list: HashSet<String>,
    /// 父目录里可见，但列出时报不存在
    pub vanished: HashSet<String>,
    pub fail_tasks: bool,
    /// 第 N 次（从 1 计）拉取任务列表时失败
    pub fail_task_calls: HashSet<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryFs {
    pub state: Mutex<State>,
}

fn status(api: &str, message: &str) -> ApiError {
    ApiError::Status {
        api: api.to_string(),
        code: 500,
        message: message.to_string(),
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.state.lock().unwrap().dirs.insert("/".to_string());
        fs
    }

    /// 写入文件，自动补齐父目录
    pub fn with_file(self, path: &str, size: i64) -> Self {
        let path = normalize(path);
        self.add_dir(&parent(&path));
        self.state.lock().unwrap().files.insert(path, size);
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        self.add_dir(path);
        self
    }

    pub fn with_task(self, name: &str) -> Self {
        self.state.lock().unwrap().tasks.push(PendingTask {
            name: name.to_string(),
        });
        self
    }

    fn add_dir(&self, path: &str) {
        let mut dir = normalize(path);
        let mut state = self.state.lock().unwrap();
        loop {
            state.dirs.insert(dir.clone());
            if dir == "/" {
                break;
            }
            dir = parent(&dir);
        }
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl RemoteFs for MemoryFs {
    async fn list_all(&self, path: &str) -> Result<Vec<FsEntry>, ApiError> {
        let path = normalize(path);
        let mut state = self.state.lock().unwrap();
        state.list_calls.push(path.clone());
        if state.fail_list.contains(&path) {
            return Err(status("/api/fs/list", "storage unavailable"));
        }
        if !state.dirs.contains(&path) || state.vanished.contains(&path) {
            return Err(status("/api/fs/list", "object not found"));
        }

        let mut entries: Vec<FsEntry> = state
            .dirs
            .iter()
            .filter(|d| d.as_str() != "/" && parent(d) == path)
            .map(|d| FsEntry {
                name: d.rsplit('/').next().unwrap_or_default().to_string(),
                size: 0,
                is_dir: true,
            })
            .collect();
        entries.extend(
            state
                .files
                .iter()
                .filter(|(f, _)| parent(f) == path)
                .map(|(f, size)| FsEntry {
                    name: f.rsplit('/').next().unwrap_or_default().to_string(),
                    size: *size,
                    is_dir: false,
                }),
        );
        Ok(entries)
    }

    async fn mkdir(&self, path: &str) -> Result<(), ApiError> {
        let path = normalize(path);
        let mut state = self.state.lock().unwrap();
        state.mkdir_calls.push(path.clone());
        if let Some(message) = state.mkdir_errors.get(&path) {
            return Err(status("/api/fs/mkdir", message));
        }
        if state.fail_mkdir.contains(&path) {
            return Err(status("/api/fs/mkdir", "permission denied"));
        }
        if state.dirs.contains(&path) {
            return Err(status("/api/fs/mkdir", "file already exists"));
        }
        if !state.dirs.contains(&parent(&path)) {
            return Err(status("/api/fs/mkdir", "parent not found"));
        }
        state.dirs.insert(path);
        Ok(())
    }

    async fn copy_file(
        &self,
        src_dir: &str,
        dst_dir: &str,
        name: &str,
        _overwrite: bool,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state
            .copy_calls
            .push((normalize(src_dir), normalize(dst_dir), name.to_string()));
        if state.fail_copy.contains(name) {
            return Err(status("/api/fs/copy", "copy rejected"));
        }
        Ok(())
    }

    async fn list_undone_copy_tasks(&self) -> Result<Vec<PendingTask>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.task_list_calls += 1;
        if state.fail_tasks || state.fail_task_calls.contains(&state.task_list_calls) {
            return Err(status("/api/admin/task/copy/undone", "task manager busy"));
        }
        Ok(state.tasks.clone())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
