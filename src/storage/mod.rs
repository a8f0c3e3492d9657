pub mod openlist;

#[cfg(test)]
pub(crate) mod memory;

use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio_util::sync::CancellationToken;

pub use openlist::OpenListClient;

// ============ 公共常量 ============

/// HTTP 请求默认超时（秒）
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// 目录项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEntry {
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub is_dir: bool,
}

/// 未完成的复制任务，只有远端给出的任务名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTask {
    pub name: String,
}

/// 远端目录树的访问接口
///
/// 源和目标都只能通过这组调用访问，没有本地文件系统。
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// 列出目录下的全部条目（内部处理分页）
    async fn list_all(&self, path: &str) -> Result<Vec<FsEntry>, ApiError>;

    /// 创建目录
    async fn mkdir(&self, path: &str) -> Result<(), ApiError>;

    /// 提交复制任务，远端异步执行
    async fn copy_file(
        &self,
        src_dir: &str,
        dst_dir: &str,
        name: &str,
        overwrite: bool,
    ) -> Result<(), ApiError>;

    /// 列出未完成的复制任务
    async fn list_undone_copy_tasks(&self) -> Result<Vec<PendingTask>, ApiError>;

    /// 用于日志
    fn name(&self) -> &str;
}

/// 在取消令牌触发时中止远端调用
pub async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        result = call => result,
    }
}
