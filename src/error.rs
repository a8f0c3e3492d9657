//! 错误类型

use crate::core::engine::SyncReport;
use thiserror::Error;

/// 远端 API 调用失败
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("marshal request body: {0}")]
    Encode(serde_json::Error),

    #[error("decode response failed, status={status} body={body:?}")]
    Envelope { status: u16, body: String },

    /// 响应 code 非 200
    #[error("api {api} failed: code={code} message={message}")]
    Status {
        api: String,
        code: i64,
        message: String,
    },

    #[error("decode response data for {api}: {source}")]
    Data {
        api: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    /// 远端只通过 message 文本区分“不存在”
    pub fn is_not_found(&self) -> bool {
        self.to_string().to_lowercase().contains("not found")
    }

    /// mkdir 时目录已存在，"does not exist" 之类不算
    pub fn is_already_exists(&self) -> bool {
        self.to_string().to_lowercase().contains("already exist")
    }
}

/// 同步流程中的错误
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0}")]
    Config(String),

    #[error("invalid blacklist pattern: {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// 列目录失败，带上出错的绝对路径
    #[error("list {dir}: {source}")]
    Scan {
        dir: String,
        #[source]
        source: ApiError,
    },

    #[error("scan source failed: {0}")]
    ScanSource(#[source] Box<SyncError>),

    #[error("scan target failed: {0}")]
    ScanTarget(#[source] Box<SyncError>),

    #[error("create target dir failed: {dir}: {source}")]
    CreateTarget {
        dir: String,
        #[source]
        source: ApiError,
    },

    #[error("sync cancelled")]
    Cancelled,

    /// 有计划项失败，其余项已尽力处理
    #[error("sync finished with {failed} failed items")]
    Failed {
        failed: usize,
        report: Box<SyncReport>,
    },
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::Scan { source, .. } | SyncError::CreateTarget { source, .. } => {
                source.is_not_found()
            }
            SyncError::ScanSource(inner) | SyncError::ScanTarget(inner) => inner.is_not_found(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            SyncError::Cancelled => true,
            SyncError::Scan { source, .. } | SyncError::CreateTarget { source, .. } => {
                matches!(source, ApiError::Cancelled)
            }
            SyncError::ScanSource(inner) | SyncError::ScanTarget(inner) => inner.is_cancelled(),
            _ => false,
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
