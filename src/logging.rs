//! 日志模块 - 日志级别和日志输出

use crate::error::SyncError;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

/// 日志级别，只支持 debug / info / error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Error => "error",
        }
    }

    pub fn level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = SyncError;

    /// 空字符串按 error 处理
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "error" | "" => Ok(LogLevel::Error),
            _ => Err(SyncError::Config(format!(
                "invalid log level: {} (allowed: debug, info, error)",
                s
            ))),
        }
    }
}

/// 构建日志输出
///
/// 返回的 `Dispatch` 由调用方显式传给同步引擎，不注册为全局 subscriber。
pub fn build_dispatch<W>(level: LogLevel, writer: W, ansi: bool) -> Dispatch
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let level = level.level_filter();
    let targets = Targets::new()
        .with_default(level)
        .with_target("hyper", level.min(LevelFilter::WARN))
        .with_target("reqwest", level.min(LevelFilter::WARN));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    Dispatch::new(tracing_subscriber::registry().with(fmt_layer).with(targets))
}

/// 输出到文件（追加，不轮转），guard 需持有到进程结束
pub fn file_dispatch(level: LogLevel, log_file: &Path) -> std::io::Result<(Dispatch, WorkerGuard)> {
    let dir = match log_file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = log_file.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid log file: {}", log_file.display()),
        )
    })?;
    std::fs::create_dir_all(dir)?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((build_dispatch(level, writer, false), guard))
}

/// 输出到 stdout
pub fn stdout_dispatch(level: LogLevel) -> Dispatch {
    build_dispatch(level, std::io::stdout, true)
}


#[cfg(test)]
mod tests {
    use super::capture::CaptureWriter;
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" INFO ".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("".parse::<LogLevel>().unwrap(), LogLevel::Error);
        let err = "warn".parse::<LogLevel>().unwrap_err();
        assert!(err.to_string().contains("allowed: debug, info, error"));
    }

    #[test]
    fn test_dispatch_filters_by_level() {
        let writer = CaptureWriter::default();
        let dispatch = build_dispatch(LogLevel::Info, writer.clone(), false);

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug!("hidden line");
            tracing::info!("visible line");
            tracing::error!("error line");
        });

        let out = writer.contents();
        assert!(!out.contains("hidden line"));
        assert!(out.contains("INFO"));
        assert!(out.contains("visible line"));
        assert!(out.contains("error line"));
    }

    #[test]
    fn test_file_dispatch_writes_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("sync.log");
        {
            let (dispatch, _guard) = file_dispatch(LogLevel::Debug, &path).unwrap();
            tracing::dispatcher::with_default(&dispatch, || {
                tracing::debug!("written to file");
            });
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("written to file"));
    }
}
