use anyhow::Context;
use clap::Parser;
use olsync_lib::config::{self, FileConfig, Settings, DEFAULT_CONFIG_FILE};
use olsync_lib::logging::{self, LogLevel};
use olsync_lib::{SyncConfig, SyncEngine, SyncError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;

/// 配置、参数或 token 错误
const EXIT_CONFIG: u8 = 2;
/// 同步失败（含部分失败和取消）
const EXIT_FAILED: u8 = 1;

/// 将 OpenList 中的源目录增量同步到目标目录
#[derive(Debug, Parser)]
#[command(name = "olsync", version, about)]
struct Cli {
    /// path to JSON config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// OpenList base URL
    #[arg(long)]
    base_url: Option<String>,

    /// path to token file
    #[arg(long, value_name = "PATH")]
    token_file: Option<PathBuf>,

    /// source directory path in OpenList
    #[arg(long)]
    src: Option<String>,

    /// destination directory path in OpenList
    #[arg(long)]
    dst: Option<String>,

    /// blacklist wildcard pattern, repeatable or comma-separated
    #[arg(long = "exclude", value_name = "PATTERN")]
    excludes: Vec<String>,

    /// log level: debug, info, error
    #[arg(long)]
    log_level: Option<String>,

    /// append logs to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// list API page size
    #[arg(long, allow_negative_numbers = true)]
    per_page: Option<i64>,

    /// copy only when src-dst size diff is >= this value (KiB)
    #[arg(long, value_name = "KIB", allow_negative_numbers = true)]
    min_size_diff: Option<i64>,

    /// HTTP timeout, e.g. 30s or 1m
    #[arg(long, value_parser = config::parse_duration)]
    timeout: Option<Duration>,

    /// plan only, do not submit copy
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    dry_run: Option<bool>,

    /// per-user base path used when matching pending task names
    #[arg(long)]
    base_path: Option<String>,

    /// re-fetch pending copy tasks before every submission
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    refresh_tasks: Option<bool>,
}

impl Cli {
    /// 默认值 <- 配置文件 <- 命令行
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = Settings::default();

        let config_path = self
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if self.config.is_some() || config_path.exists() {
            settings.apply_file(FileConfig::load(&config_path)?)?;
        }

        if let Some(v) = &self.base_url {
            settings.base_url = v.clone();
        }
        if let Some(v) = &self.token_file {
            settings.token_file = v.clone();
        }
        if let Some(v) = &self.src {
            settings.src = v.clone();
        }
        if let Some(v) = &self.dst {
            settings.dst = v.clone();
        }
        for v in &self.excludes {
            settings.excludes.extend(config::split_patterns(v));
        }
        if let Some(v) = &self.log_level {
            settings.log_level = v.clone();
        }
        if let Some(v) = &self.log_file {
            settings.log_file = Some(v.clone());
        }
        if let Some(v) = self.per_page {
            settings.per_page = v;
        }
        if let Some(v) = self.min_size_diff {
            settings.min_size_diff = v;
        }
        if let Some(v) = self.timeout {
            settings.timeout = v;
        }
        if let Some(v) = self.dry_run {
            settings.dry_run = v;
        }
        if let Some(v) = &self.base_path {
            settings.base_path = v.clone();
        }
        if let Some(v) = self.refresh_tasks {
            settings.refresh_tasks = v;
        }
        Ok(settings)
    }
}

/// 解析参数、读取 token 并建立日志输出
fn prepare(cli: &Cli) -> anyhow::Result<(SyncConfig, Option<WorkerGuard>)> {
    let mut settings = cli.settings()?;
    let level = settings.validate()?;
    let token = config::read_token(&settings.token_file)?;

    let (dispatch, guard) = match &settings.log_file {
        Some(path) => {
            let (dispatch, guard) = logging::file_dispatch(level, path)
                .with_context(|| format!("open log file {}", path.display()))?;
            (dispatch, Some(guard))
        }
        None => (logging::stdout_dispatch(level), None),
    };

    Ok((settings.into_sync_config(token, dispatch)?, guard))
}

fn report_error(err: &dyn std::fmt::Display) {
    let dispatch = logging::build_dispatch(LogLevel::Error, std::io::stderr, true);
    tracing::dispatcher::with_default(&dispatch, || tracing::error!("{}", err));
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, _guard) = match prepare(&cli) {
        Ok(v) => v,
        Err(e) => {
            report_error(&format!("{:#}", e));
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let engine = match SyncEngine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            report_error(&e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    match engine.run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e @ SyncError::Config(_)) | Err(e @ SyncError::InvalidPattern { .. }) => {
            report_error(&e);
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e) => {
            report_error(&e);
            ExitCode::from(EXIT_FAILED)
        }
    }
}
