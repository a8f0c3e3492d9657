//! 应用配置模块

use crate::core::path::{normalize, normalize_base_url, DEFAULT_BASE_URL};
use crate::error::{Result, SyncError};
use crate::logging::LogLevel;
use crate::storage::DEFAULT_TIMEOUT_SECS;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Dispatch;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_TOKEN_FILE: &str = "token.txt";
pub const BYTES_PER_KIB: i64 = 1024;

/// 未完成任务列表的拉取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskRefresh {
    /// 提交循环开始前拉取一次
    #[default]
    Once,
    /// 每个计划项提交前重新拉取
    PerItem,
}

/// 同步引擎配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub base_url: String,
    pub token: String,
    pub src_dir: String,
    pub dst_dir: String,
    /// 黑名单通配规则
    pub blacklist: Vec<String>,
    /// 覆盖所需的最小字节差
    pub min_size_diff: i64,
    /// 列目录分页大小，0 表示由服务端决定
    pub per_page: i64,
    pub timeout: Duration,
    pub dry_run: bool,
    /// 用户 base path，用于匹配远端任务名中的两种路径写法
    pub base_path: String,
    pub task_refresh: TaskRefresh,
    /// 日志输出，默认丢弃
    pub dispatch: Dispatch,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: String::new(),
            src_dir: String::new(),
            dst_dir: String::new(),
            blacklist: Vec::new(),
            min_size_diff: 0,
            per_page: 0,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            dry_run: false,
            base_path: "/".to_string(),
            task_refresh: TaskRefresh::Once,
            dispatch: Dispatch::none(),
        }
    }
}

impl SyncConfig {
    /// 校验并规范化，失败时不应发出任何远端请求
    pub fn normalize(mut self) -> Result<Self> {
        self.token = self.token.trim().to_string();
        if self.token.is_empty() {
            return Err(SyncError::Config("token is empty".to_string()));
        }

        self.src_dir = self.src_dir.trim().to_string();
        self.dst_dir = self.dst_dir.trim().to_string();
        if self.src_dir.is_empty() || self.dst_dir.is_empty() {
            return Err(SyncError::Config("both src and dst are required".to_string()));
        }
        if self.per_page < 0 {
            return Err(SyncError::Config("per_page must be >= 0".to_string()));
        }
        if self.min_size_diff < 0 {
            return Err(SyncError::Config("min_size_diff must be >= 0".to_string()));
        }
        if self.timeout.is_zero() {
            self.timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        }

        self.base_url = normalize_base_url(&self.base_url);
        self.src_dir = normalize(&self.src_dir);
        self.dst_dir = normalize(&self.dst_dir);
        self.base_path = normalize(&self.base_path);
        Ok(self)
    }
}

/// 配置文件中的超时：秒数或 `30s` / `1m30s` 形式
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimeoutValue {
    Secs(u64),
    Text(String),
}

/// JSON 配置文件，所有字段可选
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub token_file: Option<PathBuf>,
    pub src: Option<String>,
    pub dst: Option<String>,
    pub blacklist: Option<Vec<String>>,
    /// KiB
    pub min_size_diff: Option<i64>,
    /// 旧字段，字节
    pub size_diff_threshold: Option<i64>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub per_page: Option<i64>,
    pub timeout: Option<TimeoutValue>,
    pub dry_run: Option<bool>,
    pub base_path: Option<String>,
    pub refresh_tasks: Option<bool>,
}

impl FileConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path).map_err(|e| {
            SyncError::Config(format!(
                "read config file failed ({}): {}",
                config_path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            SyncError::Config(format!(
                "parse config file failed ({}): {}",
                config_path.display(),
                e
            ))
        })
    }
}

/// 命令行层面的设置：默认值 <- 配置文件 <- 命令行参数
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub token_file: PathBuf,
    pub src: String,
    pub dst: String,
    pub excludes: Vec<String>,
    /// KiB
    pub min_size_diff: i64,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub per_page: i64,
    pub timeout: Duration,
    pub dry_run: bool,
    pub base_path: String,
    pub refresh_tasks: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_file: PathBuf::from(DEFAULT_TOKEN_FILE),
            src: String::new(),
            dst: String::new(),
            excludes: Vec::new(),
            min_size_diff: 0,
            log_level: "info".to_string(),
            log_file: None,
            per_page: 0,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            dry_run: false,
            base_path: "/".to_string(),
            refresh_tasks: false,
        }
    }
}

impl Settings {
    pub fn apply_file(&mut self, fc: FileConfig) -> Result<()> {
        if let Some(v) = fc.base_url {
            self.base_url = v;
        }
        if let Some(v) = fc.token_file {
            self.token_file = v;
        }
        if let Some(v) = fc.src {
            self.src = v;
        }
        if let Some(v) = fc.dst {
            self.dst = v;
        }
        if let Some(v) = fc.blacklist {
            self.excludes = v;
        }
        if let Some(v) = fc.min_size_diff {
            self.min_size_diff = v;
        } else if let Some(v) = fc.size_diff_threshold {
            self.min_size_diff = bytes_to_kib_ceil(v);
        }
        if let Some(v) = fc.log_level {
            self.log_level = v;
        }
        if let Some(v) = fc.log_file {
            self.log_file = Some(v);
        }
        if let Some(v) = fc.per_page {
            self.per_page = v;
        }
        if let Some(v) = fc.timeout {
            self.timeout = match v {
                TimeoutValue::Secs(secs) => Duration::from_secs(secs),
                TimeoutValue::Text(text) => parse_duration(&text)
                    .map_err(|e| SyncError::Config(format!("invalid timeout in config file: {}", e)))?,
            };
        }
        if let Some(v) = fc.dry_run {
            self.dry_run = v;
        }
        if let Some(v) = fc.base_path {
            self.base_path = v;
        }
        if let Some(v) = fc.refresh_tasks {
            self.refresh_tasks = v;
        }
        Ok(())
    }

    /// 命令行层面的校验，返回解析后的日志级别
    pub fn validate(&mut self) -> Result<LogLevel> {
        self.src = self.src.trim().to_string();
        self.dst = self.dst.trim().to_string();
        if self.src.is_empty() || self.dst.is_empty() {
            return Err(SyncError::Config("both --src and --dst are required".to_string()));
        }
        if self.per_page < 0 {
            return Err(SyncError::Config("--per-page must be >= 0".to_string()));
        }
        if self.min_size_diff < 0 {
            return Err(SyncError::Config("--min-size-diff must be >= 0".to_string()));
        }
        self.log_level.parse()
    }

    /// 转换为引擎配置，阈值由 KiB 换算为字节
    pub fn into_sync_config(self, token: String, dispatch: Dispatch) -> Result<SyncConfig> {
        let min_size_diff = self
            .min_size_diff
            .checked_mul(BYTES_PER_KIB)
            .ok_or_else(|| SyncError::Config("--min-size-diff is too large".to_string()))?;

        Ok(SyncConfig {
            base_url: self.base_url,
            token,
            src_dir: self.src,
            dst_dir: self.dst,
            blacklist: self.excludes,
            min_size_diff,
            per_page: self.per_page,
            timeout: self.timeout,
            dry_run: self.dry_run,
            base_path: self.base_path,
            task_refresh: if self.refresh_tasks {
                TaskRefresh::PerItem
            } else {
                TaskRefresh::Once
            },
            dispatch,
        })
    }
}

/// 读取 token 文件并去掉首尾空白
pub fn read_token(token_file: &Path) -> Result<String> {
    let content = fs::read_to_string(token_file).map_err(|e| {
        SyncError::Config(format!("read token failed ({}): {}", token_file.display(), e))
    })?;
    let token = content.trim();
    if token.is_empty() {
        return Err(SyncError::Config("read token failed: token is empty".to_string()));
    }
    Ok(token.to_string())
}

/// 逗号分隔的规则列表
pub fn split_patterns(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn bytes_to_kib_ceil(v: i64) -> i64 {
    if v <= 0 {
        return 0;
    }
    v / BYTES_PER_KIB + i64::from(v % BYTES_PER_KIB != 0)
}

/// 解析 `500ms`、`30s`、`1m30s`、`2h` 形式的时长，纯数字按秒处理
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in duration {:?}", s))?;
        if digits == 0 {
            return Err(format!("invalid duration {:?}", s));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid duration {:?}", s))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            unit => return Err(format!("unknown unit {:?} in duration {:?}", unit, s)),
        };
        total = part
            .and_then(|part| total.checked_add(part))
            .ok_or_else(|| format!("duration out of range {:?}", s))?;
        rest = &rest[unit_len..];
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> SyncConfig {
        SyncConfig {
            token: " secret ".to_string(),
            src_dir: "src/".to_string(),
            dst_dir: " /dst/./x ".to_string(),
            base_url: "http://nas:5244/".to_string(),
            base_path: String::new(),
            timeout: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_sync_config() {
        let cfg = valid().normalize().unwrap();
        assert_eq!(cfg.token, "secret");
        assert_eq!(cfg.src_dir, "/src");
        assert_eq!(cfg.dst_dir, "/dst/x");
        assert_eq!(cfg.base_url, "http://nas:5244");
        assert_eq!(cfg.base_path, "/");
        assert_eq!(cfg.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_normalize_rejects_invalid_config() {
        let cases = [
            SyncConfig { token: "  ".to_string(), ..valid() },
            SyncConfig { src_dir: String::new(), ..valid() },
            SyncConfig { dst_dir: " ".to_string(), ..valid() },
            SyncConfig { per_page: -1, ..valid() },
            SyncConfig { min_size_diff: -1, ..valid() },
        ];
        for cfg in cases {
            assert!(matches!(cfg.normalize(), Err(SyncError::Config(_))));
        }
    }

    #[test]
    fn test_load_file_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "base_url": "http://nas:5244",
                "src": "/a",
                "dst": "/b",
                "blacklist": ["*.tmp"],
                "size_diff_threshold": 1500,
                "timeout": "1m30s",
                "dry_run": true,
                "base_path": "/user"
            }}"#
        )
        .unwrap();

        let fc = FileConfig::load(file.path()).unwrap();
        let mut settings = Settings::default();
        settings.apply_file(fc).unwrap();

        assert_eq!(settings.base_url, "http://nas:5244");
        assert_eq!(settings.excludes, vec!["*.tmp"]);
        assert_eq!(settings.min_size_diff, 2);
        assert_eq!(settings.timeout, Duration::from_secs(90));
        assert!(settings.dry_run);
        assert_eq!(settings.log_level, "info");

        let level = settings.validate().unwrap();
        assert_eq!(level, LogLevel::Info);
        let cfg = settings
            .into_sync_config("t".to_string(), Dispatch::none())
            .unwrap();
        assert_eq!(cfg.min_size_diff, 2048);
        assert_eq!(cfg.base_path, "/user");
        assert_eq!(cfg.task_refresh, TaskRefresh::Once);
    }

    #[test]
    fn test_min_size_diff_takes_precedence_over_legacy_field() {
        let fc: FileConfig =
            serde_json::from_str(r#"{"min_size_diff": 5, "size_diff_threshold": 99999, "timeout": 10}"#)
                .unwrap();
        let mut settings = Settings::default();
        settings.apply_file(fc).unwrap();
        assert_eq!(settings.min_size_diff, 5);
        assert_eq!(settings.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_load_file_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(FileConfig::load(&missing).is_err());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{not json").unwrap();
        let err = FileConfig::load(&broken).unwrap_err();
        assert!(err.to_string().contains("parse config file failed"));

        let fc: FileConfig = serde_json::from_str(r#"{"timeout": "soon"}"#).unwrap();
        assert!(Settings::default().apply_file(fc).is_err());
    }

    #[test]
    fn test_validate_settings() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_err());

        settings.src = "/a".to_string();
        settings.dst = "/b".to_string();
        settings.log_level = "verbose".to_string();
        assert!(settings.validate().is_err());

        settings.log_level = "debug".to_string();
        settings.min_size_diff = -3;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_read_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.txt");
        std::fs::write(&path, "  abc123\n").unwrap();
        assert_eq!(read_token(&path).unwrap(), "abc123");

        std::fs::write(&path, " \n").unwrap();
        assert!(read_token(&path).is_err());
        assert!(read_token(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_split_patterns() {
        assert_eq!(split_patterns(" *.tmp, ,cache/*,"), vec!["*.tmp", "cache/*"]);
        assert!(split_patterns("").is_empty());
    }

    #[test]
    fn test_bytes_to_kib_ceil() {
        assert_eq!(bytes_to_kib_ceil(-5), 0);
        assert_eq!(bytes_to_kib_ceil(0), 0);
        assert_eq!(bytes_to_kib_ceil(1), 1);
        assert_eq!(bytes_to_kib_ceil(1024), 1);
        assert_eq!(bytes_to_kib_ceil(1025), 2);
        assert_eq!(bytes_to_kib_ceil(i64::MAX), i64::MAX / 1024 + 1);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1h2m3s").unwrap(), Duration::from_secs(3723));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_ok());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("1.5s").is_err());
        // 溢出返回错误
        assert!(parse_duration("18446744073709551615h").is_err());
        assert!(parse_duration("18446744073709551615m").is_err());
        assert!(parse_duration("18446744073709551615s1s").is_err());
    }
}
