use crate::config::{SyncConfig, TaskRefresh};
use crate::core::comparator::{build_plan, CopyPlanItem};
use crate::core::dirs::{ensure_dir, KnownDirs};
use crate::core::filter::PathFilter;
use crate::core::path::{base_name, join_root, parent};
use crate::core::scanner::{TreeScanner, TreeSnapshot};
use crate::core::task::{PendingCopyTasks, TaskMatcher};
use crate::error::{ApiError, Result, SyncError};
use crate::storage::{cancellable, OpenListClient, RemoteFs};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info};

/// 同步报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub source_files: usize,
    pub target_files: usize,
    /// 计划复制的文件数
    pub planned: usize,
    pub unchanged: usize,
    pub submitted: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
    pub dry_run: bool,
}

impl SyncReport {
    fn new(start_time: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            start_time,
            end_time: start_time,
            source_files: 0,
            target_files: 0,
            planned: 0,
            unchanged: 0,
            submitted: 0,
            skipped_duplicate: 0,
            failed: 0,
            dry_run,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// 单个计划项的处理结果
enum ItemOutcome {
    Submitted,
    Duplicate,
    Failed,
}

/// 去重检查使用的未完成任务来源
enum PendingLookup {
    /// 每项提交前实时拉取
    Live,
    /// 本次运行开始提交前拉取的一份
    Snapshot(PendingCopyTasks),
    /// 拉取失败，每一项的去重检查都按失败处理
    Unavailable(ApiError),
}

/// 同步引擎
///
/// 扫描、比较、提交严格串行执行；所有远端调用共享同一个取消令牌。
pub struct SyncEngine {
    config: SyncConfig,
    fs: Arc<dyn RemoteFs>,
    filter: PathFilter,
    matcher: TaskMatcher,
    cancel: CancellationToken,
}

impl SyncEngine {
    /// 使用 OpenList HTTP 客户端
    pub fn new(config: SyncConfig) -> Result<Self> {
        let config = config.normalize()?;
        let per_page = u32::try_from(config.per_page)
            .map_err(|_| SyncError::Config("per_page is too large".to_string()))?;
        let client = OpenListClient::new(&config.base_url, &config.token, per_page, config.timeout)
            .map_err(|e| SyncError::Config(format!("build http client: {}", e)))?;
        Self::build(config, Arc::new(client))
    }

    /// 使用任意远端实现
    pub fn with_remote(config: SyncConfig, fs: Arc<dyn RemoteFs>) -> Result<Self> {
        Self::build(config.normalize()?, fs)
    }

    fn build(config: SyncConfig, fs: Arc<dyn RemoteFs>) -> Result<Self> {
        let filter = PathFilter::new(&config.blacklist)?;
        let matcher = TaskMatcher::new(&config.base_path);
        Ok(Self {
            config,
            fs,
            filter,
            matcher,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// 取消令牌，触发后当前远端调用中止，整个同步返回 `Cancelled`
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 执行一次增量同步，日志写入配置中的 dispatch
    pub async fn run(&self) -> Result<SyncReport> {
        let dispatch = self.config.dispatch.clone();
        self.run_sync().with_subscriber(dispatch).await
    }

    async fn run_sync(&self) -> Result<SyncReport> {
        let cfg = &self.config;
        let mut report = SyncReport::new(Utc::now(), cfg.dry_run);

        if !self.filter.is_empty() {
            info!("blacklist enabled with {} pattern(s)", self.filter.len());
        }
        if cfg.min_size_diff > 0 {
            info!("min size diff enabled: {} bytes", cfg.min_size_diff);
        }

        let scanner = TreeScanner::new(self.fs.as_ref(), &self.filter, &self.cancel);

        info!("scan source: {}", cfg.src_dir);
        let src_snap = match scanner.scan(&cfg.src_dir).await {
            Ok(snap) => snap,
            Err(e) if e.is_cancelled() => return Err(SyncError::Cancelled),
            Err(e) => {
                error!("scan source failed: {}", e);
                return Err(SyncError::ScanSource(Box::new(e)));
            }
        };

        info!("scan target: {}", cfg.dst_dir);
        let dst_snap = match scanner.scan(&cfg.dst_dir).await {
            Ok(snap) => snap,
            Err(e) if e.is_cancelled() => return Err(SyncError::Cancelled),
            Err(SyncError::Scan { dir, source })
                if dir == cfg.dst_dir && source.is_not_found() =>
            {
                info!("target dir not found, create: {}", cfg.dst_dir);
                self.create_target_root().await?;
                TreeSnapshot::empty()
            }
            Err(e) => {
                error!("scan target failed: {}", e);
                return Err(SyncError::ScanTarget(Box::new(e)));
            }
        };

        let (plan, unchanged) = build_plan(&src_snap.files, &dst_snap.files, cfg.min_size_diff);
        report.source_files = src_snap.files.len();
        report.target_files = dst_snap.files.len();
        report.planned = plan.len();
        report.unchanged = unchanged;
        info!(
            "source files: {}, target files: {}",
            report.source_files, report.target_files
        );
        info!("to copy: {}, unchanged/skipped: {}", plan.len(), unchanged);

        if plan.is_empty() {
            info!("nothing to sync");
            report.end_time = Utc::now();
            return Ok(report);
        }
        for item in &plan {
            debug!(
                "PLAN {} | src={} dst={} | {}",
                item.rel_path, item.src_size, item.dst_size, item.reason
            );
        }
        if cfg.dry_run {
            info!("dry-run enabled, no copy submitted");
            report.end_time = Utc::now();
            return Ok(report);
        }

        self.submit_plan(&plan, &dst_snap, &mut report).await?;
        report.end_time = Utc::now();

        info!(
            "done: submitted={} skipped_duplicate_task={} failed={}",
            report.submitted, report.skipped_duplicate, report.failed
        );
        if report.failed > 0 {
            error!("sync finished with {} failed items", report.failed);
            return Err(SyncError::Failed {
                failed: report.failed,
                report: Box::new(report),
            });
        }
        Ok(report)
    }

    async fn create_target_root(&self) -> Result<()> {
        let dst = &self.config.dst_dir;
        match cancellable(&self.cancel, self.fs.mkdir(dst)).await {
            Ok(()) => Ok(()),
            Err(ApiError::Cancelled) => Err(SyncError::Cancelled),
            Err(e) if e.is_already_exists() => Ok(()),
            Err(source) => {
                error!("create target dir failed: {}", source);
                Err(SyncError::CreateTarget {
                    dir: dst.clone(),
                    source,
                })
            }
        }
    }

    /// 逐项提交复制任务，单项失败只计数不中断
    async fn submit_plan(
        &self,
        plan: &[CopyPlanItem],
        dst_snap: &TreeSnapshot,
        report: &mut SyncReport,
    ) -> Result<()> {
        let mut known = KnownDirs::seeded(&self.config.dst_dir, &dst_snap.dirs);

        let pending = match self.config.task_refresh {
            TaskRefresh::Once => self.fetch_pending_tasks().await?,
            TaskRefresh::PerItem => PendingLookup::Live,
        };

        for item in plan {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let outcome = self.submit_item(item, &mut known, &pending).await?;
            match outcome {
                ItemOutcome::Submitted => report.submitted += 1,
                ItemOutcome::Duplicate => report.skipped_duplicate += 1,
                ItemOutcome::Failed => report.failed += 1,
            }
        }
        Ok(())
    }

    async fn fetch_pending_tasks(&self) -> Result<PendingLookup> {
        match cancellable(&self.cancel, self.fs.list_undone_copy_tasks()).await {
            Ok(tasks) => {
                let pending = PendingCopyTasks::from_tasks(&tasks);
                debug!(
                    "undone tasks: {}, parsed copy tasks: {}",
                    tasks.len(),
                    pending.len()
                );
                Ok(PendingLookup::Snapshot(pending))
            }
            Err(ApiError::Cancelled) => Err(SyncError::Cancelled),
            Err(e) => {
                error!("list undone copy tasks failed: {}", e);
                Ok(PendingLookup::Unavailable(e))
            }
        }
    }

    async fn submit_item(
        &self,
        item: &CopyPlanItem,
        known: &mut KnownDirs,
        pending: &PendingLookup,
    ) -> Result<ItemOutcome> {
        let cfg = &self.config;
        let src_file = join_root(&cfg.src_dir, &item.rel_path);
        let dst_file = join_root(&cfg.dst_dir, &item.rel_path);
        let dst_parent = parent(&dst_file);

        match ensure_dir(self.fs.as_ref(), &self.cancel, &dst_parent, known).await {
            Ok(()) => {}
            Err(ApiError::Cancelled) => return Err(SyncError::Cancelled),
            Err(e) => {
                error!("mkdir failed {}: {}", dst_parent, e);
                return Ok(ItemOutcome::Failed);
            }
        }

        let has_same_task = match pending {
            PendingLookup::Snapshot(tasks) => {
                tasks.contains_any(&self.matcher.candidate_keys(&src_file, &dst_parent))
            }
            PendingLookup::Unavailable(e) => {
                return Ok(dedup_check_failed(&src_file, &dst_parent, e));
            }
            PendingLookup::Live => match self
                .matcher
                .has_same_undone_copy_task(self.fs.as_ref(), &self.cancel, &src_file, &dst_parent)
                .await
            {
                Ok(found) => found,
                Err(ApiError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => return Ok(dedup_check_failed(&src_file, &dst_parent, &e)),
            },
        };
        if has_same_task {
            info!("skip duplicate task {} -> {}", src_file, dst_parent);
            return Ok(ItemOutcome::Duplicate);
        }

        let src_parent = parent(&src_file);
        let name = base_name(&src_file);
        match cancellable(
            &self.cancel,
            self.fs.copy_file(&src_parent, &dst_parent, &name, true),
        )
        .await
        {
            Ok(()) => {
                info!("copy {} -> {} ({})", src_file, dst_parent, item.reason);
                Ok(ItemOutcome::Submitted)
            }
            Err(ApiError::Cancelled) => Err(SyncError::Cancelled),
            Err(e) => {
                error!("copy failed {} -> {}: {}", src_file, dst_parent, e);
                Ok(ItemOutcome::Failed)
            }
        }
    }
}

fn dedup_check_failed(src_file: &str, dst_dir: &str, err: &ApiError) -> ItemOutcome {
    error!("check undone task failed {} -> {}: {}", src_file, dst_dir, err);
    ItemOutcome::Failed
}

/// 按配置执行一次同步
pub async fn run(config: SyncConfig) -> Result<SyncReport> {
    SyncEngine::new(config)?.run().await
}
