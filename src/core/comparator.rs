use std::collections::BTreeMap;
use std::fmt;

/// 需要复制的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyReason {
    /// 目标不存在
    TargetMissing,
    /// 源文件比目标大，字节差
    SourceLarger(i64),
}

impl fmt::Display for CopyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyReason::TargetMissing => write!(f, "target missing"),
            CopyReason::SourceLarger(diff) => {
                write!(f, "source larger by {} bytes, overwrite", diff)
            }
        }
    }
}

/// 复制计划项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyPlanItem {
    pub rel_path: String,
    pub src_size: i64,
    /// 目标不存在时为 -1
    pub dst_size: i64,
    pub reason: CopyReason,
}

/// 对比源/目标文件索引并生成复制计划
///
/// - 目标不存在：复制
/// - 源比目标大且差值不小于 `min_size_diff`：覆盖
/// - 其他情况计为未变化
///
/// 只在目标存在的文件不参与比较。返回的计划按相对路径升序排列。
pub fn build_plan(
    src_files: &BTreeMap<String, i64>,
    dst_files: &BTreeMap<String, i64>,
    min_size_diff: i64,
) -> (Vec<CopyPlanItem>, usize) {
    let mut plan = Vec::new();
    let mut unchanged = 0;

    for (rel, &src_size) in src_files {
        let Some(&dst_size) = dst_files.get(rel) else {
            plan.push(CopyPlanItem {
                rel_path: rel.clone(),
                src_size,
                dst_size: -1,
                reason: CopyReason::TargetMissing,
            });
            continue;
        };

        let diff = src_size - dst_size;
        if diff > 0 && diff >= min_size_diff {
            plan.push(CopyPlanItem {
                rel_path: rel.clone(),
                src_size,
                dst_size,
                reason: CopyReason::SourceLarger(diff),
            });
            continue;
        }
        unchanged += 1;
    }

    plan.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    (plan, unchanged)
}
