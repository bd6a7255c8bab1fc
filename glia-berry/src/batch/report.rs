//! 批处理结果.

use std::path::{Path, PathBuf};

use super::BatchError;
use crate::pipeline::ImageOutcome;

/// 一幅成功处理的图像.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    /// 文件名.
    pub file: String,

    /// 颗粒分析得到的候选个数.
    pub found: usize,

    /// 人工确认后的 ROI 个数.
    pub rois: usize,

    /// 测量行数.
    pub measured: usize,

    /// 因面积为 0 被跳过的 ROI 个数.
    pub gaps: usize,

    /// 写出的文件.
    pub outputs: Vec<PathBuf>,
}

impl FileReport {
    pub(crate) fn new(outcome: &ImageOutcome, outputs: Vec<PathBuf>) -> Self {
        Self {
            file: outcome.name.clone(),
            found: outcome.found,
            rois: outcome.rois.len(),
            measured: outcome.measured.table.len(),
            gaps: outcome.measured.gaps.len(),
            outputs,
        }
    }
}

/// 一幅处理失败并被跳过的图像.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// 文件名.
    pub file: String,

    /// 错误信息.
    pub reason: String,
}

impl FileFailure {
    pub(crate) fn from_error(path: &Path, e: &BatchError) -> Self {
        let file = e
            .file()
            .unwrap_or_else(|| path.display().to_string());
        Self {
            file,
            reason: e.to_string(),
        }
    }
}

/// 整个批处理的结果.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// 输出目录.
    pub analysis_dir: PathBuf,

    /// 成功处理的图像, 按处理顺序.
    pub files: Vec<FileReport>,

    /// 被跳过的图像. 只在 [`FailurePolicy::Isolate`](crate::config::FailurePolicy::Isolate) 下非空.
    pub failures: Vec<FileFailure>,

    /// 文件夹汇总表格的路径. 没有任何测量行时为 `None`.
    pub summary: Option<PathBuf>,
}

impl BatchReport {
    pub(crate) fn new(analysis_dir: &Path) -> Self {
        Self {
            analysis_dir: analysis_dir.to_path_buf(),
            files: Vec::new(),
            failures: Vec::new(),
            summary: None,
        }
    }

    /// 是否所有图像都处理成功.
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// 所有图像的测量行总数.
    pub fn measured(&self) -> usize {
        self.files.iter().map(|f| f.measured).sum()
    }
}
