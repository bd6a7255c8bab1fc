//! 运行参数.
//!
//! 所有参数都集中在 [`Config`] 中, 由批处理器显式传递给每个步骤.
//! 默认值与 [`consts::defaults`](crate::consts::defaults) 一致.

use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::defaults;

/// 批处理中某幅图像无法加载时的处理策略.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FailurePolicy {
    /// 立刻终止整个批处理.
    #[default]
    Abort,

    /// 记录该文件的错误并继续处理下一个文件, 最后统一报告.
    Isolate,
}

/// 参数不合法.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// 某个数值参数不是有限非负数.
    #[error("parameter `{0}` must be finite and non-negative, got {1}")]
    NotNonNegative(&'static str, f64),

    /// 最小面积大于最大面积.
    #[error("microglia size band is empty: min {0} > max {1}")]
    EmptySizeBand(f64, f64),

    /// 滚球半径必须为正.
    #[error("rolling ball radius must be positive, got {0}")]
    RollingBall(f64),

    /// 饱和百分比必须位于 `[0, 100)`.
    #[error("saturated percentage must lie in [0, 100), got {0}")]
    Saturated(f64),

    /// 输出目录名为空.
    #[error("analysis directory name is empty")]
    EmptyAnalysisDir,

    /// 没有可接受的扩展名.
    #[error("no input extension configured")]
    NoExtension,
}

/// 一次批处理的全部参数.
///
/// 面积单位为标定单位的平方 (通常为平方微米), 长度单位为标定单位.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// 连接小胶质细胞缝隙的长度. `None` (默认) 表示不做缝隙连接.
    pub connect_gap: Option<f64>,

    /// 候选区域内细胞核前景的最小面积.
    pub nucleus_intersection: f64,

    /// 2D 颗粒的最小面积.
    pub microglia_min_size: f64,

    /// 2D 颗粒的最大面积.
    pub microglia_max_size: f64,

    /// 3D 连通体的最小体素数.
    pub microglia_min_size_3d: usize,

    /// 滚球半径 (像素).
    pub rolling_ball_radius: f64,

    /// 对比度增强时的饱和百分比.
    pub saturated: f64,

    /// 像素分类器模型文件. 允许以 `~` 开头.
    pub model_file: PathBuf,

    /// 输入目录下的输出子目录名.
    pub analysis_dir: String,

    /// 接受的输入扩展名 (不含 `.`, 不区分大小写).
    pub extensions: Vec<String>,

    /// 图像加载失败时的处理策略.
    pub failure_policy: FailurePolicy,

    /// 是否缓存并复用分类器输出.
    pub cache_segmentation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_gap: None,
            nucleus_intersection: defaults::NUCLEUS_INTERSECTION_WITH_CELL,
            microglia_min_size: defaults::MICROGLIA_MIN_SIZE,
            microglia_max_size: defaults::MICROGLIA_MAX_SIZE,
            microglia_min_size_3d: defaults::MICROGLIA_MIN_SIZE_3D,
            rolling_ball_radius: defaults::ROLLING_BALL_RADIUS,
            saturated: defaults::SATURATED,
            model_file: PathBuf::from(defaults::MEMBRANE_MODEL_FILE),
            analysis_dir: defaults::ANALYSIS_DIR.to_string(),
            extensions: defaults::EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            failure_policy: FailurePolicy::default(),
            cache_segmentation: false,
        }
    }
}

impl Config {
    /// 设置缝隙连接长度.
    #[inline]
    pub fn with_connect_gap(mut self, gap: Option<f64>) -> Self {
        self.connect_gap = gap;
        self
    }

    /// 设置细胞核面积下限.
    #[inline]
    pub fn with_nucleus_intersection(mut self, area: f64) -> Self {
        self.nucleus_intersection = area;
        self
    }

    /// 设置 2D 颗粒面积区间.
    #[inline]
    pub fn with_size_band(mut self, min: f64, max: f64) -> Self {
        self.microglia_min_size = min;
        self.microglia_max_size = max;
        self
    }

    /// 设置 3D 连通体体素数下限.
    #[inline]
    pub fn with_min_size_3d(mut self, voxels: usize) -> Self {
        self.microglia_min_size_3d = voxels;
        self
    }

    /// 设置滚球半径.
    #[inline]
    pub fn with_rolling_ball_radius(mut self, radius: f64) -> Self {
        self.rolling_ball_radius = radius;
        self
    }

    /// 设置模型文件.
    #[inline]
    pub fn with_model_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_file = path.into();
        self
    }

    /// 设置输出子目录名.
    #[inline]
    pub fn with_analysis_dir(mut self, dir: impl Into<String>) -> Self {
        self.analysis_dir = dir.into();
        self
    }

    /// 设置失败处理策略.
    #[inline]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// 设置是否缓存分类器输出.
    #[inline]
    pub fn with_cache_segmentation(mut self, on: bool) -> Self {
        self.cache_segmentation = on;
        self
    }

    /// 检查所有参数是否合法.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = |name: &'static str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::NotNonNegative(name, v))
            }
        };
        if let Some(gap) = self.connect_gap {
            non_negative("connect_gap", gap)?;
        }
        non_negative("nucleus_intersection", self.nucleus_intersection)?;
        non_negative("microglia_min_size", self.microglia_min_size)?;
        non_negative("microglia_max_size", self.microglia_max_size)?;
        if self.microglia_min_size > self.microglia_max_size {
            return Err(ConfigError::EmptySizeBand(
                self.microglia_min_size,
                self.microglia_max_size,
            ));
        }
        if !(self.rolling_ball_radius.is_finite() && self.rolling_ball_radius > 0.0) {
            return Err(ConfigError::RollingBall(self.rolling_ball_radius));
        }
        if !(0.0..100.0).contains(&self.saturated) {
            return Err(ConfigError::Saturated(self.saturated));
        }
        if self.analysis_dir.trim().is_empty() {
            return Err(ConfigError::EmptyAnalysisDir);
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::NoExtension);
        }
        Ok(())
    }

    /// 文件扩展名是否被接受 (不区分大小写).
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}
