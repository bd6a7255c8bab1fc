//! 单幅图像的处理流程.
//!
//! 流程在人工检查点处拆成两段: [`ImagePipeline::segment`] 完成投影, 分割和细胞核验证,
//! 返回持有候选 ROI 与中间图像的 [`Checkpoint`]; [`Checkpoint::resume`] 以 (可能被编辑过的)
//! ROI 集合重新进入流程并完成测量. [`Checkpoint::accept`] 原样接受候选集合, 用于无人值守运行.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::consts::{MICROGLIA_CHANNEL, NUCLEUS_CHANNEL};
use crate::dataset::SourceImage;
use crate::measure::{MeasureError, Measured, Measurer};
use crate::roi::{NucleusFilter, RoiSet};
use crate::segment::{
    segment_membrane, CachedClassifier, ClassifierInput, ClassifyError, NucleusSegmenter,
    ObjectExtractor, PixelClassifier,
};
use crate::{Idx2d, Mask, Plane};

#[cfg(feature = "serde")]
mod snapshot;

/// 单幅图像处理失败.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 分类器调用失败.
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// 测量阶段的不变量被破坏.
    #[error(transparent)]
    Measure(#[from] MeasureError),

    /// 编辑后的 ROI 集合与图像尺寸不符.
    #[error("edited ROI set has shape {found:?}, image has {expected:?}")]
    ShapeMismatch {
        /// 图像形状.
        expected: Idx2d,
        /// ROI 集合的形状.
        found: Idx2d,
    },

    /// 交互式编辑失败.
    #[error("ROI editing failed: {0}")]
    Edit(#[source] io::Error),
}

impl PipelineError {
    /// 是否为不变量错误. 这类错误总是终止整个批处理.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::Measure(_))
    }
}

/// 单幅图像的处理流程.
pub struct ImagePipeline<'a, C: ?Sized> {
    config: &'a Config,
    classifier: &'a C,
    nucleus: NucleusSegmenter,
    extractor: ObjectExtractor,
    filter: NucleusFilter,
    cache_dir: Option<PathBuf>,
}

impl<'a, C: PixelClassifier + ?Sized> ImagePipeline<'a, C> {
    /// 以运行参数和像素分类器初始化. 参数不合法时返回 `Err`.
    pub fn new(config: &'a Config, classifier: &'a C) -> Result<Self, ConfigError> {
        config.validate()?;
        let nucleus = NucleusSegmenter::from_config(config)
            .ok_or(ConfigError::RollingBall(config.rolling_ball_radius))?;
        Ok(Self {
            config,
            classifier,
            nucleus,
            extractor: ObjectExtractor::from_config(config),
            filter: NucleusFilter::from_config(config),
            cache_dir: None,
        })
    }

    /// 把分类结果缓存到 `dir` 下. 只在 `Config::cache_segmentation` 打开时生效.
    pub fn with_cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// 运行参数.
    #[inline]
    pub fn config(&self) -> &Config {
        self.config
    }

    /// 投影 → 细胞核分割 ∥ 细胞膜分类 → 3D → 2D 目标提取 → 细胞核验证.
    pub fn segment(&self, image: &SourceImage) -> Result<Checkpoint, PipelineError> {
        let projections = image.stack.max_projection();
        log::info!("{}: projected {} slices", image.name, image.stack.len_z());

        let nuclei = self.nucleus.segment(&projections[NUCLEUS_CHANNEL]);

        let input = ClassifierInput {
            path: &image.path,
            stack: &image.stack,
        };
        let volume = match self.cache_dir.as_ref().filter(|_| self.config.cache_segmentation) {
            Some(dir) => segment_membrane(&CachedClassifier::new(self.classifier, dir), input)?,
            None => segment_membrane(self.classifier, input)?,
        };
        log::info!(
            "{}: {} membrane voxels from {}",
            image.name,
            volume.count_foreground(),
            self.classifier.name()
        );

        let candidates = self.extractor.extract(&volume);
        let found = candidates.rois.len();
        let rois = self.filter.filter(candidates.rois, &nuclei);
        Ok(Checkpoint {
            name: image.name.clone(),
            found,
            rois,
            nuclei,
            antibody: candidates.mask,
            projections,
        })
    }
}

/// 人工检查点: 候选 ROI 集合与后续步骤需要的中间图像.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    name: String,
    found: usize,
    rois: RoiSet,
    nuclei: Mask,
    antibody: Mask,
    projections: [Plane; 2],
}

impl Checkpoint {
    /// 源文件名.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 细胞核验证之前的候选个数.
    #[inline]
    pub fn found(&self) -> usize {
        self.found
    }

    /// 通过细胞核验证的候选 ROI.
    #[inline]
    pub fn rois(&self) -> &RoiSet {
        &self.rois
    }

    /// 细胞核掩膜.
    #[inline]
    pub fn nuclei(&self) -> &Mask {
        &self.nuclei
    }

    /// 颗粒分析接受的小胶质细胞掩膜.
    #[inline]
    pub fn antibody_mask(&self) -> &Mask {
        &self.antibody
    }

    /// 细胞核通道的最大投影.
    #[inline]
    pub fn nucleus_projection(&self) -> &Plane {
        &self.projections[NUCLEUS_CHANNEL]
    }

    /// 小胶质细胞通道的最大投影.
    #[inline]
    pub fn microglia_projection(&self) -> &Plane {
        &self.projections[MICROGLIA_CHANNEL]
    }

    /// 以 `edited` 作为权威 ROI 集合继续流程并测量.
    ///
    /// 超出图像范围的像素先被裁掉. ROI 掩膜由 `edited` 重新栅格化;
    /// `edited` 为空时沿用颗粒分析的掩膜, 测量表格为空.
    pub fn resume(self, mut edited: RoiSet) -> Result<ImageOutcome, PipelineError> {
        let expected = self.antibody.shape();
        if edited.shape() != expected {
            return Err(PipelineError::ShapeMismatch {
                expected,
                found: edited.shape(),
            });
        }
        let clipped = edited.clip_to_shape();
        if clipped > 0 {
            log::warn!("{}: {clipped} ROIs reach outside the image, clipped", self.name);
        }
        if edited.len() != self.rois.len() {
            log::info!(
                "{}: ROI set edited, {} -> {} ROIs",
                self.name,
                self.rois.len(),
                edited.len()
            );
        }

        let microglia = if edited.is_empty() {
            log::warn!("{}: no ROI left, measurement skipped", self.name);
            self.antibody
        } else {
            edited.to_mask()
        };
        let measured = Measurer::default().measure(&self.name, &edited, &microglia)?;
        if !measured.gaps.is_empty() {
            log::warn!("{}: {} zero-area ROIs skipped", self.name, measured.gaps.len());
        }
        Ok(ImageOutcome {
            name: self.name,
            found: self.found,
            rois: edited,
            measured,
            nuclei: self.nuclei,
            microglia,
            projections: self.projections,
        })
    }

    /// 原样接受候选集合.
    pub fn accept(self) -> Result<ImageOutcome, PipelineError> {
        let rois = self.rois.clone();
        self.resume(rois)
    }
}

/// 交互式 ROI 编辑. 调用会阻塞直到操作者确认, 没有超时.
pub trait RoiEditor {
    /// 展示检查点, 返回确认后的 ROI 集合.
    fn edit(&mut self, checkpoint: &Checkpoint) -> io::Result<RoiSet>;
}

/// 无人值守模式: 原样接受候选集合.
#[derive(Debug, Clone, Copy, Default)]
pub struct Headless;

impl RoiEditor for Headless {
    fn edit(&mut self, checkpoint: &Checkpoint) -> io::Result<RoiSet> {
        Ok(checkpoint.rois().clone())
    }
}

/// 单幅图像的处理结果.
#[derive(Debug, Clone)]
pub struct ImageOutcome {
    /// 源文件名.
    pub name: String,

    /// 细胞核验证之前的候选个数.
    pub found: usize,

    /// 最终的 ROI 集合.
    pub rois: RoiSet,

    /// 测量结果.
    pub measured: Measured,

    /// 细胞核掩膜.
    pub nuclei: Mask,

    /// 小胶质细胞掩膜 (由最终 ROI 集合栅格化).
    pub microglia: Mask,

    /// 两个通道的最大投影.
    pub projections: [Plane; 2],
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::roi::Roi;
    use crate::segment::ChannelThreshold;
    use crate::{Calibration, Stack};
    use ndarray::Array4;

    /// 40x40, 3 层. 两个小胶质细胞方块, 只有第一个中心有细胞核.
    pub(crate) fn synthetic_image() -> SourceImage {
        let cal = Calibration::new(1.0, 1.0, Some(2.0), "micron").unwrap();
        let data = Array4::from_shape_fn((2, 3, 40, 40), |(c, _, h, w)| {
            let (fh, fw) = (h as f64, w as f64);
            let bright = match c {
                0 => (fh - 17.5).powi(2) + (fw - 17.5).powi(2) <= 9.0,
                _ => {
                    ((14..22).contains(&h) && (14..22).contains(&w))
                        || ((4..10).contains(&h) && (26..34).contains(&w))
                }
            };
            if bright {
                200.0
            } else {
                10.0
            }
        });
        SourceImage::new("cells.tif", Stack::new(data, cal).unwrap())
    }

    fn checkpoint() -> Checkpoint {
        let config = Config::default();
        let pipeline = ImagePipeline::new(&config, &ChannelThreshold).unwrap();
        pipeline.segment(&synthetic_image()).unwrap()
    }

    #[test]
    fn test_segment_and_accept() {
        let cp = checkpoint();
        assert_eq!(cp.found(), 2);
        assert_eq!(cp.rois().len(), 1);
        assert_eq!(cp.antibody_mask().count_foreground(), 64 + 48);
        assert_eq!(cp.nucleus_projection().min_max(), Some((10.0, 200.0)));
        assert_eq!(cp.microglia_projection().shape(), (40, 40));

        let out = cp.accept().unwrap();
        assert_eq!(out.measured.table.len(), 1);
        let row = &out.measured.table.rows()[0];
        assert_eq!(row.label, "cells.tif:0018-0018");
        assert_eq!(row.area, 64.0);
        assert!((row.perimeter - (32.0 - 4.0 * (2.0 - std::f64::consts::SQRT_2))).abs() < 1e-9);
        assert!(row.ri >= 1.0);
        assert!(row.cable_length >= 0.0);
        assert_eq!(out.microglia.count_foreground(), 64);
    }

    #[test]
    fn test_resume_with_edits() {
        let cp = checkpoint();
        let mut edited = cp.rois().clone();
        edited.push(Roi::from_pixels((30..34).flat_map(|h| (4..12).map(move |w| (h, w)))));
        let out = cp.resume(edited).unwrap();
        assert_eq!(out.rois.len(), 2);
        assert_eq!(out.measured.table.len(), 2);
        assert_eq!(out.microglia.count_foreground(), 64 + 32);
    }

    /// 越过图像边缘的 ROI 被裁剪后测量, 完全在图像外的 ROI 成为缺口.
    #[test]
    fn test_resume_clips_rois_at_the_border() {
        let cp = checkpoint();
        let mut edited = cp.rois().clone();
        edited.push(Roi::from_pixels((36..44).flat_map(|h| (30..38).map(move |w| (h, w)))));
        edited.push(Roi::from_pixels([(50, 50), (51, 51)]));
        let out = cp.resume(edited).unwrap();

        assert_eq!(out.rois.len(), 3);
        assert_eq!(out.measured.table.len(), 2);
        let row = &out.measured.table.rows()[1];
        assert_eq!(row.label, "cells.tif:0040-0034");
        assert_eq!(row.area, 32.0);
        assert_eq!(out.measured.gaps.len(), 1);
        assert_eq!(out.measured.gaps[0].index, 2);
        assert_eq!(out.microglia.count_foreground(), 64 + 32);
    }

    #[test]
    fn test_resume_with_nothing() {
        let cp = checkpoint();
        let empty = RoiSet::new((40, 40), cp.rois().calibration().clone());
        let antibody = cp.antibody_mask().clone();
        let out = cp.resume(empty).unwrap();
        assert!(out.measured.table.is_empty());
        assert_eq!(out.microglia, antibody);
    }

    #[test]
    fn test_resume_shape_mismatch() {
        let cp = checkpoint();
        let other = RoiSet::new((20, 40), Calibration::default());
        assert!(matches!(
            cp.resume(other),
            Err(PipelineError::ShapeMismatch { expected: (40, 40), found: (20, 40) })
        ));
    }

    #[test]
    fn test_invalid_config() {
        let config = Config::default().with_rolling_ball_radius(0.0);
        assert!(ImagePipeline::new(&config, &ChannelThreshold).is_err());
    }

    #[test]
    fn test_headless_editor() {
        let cp = checkpoint();
        assert_eq!(Headless.edit(&cp).unwrap(), *cp.rois());
    }
}
