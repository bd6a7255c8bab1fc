//! 形态学测量: 面积, 周长, 分枝指数 (RI) 和骨架总长.

use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::roi::RoiSet;
use crate::Mask;

mod skeleton;
mod table;

pub use skeleton::{skeletonize, SkeletonAnalyzer, SkeletonSummary};
pub use table::{ColumnStats, FolderSummary, Summary, Table, COLUMNS, MEAN_LABEL};

/// 测量阶段的不变量被破坏. 属于致命错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasureError {
    /// 分枝指数小于 1. 追踪周长在很小的 ROI 上可能短于同面积圆的周长.
    #[error("shape index of `{label}` is {ri}, below 1")]
    ShapeIndexBelowOne {
        /// 行标签.
        label: String,
        /// 实际算出的分枝指数.
        ri: f64,
    },

    /// 测量行数与 ROI 个数不一致.
    #[error("{rows} measurement rows (+{gaps} gaps) for {rois} ROIs")]
    RowCountMismatch {
        /// 测量行数.
        rows: usize,
        /// 跳过的 ROI 数.
        gaps: usize,
        /// ROI 个数.
        rois: usize,
    },
}

/// 一个 ROI 的测量结果.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// 标签, 形如 `<文件名>:<ROI 名称>`.
    pub label: String,

    /// 面积 (单位的平方).
    pub area: f64,

    /// 周长.
    pub perimeter: f64,

    /// 分枝指数, 不小于 1.
    pub ri: f64,

    /// 骨架最大树的总长度, 不小于 0.
    pub cable_length: f64,
}

/// 数据质量缺口: 被跳过的 ROI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
    /// ROI 在集合中的位置.
    pub index: usize,

    /// ROI 名称.
    pub name: String,
}

/// 一幅图像的测量结果.
#[derive(Debug, Clone, PartialEq)]
pub struct Measured {
    /// 测量表格, 与未被跳过的 ROI 一一对应.
    pub table: Table,

    /// 被跳过的 ROI.
    pub gaps: Vec<Gap>,
}

/// 分枝指数 `RI = 周长 / 面积 / (2 * sqrt(π / 面积))`, 即周长与同面积圆周长之比.
#[inline]
pub fn shape_index(area: f64, perimeter: f64) -> f64 {
    perimeter / area / (2.0 * (PI / area).sqrt())
}

/// 测量器.
#[derive(Copy, Clone, Debug, Default)]
pub struct Measurer {
    skeleton: SkeletonAnalyzer,
}

impl Measurer {
    /// 按顺序测量 `rois` 中的每个 ROI.
    ///
    /// `roi_mask` 是由 `rois` 栅格化得到的掩膜; 骨架分析在它被 ROI 包围盒裁剪后的部分上进行.
    /// 面积为 0 的 ROI 被跳过并记为 [`Gap`]. 分枝指数小于 1 或行数与 ROI 数不一致时返回错误.
    pub fn measure(
        &self,
        file: &str,
        rois: &RoiSet,
        roi_mask: &Mask,
    ) -> Result<Measured, MeasureError> {
        let cal = rois.calibration();
        let mut rows = Vec::with_capacity(rois.len());
        let mut gaps = Vec::new();

        for (index, roi) in rois.iter().enumerate() {
            let area = roi.area(cal);
            let Some(bbox) = roi.bbox().filter(|_| area > 0.0) else {
                log::warn!("{file}: ROI {} has zero area, skipped", roi.name());
                gaps.push(Gap {
                    index,
                    name: roi.name().to_string(),
                });
                continue;
            };

            let label = format!("{file}:{}", roi.name());
            let perimeter = roi.perimeter(cal);
            let ri = shape_index(area, perimeter);
            if !(ri >= 1.0) {
                return Err(MeasureError::ShapeIndexBelowOne { label, ri });
            }
            let cable_length = self.skeleton.cable_length(&roi_mask.crop(bbox));
            log::debug!(
                "{label}: area {area:.3}, perimeter {perimeter:.3}, RI {ri:.3}, cable {cable_length:.3}"
            );
            rows.push(Measurement {
                label,
                area,
                perimeter,
                ri,
                cable_length,
            });
        }

        if rows.len() + gaps.len() != rois.len() {
            return Err(MeasureError::RowCountMismatch {
                rows: rows.len(),
                gaps: gaps.len(),
                rois: rois.len(),
            });
        }
        Ok(Measured {
            table: Table::from_rows(rows),
            gaps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::Roi;
    use crate::Calibration;

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    /// 外接圆半径为 `r` 的正 `n` 边形的顶点.
    fn regular_polygon(n: usize, r: f64) -> Vec<(f64, f64)> {
        (0..n)
            .map(|k| {
                let t = 2.0 * PI * k as f64 / n as f64;
                (r * t.cos(), r * t.sin())
            })
            .collect()
    }

    fn shoelace(v: &[(f64, f64)]) -> f64 {
        let n = v.len();
        (0..n)
            .map(|i| {
                let (x0, y0) = v[i];
                let (x1, y1) = v[(i + 1) % n];
                x0 * y1 - x1 * y0
            })
            .sum::<f64>()
            .abs()
            / 2.0
    }

    fn polygon_perimeter(v: &[(f64, f64)]) -> f64 {
        let n = v.len();
        (0..n)
            .map(|i| {
                let (x0, y0) = v[i];
                let (x1, y1) = v[(i + 1) % n];
                (x1 - x0).hypot(y1 - y0)
            })
            .sum()
    }

    #[test]
    fn test_shape_index_of_polygons() {
        let mut last = f64::INFINITY;
        for n in [3, 4, 6, 12, 48, 360] {
            let v = regular_polygon(n, 10.0);
            let ri = shape_index(shoelace(&v), polygon_perimeter(&v));
            assert!(ri >= 1.0);
            assert!(ri < last);
            last = ri;
        }
        // 正 360 边形几乎是圆.
        assert!((last - 1.0).abs() < 1e-3);
        // 正方形: 2 / sqrt(π).
        assert!(float_eq(shape_index(16.0, 16.0), 2.0 / PI.sqrt()));
    }

    fn rect(top: usize, left: usize, h: usize, w: usize) -> Roi {
        Roi::from_pixels((top..top + h).flat_map(|a| (left..left + w).map(move |b| (a, b))))
    }

    #[test]
    fn test_rows_match_rois() {
        let cal = Calibration::new(0.5, 0.5, None, "micron").unwrap();
        let mut rois = RoiSet::new((30, 30), cal);
        rois.push(rect(2, 2, 4, 10));
        rois.push(rect(10, 10, 8, 8));
        rois.push(rect(20, 3, 3, 8));
        let mask = rois.to_mask();
        let m = Measurer::default().measure("img.tif", &rois, &mask).unwrap();
        assert_eq!(m.table.len(), rois.len());
        assert!(m.gaps.is_empty());

        let first = &m.table.rows()[0];
        assert_eq!(first.label, "img.tif:0004-0007");
        assert!(float_eq(first.area, 10.0));
        // 28 条边长 0.5 的像素边, 扣除 4 个拐角.
        let corner = 1.0 - 0.5_f64.hypot(0.5);
        assert!(float_eq(first.perimeter, 14.0 - 4.0 * corner));
        assert!(m.table.rows().iter().all(|r| r.ri >= 1.0 && r.cable_length >= 0.0));
    }

    #[test]
    fn test_rows_follow_edits() {
        let cal = Calibration::default();
        let mut rois = RoiSet::new((30, 30), cal);
        rois.push(rect(2, 2, 4, 10));
        rois.push(rect(10, 10, 8, 8));
        rois.remove(0);
        rois.push(rect(20, 3, 3, 8));
        rois.push(rect(20, 20, 2, 6));
        let m = Measurer::default().measure("x", &rois, &rois.to_mask()).unwrap();
        assert_eq!(m.table.len(), 3);
        assert_eq!(m.table.rows()[0].label, "x:0014-0014");
    }

    #[test]
    fn test_zero_area_roi_is_a_gap() {
        let cal = Calibration::default();
        let mut rois = RoiSet::new((10, 10), cal);
        rois.push(rect(1, 1, 3, 8));
        rois.push(Roi::from_pixels(None));
        let m = Measurer::default().measure("x", &rois, &rois.to_mask()).unwrap();
        assert_eq!(m.table.len(), 1);
        assert_eq!(m.gaps, vec![Gap { index: 1, name: "empty".to_string() }]);
    }

    /// 很小的方块: 拐角扣除后周长短于同面积的圆, 按致命错误上报.
    #[test]
    fn test_tiny_square_breaks_shape_index() {
        let mut rois = RoiSet::new((10, 10), Calibration::default());
        rois.push(rect(1, 1, 3, 3));
        let err = Measurer::default()
            .measure("x", &rois, &rois.to_mask())
            .unwrap_err();
        assert!(matches!(err, MeasureError::ShapeIndexBelowOne { ref label, ri }
            if label == "x:0002-0002" && ri < 1.0));
    }
}
