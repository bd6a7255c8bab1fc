//! 感兴趣区域 (ROI) 及其有序集合.
//!
//! ROI 以栅格化的像素集合表示, 像素按行优先顺序排列且不重复.
//! [`RoiSet`] 中 ROI 的顺序在过滤, 编辑和测量之间保持稳定.

use std::collections::HashSet;

use itertools::Itertools;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::data::BoundingBox;
use crate::eight::neighbour4;
use crate::{Calibration, Idx2d, Mask};

mod contour;
mod nucleus_filter;

pub use nucleus_filter::NucleusFilter;

/// 2D 感兴趣区域.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roi {
    name: String,
    pixels: Vec<Idx2d>,
    bbox: Option<BoundingBox>,
}

impl Roi {
    /// 从像素集合创建 ROI. 名称按包围盒中心取为 `yyyy-xxxx`.
    pub fn from_pixels<I: IntoIterator<Item = Idx2d>>(it: I) -> Self {
        let pixels: Vec<Idx2d> = it.into_iter().sorted_unstable().dedup().collect();
        let bbox = BoundingBox::from_points(pixels.iter().copied());
        let name = match bbox {
            Some(b) => {
                let (ch, cw) = b.center();
                format!("{ch:04}-{cw:04}")
            }
            None => "empty".to_string(),
        };
        Self { name, pixels, bbox }
    }

    /// 从多边形创建 ROI. 顶点以 `(h, w)` 实数坐标给出, 像素 `(h, w)` 占据
    /// `[h, h + 1) x [w, w + 1)`; 像素中心落在多边形内 (奇偶规则) 的像素属于 ROI.
    /// 超出 `shape` 的部分被裁掉.
    pub fn from_polygon(vertices: &[(f64, f64)], (height, width): Idx2d) -> Self {
        if vertices.len() < 3 {
            return Self::from_pixels(None);
        }
        let (min_h, max_h) = vertices
            .iter()
            .map(|v| v.0)
            .minmax()
            .into_option()
            .unwrap_or((0.0, 0.0));
        let h0 = min_h.floor().max(0.0) as usize;
        let h1 = (max_h.ceil().max(0.0) as usize).min(height);

        let mut pixels = Vec::new();
        for h in h0..h1 {
            let y = h as f64 + 0.5;
            // 扫描线与各边的交点.
            let xs: Vec<f64> = vertices
                .iter()
                .circular_tuple_windows()
                .filter_map(|(&(ya, xa), &(yb, xb))| {
                    ((ya <= y) != (yb <= y)).then(|| xa + (y - ya) / (yb - ya) * (xb - xa))
                })
                .sorted_by(f64::total_cmp)
                .collect();
            for (&l, &r) in xs.iter().tuples() {
                // 像素中心 w + 0.5 位于 [l, r) 内.
                let w0 = (l - 0.5).ceil().max(0.0) as usize;
                let w1 = ((r - 0.5).ceil().max(0.0) as usize).min(width);
                pixels.extend((w0..w1).map(|w| (h, w)));
            }
        }
        Self::from_pixels(pixels)
    }

    /// 修改名称.
    #[inline]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 名称.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 按行优先顺序排列的像素.
    #[inline]
    pub fn pixels(&self) -> &[Idx2d] {
        &self.pixels
    }

    /// 像素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// 是否不含任何像素.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// 包围盒. 空 ROI 没有包围盒.
    #[inline]
    pub fn bbox(&self) -> Option<&BoundingBox> {
        self.bbox.as_ref()
    }

    /// 是否包含像素 `pos`.
    #[inline]
    pub fn contains(&self, pos: Idx2d) -> bool {
        self.pixels.binary_search(&pos).is_ok()
    }

    /// 标定面积.
    #[inline]
    pub fn area(&self, cal: &Calibration) -> f64 {
        self.len() as f64 * cal.pixel_area()
    }

    /// 标定周长: 按 8-邻域追踪外轮廓, 以 ImageJ 的方式计长.
    ///
    /// 水平边长度为像素宽度, 竖直边长度为像素高度; 阶梯状的斜边按像素对角线计长,
    /// 因此圆盘的分枝指数接近 1. 孔洞不计入.
    pub fn perimeter(&self, cal: &Calibration) -> f64 {
        contour::traced_perimeter(&self.pixels, cal)
    }

    /// 边界像素: ROI 内至少有一个 4-邻居不在 ROI 内的像素.
    pub fn boundary_pixels(&self) -> Vec<Idx2d> {
        let inside: HashSet<Idx2d> = self.pixels.iter().copied().collect();
        self.pixels
            .iter()
            .copied()
            .filter(|&pos| neighbour4(pos).iter().any(|p| !inside.contains(p)))
            .collect()
    }

    /// 统计 `mask` 中位于 ROI 内的前景像素个数.
    pub fn count_foreground_in(&self, mask: &Mask) -> usize {
        self.pixels
            .iter()
            .filter(|&&p| mask.is_foreground_at(p))
            .count()
    }
}

/// 有序 ROI 集合. 所有 ROI 都属于同一幅 `shape` 大小, 以 `calibration` 标定的图像.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct RoiSet {
    shape: Idx2d,
    calibration: Calibration,
    rois: Vec<Roi>,
}

impl RoiSet {
    /// 创建空集合.
    #[inline]
    pub fn new(shape: Idx2d, calibration: Calibration) -> Self {
        Self {
            shape,
            calibration,
            rois: Vec::new(),
        }
    }

    /// 图像形状.
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.shape
    }

    /// 标定.
    #[inline]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// 追加一个 ROI. 重名时在名称后追加 `-1`, `-2`, ... 保证名称唯一.
    pub fn push(&mut self, roi: Roi) {
        let roi = if self.rois.iter().any(|r| r.name == roi.name) {
            let base = roi.name.clone();
            let name = (1..)
                .map(|k| format!("{base}-{k}"))
                .find(|n| self.rois.iter().all(|r| &r.name != n))
                .unwrap_or(base);
            roi.with_name(name)
        } else {
            roi
        };
        self.rois.push(roi);
    }

    /// ROI 个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rois.len()
    }

    /// 是否为空集合.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    /// 按顺序迭代所有 ROI.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Roi> {
        self.rois.iter()
    }

    /// 第 `index` 个 ROI.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Roi> {
        self.rois.get(index)
    }

    /// 移除第 `index` 个 ROI, 其后的 ROI 依次前移. 越界时 panic.
    #[inline]
    pub fn remove(&mut self, index: usize) -> Roi {
        self.rois.remove(index)
    }

    /// 按谓词把集合分成 (保留, 丢弃) 两部分, 两部分都保持原有顺序.
    pub fn partition<F: FnMut(&Roi) -> bool>(self, mut keep: F) -> (Self, Self) {
        let Self {
            shape,
            calibration,
            rois,
        } = self;
        let (kept, dropped): (Vec<_>, Vec<_>) = rois.into_iter().partition(|r| keep(r));
        (
            Self {
                shape,
                calibration: calibration.clone(),
                rois: kept,
            },
            Self {
                shape,
                calibration,
                rois: dropped,
            },
        )
    }

    /// 去掉各 ROI 中超出图像范围的像素, 名称保持不变. 返回被裁剪的 ROI 个数.
    pub fn clip_to_shape(&mut self) -> usize {
        let (height, width) = self.shape;
        let inside = |&(h, w): &Idx2d| h < height && w < width;
        let mut clipped = 0;
        for roi in self.rois.iter_mut() {
            if roi.pixels.iter().all(inside) {
                continue;
            }
            let kept: Vec<Idx2d> = roi.pixels.iter().copied().filter(inside).collect();
            let name = std::mem::take(&mut roi.name);
            *roi = Roi::from_pixels(kept).with_name(name);
            clipped += 1;
        }
        clipped
    }

    /// 把所有 ROI 栅格化为一幅掩膜.
    pub fn to_mask(&self) -> Mask {
        Mask::from_positions(
            self.shape,
            self.calibration.clone(),
            self.rois.iter().flat_map(|r| r.pixels.iter().copied()),
        )
    }
}

impl<'a> IntoIterator for &'a RoiSet {
    type Item = &'a Roi;
    type IntoIter = std::slice::Iter<'a, Roi>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.rois.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn rect(top: usize, left: usize, h: usize, w: usize) -> Roi {
        Roi::from_pixels((top..top + h).flat_map(|a| (left..left + w).map(move |b| (a, b))))
    }

    #[test]
    fn test_name_and_bbox() {
        let r = rect(10, 20, 5, 7);
        assert_eq!(r.name(), "0012-0023");
        assert_eq!(r.bbox().unwrap().shape(), (5, 7));
        assert!(r.contains((14, 26)));
        assert!(!r.contains((15, 26)));
    }

    #[test]
    fn test_area_perimeter_rect() {
        let cal = Calibration::new(0.5, 2.0, None, "micron").unwrap();
        let r = rect(1, 1, 3, 4);
        assert!(float_eq(r.area(&cal), 12.0 * 1.0));
        // 上下各 4 条宽 0.5 的边, 左右各 3 条高 2.0 的边, 再扣除 4 个拐角.
        let corner = 0.5 + 2.0 - 0.5_f64.hypot(2.0);
        assert!(float_eq(r.perimeter(&cal), 8.0 * 0.5 + 6.0 * 2.0 - 4.0 * corner));
    }

    #[test]
    fn test_perimeter_at_origin() {
        let r = rect(0, 0, 2, 2);
        let expected = 8.0 - 4.0 * (2.0 - std::f64::consts::SQRT_2);
        assert!(float_eq(r.perimeter(&Calibration::default()), expected));
    }

    /// 栅格化的圆盘: 分枝指数不小于 1 且接近 1.
    #[test]
    fn test_disc_shape_index_near_one() {
        let cal = Calibration::default();
        for radius in [8.0_f64, 15.0, 40.0] {
            let size = (2.0 * radius) as usize + 2;
            let c = size as f64 / 2.0;
            let inside = |&(h, w): &Idx2d| {
                let (dh, dw) = (h as f64 + 0.5 - c, w as f64 + 0.5 - c);
                dh * dh + dw * dw <= radius * radius
            };
            let square = (0..size).flat_map(|h| (0..size).map(move |w| (h, w)));
            let disc = Roi::from_pixels(square.filter(inside));
            let ri = crate::measure::shape_index(disc.area(&cal), disc.perimeter(&cal));
            assert!((1.0..1.1).contains(&ri), "r = {radius}: ri = {ri}");
        }
    }

    #[test]
    fn test_from_polygon_square() {
        let r = Roi::from_polygon(&[(1.0, 1.0), (1.0, 4.0), (4.0, 4.0), (4.0, 1.0)], (10, 10));
        assert_eq!(r, rect(1, 1, 3, 3));
    }

    #[test]
    fn test_from_polygon_clipped() {
        let r = Roi::from_polygon(&[(-2.0, -2.0), (-2.0, 2.0), (2.0, 2.0), (2.0, -2.0)], (10, 10));
        assert_eq!(r.len(), 4);
        assert!(Roi::from_polygon(&[(0.0, 0.0), (1.0, 1.0)], (3, 3)).is_empty());
    }

    #[test]
    fn test_set_names_unique_and_partition() {
        let mut set = RoiSet::new((20, 20), Calibration::default());
        set.push(rect(0, 0, 3, 3));
        set.push(rect(0, 0, 3, 3));
        set.push(rect(10, 10, 2, 2));
        assert_eq!(set.get(1).unwrap().name(), "0001-0001-1");

        let (kept, dropped) = set.partition(|r| r.len() > 4);
        assert_eq!(kept.len(), 2);
        assert_eq!(dropped.len(), 1);
        assert_eq!(kept.get(0).unwrap().name(), "0001-0001");
        assert_eq!(kept.to_mask().count_foreground(), 9);
    }

    #[test]
    fn test_clip_to_shape() {
        let mut set = RoiSet::new((10, 10), Calibration::default());
        set.push(rect(2, 2, 3, 3));
        set.push(rect(8, 7, 4, 5));
        set.push(rect(12, 0, 2, 2));
        assert_eq!(set.clip_to_shape(), 2);

        assert_eq!(set.get(0), Some(&rect(2, 2, 3, 3)));
        let edge = set.get(1).unwrap();
        assert_eq!(edge.name(), "0010-0009");
        assert_eq!(edge.len(), 6);
        assert_eq!(edge.bbox().unwrap().shape(), (2, 3));
        assert!(set.get(2).unwrap().is_empty());
        assert_eq!(set.clip_to_shape(), 0);
    }
}
