use std::ops::Index;

use ndarray::{Array2, ArrayView2};

use super::Calibration;
use crate::Idx2d;

/// 拥有所有权的 2D 强度图 (例如某通道的最大强度投影), 包括强度数据和标定.
#[derive(Debug, Clone)]
pub struct Plane {
    data: Array2<f32>,
    calibration: Calibration,
}

impl Index<Idx2d> for Plane {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl Plane {
    /// 直接初始化.
    #[inline]
    pub fn new(data: Array2<f32>, calibration: Calibration) -> Self {
        Self { data, calibration }
    }

    /// 获得底层数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array2<f32> {
        self.data
    }

    /// 标定.
    #[inline]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// 图像的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> Option<&f32> {
        self.data.get(pos)
    }

    /// 以行优先规则, 获取能迭代图像所有 `(索引, 像素值)` 的迭代器.
    #[inline]
    pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &f32)> {
        self.data.indexed_iter()
    }

    /// 获取可以迭代图像像素的迭代器.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.data.iter()
    }

    /// 获取有限像素值中的最小值和最大值. 若不存在有限像素值则返回 `None`.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
