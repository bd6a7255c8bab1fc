use std::ops::Index;

use ndarray::{Array2, Array4, ArrayView3, Axis};
use thiserror::Error;

use super::{Calibration, Plane};
use crate::consts::CHANNELS;

/// 构建 [`Stack`] 错误. 属于致命的输入错误.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// 通道数不是 2.
    #[error("expected {CHANNELS} channels, found {0}")]
    ChannelCount(usize),

    /// 某个维度长度为 0. 参数为 `(c, z, h, w)` 形状.
    #[error("malformed stack dimensions {0:?}")]
    EmptyDimension((usize, usize, usize, usize)),
}

/// 双通道荧光图像栈, 包括强度数据和标定. 强度值以 `f32` 保存.
///
/// 数据按照 `(c, z, h, w)` 模式访问.
#[derive(Debug, Clone)]
pub struct Stack {
    data: Array4<f32>,
    calibration: Calibration,
}

impl Index<(usize, usize, usize, usize)> for Stack {
    type Output = f32;

    #[inline]
    fn index(&self, index: (usize, usize, usize, usize)) -> &Self::Output {
        &self.data[index]
    }
}

impl Stack {
    /// 从 `(c, z, h, w)` 数据和标定构建图像栈.
    ///
    /// 通道数必须恰为 2, 其余维度必须非空.
    pub fn new(data: Array4<f32>, calibration: Calibration) -> Result<Self, StackError> {
        let (c, z, h, w) = data.dim();
        if c != CHANNELS {
            return Err(StackError::ChannelCount(c));
        }
        if z == 0 || h == 0 || w == 0 {
            return Err(StackError::EmptyDimension((c, z, h, w)));
        }
        Ok(Self { data, calibration })
    }

    /// 数据形状 `(c, z, h, w)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        self.data.dim()
    }

    /// z 层个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.shape().1
    }

    /// 标定.
    #[inline]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// 获取第 `c` 个通道的 `(z, h, w)` 视图. 越界时 panic.
    #[inline]
    pub fn channel(&self, c: usize) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(0), c)
    }

    /// 第 `c` 个通道的最大强度投影. 越界时 panic.
    ///
    /// 每个像素取 z 方向的最大值, 不插值; 结果沿用 x/y 标定并丢弃 z 标定.
    pub fn channel_projection(&self, c: usize) -> Plane {
        let channel = self.channel(c);
        let data: Array2<f32> = channel.fold_axis(Axis(0), f32::NEG_INFINITY, |&acc, &v| acc.max(v));
        Plane::new(data, self.calibration.planar())
    }

    /// 所有通道的最大强度投影, 按通道顺序排列.
    #[inline]
    pub fn max_projection(&self) -> [Plane; CHANNELS] {
        [self.channel_projection(0), self.channel_projection(1)]
    }
}
