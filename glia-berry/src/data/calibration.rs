#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 像素到物理长度的标定.
///
/// 每幅派生出的 2D 图像, 掩膜和 ROI 都沿用源图像的标定; 投影时仅丢弃 z 方向的分辨率.
/// 该结构是只读的. 若要修改参数, 你应该创建新的实例.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    pixel_width: f64,
    pixel_height: f64,
    voxel_depth: Option<f64>,
    unit: String,
}

impl Default for Calibration {
    #[inline]
    fn default() -> Self {
        Self::uncalibrated()
    }
}

impl Calibration {
    /// 构建标定.
    ///
    /// 所有分辨率必须是有限正数, 否则返回 `None`.
    pub fn new(
        pixel_width: f64,
        pixel_height: f64,
        voxel_depth: Option<f64>,
        unit: impl Into<String>,
    ) -> Option<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if valid(pixel_width) && valid(pixel_height) && voxel_depth.map_or(true, valid) {
            Some(Self {
                pixel_width,
                pixel_height,
                voxel_depth,
                unit: unit.into(),
            })
        } else {
            None
        }
    }

    /// 未标定的图像: 每个像素边长为 1, 单位为 `pixel`.
    #[inline]
    pub fn uncalibrated() -> Self {
        Self {
            pixel_width: 1.0,
            pixel_height: 1.0,
            voxel_depth: Some(1.0),
            unit: "pixel".to_string(),
        }
    }

    /// 获得丢弃 z 方向分辨率后的平面标定.
    #[inline]
    pub fn planar(&self) -> Self {
        Self {
            voxel_depth: None,
            ..self.clone()
        }
    }

    /// 宽方向 (自然图像的水平方向) 像素分辨率.
    #[inline]
    pub fn pixel_width(&self) -> f64 {
        self.pixel_width
    }

    /// 高方向 (自然图像的垂直方向) 像素分辨率.
    #[inline]
    pub fn pixel_height(&self) -> f64 {
        self.pixel_height
    }

    /// z 方向体素分辨率. 平面标定返回 `None`.
    #[inline]
    pub fn voxel_depth(&self) -> Option<f64> {
        self.voxel_depth
    }

    /// 长度单位.
    #[inline]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// 单个像素的实际面积.
    #[inline]
    pub fn pixel_area(&self) -> f64 {
        self.pixel_width * self.pixel_height
    }

    /// 将实际长度换算为宽方向的像素数.
    #[inline]
    pub fn length_to_pixels(&self, length: f64) -> f64 {
        length / self.pixel_width
    }

    /// 两个像素中心之间的实际距离, `dh` 和 `dw` 分别是两个方向上的像素差.
    #[inline]
    pub fn distance(&self, dh: usize, dw: usize) -> f64 {
        let h = dh as f64 * self.pixel_height;
        let w = dw as f64 * self.pixel_width;
        h.hypot(w)
    }
}
