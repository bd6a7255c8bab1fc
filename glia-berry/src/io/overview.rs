//! 概览图: 双通道合成图 (带 ROI 轮廓) 和掩膜叠加图.

use std::path::Path;

use image::{Rgb, RgbImage};

use super::PersistResult;
use crate::data::stretch;
use crate::roi::RoiSet;
use crate::segment::threshold::contrast_limits;
use crate::{Mask, Plane};

/// ROI 轮廓颜色.
const OUTLINE: Rgb<u8> = Rgb([255, 255, 0]);

/// 合成图: 细胞核通道为蓝色, 小胶质细胞通道为绿色, 各自按 `saturated` (百分比) 增强对比度;
/// ROI 的边界像素以黄色标出.
///
/// 两个通道的形状必须一致.
pub fn composite(nucleus: &Plane, microglia: &Plane, rois: &RoiSet, saturated: f64) -> RgbImage {
    assert_eq!(nucleus.shape(), microglia.shape());
    let (height, width) = nucleus.shape();
    let (n_lo, n_hi) = contrast_limits(nucleus, saturated).unwrap_or((0.0, 0.0));
    let (m_lo, m_hi) = contrast_limits(microglia, saturated).unwrap_or((0.0, 0.0));

    let mut buf = RgbImage::new(width as u32, height as u32);
    for ((h, w), &v) in nucleus.indexed_iter() {
        let blue = stretch(v, n_lo, n_hi);
        let green = stretch(microglia[(h, w)], m_lo, m_hi);
        buf.put_pixel(w as u32, h as u32, Rgb([0, green, blue]));
    }
    for roi in rois {
        for (h, w) in roi.boundary_pixels() {
            if h < height && w < width {
                buf.put_pixel(w as u32, h as u32, OUTLINE);
            }
        }
    }
    buf
}

/// 掩膜叠加图: 小胶质细胞掩膜为红色, 细胞核掩膜为蓝色.
pub fn masks_overview(microglia: &Mask, nuclei: &Mask) -> RgbImage {
    assert_eq!(microglia.shape(), nuclei.shape());
    let (height, width) = microglia.shape();
    let mut buf = RgbImage::new(width as u32, height as u32);
    for ((h, w), &pix) in microglia.indexed_iter() {
        buf.put_pixel(w as u32, h as u32, Rgb([pix, 0, nuclei[(h, w)]]));
    }
    buf
}

/// 保存合成图. 格式由扩展名决定, 通常为 `.tif`.
pub fn save_composite<P: AsRef<Path>>(
    path: P,
    nucleus: &Plane,
    microglia: &Plane,
    rois: &RoiSet,
    saturated: f64,
) -> PersistResult<()> {
    composite(nucleus, microglia, rois, saturated).save(path)?;
    Ok(())
}

/// 保存掩膜叠加图, 通常为 `_masks.png`.
pub fn save_masks_overview<P: AsRef<Path>>(path: P, microglia: &Mask, nuclei: &Mask) -> PersistResult<()> {
    masks_overview(microglia, nuclei).save(path)?;
    Ok(())
}
