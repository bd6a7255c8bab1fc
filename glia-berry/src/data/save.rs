//! 图像的持久化存储.

use std::path::Path;

use image::ImageResult;

use super::{Mask, Plane};

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// `ImgWriteVis` trait 的意图是, 图像将以 "可视化友好" 的方式保存, 而不是 "as is" 的方式.
/// 对于 [`Mask`], 前景保存为白色, 背景保存为黑色; 对于 [`Plane`] 这类以浮点强度存储的图像,
/// 在保存时会以最小/最大值线性拉伸到 `[0, 255]`.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

impl ImgWriteVis for Mask {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (height, width) = self.shape();
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &pix) in self.indexed_iter() {
            buf.put_pixel(w as u32, h as u32, image::Luma([pix]));
        }
        buf.save(path)
    }
}

impl ImgWriteVis for Plane {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (height, width) = self.shape();
        let (lo, hi) = self.min_max().unwrap_or((0.0, 0.0));
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &v) in self.indexed_iter() {
            buf.put_pixel(w as u32, h as u32, image::Luma([stretch(v, lo, hi)]));
        }
        buf.save(path)
    }
}

/// 将 `v` 从 `[lo, hi]` 线性映射到 `[0, 255]`, 超出部分截断.
#[inline]
pub(crate) fn stretch(v: f32, lo: f32, hi: f32) -> u8 {
    if !v.is_finite() || hi <= lo {
        return 0;
    }
    let t = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
    (t * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Calibration;

    #[test]
    fn test_stretch() {
        assert_eq!(stretch(0.0, 0.0, 10.0), 0);
        assert_eq!(stretch(10.0, 0.0, 10.0), 255);
        assert_eq!(stretch(20.0, 0.0, 10.0), 255);
        assert_eq!(stretch(5.0, 5.0, 5.0), 0);
    }

    #[test]
    fn test_save_mask_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let m = Mask::from_positions((3, 4), Calibration::default(), [(1, 1)]);
        m.save(&path).unwrap();
        let back = image::open(&path).unwrap().into_luma8();
        assert_eq!(back.dimensions(), (4, 3));
        assert_eq!(back.get_pixel(1, 1).0, [255]);
        assert_eq!(back.get_pixel(0, 0).0, [0]);
    }
}
