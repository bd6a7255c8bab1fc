//! 全局阈值与对比度范围.

use crate::{Mask, Plane};

/// 直方图桶数.
const BINS: usize = 256;

/// 以 Otsu 方法计算全局阈值 (类间方差最大).
///
/// 直方图在有限值的 `[min, max]` 上均分为 256 个桶. 返回值 `t` 满足:
/// 强度 `>= t` 的像素属于前景 (暗背景约定). 若不存在有限值或所有有限值相等,
/// 说明图像没有可分的两类, 返回 `None`.
pub fn otsu<'a, I>(values: I) -> Option<f32>
where
    I: IntoIterator<Item = &'a f32>,
{
    let values: Vec<f32> = values.into_iter().copied().filter(|v| v.is_finite()).collect();
    let (lo, hi) = values.iter().fold(None, |acc: Option<(f32, f32)>, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })?;
    if lo == hi {
        return None;
    }

    let width = (hi - lo) as f64 / BINS as f64;
    let mut histogram = [0_u64; BINS];
    for &v in values.iter() {
        let bin = (((v - lo) as f64 / width) as usize).min(BINS - 1);
        histogram[bin] += 1;
    }

    let total = values.len() as f64;
    let sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut sum_b = 0.0;
    let mut weight_b = 0.0;
    let mut max_variance = -1.0;
    let mut best = 0;
    for (i, &count) in histogram.iter().enumerate() {
        weight_b += count as f64;
        if weight_b == 0.0 {
            continue;
        }
        let weight_f = total - weight_b;
        if weight_f == 0.0 {
            break;
        }
        sum_b += i as f64 * count as f64;
        let mean_b = sum_b / weight_b;
        let mean_f = (sum - sum_b) / weight_f;
        let variance = weight_b * weight_f * (mean_b - mean_f).powi(2);
        if variance > max_variance {
            max_variance = variance;
            best = i;
        }
    }

    Some((lo as f64 + (best + 1) as f64 * width) as f32)
}

/// 以阈值 `t` 二值化: 强度 `>= t` 为前景.
pub fn binarize(plane: &Plane, t: f32) -> Mask {
    Mask::from_fn(plane.shape(), plane.calibration().clone(), |pos| plane[pos] >= t)
}

/// 以 Otsu 阈值二值化. 无法确定阈值 (例如常值图像) 时返回全背景掩膜.
pub fn otsu_mask(plane: &Plane) -> Mask {
    match otsu(plane.iter()) {
        Some(t) => binarize(plane, t),
        None => {
            log::debug!("Otsu threshold undefined on a flat image, mask left empty");
            Mask::background(plane.shape(), plane.calibration().clone())
        }
    }
}

/// 对比度增强的显示范围: 两端各有 `saturated / 2` 百分比的像素被饱和.
///
/// 若不存在有限值则返回 `None`.
pub fn contrast_limits(plane: &Plane, saturated: f64) -> Option<(f32, f32)> {
    let mut values: Vec<f32> = plane.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f32::total_cmp);

    let tail = (saturated / 100.0 / 2.0).clamp(0.0, 0.5);
    let last = values.len() - 1;
    let lo = (tail * last as f64).floor() as usize;
    let hi = ((1.0 - tail) * last as f64).ceil() as usize;
    Some((values[lo], values[hi.min(last)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Calibration;
    use ndarray::Array2;

    fn two_level(shape: (usize, usize), bright: impl Fn((usize, usize)) -> bool) -> Plane {
        let data = Array2::from_shape_fn(shape, |pos| if bright(pos) { 200.0 } else { 10.0 });
        Plane::new(data, Calibration::default())
    }

    #[test]
    fn test_otsu_separates_two_levels() {
        let p = two_level((10, 10), |(h, _)| h < 3);
        let t = otsu(p.iter()).unwrap();
        assert!(t > 10.0 && t <= 200.0);
        let m = binarize(&p, t);
        assert_eq!(m.count_foreground(), 30);
    }

    #[test]
    fn test_otsu_three_levels() {
        // 两个暗的类和一个亮的类, 阈值应落在中间类和亮类之间.
        let data = Array2::from_shape_fn((30, 10), |(h, _)| match h {
            0..=9 => 0.0,
            10..=19 => 20.0,
            _ => 250.0,
        });
        let p = Plane::new(data, Calibration::default());
        let t = otsu(p.iter()).unwrap();
        assert!(t > 20.0 && t <= 250.0);
    }

    #[test]
    fn test_flat_image() {
        let p = Plane::new(Array2::from_elem((4, 4), 7.0), Calibration::default());
        assert!(otsu(p.iter()).is_none());
        assert!(otsu_mask(&p).is_background());
    }

    #[test]
    fn test_contrast_limits() {
        let data = Array2::from_shape_fn((10, 100), |(h, w)| (h * 100 + w) as f32);
        let p = Plane::new(data, Calibration::default());
        let (lo, hi) = contrast_limits(&p, 0.35).unwrap();
        assert!(lo <= 2.0);
        assert!(hi >= 997.0);
        assert_eq!(contrast_limits(&p, 0.0), Some((0.0, 999.0)));
    }
}
