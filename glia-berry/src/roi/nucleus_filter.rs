use super::{Roi, RoiSet};
use crate::config::Config;
use crate::Mask;

/// 细胞核验证: 丢弃内部细胞核信号不足的候选区域.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NucleusFilter {
    floor: f64,
}

impl NucleusFilter {
    /// 以最小细胞核面积 (标定单位) 初始化.
    #[inline]
    pub fn new(floor: f64) -> Self {
        Self { floor }
    }

    /// 从运行参数初始化.
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.nucleus_intersection)
    }

    /// 最小细胞核面积.
    #[inline]
    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// ROI 内细胞核前景的标定面积: `ROI 面积 x ROI 内前景像素占比`.
    /// 空 ROI 的重叠面积为 0.
    pub fn overlap(&self, roi: &Roi, nuclei: &Mask) -> f64 {
        if roi.is_empty() {
            return 0.0;
        }
        let fraction = roi.count_foreground_in(nuclei) as f64 / roi.len() as f64;
        roi.area(nuclei.calibration()) * fraction
    }

    /// 保留重叠面积不小于下限的 ROI, 顺序不变.
    pub fn filter(&self, candidates: RoiSet, nuclei: &Mask) -> RoiSet {
        let before = candidates.len();
        let (kept, dropped) = candidates.partition(|roi| self.overlap(roi, nuclei) >= self.floor);
        for roi in dropped.iter() {
            log::debug!(
                "ROI {} dropped: nucleus overlap {:.3} < {}",
                roi.name(),
                self.overlap(roi, nuclei),
                self.floor
            );
        }
        log::info!("Nucleus filter kept {} of {before} candidates", kept.len());
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Calibration;

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn disc(ch: usize, cw: usize, r2: usize) -> impl Fn((usize, usize)) -> bool {
        move |(h, w)| {
            let dh = h.abs_diff(ch);
            let dw = w.abs_diff(cw);
            dh * dh + dw * dw <= r2
        }
    }

    #[test]
    fn test_overlap_equals_disc_area() {
        let cal = Calibration::new(0.5, 0.5, None, "micron").unwrap();
        let shape = (40, 40);
        // 15x15 的方形 ROI 完全覆盖一个半径 4 的细胞核圆盘.
        let roi = Roi::from_pixels((5..20).flat_map(|h| (5..20).map(move |w| (h, w))));
        let nuclei = Mask::from_fn(shape, cal.clone(), disc(12, 12, 16));
        let disc_area = nuclei.foreground_area();
        let f = NucleusFilter::new(1.0);
        assert!(float_eq(f.overlap(&roi, &nuclei), disc_area));
    }

    #[test]
    fn test_discard_iff_below_floor() {
        let cal = Calibration::default();
        let shape = (40, 40);
        let mut set = RoiSet::new(shape, cal.clone());
        // 左边的 ROI 内有 49 像素的细胞核, 右边的 ROI 内只有 9 像素.
        set.push(Roi::from_pixels((0..10).flat_map(|h| (0..10).map(move |w| (h, w)))));
        set.push(Roi::from_pixels((0..10).flat_map(|h| (20..30).map(move |w| (h, w)))));
        let nuclei = Mask::from_fn(shape, cal, |(h, w)| {
            (2..9).contains(&h) && (2..9).contains(&w) || (2..5).contains(&h) && (22..25).contains(&w)
        });

        let kept = NucleusFilter::new(15.0).filter(set.clone(), &nuclei);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.get(0), set.get(0));

        // 恰好等于下限时保留.
        assert_eq!(NucleusFilter::new(9.0).filter(set.clone(), &nuclei).len(), 2);
        assert_eq!(NucleusFilter::new(49.5).filter(set, &nuclei).len(), 0);
    }

    #[test]
    fn test_empty_roi_has_no_overlap() {
        let nuclei = Mask::from_fn((4, 4), Calibration::default(), |_| true);
        let f = NucleusFilter::new(0.0);
        assert_eq!(f.overlap(&Roi::from_pixels(None), &nuclei), 0.0);
    }
}
