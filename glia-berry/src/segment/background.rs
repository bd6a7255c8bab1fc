//! 滚球 (rolling ball) 背景扣除.
//!
//! 背景被定义为一个半径为 `r` 的球从图像表面下方滚过时所能到达的最高位置,
//! 即以球面为结构元的灰度开运算. 为了控制大半径下的开销, 先按块最小值缩小图像,
//! 在小图上做开运算, 再双线性插值回原尺寸.

use ndarray::{Array2, ArrayView2, Zip};

use crate::Plane;

/// 球面结构元上的一个点: 相对位置 `(dh, dw)` 和球面高度.
type BallPoint = (isize, isize, f32);

/// 滚球背景扣除器.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RollingBall {
    radius: f64,
}

impl RollingBall {
    /// 以像素半径初始化. 半径必须是有限正数, 否则返回 `None`.
    #[inline]
    pub fn new(radius: f64) -> Option<Self> {
        (radius.is_finite() && radius > 0.0).then_some(Self { radius })
    }

    /// 半径 (像素).
    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// 缩小倍数. 半径越大, 缩得越多.
    #[inline]
    pub fn shrink_factor(&self) -> usize {
        match self.radius {
            r if r <= 10.0 => 1,
            r if r <= 30.0 => 2,
            r if r <= 100.0 => 4,
            _ => 8,
        }
    }

    /// 估计背景. 返回的图像与 `plane` 形状和标定一致.
    pub fn background(&self, plane: &Plane) -> Plane {
        let shrink = self.shrink_factor();
        let small = shrink_min(plane.data(), shrink);
        let ball = self.ball(shrink);

        let eroded = ball_filter(small.view(), &ball, Extremum::Min);
        let opened = ball_filter(eroded.view(), &ball, Extremum::Max);

        let data = if shrink == 1 {
            opened
        } else {
            enlarge(opened.view(), plane.shape(), shrink)
        };
        Plane::new(data, plane.calibration().clone())
    }

    /// 扣除背景, 结果截断到非负.
    pub fn subtract(&self, plane: &Plane) -> Plane {
        let bg = self.background(plane);
        let mut data = plane.data().to_owned();
        Zip::from(&mut data)
            .and(bg.data())
            .for_each(|v, &b| *v = (*v - b).max(0.0));
        Plane::new(data, plane.calibration().clone())
    }

    /// 缩小 `shrink` 倍后的球面结构元.
    fn ball(&self, shrink: usize) -> Vec<BallPoint> {
        let r = (self.radius / shrink as f64).max(1.0);
        let reach = r.floor() as isize;
        let mut ans = Vec::with_capacity(((2 * reach + 1) * (2 * reach + 1)) as usize);
        for dh in -reach..=reach {
            for dw in -reach..=reach {
                let d2 = (dh * dh + dw * dw) as f64;
                if d2 <= r * r {
                    ans.push((dh, dw, (r * r - d2).sqrt() as f32));
                }
            }
        }
        ans
    }
}

#[derive(Copy, Clone)]
enum Extremum {
    /// 腐蚀: `e(p) = min(I(p + o) - z(o))`.
    Min,

    /// 膨胀: `d(p) = max(I(p - o) + z(o))`.
    Max,
}

/// 以球面为结构元的灰度腐蚀/膨胀. 图像外的像素不参与计算.
fn ball_filter(src: ArrayView2<'_, f32>, ball: &[BallPoint], op: Extremum) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros(src.dim());
    let eval = |(h, w): (usize, usize), v: &mut f32| {
        let mut acc = match op {
            Extremum::Min => f32::INFINITY,
            Extremum::Max => f32::NEG_INFINITY,
        };
        for &(dh, dw, z) in ball {
            let (dh, dw) = match op {
                Extremum::Min => (dh, dw),
                Extremum::Max => (-dh, -dw),
            };
            let Some(&p) = h
                .checked_add_signed(dh)
                .zip(w.checked_add_signed(dw))
                .and_then(|q| src.get(q))
            else {
                continue;
            };
            acc = match op {
                Extremum::Min => acc.min(p - z),
                Extremum::Max => acc.max(p + z),
            };
        }
        *v = acc;
    };

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            Zip::indexed(&mut out).par_for_each(eval);
        } else {
            Zip::indexed(&mut out).for_each(eval);
        }
    }
    out
}

/// 按 `shrink x shrink` 的块取最小值缩小图像.
fn shrink_min(src: ArrayView2<'_, f32>, shrink: usize) -> Array2<f32> {
    if shrink == 1 {
        return src.to_owned();
    }
    let (h, w) = src.dim();
    let small = (h.div_ceil(shrink), w.div_ceil(shrink));
    Array2::from_shape_fn(small, |(sh, sw)| {
        let (h0, w0) = (sh * shrink, sw * shrink);
        let mut acc = f32::INFINITY;
        for hh in h0..(h0 + shrink).min(h) {
            for ww in w0..(w0 + shrink).min(w) {
                acc = acc.min(src[(hh, ww)]);
            }
        }
        acc
    })
}

/// 将缩小图双线性插值回 `shape` 尺寸. 小图像素 `(i, j)` 代表原图块中心.
fn enlarge(small: ArrayView2<'_, f32>, shape: (usize, usize), shrink: usize) -> Array2<f32> {
    let (sh, sw) = small.dim();
    let s = shrink as f64;
    let coord = |x: usize, len: usize| -> (usize, usize, f32) {
        let f = ((x as f64 + 0.5) / s - 0.5).clamp(0.0, (len - 1) as f64);
        let i0 = f.floor() as usize;
        let i1 = (i0 + 1).min(len - 1);
        (i0, i1, (f - i0 as f64) as f32)
    };
    Array2::from_shape_fn(shape, |(h, w)| {
        let (h0, h1, th) = coord(h, sh);
        let (w0, w1, tw) = coord(w, sw);
        let top = small[(h0, w0)] * (1.0 - tw) + small[(h0, w1)] * tw;
        let bottom = small[(h1, w0)] * (1.0 - tw) + small[(h1, w1)] * tw;
        top * (1.0 - th) + bottom * th
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Calibration;

    fn float_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_shrink_factor() {
        let f = |r| RollingBall::new(r).unwrap().shrink_factor();
        assert_eq!(f(5.0), 1);
        assert_eq!(f(30.0), 2);
        assert_eq!(f(50.0), 4);
        assert_eq!(f(200.0), 8);
        assert!(RollingBall::new(0.0).is_none());
    }

    #[test]
    fn test_flat_background_removed() {
        let p = Plane::new(Array2::from_elem((40, 40), 50.0), Calibration::default());
        let out = RollingBall::new(30.0).unwrap().subtract(&p);
        assert!(out.iter().all(|&v| float_eq(v, 0.0)));
    }

    #[test]
    fn test_small_spot_survives() {
        // 平坦背景 + 一个 3x3 的亮斑. 亮斑远小于球, 扣除后应基本保留.
        let data = Array2::from_shape_fn((41, 41), |(h, w)| {
            if (19..=21).contains(&h) && (19..=21).contains(&w) {
                150.0
            } else {
                20.0
            }
        });
        let p = Plane::new(data, Calibration::default());
        let out = RollingBall::new(10.0).unwrap().subtract(&p);
        assert!(out[(20, 20)] > 100.0);
        assert!(float_eq(out[(0, 0)], 0.0));
        assert!(float_eq(out[(5, 35)], 0.0));
    }

    #[test]
    fn test_shrink_and_enlarge_shapes() {
        let src = Array2::from_shape_fn((5, 7), |(h, w)| (h * 7 + w) as f32);
        let small = shrink_min(src.view(), 2);
        assert_eq!(small.dim(), (3, 4));
        assert_eq!(small[(0, 0)], 0.0);
        assert_eq!(small[(2, 3)], 34.0);
        let big = enlarge(small.view(), (5, 7), 2);
        assert_eq!(big.dim(), (5, 7));
    }
}
