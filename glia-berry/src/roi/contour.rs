//! 轮廓追踪与标定周长.
//!
//! 沿像素边追踪 ROI 的闭合轮廓, 行进时 ROI 始终在右侧; 对角相接的像素视为连通 (8-邻域).
//! 周长沿用 ImageJ 对追踪多边形的约定: 水平与竖直边长之和, 每个计入的拐角再减去
//! `pw + ph - sqrt(pw^2 + ph^2)`. 孔洞的轮廓不计入周长.

use std::collections::HashSet;

use crate::eight::neighbour4;
use crate::{Calibration, Idx2d};

/// 行进方向依次为右, 下, 左, 上. 顺时针排列, 右转即 `+1`.
const STEPS: [(isize, isize); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

/// 有向像素边: 起点 (像素角点坐标) 和方向.
type Crack = (Idx2d, usize);

#[inline]
fn step((h, w): Idx2d, dir: usize) -> Idx2d {
    let (dh, dw) = STEPS[dir];
    (h.wrapping_add_signed(dh), w.wrapping_add_signed(dw))
}

/// 沿 `dir` 到达角点 `v` 后, 左前方和右前方的像素. 越界索引必然不在 ROI 内.
fn ahead((vh, vw): Idx2d, dir: usize) -> (Idx2d, Idx2d) {
    let top_left = (vh.wrapping_sub(1), vw.wrapping_sub(1));
    let top_right = (vh.wrapping_sub(1), vw);
    let bottom_left = (vh, vw.wrapping_sub(1));
    let bottom_right = (vh, vw);
    match dir {
        0 => (top_right, bottom_right),
        1 => (bottom_right, bottom_left),
        2 => (bottom_left, top_left),
        _ => (top_left, top_right),
    }
}

/// ROI 与外部之间的所有有向边, 按像素的行优先顺序给出.
fn cracks(pixels: &[Idx2d], inside: &HashSet<Idx2d>) -> Vec<Crack> {
    let mut ans = Vec::new();
    for &(h, w) in pixels {
        // neighbour4 的顺序: 上, 下, 左, 右.
        let [up, down, left, right] = neighbour4((h, w));
        if !inside.contains(&up) {
            ans.push(((h, w), 0));
        }
        if !inside.contains(&right) {
            ans.push(((h, w + 1), 1));
        }
        if !inside.contains(&down) {
            ans.push(((h + 1, w + 1), 2));
        }
        if !inside.contains(&left) {
            ans.push(((h + 1, w), 3));
        }
    }
    ans
}

/// 追踪所有闭合轮廓, 每个轮廓是首尾相接的有向边序列.
///
/// 到达角点后优先左转, 其次直行, 最后右转, 因此对角相接的像素归入同一轮廓.
pub(super) fn trace(pixels: &[Idx2d]) -> Vec<Vec<Crack>> {
    let inside: HashSet<Idx2d> = pixels.iter().copied().collect();
    let mut visited = HashSet::new();
    let mut contours = Vec::new();
    for start in cracks(pixels, &inside) {
        if visited.contains(&start) {
            continue;
        }
        let mut contour = Vec::new();
        let mut cur = start;
        loop {
            visited.insert(cur);
            contour.push(cur);
            let (v, dir) = cur;
            let v = step(v, dir);
            let (left, right) = ahead(v, dir);
            let next = if inside.contains(&left) {
                (dir + 3) % 4
            } else if inside.contains(&right) {
                dir
            } else {
                (dir + 1) % 4
            };
            cur = (v, next);
            if cur == start {
                break;
            }
        }
        contours.push(contour);
    }
    contours
}

/// 有向面积的 2 倍. 外轮廓为正, 孔洞为负.
fn signed_area2(contour: &[Crack]) -> i64 {
    let n = contour.len();
    (0..n)
        .map(|i| {
            let (h1, w1) = contour[i].0;
            let (h2, w2) = contour[(i + 1) % n].0;
            w1 as i64 * h2 as i64 - w2 as i64 * h1 as i64
        })
        .sum()
}

/// 轮廓的拐角顶点: 方向与前一条边不同的边的起点.
fn corners(contour: &[Crack]) -> Vec<Idx2d> {
    let n = contour.len();
    (0..n)
        .filter(|&i| contour[i].1 != contour[(i + n - 1) % n].1)
        .map(|i| contour[i].0)
        .collect()
}

/// 单个轮廓的 ImageJ 周长.
///
/// 长度为 1 的边与前一个拐角交替计数, 因此阶梯状的斜边按对角线计长.
fn traced_length(contour: &[Crack], cal: &Calibration) -> f64 {
    let vertices = corners(contour);
    let n = vertices.len();
    let (pw, ph) = (cal.pixel_width(), cal.pixel_height());
    let (mut sum_dh, mut sum_dw, mut n_corners) = (0_usize, 0_usize, 0_usize);
    let mut corner = false;
    for i in 0..n {
        let (a, b) = (vertices[(i + n - 1) % n], vertices[i]);
        let (dh, dw) = (a.0.abs_diff(b.0), a.1.abs_diff(b.1));
        sum_dh += dh;
        sum_dw += dw;
        if dh + dw > 1 || !corner {
            corner = true;
            n_corners += 1;
        } else {
            corner = false;
        }
    }
    sum_dw as f64 * pw + sum_dh as f64 * ph - n_corners as f64 * (pw + ph - pw.hypot(ph))
}

/// 所有外轮廓的 ImageJ 周长之和.
pub(super) fn traced_perimeter(pixels: &[Idx2d], cal: &Calibration) -> f64 {
    trace(pixels)
        .iter()
        .filter(|c| signed_area2(c) > 0)
        .map(|c| traced_length(c, cal))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::SQRT_2;

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn square(top: usize, left: usize, size: usize) -> Vec<Idx2d> {
        (top..top + size)
            .flat_map(|h| (left..left + size).map(move |w| (h, w)))
            .collect()
    }

    /// 方块只有一条外轮廓, 4 个拐角.
    #[test]
    fn test_square_contour() {
        let contours = trace(&square(2, 3, 4));
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].len(), 16);
        assert_eq!(corners(&contours[0]).len(), 4);
        assert_eq!(signed_area2(&contours[0]), 2 * 16);
    }

    /// 单个像素: 4 条单位边交替计数, 只扣除 2 个拐角.
    #[test]
    fn test_single_pixel() {
        let p = traced_perimeter(&[(0, 0)], &Calibration::default());
        assert!(float_eq(p, 4.0 - 2.0 * (2.0 - SQRT_2)));
    }

    /// 对角相接的两个像素属于同一条轮廓.
    #[test]
    fn test_diagonal_pixels_share_contour() {
        let pixels = [(0, 0), (1, 1)];
        let contours = trace(&pixels);
        assert_eq!(contours.len(), 1);
        assert!(float_eq(
            traced_perimeter(&pixels, &Calibration::default()),
            4.0 * SQRT_2
        ));
    }

    /// 孔洞的轮廓为负向, 不计入周长.
    #[test]
    fn test_hole_is_ignored() {
        let hole: HashSet<Idx2d> = square(3, 3, 4).into_iter().collect();
        let ring: Vec<Idx2d> = square(0, 0, 10)
            .into_iter()
            .filter(|p| !hole.contains(p))
            .collect();
        let contours = trace(&ring);
        assert_eq!(contours.len(), 2);
        assert_eq!(contours.iter().filter(|c| signed_area2(c) < 0).count(), 1);

        let solid = traced_perimeter(&square(0, 0, 10), &Calibration::default());
        assert!(float_eq(traced_perimeter(&ring, &Calibration::default()), solid));
        assert!(float_eq(solid, 40.0 - 4.0 * (2.0 - SQRT_2)));
    }

    /// 各向异性像素: 拐角扣除量取决于像素对角线长度.
    #[test]
    fn test_anisotropic_calibration() {
        let cal = Calibration::new(0.5, 2.0, None, "micron").unwrap();
        let pixels: Vec<Idx2d> = (1..4).flat_map(|h| (1..5).map(move |w| (h, w))).collect();
        let expected = 8.0 * 0.5 + 6.0 * 2.0 - 4.0 * (0.5 + 2.0 - 0.5_f64.hypot(2.0));
        assert!(float_eq(traced_perimeter(&pixels, &cal), expected));
    }
}
