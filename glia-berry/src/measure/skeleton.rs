//! 骨架分析: 细化 → 拆分为树 → 最大树的总长度.

use std::collections::HashMap;

use binary_heap_plus::BinaryHeap;

use crate::consts::gray::*;
use crate::eight::{neighbour8, neighbour8_clockwise};
use crate::{Area2d, Idx2d, Mask};

/// 以 Zhang-Suen 算法把前景细化为单像素宽的骨架. 图像外的像素视为背景.
pub fn skeletonize(mask: &Mask) -> Mask {
    let mut ans = mask.clone();
    let mut to_delete: Vec<Idx2d> = Vec::new();
    loop {
        let mut changed = false;
        for step in 0..2 {
            to_delete.clear();
            for pos in ans.foreground_pos::<Vec<_>>() {
                let p = neighbour8_clockwise(pos).map(|q| u8::from(ans.is_foreground_at(q)));
                // p[0] = P2 (上), p[2] = P4 (右), p[4] = P6 (下), p[6] = P8 (左).
                let b: u8 = p.iter().sum();
                if !(2..=6).contains(&b) {
                    continue;
                }
                let a = (0..8).filter(|&i| p[i] == 0 && p[(i + 1) % 8] == 1).count();
                if a != 1 {
                    continue;
                }
                let removable = if step == 0 {
                    p[0] * p[2] * p[4] == 0 && p[2] * p[4] * p[6] == 0
                } else {
                    p[0] * p[2] * p[6] == 0 && p[0] * p[4] * p[6] == 0
                };
                if removable {
                    to_delete.push(pos);
                }
            }
            if !to_delete.is_empty() {
                changed = true;
                ans.fill_batch(to_delete.iter().copied(), BACKGROUND);
            }
        }
        if !changed {
            return ans;
        }
    }
}

/// 骨架分析结果.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonSummary {
    /// 树的个数.
    pub trees: usize,

    /// 最大树的节点 (像素) 个数.
    pub largest_nodes: usize,

    /// 最大树所有边的标定长度之和.
    pub cable_length: f64,
}

/// 骨架分析器.
#[derive(Copy, Clone, Debug, Default)]
pub struct SkeletonAnalyzer;

impl SkeletonAnalyzer {
    /// 分析裁剪后的掩膜. 空掩膜的各项结果都为 0.
    pub fn analyze(&self, crop: &Mask) -> SkeletonSummary {
        if crop.is_background() {
            return SkeletonSummary {
                trees: 0,
                largest_nodes: 0,
                cable_length: 0.0,
            };
        }
        let skeleton = skeletonize(crop);
        let trees = skeleton.foreground_areas();
        let largest = largest_tree(&trees).unwrap_or(&[]);
        SkeletonSummary {
            trees: trees.len(),
            largest_nodes: largest.len(),
            cable_length: tree_length(largest, crop),
        }
    }

    /// 只计算最大树的总长度.
    #[inline]
    pub fn cable_length(&self, crop: &Mask) -> f64 {
        self.analyze(crop).cable_length
    }
}

/// 节点最多的树. 节点数相同时取最先出现 (行优先扫描) 的树.
fn largest_tree(trees: &[Area2d]) -> Option<&[Idx2d]> {
    let mut best: Option<&Area2d> = None;
    for tree in trees {
        if best.map_or(true, |b| tree.len() > b.len()) {
            best = Some(tree);
        }
    }
    best.map(Vec::as_slice)
}

/// 树中 8-相邻节点之间以标定距离为权, 求最小生成树的总权重.
///
/// 骨架中可能残留小的环, 最小生成树保证每个节点只被连接一次.
fn tree_length(nodes: &[Idx2d], mask: &Mask) -> f64 {
    let Some(&start) = nodes.first() else {
        return 0.0;
    };
    let cal = mask.calibration();
    let index: HashMap<Idx2d, usize> = nodes.iter().enumerate().map(|(i, &p)| (p, i)).collect();
    let mut in_tree = vec![false; nodes.len()];

    // 堆顶是权重最小的边.
    let mut heap: BinaryHeap<(f64, Idx2d), _> =
        BinaryHeap::new_by(|a: &(f64, Idx2d), b: &(f64, Idx2d)| b.0.total_cmp(&a.0));
    heap.push((0.0, start));
    let mut total = 0.0;
    while let Some((weight, pos)) = heap.pop() {
        let i = index[&pos];
        if in_tree[i] {
            continue;
        }
        in_tree[i] = true;
        total += weight;
        for neigh in neighbour8(pos) {
            match index.get(&neigh) {
                Some(&j) if !in_tree[j] => {
                    let d = cal.distance(pos.0.abs_diff(neigh.0), pos.1.abs_diff(neigh.1));
                    heap.push((d, neigh));
                }
                _ => {}
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Calibration;

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn has_2x2_block(m: &Mask) -> bool {
        let (h, w) = m.shape();
        (0..h.saturating_sub(1)).any(|a| {
            (0..w.saturating_sub(1)).any(|b| {
                [(a, b), (a + 1, b), (a, b + 1), (a + 1, b + 1)]
                    .iter()
                    .all(|&p| m.is_foreground_at(p))
            })
        })
    }

    #[test]
    fn test_empty_crop_is_exactly_zero() {
        let m = Mask::background((7, 9), Calibration::default());
        let s = SkeletonAnalyzer.analyze(&m);
        assert_eq!(s.cable_length, 0.0);
        assert_eq!(s.trees, 0);
    }

    #[test]
    fn test_single_pixel() {
        let m = Mask::from_positions((3, 3), Calibration::default(), [(1, 1)]);
        let s = SkeletonAnalyzer.analyze(&m);
        assert_eq!(s.trees, 1);
        assert_eq!(s.largest_nodes, 1);
        assert_eq!(s.cable_length, 0.0);
    }

    #[test]
    fn test_rectangle_thins_to_line() {
        let m = Mask::from_fn((9, 25), Calibration::default(), |(h, w)| {
            (2..7).contains(&h) && (2..23).contains(&w)
        });
        let sk = skeletonize(&m);
        assert!(!sk.is_background());
        assert!(!has_2x2_block(&sk));
        assert_eq!(sk.foreground_areas().len(), 1);
        let len = SkeletonAnalyzer.cable_length(&m);
        assert!((10.0..=25.0).contains(&len), "{len}");
    }

    #[test]
    fn test_thin_lines_are_stable() {
        let cal = Calibration::new(0.5, 0.5, None, "micron").unwrap();
        let m = Mask::from_fn((5, 12), cal, |(h, w)| h == 2 && (1..11).contains(&w));
        assert_eq!(skeletonize(&m), m);
        assert!(float_eq(SkeletonAnalyzer.cable_length(&m), 9.0 * 0.5));
    }

    #[test]
    fn test_largest_tree_ties_take_first() {
        // 对角线 4 像素 (先出现) 与水平线 4 像素.
        let pixels = [(1, 1), (2, 2), (3, 3), (4, 4), (8, 1), (8, 2), (8, 3), (8, 4)];
        let m = Mask::from_positions((10, 10), Calibration::default(), pixels);
        let s = SkeletonAnalyzer.analyze(&m);
        assert_eq!(s.trees, 2);
        assert_eq!(s.largest_nodes, 4);
        assert!(float_eq(s.cable_length, 3.0 * 2_f64.sqrt()));
    }

    #[test]
    fn test_only_largest_tree_counts() {
        let m = Mask::from_fn((10, 20), Calibration::default(), |(h, w)| {
            (h == 2 && (1..8).contains(&w)) || (h == 6 && (1..15).contains(&w))
        });
        assert!(float_eq(SkeletonAnalyzer.cable_length(&m), 13.0));
    }

    #[test]
    fn test_adding_branch_does_not_shrink() {
        let line = |(h, w): Idx2d| h == 5 && (2..18).contains(&w);
        let base = Mask::from_fn((12, 20), Calibration::default(), line);
        let branched = Mask::from_fn((12, 20), Calibration::default(), |(h, w)| {
            line((h, w)) || (w == 9 && (1..5).contains(&h))
        });
        let a = SkeletonAnalyzer.cable_length(&base);
        let b = SkeletonAnalyzer.cable_length(&branched);
        assert!(float_eq(a, 15.0));
        assert!(b >= a);
    }
}
