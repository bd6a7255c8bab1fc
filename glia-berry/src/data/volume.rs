use std::collections::VecDeque;
use std::ops::Index;

use ndarray::{Array2, Array3, ArrayView3, Axis};

use super::{Calibration, Mask};
use crate::consts::{class, gray::*};
use crate::eight::neighbour26;
use crate::{Area3d, Idx3d};

/// 拥有所有权的 3D 二值体数据, 包括体素数据和标定.
///
/// 数据按照 `(z, h, w)` 模式访问, 体素值只有 [`BACKGROUND`] 和 [`FOREGROUND`] 两种.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Array3<u8>,
    calibration: Calibration,
}

impl Index<Idx3d> for Volume {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl Volume {
    /// 从任意 `u8` 数据初始化. 所有非零体素都会被规范化为 [`FOREGROUND`].
    pub fn new(mut data: Array3<u8>, calibration: Calibration) -> Self {
        data.mapv_inplace(|p| if is_foreground(p) { FOREGROUND } else { BACKGROUND });
        Self { data, calibration }
    }

    /// 从像素分类器输出的类别图初始化: 类别 >= 2 的体素为前景, 其余为背景.
    ///
    /// 分类器的背景/前景约定在这里被统一为掩膜的约定, 后续步骤不再关心类别编号.
    pub fn from_classes(classes: ArrayView3<'_, u8>, calibration: Calibration) -> Self {
        let data = classes.mapv(|c| if class::is_foreground(c) { FOREGROUND } else { BACKGROUND });
        Self { data, calibration }
    }

    /// 获得底层数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// 标定.
    #[inline]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// 数据形状 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 统计前景体素个数.
    #[inline]
    pub fn count_foreground(&self) -> usize {
        self.data.iter().filter(|&&p| is_foreground(p)).count()
    }

    /// 按照 26-相邻规则获得所有前景连通体.
    ///
    /// 连通体按首个体素的 `(z, h, w)` 字典序排列, 连通体内的体素按 BFS 访问顺序排列.
    pub fn components26(&self) -> Vec<Area3d> {
        let mut ans = Vec::with_capacity(1);
        let mut bfs_q = VecDeque::with_capacity(8);
        let mut visited = Array3::from_elem(self.shape(), false);

        for (pos, &p) in self.data.indexed_iter() {
            if visited[pos] || is_background(p) {
                continue;
            }
            visited[pos] = true;
            bfs_q.push_back(pos);
            let mut this_area = Area3d::with_capacity(1);
            while let Some(cur_pos) = bfs_q.pop_front() {
                this_area.push(cur_pos);
                for neigh in neighbour26(cur_pos) {
                    match visited.get_mut(neigh) {
                        Some(v) if !*v && is_foreground(self.data[neigh]) => {
                            *v = true;
                            bfs_q.push_back(neigh);
                        }
                        _ => {}
                    }
                }
            }
            ans.push(this_area);
        }
        ans
    }

    /// 仅保留体素数不少于 `min_voxels` 的 26-连通体, 返回新的体数据.
    pub fn retain_components(&self, min_voxels: usize) -> Self {
        let mut data = Array3::from_elem(self.shape(), BACKGROUND);
        for area in self.components26() {
            if area.len() >= min_voxels {
                for pos in area {
                    data[pos] = FOREGROUND;
                }
            }
        }
        Self {
            data,
            calibration: self.calibration.clone(),
        }
    }

    /// 沿 z 方向做最大投影: 只要某一层为前景, 投影后即为前景.
    pub fn max_projection(&self) -> Mask {
        let data: Array2<u8> = self
            .data
            .fold_axis(Axis(0), BACKGROUND, |&acc, &v| acc.max(v));
        Mask::new(data, self.calibration.planar())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_classes() {
        let classes = Array3::from_shape_fn((1, 2, 2), |(_, h, w)| (h * 2 + w) as u8);
        let v = Volume::from_classes(classes.view(), Calibration::default());
        // 类别 0, 1 -> 背景; 2, 3 -> 前景.
        assert_eq!(v[(0, 0, 0)], BACKGROUND);
        assert_eq!(v[(0, 0, 1)], BACKGROUND);
        assert_eq!(v[(0, 1, 0)], FOREGROUND);
        assert_eq!(v[(0, 1, 1)], FOREGROUND);
    }

    #[test]
    fn test_components26_diagonal() {
        let mut data = Array3::zeros((3, 3, 5));
        data[(0, 0, 0)] = 1;
        data[(1, 1, 1)] = 1;
        data[(2, 2, 2)] = 1;
        // 与前三个不相邻.
        data[(0, 0, 4)] = 1;
        let v = Volume::new(data, Calibration::default());
        let comps = v.components26();
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].len(), 3);
        assert_eq!(comps[1], vec![(0, 0, 4)]);
    }

    #[test]
    fn test_retain_and_project() {
        let mut data = Array3::zeros((2, 4, 4));
        for w in 0..3 {
            data[(0, 0, w)] = 1;
            data[(1, 0, w)] = 1;
        }
        data[(1, 3, 3)] = 1;
        let v = Volume::new(data, Calibration::new(0.5, 0.5, Some(1.0), "micron").unwrap());
        let kept = v.retain_components(2);
        assert_eq!(kept.count_foreground(), 6);
        let proj = kept.max_projection();
        assert_eq!(proj.count_foreground(), 3);
        assert_eq!(proj.calibration().voxel_depth(), None);
        assert_eq!(v.max_projection().count_foreground(), 4);
    }
}
