//! 3D 目标提取与 2D 颗粒分析.

use crate::config::Config;
use crate::roi::{Roi, RoiSet};
use crate::{Area2d, Area3d, Mask, Volume};

/// 一个 3D 连通体.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object3D {
    voxels: Area3d,
}

impl Object3D {
    /// 体素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// 所有体素.
    #[inline]
    pub fn voxels(&self) -> &[(usize, usize, usize)] {
        &self.voxels
    }
}

/// 2D 颗粒分析的结果.
#[derive(Debug, Clone)]
pub struct Candidates {
    /// 所有被接受的颗粒组成的掩膜.
    pub mask: Mask,

    /// 候选 ROI, 按颗粒在图像中首次出现的行优先顺序排列.
    pub rois: RoiSet,
}

/// 3D → 2D 目标提取器.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ObjectExtractor {
    min_voxels: usize,
    min_area: f64,
    max_area: f64,
    connect_gap: Option<f64>,
}

impl ObjectExtractor {
    /// 从运行参数初始化.
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_voxels: config.microglia_min_size_3d,
            min_area: config.microglia_min_size,
            max_area: config.microglia_max_size,
            connect_gap: config.connect_gap,
        }
    }

    /// 获得体素数不少于下限的所有 26-连通体. 没有上限.
    pub fn objects(&self, volume: &Volume) -> Vec<Object3D> {
        volume
            .components26()
            .into_iter()
            .filter(|a| a.len() >= self.min_voxels)
            .map(|voxels| Object3D { voxels })
            .collect()
    }

    /// 缝隙连接的闭运算半径 (像素).
    pub fn gap_radius(&self, mask: &Mask) -> usize {
        self.connect_gap
            .map(|gap| mask.calibration().length_to_pixels(gap).round() as usize)
            .unwrap_or(0)
    }

    /// 完整提取流程: 3D 连通体过滤 → 最大投影 → 缝隙连接 → 2D 颗粒分析.
    pub fn extract(&self, volume: &Volume) -> Candidates {
        let kept = volume.retain_components(self.min_voxels);
        let projected = kept.max_projection();
        let radius = self.gap_radius(&projected);
        let projected = if radius > 0 {
            log::debug!("Closing gaps with a disk of radius {radius} px");
            projected.closing(radius)
        } else {
            projected
        };
        self.particles(&projected)
    }

    /// 2D 颗粒分析: 8-连通前景区域中, 不接触图像边缘且标定面积位于 `[min, max]` 的区域被接受.
    /// 每个被接受区域填充空洞后成为一个 ROI.
    pub fn particles(&self, mask: &Mask) -> Candidates {
        let cal = mask.calibration().clone();
        let mut accepted: Vec<Area2d> = Vec::new();
        let (mut at_border, mut out_of_band) = (0_usize, 0_usize);
        for area in mask.foreground_areas() {
            if area.iter().any(|&p| mask.is_at_border(p)) {
                at_border += 1;
                continue;
            }
            let size = area.len() as f64 * cal.pixel_area();
            if size < self.min_area || size > self.max_area {
                out_of_band += 1;
                continue;
            }
            accepted.push(area);
        }
        log::info!(
            "Particle analysis: {} accepted, {at_border} at border, {out_of_band} outside size band",
            accepted.len()
        );

        let particle_mask =
            Mask::from_positions(mask.shape(), cal.clone(), accepted.iter().flatten().copied());
        let mut rois = RoiSet::new(mask.shape(), cal.clone());
        for area in accepted {
            let single = Mask::from_positions(mask.shape(), cal.clone(), area);
            rois.push(Roi::from_pixels(single.fill_holes().foreground_pos::<Vec<_>>()));
        }
        Candidates {
            mask: particle_mask,
            rois,
        }
    }
}
