use super::background::RollingBall;
use super::threshold;
use crate::config::Config;
use crate::{Mask, Plane};

/// 细胞核分割器: 滚球背景扣除后以 Otsu 全局阈值二值化 (暗背景).
#[derive(Copy, Clone, Debug)]
pub struct NucleusSegmenter {
    ball: RollingBall,
}

impl NucleusSegmenter {
    /// 以滚球半径 (像素) 初始化. 半径不合法时返回 `None`.
    #[inline]
    pub fn new(rolling_ball_radius: f64) -> Option<Self> {
        Some(Self {
            ball: RollingBall::new(rolling_ball_radius)?,
        })
    }

    /// 从运行参数初始化.
    #[inline]
    pub fn from_config(config: &Config) -> Option<Self> {
        Self::new(config.rolling_ball_radius)
    }

    /// 由细胞核通道的最大投影得到细胞核掩膜.
    ///
    /// 单峰图像可能得到全背景或全前景的掩膜, 二者都是合法结果.
    pub fn segment(&self, nucleus: &Plane) -> Mask {
        let flat = self.ball.subtract(nucleus);
        let mask = threshold::otsu_mask(&flat);
        log::debug!(
            "nucleus mask: {} of {} pixels in foreground",
            mask.count_foreground(),
            mask.height() * mask.width()
        );
        mask
    }
}
