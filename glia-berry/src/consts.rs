//! 通用常量.

/// 单通道掩膜颜色.
pub mod gray {
    /// 掩膜中背景的像素值.
    pub const BACKGROUND: u8 = 0;

    /// 掩膜中前景的像素值. 与 ImageJ 的二值图约定保持一致.
    pub const FOREGROUND: u8 = 255;

    /// 像素是否是前景?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        p != BACKGROUND
    }

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        p == BACKGROUND
    }
}

/// 像素分类器输出的类别.
pub mod class {
    /// 背景类别.
    pub const BACKGROUND: u8 = 1;

    /// 第一个前景 (细胞) 类别. 大于等于该值的类别都视为前景.
    pub const FIRST_FOREGROUND: u8 = 2;

    /// 类别是否属于前景?
    #[inline]
    pub const fn is_foreground(c: u8) -> bool {
        c >= FIRST_FOREGROUND
    }
}

/// 每幅图像必须具有的通道数.
pub const CHANNELS: usize = 2;

/// 细胞核所在通道 (从 0 开始).
pub const NUCLEUS_CHANNEL: usize = 0;

/// 小胶质细胞标记所在通道 (从 0 开始).
pub const MICROGLIA_CHANNEL: usize = 1;

/// 输出目录下记录本次运行参数的文件名.
pub const PARAMETERS_FILE: &str = "parameters.json";

/// 默认参数. 与最初的 Fiji 脚本 v9.2 保持一致.
pub mod defaults {
    /// 打开缝隙连接但未指定长度时使用的长度 (单位: 微米). Fiji 脚本记录了这个值, 但没有用它做任何处理,
    /// 所以缝隙连接默认关闭.
    pub const CONNECT_MICROGLIA: f64 = 0.8;

    /// 细胞内细胞核的最小面积 (单位: 平方微米).
    pub const NUCLEUS_INTERSECTION_WITH_CELL: f64 = 15.0;

    /// 2D 小胶质细胞的最小面积 (单位: 平方微米).
    pub const MICROGLIA_MIN_SIZE: f64 = 20.0;

    /// 2D 小胶质细胞的最大面积 (单位: 平方微米).
    pub const MICROGLIA_MAX_SIZE: f64 = 500.0;

    /// 3D 目标的最小体素数.
    pub const MICROGLIA_MIN_SIZE_3D: usize = 10;

    /// 细胞核通道滚球背景扣除的半径 (单位: 像素).
    pub const ROLLING_BALL_RADIUS: f64 = 30.0;

    /// 对比度增强时饱和像素的百分比.
    pub const SATURATED: f64 = 0.35;

    /// 像素分类器模型文件. `~` 会展开为用户主目录.
    pub const MEMBRANE_MODEL_FILE: &str = "~/microglia/membrane.ilp";

    /// 输出结果所在的子目录名.
    pub const ANALYSIS_DIR: &str = "analysis_v9";

    /// 支持的图像文件扩展名.
    pub const EXTENSIONS: [&str; 2] = ["nd2", "tif"];
}

/// 体素/像素类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElemType {
    /// 代表背景.
    Background,

    /// 代表前景.
    Foreground,
}

impl ElemType {
    /// 是否为前景.
    #[inline]
    pub fn is_foreground(&self) -> bool {
        matches!(self, Self::Foreground)
    }

    /// 是否为背景.
    #[inline]
    pub fn is_background(&self) -> bool {
        !self.is_foreground()
    }

    /// 转换为掩膜像素值.
    #[inline]
    pub const fn gray(&self) -> u8 {
        match self {
            Self::Background => gray::BACKGROUND,
            Self::Foreground => gray::FOREGROUND,
        }
    }
}

impl From<bool> for ElemType {
    #[inline]
    fn from(foreground: bool) -> Self {
        if foreground {
            Self::Foreground
        } else {
            Self::Background
        }
    }
}
