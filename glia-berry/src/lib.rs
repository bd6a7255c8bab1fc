#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 对双通道荧光显微图像 (通道 1 为细胞核, 通道 2 为小胶质细胞标记)
//! 中的小胶质细胞进行分割, 以细胞核验证候选区域, 并测量每个细胞的形态学指标.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 每幅图像必须恰有 2 个通道和至少 1 个 z 层, 否则在加载阶段即报错.
//! 2. 像素分类器 (例如 ilastik) 和交互式编辑界面都是外部协作者,
//!   本 crate 只规定它们的接口 ([`segment::PixelClassifier`], [`pipeline::RoiEditor`]).
//! 3. 整个流程严格串行: 一幅图像完整走完流程后才处理下一幅.
//!
//! # 流程
//!
//! ### 最大强度投影 ✅
//!
//! 每个通道沿 z 方向取最大值. 实现位于 `glia-berry/src/data/stack.rs`.
//!
//! ### 细胞核分割 ✅
//!
//! 滚球背景扣除 (半径默认 30 像素) + Otsu 全局阈值 (暗背景).
//!
//! 实现位于 `glia-berry/src/segment/{background, threshold, nucleus}.rs`.
//!
//! ### 细胞膜分类与 3D → 2D 目标提取 ✅
//!
//! 外部像素分类器给出每个体素的类别 (1 为背景, 2 及以上为前景),
//! 按 26-邻域提取 3D 连通体并丢弃体素数不足的碎片, 再投影到 2D,
//! 按 8-邻域提取颗粒并以标定面积区间筛选, 排除接触图像边缘的颗粒.
//!
//! 实现位于 `glia-berry/src/segment/{membrane, objects}.rs`.
//!
//! ### 细胞核验证 ✅
//!
//! 候选区域内的细胞核前景面积 (标定单位) 不足时丢弃.
//!
//! 实现位于 `glia-berry/src/roi/nucleus_filter.rs`.
//!
//! ### 测量 ✅
//!
//! 面积, 周长, 分枝指数 RI = 周长 / 面积 / (2 * sqrt(π / 面积)),
//! 骨架最大树的总长度 (cable length).
//!
//! 实现位于 `glia-berry/src/measure/*`.
//!
//! ### 批处理与汇总 ✅
//!
//! 逐个处理文件夹下的图像, 保存每幅图像的结果, 最后重新读取所有表格生成文件夹汇总.
//!
//! 实现位于 `glia-berry/src/batch/*`.
//!
//! ### 输入输出 ✅
//!
//! ImageJ hyperstack TIFF 解码, 测量表格的 CSV 读写, 电子表格导出接口, 合成概览图.
//! `.nd2` 等格式需要注册额外的 [`io::StackReader`].
//!
//! 实现位于 `glia-berry/src/{io, dataset, pipeline}/*`.

/// 二维索引 `(h, w)`, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引 `(z, h, w)`, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

type Predicate = fn(u8) -> bool;

type Area2d = Vec<Idx2d>;
type Areas2d = Vec<Area2d>;
type Area3d = Vec<Idx3d>;

/// 图像, 掩膜和标定等基础数据结构.
mod data;

pub use data::{
    BoundingBox, Calibration, CompactMask, ImgWriteVis, Mask, Plane, Stack, StackError, Volume,
};

pub mod batch;
pub mod config;
pub mod consts;
pub mod dataset;
pub(crate) mod eight;
pub mod io;
pub mod measure;
pub mod pipeline;
pub mod prelude;
pub mod roi;
pub mod segment;
