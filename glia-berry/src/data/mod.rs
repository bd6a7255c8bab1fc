//! 图像数据结构: 标定, 双通道图像栈, 2D 强度图, 2D/3D 掩膜.

mod calibration;
mod iter;
mod mask;
mod plane;
mod save;
mod stack;
mod volume;

pub use calibration::Calibration;
pub use mask::{BoundingBox, CompactMask, Mask};
pub use plane::Plane;
pub use save::ImgWriteVis;
pub use stack::{Stack, StackError};
pub use volume::Volume;

pub(crate) use iter::PosIter;
pub(crate) use save::stretch;
