//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::{BoundingBox, Calibration, ImgWriteVis, Mask, Plane, Stack, Volume};

pub use crate::consts::gray::{BACKGROUND, FOREGROUND};
pub use crate::consts::{ElemType, MICROGLIA_CHANNEL, NUCLEUS_CHANNEL};

pub use crate::config::{Config, FailurePolicy};

pub use crate::dataset::{image_loader, ReaderRegistry, SourceImage};
pub use crate::io::{StackReader, TiffStackReader};

pub use crate::segment::{ChannelThreshold, IlastikHeadless, PixelClassifier};

pub use crate::roi::{Roi, RoiSet};

pub use crate::measure::{Measurement, Table};

pub use crate::pipeline::{Checkpoint, Headless, ImagePipeline, RoiEditor};

pub use crate::batch::{BatchReport, BatchRunner};
