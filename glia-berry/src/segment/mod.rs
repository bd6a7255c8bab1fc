//! 分割: 细胞核掩膜, 细胞膜分类, 3D → 2D 目标提取.

pub mod background;
mod cache;
mod membrane;
mod nucleus;
mod objects;
pub mod threshold;

pub use cache::CachedClassifier;
pub use membrane::{
    segment_membrane, ChannelThreshold, ClassifierInput, ClassifyError, IlastikHeadless, ModelFile,
    PixelClassifier, ProbabilityMap,
};
pub use nucleus::NucleusSegmenter;
pub use objects::{Candidates, Object3D, ObjectExtractor};
