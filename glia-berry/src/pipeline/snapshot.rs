//! 检查点的持久化, 使交互式编辑可以在另一个会话中继续.
//!
//! 掩膜以压缩形式保存, 整体以 `bincode` 编码.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::Checkpoint;
use crate::io::PersistResult;
use crate::roi::RoiSet;
use crate::{Calibration, CompactMask, Plane};

#[derive(Serialize, Deserialize)]
struct Snapshot {
    name: String,
    found: usize,
    rois: RoiSet,
    nuclei: CompactMask,
    antibody: CompactMask,
    projections: [Array2<f32>; 2],
    calibration: Calibration,
}

impl Checkpoint {
    /// 保存到 `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> PersistResult<()> {
        let snapshot = Snapshot {
            name: self.name.clone(),
            found: self.found,
            rois: self.rois.clone(),
            nuclei: self.nuclei.compress(),
            antibody: self.antibody.compress(),
            projections: [
                self.projections[0].data().to_owned(),
                self.projections[1].data().to_owned(),
            ],
            calibration: self.projections[0].calibration().clone(),
        };
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, &snapshot)?;
        Ok(())
    }

    /// 读取 [`Checkpoint::save`] 保存的检查点.
    pub fn load<P: AsRef<Path>>(path: P) -> PersistResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let Snapshot {
            name,
            found,
            rois,
            nuclei,
            antibody,
            projections: [p0, p1],
            calibration,
        } = bincode::deserialize_from(reader)?;
        Ok(Self {
            name,
            found,
            rois,
            nuclei: nuclei.decompress()?,
            antibody: antibody.decompress()?,
            projections: [
                Plane::new(p0, calibration.clone()),
                Plane::new(p1, calibration),
            ],
        })
    }
}
