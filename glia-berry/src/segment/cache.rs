//! 分类结果缓存. 打开后, 每幅图像的分类结果以 `<name>_seg.npy` 保存在输出目录下,
//! 之后的运行直接读取而不再调用分类器.

use std::path::{Path, PathBuf};

use ndarray::Array3;
use ndarray_npy::{read_npy, write_npy};

use super::membrane::{ClassifierInput, ClassifyError, PixelClassifier, ProbabilityMap};

/// 带缓存的分类器包装.
pub struct CachedClassifier<'a, C: ?Sized> {
    inner: &'a C,
    dir: PathBuf,
}

impl<'a, C: PixelClassifier + ?Sized> CachedClassifier<'a, C> {
    /// 以内部分类器和缓存目录初始化.
    #[inline]
    pub fn new<P: Into<PathBuf>>(inner: &'a C, dir: P) -> Self {
        Self {
            inner,
            dir: dir.into(),
        }
    }

    /// 源文件对应的缓存路径.
    pub fn cache_path(&self, source: &Path) -> PathBuf {
        let name = source
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.dir.join(format!("{name}_seg.npy"))
    }
}

impl<C: PixelClassifier + ?Sized> PixelClassifier for CachedClassifier<'_, C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn check(&self) -> Result<(), ClassifyError> {
        self.inner.check()
    }

    fn classify(&self, input: ClassifierInput<'_>) -> Result<ProbabilityMap, ClassifyError> {
        let path = self.cache_path(input.path);
        if path.is_file() {
            let classes: Array3<u8> =
                read_npy(&path).map_err(|e| ClassifyError::Decode(e.to_string()))?;
            log::info!("Reusing cached segmentation {}", path.display());
            return Ok(ProbabilityMap::new(
                classes,
                input.stack.calibration().clone(),
            ));
        }

        let map = self.inner.classify(input)?;
        std::fs::create_dir_all(&self.dir)?;
        if let Err(e) = write_npy(&path, &map.classes()) {
            log::warn!("Cannot cache segmentation to {}: {e}", path.display());
        }
        Ok(map)
    }
}
