//! 细胞膜像素分类.
//!
//! 像素分类器是外部黑盒: `(模型, 图像) -> 每个体素的类别`. 本模块只规定接口
//! [`PixelClassifier`], 并提供两种实现:
//!
//! 1. [`IlastikHeadless`]: 以 headless 模式调用 ilastik 可执行文件, 读回其输出的标签 TIFF;
//! 2. [`ChannelThreshold`]: 不依赖模型, 对标记通道逐层做 Otsu 阈值, 用于无模型的运行和测试.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use ndarray::{Array3, ArrayView3, Axis};
use thiserror::Error;

use super::threshold;
use crate::consts::{class, MICROGLIA_CHANNEL};
use crate::{Calibration, Stack, Volume};

/// 像素分类错误.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// 模型文件不存在. 对整个批处理是致命错误.
    #[error("classifier model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    /// 无法展开 `~`.
    #[error("cannot locate home directory to expand {}", .0.display())]
    NoHomeDir(PathBuf),

    /// 分类结果形状与输入图像不一致.
    #[error("class map shape {found:?} differs from stack shape {expected:?}")]
    ShapeMismatch {
        /// 输入图像的 `(z, h, w)`.
        expected: (usize, usize, usize),
        /// 分类结果的 `(z, h, w)`.
        found: (usize, usize, usize),
    },

    /// 外部程序运行失败.
    #[error("classifier command failed with {status}: {stderr}")]
    Command {
        /// 退出状态描述.
        status: String,
        /// 标准错误输出.
        stderr: String,
    },

    /// 分类结果无法解码.
    #[error("cannot decode class map: {0}")]
    Decode(String),

    /// IO 错误.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// 分类结果: 每个体素的类别. 1 为背景, 2 及以上为前景 (细胞).
///
/// 数据按照 `(z, h, w)` 模式访问; 只供阈值化使用.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    classes: Array3<u8>,
    calibration: Calibration,
}

impl ProbabilityMap {
    /// 直接初始化.
    #[inline]
    pub fn new(classes: Array3<u8>, calibration: Calibration) -> Self {
        Self {
            classes,
            calibration,
        }
    }

    /// 类别数据.
    #[inline]
    pub fn classes(&self) -> ArrayView3<'_, u8> {
        self.classes.view()
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array3<u8> {
        self.classes
    }

    /// 数据形状 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize, usize) {
        self.classes.dim()
    }

    /// 以 `类别 >= 2` 阈值化, 得到 3D 细胞膜掩膜.
    #[inline]
    pub fn foreground_volume(&self) -> Volume {
        Volume::from_classes(self.classes.view(), self.calibration.clone())
    }
}

/// 已确认存在的模型文件.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFile(PathBuf);

impl ModelFile {
    /// 展开开头的 `~` 并确认文件存在.
    pub fn resolve<P: AsRef<Path>>(path: P) -> Result<Self, ClassifyError> {
        let path = path.as_ref();
        let full = match path.strip_prefix("~") {
            Ok(rest) => {
                let mut home =
                    dirs::home_dir().ok_or_else(|| ClassifyError::NoHomeDir(path.to_owned()))?;
                home.push(rest);
                home
            }
            Err(_) => path.to_owned(),
        };
        if full.exists() {
            Ok(Self(full))
        } else {
            Err(ClassifyError::ModelNotFound(full))
        }
    }

    /// 完整路径.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// 分类器的输入: 源文件路径和已解码的图像栈.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    /// 源文件. 外部程序通常需要直接读取它.
    pub path: &'a Path,

    /// 已解码的双通道图像栈.
    pub stack: &'a Stack,
}

/// 像素分类器.
pub trait PixelClassifier {
    /// 名称, 仅用于日志.
    fn name(&self) -> &str;

    /// 在处理任何图像之前检查分类器是否可用 (例如模型文件是否存在).
    ///
    /// 默认总是可用.
    fn check(&self) -> Result<(), ClassifyError> {
        Ok(())
    }

    /// 对一幅图像的每个体素分类.
    fn classify(&self, input: ClassifierInput<'_>) -> Result<ProbabilityMap, ClassifyError>;
}

impl<T: PixelClassifier + ?Sized> PixelClassifier for Box<T> {
    #[inline]
    fn name(&self) -> &str {
        (**self).name()
    }

    #[inline]
    fn check(&self) -> Result<(), ClassifyError> {
        (**self).check()
    }

    #[inline]
    fn classify(&self, input: ClassifierInput<'_>) -> Result<ProbabilityMap, ClassifyError> {
        (**self).classify(input)
    }
}

/// 对一幅图像分类并阈值化, 得到 3D 细胞膜掩膜.
///
/// 分类结果的形状必须与图像栈的 `(z, h, w)` 一致.
pub fn segment_membrane<C: PixelClassifier + ?Sized>(
    classifier: &C,
    input: ClassifierInput<'_>,
) -> Result<Volume, ClassifyError> {
    let map = classifier.classify(input)?;
    check_shape(input.stack, &map)?;
    Ok(map.foreground_volume())
}

/// 分类结果的形状必须与图像栈一致.
pub(crate) fn check_shape(stack: &Stack, map: &ProbabilityMap) -> Result<(), ClassifyError> {
    let (_, z, h, w) = stack.shape();
    if map.shape() != (z, h, w) {
        return Err(ClassifyError::ShapeMismatch {
            expected: (z, h, w),
            found: map.shape(),
        });
    }
    Ok(())
}

/// 以 headless 模式运行 ilastik 像素分类工程.
#[derive(Debug, Clone)]
pub struct IlastikHeadless {
    executable: PathBuf,
    model: ModelFile,
}

impl IlastikHeadless {
    /// 以 ilastik 启动脚本 (例如 `run_ilastik.sh`) 和工程文件初始化.
    /// 工程文件不存在时返回 [`ClassifyError::ModelNotFound`].
    pub fn new<P: Into<PathBuf>, M: AsRef<Path>>(
        executable: P,
        model: M,
    ) -> Result<Self, ClassifyError> {
        Ok(Self {
            executable: executable.into(),
            model: ModelFile::resolve(model)?,
        })
    }

    /// 工程文件.
    #[inline]
    pub fn model(&self) -> &ModelFile {
        &self.model
    }

    /// 构造命令. 输出的标签图为多页 TIFF, 写入 `out_dir`.
    fn command(&self, input: &Path, out_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("--headless")
            .arg(format!("--project={}", self.model.path().display()))
            .arg("--export_source=Simple Segmentation")
            .arg("--output_format=multipage tiff")
            .arg(format!(
                "--output_filename_format={}",
                out_dir.join("{nickname}_seg.tiff").display()
            ))
            .arg(input);
        cmd
    }
}

impl PixelClassifier for IlastikHeadless {
    fn name(&self) -> &str {
        "ilastik"
    }

    fn check(&self) -> Result<(), ClassifyError> {
        if self.model.path().exists() {
            Ok(())
        } else {
            Err(ClassifyError::ModelNotFound(self.model.path().to_owned()))
        }
    }

    fn classify(&self, input: ClassifierInput<'_>) -> Result<ProbabilityMap, ClassifyError> {
        let out_dir = tempfile::tempdir()?;
        let mut cmd = self.command(input.path, out_dir.path());
        log::info!("Running ilastik on {}", input.path.display());
        log::debug!("Command: {cmd:?}");

        let output = cmd.output()?;
        let nickname = input
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let seg = out_dir.path().join(format!("{nickname}_seg.tiff"));
        if !output.status.success() || !seg.exists() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            log::error!("ilastik failed: {stderr}");
            return Err(ClassifyError::Command {
                status: output.status.to_string(),
                stderr,
            });
        }

        let classes = crate::io::read_label_pages(&seg)
            .map_err(|e| ClassifyError::Decode(e.to_string()))?;
        Ok(ProbabilityMap::new(classes, input.stack.calibration().clone()))
    }
}

/// 不依赖模型的替代分类器: 对标记通道的每一层以 Otsu 阈值分为背景 (1) 和细胞 (2).
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelThreshold;

impl PixelClassifier for ChannelThreshold {
    fn name(&self) -> &str {
        "channel-threshold"
    }

    fn classify(&self, input: ClassifierInput<'_>) -> Result<ProbabilityMap, ClassifyError> {
        let channel = input.stack.channel(MICROGLIA_CHANNEL);
        let mut classes = Array3::from_elem(channel.dim(), class::BACKGROUND);
        for (src, mut dst) in channel.axis_iter(Axis(0)).zip(classes.axis_iter_mut(Axis(0))) {
            let Some(t) = threshold::otsu(src.iter()) else {
                continue;
            };
            dst.zip_mut_with(&src, |c, &v| {
                if v >= t {
                    *c = class::FIRST_FOREGROUND;
                }
            });
        }
        Ok(ProbabilityMap::new(classes, input.stack.calibration().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_model_not_found() {
        let err = ModelFile::resolve("/definitely/not/here/membrane.ilp").unwrap_err();
        assert!(matches!(err, ClassifyError::ModelNotFound(_)));
        let err = IlastikHeadless::new("run_ilastik.sh", "/definitely/not/here.ilp").unwrap_err();
        assert!(matches!(err, ClassifyError::ModelNotFound(_)));
    }

    #[test]
    fn test_model_found() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("membrane.ilp");
        std::fs::write(&model, b"model").unwrap();
        let m = ModelFile::resolve(&model).unwrap();
        assert_eq!(m.path(), model.as_path());
        let c = IlastikHeadless::new("run_ilastik.sh", &model).unwrap();
        assert!(c.check().is_ok());
        std::fs::remove_file(&model).unwrap();
        assert!(c.check().is_err());
    }

    #[test]
    fn test_channel_threshold() {
        // 标记通道第 0 层左半边明亮, 第 1 层全暗.
        let data = Array4::from_shape_fn((2, 2, 4, 4), |(c, z, _, w)| {
            if c == MICROGLIA_CHANNEL && z == 0 && w < 2 {
                100.0
            } else {
                0.0
            }
        });
        let stack = Stack::new(data, Calibration::default()).unwrap();
        let input = ClassifierInput {
            path: Path::new("synthetic.tif"),
            stack: &stack,
        };
        let volume = segment_membrane(&ChannelThreshold, input).unwrap();
        assert_eq!(volume.shape(), (2, 4, 4));
        assert_eq!(volume.count_foreground(), 8);
    }

    #[test]
    fn test_shape_mismatch() {
        let stack = Stack::new(Array4::zeros((2, 1, 3, 3)), Calibration::default()).unwrap();
        let map = ProbabilityMap::new(Array3::from_elem((1, 3, 4), 1), Calibration::default());
        assert!(matches!(
            check_shape(&stack, &map),
            Err(ClassifyError::ShapeMismatch { .. })
        ));
    }
}
