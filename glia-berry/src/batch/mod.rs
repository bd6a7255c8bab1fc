//! 文件夹批处理.
//!
//! 每幅图像依次经过 `Loaded → Projected → Filtered → Checkpoint → Measured → Persisted`.
//! 所有图像处理完毕后, 重新读取本次写出的每张表格, 拼接为文件夹汇总.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{Config, ConfigError, FailurePolicy};
use crate::dataset::{image_loader, ReaderRegistry, SourceImage};
use crate::io::{self as persist, DecodeError, PersistError, SpreadsheetWriter};
use crate::measure::FolderSummary;
use crate::pipeline::{Headless, ImageOutcome, ImagePipeline, PipelineError, RoiEditor};
use crate::segment::{ClassifyError, PixelClassifier};

mod report;

pub use report::{BatchReport, FileFailure, FileReport};

/// 单幅图像在流程中已完成的阶段. 出错时报告最后完成的阶段.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Stage {
    /// 已解码.
    Loaded,
    /// 已完成最大投影与细胞核分割. 接下来调用像素分类器.
    Projected,
    /// 已完成目标提取与细胞核验证.
    Filtered,
    /// ROI 已经人工确认.
    Checkpoint,
    /// 已完成测量.
    Measured,
    /// 结果已写出.
    Persisted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 批处理错误. 返回该错误意味着整个批处理被终止.
#[derive(Debug, Error)]
pub enum BatchError {
    /// 运行参数不合法.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 分类器不可用 (例如模型文件不存在). 在处理任何图像之前检查.
    #[error("classifier `{name}` is not usable: {source}")]
    Classifier {
        /// 分类器名称.
        name: String,
        /// 原因.
        source: ClassifyError,
    },

    /// 输入文件夹无法读取或输出文件夹无法创建.
    #[error("{}: {source}", path.display())]
    Folder {
        /// 文件夹路径.
        path: PathBuf,
        /// 原因.
        source: io::Error,
    },

    /// 图像无法加载.
    #[error("cannot load {}: {source}", path.display())]
    Load {
        /// 图像路径.
        path: PathBuf,
        /// 原因.
        source: DecodeError,
    },

    /// 图像处理失败.
    #[error("{file} failed after stage {stage}: {source}")]
    Pipeline {
        /// 文件名.
        file: String,
        /// 最后完成的阶段.
        stage: Stage,
        /// 原因.
        source: PipelineError,
    },

    /// 结果写出失败.
    #[error("cannot persist results of {file}: {source}")]
    Persist {
        /// 文件名.
        file: String,
        /// 原因.
        source: PersistError,
    },
}

impl BatchError {
    /// 出错的文件名; 与具体文件无关的错误返回 `None`.
    pub fn file(&self) -> Option<String> {
        match self {
            Self::Load { path, .. } => path.file_name().map(|s| s.to_string_lossy().into_owned()),
            Self::Pipeline { file, .. } | Self::Persist { file, .. } => Some(file.clone()),
            _ => None,
        }
    }

    /// 是否无论失败策略如何都必须终止批处理.
    fn always_fatal(&self) -> bool {
        match self {
            Self::Pipeline { source, .. } => source.is_invariant_violation(),
            Self::Load { .. } | Self::Persist { .. } => false,
            _ => true,
        }
    }
}

/// 批处理器.
pub struct BatchRunner<'a> {
    config: Config,
    classifier: &'a dyn PixelClassifier,
    editor: Box<dyn RoiEditor + 'a>,
    spreadsheet: Option<&'a dyn SpreadsheetWriter>,
    readers: ReaderRegistry,
}

impl<'a> BatchRunner<'a> {
    /// 以运行参数和像素分类器初始化. 默认无人值守, 不导出电子表格, 只读取 TIFF.
    pub fn new(config: Config, classifier: &'a dyn PixelClassifier) -> Self {
        Self {
            config,
            classifier,
            editor: Box::new(Headless),
            spreadsheet: None,
            readers: ReaderRegistry::default(),
        }
    }

    /// 设置交互式 ROI 编辑器.
    pub fn with_editor<E: RoiEditor + 'a>(mut self, editor: E) -> Self {
        self.editor = Box::new(editor);
        self
    }

    /// 设置电子表格序列化器.
    pub fn with_spreadsheet(mut self, writer: &'a dyn SpreadsheetWriter) -> Self {
        self.spreadsheet = Some(writer);
        self
    }

    /// 设置图像解码器集合.
    pub fn with_readers(mut self, readers: ReaderRegistry) -> Self {
        self.readers = readers;
        self
    }

    /// 运行参数.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 处理 `input` 文件夹下的所有图像.
    ///
    /// 分类器不可用, 参数不合法或不变量被破坏时总是终止. 单幅图像加载或处理失败时,
    /// 按 [`FailurePolicy`] 终止, 或者记录后继续.
    pub fn run<P: AsRef<Path>>(&mut self, input: P) -> Result<BatchReport, BatchError> {
        let input = input.as_ref();
        self.config.validate()?;
        self.classifier
            .check()
            .map_err(|source| BatchError::Classifier {
                name: self.classifier.name().to_string(),
                source,
            })?;

        let out_dir = input.join(&self.config.analysis_dir);
        let folder_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source| BatchError::Folder { path, source }
        };
        fs::create_dir_all(&out_dir).map_err(folder_error(out_dir.as_path()))?;
        self.write_parameters(&out_dir)?;

        let pipeline = ImagePipeline::new(&self.config, self.classifier)?.with_cache_dir(&out_dir);
        let loader =
            image_loader(input, &self.config, &self.readers).map_err(folder_error(input))?;
        log::info!("{} images under {}", loader.len(), input.display());

        let mut report = BatchReport::new(&out_dir);
        let mut tables: Vec<(String, PathBuf)> = Vec::new();
        for (path, loaded) in loader {
            log::info!("Processing {}", path.display());
            let result = loaded
                .map_err(|source| BatchError::Load {
                    path: path.clone(),
                    source,
                })
                .and_then(|image| {
                    process(
                        &pipeline,
                        self.editor.as_mut(),
                        self.spreadsheet,
                        &image,
                        &out_dir,
                    )
                });
            match result {
                Ok((file, table)) => {
                    if let Some(table) = table {
                        tables.push((file.file.clone(), table));
                    }
                    report.files.push(file);
                }
                Err(e) if e.always_fatal() || self.config.failure_policy == FailurePolicy::Abort => {
                    log::error!("Batch aborted: {e}");
                    return Err(e);
                }
                Err(e) => {
                    log::error!("{e}; continuing with the next image");
                    report.failures.push(FileFailure::from_error(&path, &e));
                }
            }
        }

        report.summary = self.write_folder_summary(input, &out_dir, &tables)?;
        Ok(report)
    }

    #[cfg(feature = "serde")]
    fn write_parameters(&self, out_dir: &Path) -> Result<(), BatchError> {
        let path = out_dir.join(crate::consts::PARAMETERS_FILE);
        let write = || -> Result<(), PersistError> {
            let file = io::BufWriter::new(fs::File::create(&path)?);
            serde_json::to_writer_pretty(file, &self.config)?;
            Ok(())
        };
        write().map_err(|source| BatchError::Persist {
            file: crate::consts::PARAMETERS_FILE.to_string(),
            source,
        })
    }

    #[cfg(not(feature = "serde"))]
    fn write_parameters(&self, _out_dir: &Path) -> Result<(), BatchError> {
        log::debug!("Built without `serde`, parameters are not recorded");
        Ok(())
    }

    /// 重新读取本次写出的每张表格, 拼接后写入 `summary_<文件夹名>.csv`.
    fn write_folder_summary(
        &self,
        input: &Path,
        out_dir: &Path,
        tables: &[(String, PathBuf)],
    ) -> Result<Option<PathBuf>, BatchError> {
        if tables.is_empty() {
            log::warn!("No measurement table written, folder summary skipped");
            return Ok(None);
        }
        let folder = input
            .canonicalize()
            .unwrap_or_else(|_| input.to_path_buf())
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let path = out_dir.join(format!("summary_{folder}.csv"));
        let summarize = || -> Result<(), PersistError> {
            let mut read = Vec::with_capacity(tables.len());
            for (file, csv) in tables {
                read.push((file.as_str(), persist::read_table(csv)?));
            }
            let summary = FolderSummary::aggregate(read);
            log::info!(
                "Folder summary: {} rows from {} files",
                summary.table().len(),
                summary.files()
            );
            persist::write_folder_summary(&path, &summary)
        };
        summarize().map_err(|source| BatchError::Persist {
            file: folder.clone(),
            source,
        })?;
        Ok(Some(path))
    }
}

/// 处理并保存一幅图像. 成功时返回报告和写出的 CSV 路径 (如果有).
fn process(
    pipeline: &ImagePipeline<'_, dyn PixelClassifier + '_>,
    editor: &mut (dyn RoiEditor + '_),
    spreadsheet: Option<&dyn SpreadsheetWriter>,
    image: &SourceImage,
    out_dir: &Path,
) -> Result<(FileReport, Option<PathBuf>), BatchError> {
    let fail = |stage: Stage| {
        let file = image.name.clone();
        move |source| BatchError::Pipeline {
            file,
            stage,
            source,
        }
    };
    log::debug!("{}: {}", image.name, Stage::Loaded);

    // 投影与细胞核分割不会失败, 出错的只有分类器.
    let checkpoint = pipeline.segment(image).map_err(fail(Stage::Projected))?;
    log::debug!("{}: {}", image.name, Stage::Filtered);

    let edited = editor
        .edit(&checkpoint)
        .map_err(|e| fail(Stage::Filtered)(PipelineError::Edit(e)))?;
    log::debug!("{}: {}", image.name, Stage::Checkpoint);
    let outcome = checkpoint.resume(edited).map_err(fail(Stage::Checkpoint))?;
    log::debug!("{}: {}", image.name, Stage::Measured);

    let (outputs, table) = persist_outcome(&outcome, pipeline.config(), spreadsheet, out_dir)
        .map_err(|source| BatchError::Persist {
            file: image.name.clone(),
            source,
        })?;
    log::debug!("{}: {}", image.name, Stage::Persisted);
    Ok((FileReport::new(&outcome, outputs), table))
}

/// 写出 `<文件名>.csv`, `<文件名>.xlsx`, `<文件名>.tif` 和 `<文件名>_masks.png`, 文件名含扩展名,
/// 因此同名不同扩展名的图像互不覆盖. 没有测量行时跳过两张表格.
fn persist_outcome(
    outcome: &ImageOutcome,
    config: &Config,
    spreadsheet: Option<&dyn SpreadsheetWriter>,
    out_dir: &Path,
) -> Result<(Vec<PathBuf>, Option<PathBuf>), PersistError> {
    let name = &outcome.name;
    let table = &outcome.measured.table;
    let mut outputs = Vec::with_capacity(4);
    let mut csv = None;

    if table.is_empty() {
        log::warn!("{}: no measurement, tables skipped", outcome.name);
    } else {
        let path = out_dir.join(format!("{name}.csv"));
        persist::write_table(&path, table)?;
        outputs.push(path.clone());
        csv = Some(path);

        if let Some(writer) = spreadsheet {
            let path = out_dir.join(format!("{name}.{}", writer.extension()));
            persist::export_spreadsheet(writer, &path, table)?;
            outputs.push(path);
        }
    }

    let path = out_dir.join(format!("{name}.tif"));
    let [nucleus, microglia] = &outcome.projections;
    persist::save_composite(&path, nucleus, microglia, &outcome.rois, config.saturated)?;
    outputs.push(path);

    let path = out_dir.join(format!("{name}_masks.png"));
    persist::save_masks_overview(&path, &outcome.microglia, &outcome.nuclei)?;
    outputs.push(path);

    Ok((outputs, csv))
}
