//! 输入输出: 图像栈解码, 表格读写, 概览图导出.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

mod overview;
mod spreadsheet;
mod table_csv;
mod tiff_stack;

pub use overview::{composite, masks_overview, save_composite, save_masks_overview};
pub use spreadsheet::{export_spreadsheet, sheet_rows, SpreadsheetWriter};
pub use table_csv::{read_table, write_folder_summary, write_table};
pub use tiff_stack::{read_label_pages, DecodeError, StackReader, TiffStackReader};

/// 结果持久化错误.
#[derive(Debug, Error)]
pub enum PersistError {
    /// IO 错误.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// CSV 读写错误.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// 图像编码错误.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// 参数文件序列化错误.
    #[cfg(feature = "serde")]
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// 检查点序列化错误.
    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    /// 表格内容无法解析.
    #[error("{}, line {line}: {reason}", path.display())]
    Parse {
        /// 文件路径.
        path: PathBuf,
        /// 行号 (从 1 开始, 含表头).
        line: usize,
        /// 原因.
        reason: String,
    },

    /// 外部电子表格序列化器报错.
    #[error("spreadsheet export failed: {0}")]
    Spreadsheet(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 持久化结果.
pub type PersistResult<T> = Result<T, PersistError>;

#[cfg(test)]
pub(crate) use tiff_stack::tests as tests_support;
