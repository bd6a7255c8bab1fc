//! 电子表格 (`.xlsx`) 导出. 具体的文件格式由外部序列化器负责.

use std::error::Error;
use std::path::Path;

use super::{PersistError, PersistResult};
use crate::measure::{Measurement, Table, COLUMNS};

/// 外部电子表格序列化器.
pub trait SpreadsheetWriter {
    /// 输出文件扩展名.
    fn extension(&self) -> &str {
        "xlsx"
    }

    /// 写入一张工作表. `rows` 依次为数据行和汇总行.
    fn write_sheet(
        &self,
        path: &Path,
        columns: &[&str],
        rows: &[Measurement],
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 工作表内容: 数据行, 以及均值, 标准差, 最小值, 最大值四行汇总.
pub fn sheet_rows(table: &Table) -> Vec<Measurement> {
    let mut rows = table.rows().to_vec();
    if let Some(summary) = table.summary() {
        rows.extend(summary.rows());
    }
    rows
}

/// 以 `writer` 导出表格.
pub fn export_spreadsheet<W>(writer: &W, path: &Path, table: &Table) -> PersistResult<()>
where
    W: SpreadsheetWriter + ?Sized,
{
    writer
        .write_sheet(path, &COLUMNS, &sheet_rows(table))
        .map_err(PersistError::Spreadsheet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        labels: RefCell<Vec<String>>,
    }

    impl SpreadsheetWriter for Recorder {
        fn write_sheet(
            &self,
            _path: &Path,
            columns: &[&str],
            rows: &[Measurement],
        ) -> Result<(), Box<dyn Error + Send + Sync>> {
            assert_eq!(columns.len(), 5);
            self.labels
                .borrow_mut()
                .extend(rows.iter().map(|r| r.label.clone()));
            Ok(())
        }
    }

    fn row(label: &str) -> Measurement {
        Measurement {
            label: label.to_string(),
            area: 1.0,
            perimeter: 4.0,
            ri: 1.2,
            cable_length: 0.0,
        }
    }

    #[test]
    fn test_summary_rows_follow_data() {
        let rec = Recorder::default();
        let table = Table::from_rows(vec![row("a"), row("b")]);
        export_spreadsheet(&rec, Path::new("x.xlsx"), &table).unwrap();
        assert_eq!(*rec.labels.borrow(), ["a", "b", "Mean", "SD", "Min", "Max"]);
    }

    #[test]
    fn test_empty_table_has_no_summary() {
        assert!(sheet_rows(&Table::default()).is_empty());
    }
}
