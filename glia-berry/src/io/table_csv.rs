//! 测量表格的 CSV 读写.
//!
//! 每幅图像的 CSV 只含数据行; 文件夹汇总的 CSV 末尾附加一行均值.

use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Writer};

use super::{PersistError, PersistResult};
use crate::measure::{FolderSummary, Measurement, Table, COLUMNS, MEAN_LABEL};

fn record(m: &Measurement) -> [String; 5] {
    [
        m.label.clone(),
        m.area.to_string(),
        m.perimeter.to_string(),
        m.ri.to_string(),
        m.cable_length.to_string(),
    ]
}

fn write_rows<'a, P, I>(path: P, rows: I) -> PersistResult<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a Measurement>,
{
    let mut writer = Writer::from_path(path)?;
    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.write_record(record(row))?;
    }
    writer.flush()?;
    Ok(())
}

/// 把表格的数据行写入 `path`.
pub fn write_table<P: AsRef<Path>>(path: P, table: &Table) -> PersistResult<()> {
    write_rows(path, table.rows())
}

/// 写入文件夹汇总: 所有数据行加上末尾的均值行.
pub fn write_folder_summary<P: AsRef<Path>>(path: P, summary: &FolderSummary) -> PersistResult<()> {
    write_rows(path, &summary.table().with_summary())
}

/// 读回 [`write_table`] 写出的表格. 标签为 `Mean` 的汇总行被忽略.
pub fn read_table<P: AsRef<Path>>(path: P) -> PersistResult<Table> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let parse_error = |line: usize, reason: String| PersistError::Parse {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let headers = reader.headers()?.clone();
    if headers != StringRecord::from(COLUMNS.to_vec()) {
        return Err(parse_error(1, format!("unexpected header {headers:?}")));
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i + 2;
        let label = &record[0];
        if label == MEAN_LABEL {
            continue;
        }
        let mut values = [0.0; 4];
        for (k, v) in values.iter_mut().enumerate() {
            let field = &record[k + 1];
            *v = field
                .trim()
                .parse()
                .map_err(|_| parse_error(line, format!("`{field}` in column {} is not a number", COLUMNS[k + 1])))?;
        }
        let [area, perimeter, ri, cable_length] = values;
        rows.push(Measurement {
            label: label.to_string(),
            area,
            perimeter,
            ri,
            cable_length,
        });
    }
    Ok(Table::from_rows(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(label: &str, area: f64) -> Measurement {
        Measurement {
            label: label.to_string(),
            area,
            perimeter: area.sqrt() * 4.1,
            ri: 1.0 / 3.0 + 1.0,
            cable_length: 0.1 + 0.2,
        }
    }

    #[test]
    fn test_table_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        let table = Table::from_rows(vec![row("a.tif:0010-0010", 12.5), row("a.tif:0020-0031", 40.25)]);
        write_table(&path, &table).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Label,Area,Perim.,RI,Cable_Length\n"));
        assert_eq!(text.lines().count(), 3);
        assert_eq!(read_table(&path).unwrap(), table);
    }

    #[test]
    fn test_folder_summary_has_mean_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary_x.csv");
        let folder = FolderSummary::aggregate([
            ("a.tif", Table::from_rows(vec![row("r1", 1.0), row("r2", 2.0), row("r3", 3.0)])),
            ("b.tif", Table::from_rows(vec![row("r1", 4.0), row("r2", 5.0)])),
        ]);
        write_folder_summary(&path, &folder).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let last = text.lines().last().unwrap();
        assert!(last.starts_with("Mean,3,"));
        assert_eq!(text.lines().count(), 7);
        // 汇总行读回时被忽略.
        assert_eq!(read_table(&path).unwrap().len(), 5);
    }

    #[test]
    fn test_bad_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "Label,Area,Perim.,RI,Cable_Length\nx,1,2,abc,4\n").unwrap();
        match read_table(&path) {
            Err(PersistError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bad_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "Label,Area,%Area\nx,1,2\n").unwrap();
        assert!(matches!(read_table(&path), Err(PersistError::Parse { line: 1, .. })));
    }
}
