//! 测量表格与汇总统计.

use ordered_float::OrderedFloat;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::Measurement;

/// 表格列名, 依次为标签, 面积, 周长, 分枝指数和骨架总长.
pub const COLUMNS: [&str; 5] = ["Label", "Area", "Perim.", "RI", "Cable_Length"];

/// 汇总行的标签.
pub const MEAN_LABEL: &str = "Mean";

/// 单列的统计量.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ColumnStats {
    /// 均值.
    pub mean: f64,

    /// 样本标准差. 少于 2 个样本时为 0.
    pub sd: f64,

    /// 最小值.
    pub min: f64,

    /// 最大值.
    pub max: f64,
}

impl ColumnStats {
    /// 计算统计量. 没有样本时返回 `None`.
    pub fn of<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let values: Vec<f64> = values.into_iter().collect();
        let n = values.len();
        let min = values.iter().copied().map(OrderedFloat).min()?.0;
        let max = values.iter().copied().map(OrderedFloat).max()?.0;
        let mean = values.iter().sum::<f64>() / n as f64;
        let sd = if n < 2 {
            0.0
        } else {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        };
        Some(Self { mean, sd, min, max })
    }
}

/// 所有数值列的统计量.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Summary {
    /// 面积.
    pub area: ColumnStats,

    /// 周长.
    pub perimeter: ColumnStats,

    /// 分枝指数.
    pub ri: ColumnStats,

    /// 骨架总长.
    pub cable_length: ColumnStats,
}

impl Summary {
    /// 计算所有列的统计量. 没有数据行时返回 `None`.
    pub fn of(rows: &[Measurement]) -> Option<Self> {
        Some(Self {
            area: ColumnStats::of(rows.iter().map(|r| r.area))?,
            perimeter: ColumnStats::of(rows.iter().map(|r| r.perimeter))?,
            ri: ColumnStats::of(rows.iter().map(|r| r.ri))?,
            cable_length: ColumnStats::of(rows.iter().map(|r| r.cable_length))?,
        })
    }

    fn row_with(&self, label: &str, pick: fn(&ColumnStats) -> f64) -> Measurement {
        Measurement {
            label: label.to_string(),
            area: pick(&self.area),
            perimeter: pick(&self.perimeter),
            ri: pick(&self.ri),
            cable_length: pick(&self.cable_length),
        }
    }

    /// 均值行, 即表格唯一的汇总行.
    #[inline]
    pub fn mean_row(&self) -> Measurement {
        self.row_with(MEAN_LABEL, |s| s.mean)
    }

    /// 均值, 标准差, 最小值, 最大值四行, 供电子表格导出.
    pub fn rows(&self) -> [Measurement; 4] {
        [
            self.mean_row(),
            self.row_with("SD", |s| s.sd),
            self.row_with("Min", |s| s.min),
            self.row_with("Max", |s| s.max),
        ]
    }
}

/// 有序的测量表格. 汇总行不保存在表内, 由 [`Table::summary_row`] 按需计算.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    rows: Vec<Measurement>,
}

impl Table {
    /// 由数据行创建表格.
    #[inline]
    pub fn from_rows(rows: Vec<Measurement>) -> Self {
        Self { rows }
    }

    /// 数据行.
    #[inline]
    pub fn rows(&self) -> &[Measurement] {
        &self.rows
    }

    /// 数据行数 (不含汇总行).
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否没有数据行.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 所有数值列的统计量.
    #[inline]
    pub fn summary(&self) -> Option<Summary> {
        Summary::of(&self.rows)
    }

    /// 汇总行 (均值). 空表没有汇总行.
    #[inline]
    pub fn summary_row(&self) -> Option<Measurement> {
        self.summary().map(|s| s.mean_row())
    }

    /// 数据行加上末尾的汇总行.
    pub fn with_summary(&self) -> Vec<Measurement> {
        let mut ans = self.rows.clone();
        ans.extend(self.summary_row());
        ans
    }
}

/// 文件夹汇总: 把每幅图像的表格拼接在一起, 每行标签都带有文件名前缀.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FolderSummary {
    table: Table,
    files: usize,
}

impl FolderSummary {
    /// 由 `(文件名, 表格)` 依次拼接. 标签不以 `文件名:` 开头的行会被补上前缀.
    pub fn aggregate<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = (S, Table)>,
        S: AsRef<str>,
    {
        let mut rows = Vec::new();
        let mut files = 0;
        for (file, table) in tables {
            let prefix = format!("{}:", file.as_ref());
            files += 1;
            rows.extend(table.rows.into_iter().map(|mut r| {
                if !r.label.starts_with(&prefix) {
                    r.label = format!("{prefix}{}", r.label);
                }
                r
            }));
        }
        Self {
            table: Table::from_rows(rows),
            files,
        }
    }

    /// 拼接后的表格.
    #[inline]
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// 参与汇总的文件数.
    #[inline]
    pub fn files(&self) -> usize {
        self.files
    }
}
