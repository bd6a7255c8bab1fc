//! 批处理结果.

use std::io::{self, Write};

use glia_berry::batch::{BatchReport, FileFailure, FileReport};

/// 将单幅图像的结果写进 `w` 中.
fn describe_into<W: Write>(f: &FileReport, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Image `{}`:", f.file)?;
    writeln!(w, "{S4}Candidates found: {}", f.found)?;
    writeln!(w, "{S4}ROIs after review: {}", f.rois)?;
    writeln!(w, "{S4}Measured: {}", f.measured)?;
    writeln!(w, "{S4}Zero-area ROIs skipped: {}", f.gaps)?;
    write!(w, "{S4}Files written: {}", f.outputs.len())?;
    Ok(())
}

/// 将失败的图像写进 `w` 中.
fn describe_failure_into<W: Write>(f: &FileFailure, w: &mut W) -> io::Result<()> {
    writeln!(w, "Image `{}` FAILED:", f.file)?;
    write!(w, "    {}", f.reason)?;
    Ok(())
}

/// 批处理最终结果.
pub struct BatchResult {
    report: BatchReport,
}

impl From<BatchReport> for BatchResult {
    fn from(report: BatchReport) -> Self {
        Self { report }
    }
}

impl BatchResult {
    /// 是否所有图像都处理成功.
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.report.is_clean()
    }

    /// 写出完整报告.
    pub fn describe_all<W: Write>(&self, w: &mut W) -> io::Result<()> {
        utils::sep_to(&mut *w)?;
        for f in self.report.files.iter() {
            describe_into(f, w)?;
            writeln!(w)?;
            utils::sep_to(&mut *w)?;
        }
        for f in self.report.failures.iter() {
            describe_failure_into(f, w)?;
            writeln!(w)?;
            utils::sep_to(&mut *w)?;
        }
        writeln!(
            w,
            "{} images, {} failed, {} cells measured",
            self.report.files.len() + self.report.failures.len(),
            self.report.failures.len(),
            self.report.measured()
        )?;
        writeln!(w, "Results in {}", self.report.analysis_dir.display())?;
        if let Some(summary) = &self.report.summary {
            writeln!(w, "Folder summary: {}", summary.display())?;
        }
        Ok(())
    }

    /// 分析运行结果.
    pub fn analyze(&self) {
        let mut buf = Vec::with_capacity(512);
        match self.describe_all(&mut buf) {
            Ok(()) => print!("{}", String::from_utf8_lossy(&buf)),
            Err(e) => log::error!("Cannot render report: {e}"),
        }
    }
}
