//! TSV export for machine-readable benchmark results

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::REPORT_HEADER;
use crate::error::Result;
use crate::metrics::{MetricsRow, ResultTable};

/// TSV exporter for a run's result table
pub struct TsvExporter {
    path: PathBuf,
}

impl TsvExporter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write header plus one line per row, ordered by locator
    pub fn export(&self, table: &ResultTable) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&self.path)?);
        write_table(&mut out, table)?;
        out.flush()?;

        info!("Wrote {} rows to {}", table.len(), self.path.display());
        Ok(())
    }
}

pub fn write_table<W: Write>(out: &mut W, table: &ResultTable) -> Result<()> {
    writeln!(out, "{}", REPORT_HEADER)?;
    for row in table.rows() {
        writeln!(out, "{}", format_row(row))?;
    }
    Ok(())
}

/// One TSV line (column order matches `REPORT_HEADER`)
pub fn format_row(row: &MetricsRow) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{:.6}\t{:.6}\t{:.3}\t{}\t{:.1}\t{:.1}\t{:.1}\t{:.1}\t{}\t{}",
        row.locator,
        row.category,
        row.time_chunk,
        row.lon_chunk,
        row.lat_chunk,
        row.trials,
        row.cpu_time_secs,
        row.wall_time_secs,
        row.peak_memory_mib,
        row.num_chunks,
        row.chunk_size_bytes,
        row.wasted_mem_1,
        row.wasted_mem_2,
        row.wasted_mem_3,
        row.archive_size_bytes,
        format_shape(&row.result_shape),
    )
}

/// Tuple notation: `()`, `(5136,)`, `(721, 1152)`
pub fn format_shape(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [n] => format!("({},)", n),
        dims => {
            let parts: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
            format!("({})", parts.join(", "))
        }
    }
}
