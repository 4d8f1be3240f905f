use crate::config::Config;
use crate::measurement::{BenchReport, KindReport};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const RESULT_HEADER: [&str; 6] = [
    "Operation",
    "okOperation",
    "okPoint",
    "failOperation",
    "failPoint",
    "throughput(point/s)",
];

const LATENCY_HEADER: [&str; 13] = [
    "Operation",
    "AVG",
    "MIN",
    "P10",
    "P25",
    "MEDIAN",
    "P75",
    "P90",
    "P95",
    "P99",
    "P999",
    "MAX",
    "SLOWEST_THREAD",
];

fn main_configuration(config: &Config) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("BACKEND", config.backend.clone()),
        ("INSERT_MODE", config.insert_mode.to_string()),
        ("OPERATION_PROPORTION", config.operation_proportion.clone()),
        ("CLIENT_NUMBER", config.client_number.to_string()),
        ("GROUP_NUMBER", config.group_number.to_string()),
        ("DEVICE_NUMBER", config.device_number.to_string()),
        ("SENSOR_NUMBER", config.sensor_number.to_string()),
        ("BATCH_SIZE_PER_WRITE", config.batch_size_per_write.to_string()),
        ("LOOP", config.loop_count.to_string()),
        ("POINT_STEP", config.point_step.to_string()),
        ("QUERY_INTERVAL", config.query_interval.to_string()),
        ("IS_OUT_OF_ORDER", config.out_of_order.to_string()),
    ];
    if config.out_of_order {
        rows.push(("OUT_OF_ORDER_MODE", format!("{:?}", config.out_of_order_mode).to_lowercase()));
        rows.push(("OUT_OF_ORDER_RATIO", config.out_of_order_ratio.to_string()));
    }
    if config.double_insert {
        rows.push(("SECONDARY_BACKEND", config.secondary_backend.clone()));
    }
    rows
}

fn result_row(kind: &KindReport) -> Vec<String> {
    vec![
        kind.kind.to_string(),
        kind.ok_operations.to_string(),
        kind.ok_points.to_string(),
        kind.fail_operations.to_string(),
        kind.fail_points.to_string(),
        format!("{:.2}", kind.throughput),
    ]
}

fn latency_row(kind: &KindReport) -> Vec<String> {
    let mut row = vec![kind.kind.to_string(), format!("{:.2}", kind.avg_latency_ms)];
    row.extend(kind.quantiles_ms.iter().map(|v| format!("{v:.2}")));
    row.push(format!("{:.2}", kind.max_client_latency_sum_ms));
    row
}

fn push_table(out: &mut String, header: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };
    out.push_str(&line(header.to_vec()));
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
}

/// Human-readable summary printed at the end of a run.
pub fn render_console(report: &BenchReport, config: &Config) -> String {
    let mut out = String::new();
    out.push_str("----------------------Main Configurations----------------------\n");
    for (key, value) in main_configuration(config) {
        out.push_str(&format!("{key}: {value}\n"));
    }
    out.push_str("---------------------------------------------------------------\n");
    out.push_str(&format!(
        "Create schema cost {:.2} second\nTest elapsed time (not include schema creation): {:.2} second\n",
        report.create_schema_secs, report.elapsed_secs
    ));
    if report.failed_clients > 0 {
        out.push_str(&format!(
            "Failed clients: {} of {}\n",
            report.failed_clients, report.clients
        ));
    }

    out.push_str("----------------------------------------------------------Result Matrix----------------------------------------------------------\n");
    push_table(
        &mut out,
        &RESULT_HEADER,
        &report.kinds.iter().map(result_row).collect::<Vec<_>>(),
    );
    out.push_str("--------------------------------------------------------------------------Latency (ms) Matrix--------------------------------------------------------------------------\n");
    push_table(
        &mut out,
        &LATENCY_HEADER,
        &report.kinds.iter().map(latency_row).collect::<Vec<_>>(),
    );
    out
}

/// `<backend>-<mix>-<yyyy-MM-dd-HH-mm-ss>-test-result`, where mix lists the
/// operation proportion.
pub fn csv_file_stem(config: &Config, now: DateTime<Local>) -> String {
    let mix: String = config
        .operation_proportion
        .split(':')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("_");
    format!(
        "{}-{}-{}-test-result",
        config.backend,
        mix,
        now.format("%Y-%m-%d-%H-%M-%S")
    )
}

/// CSV output that rolls over to a new numbered file after `max_rows` rows.
pub struct CsvReportWriter {
    dir: PathBuf,
    stem: String,
    max_rows: Option<u64>,
    rows_in_file: u64,
    file_index: usize,
    writer: csv::Writer<File>,
    paths: Vec<PathBuf>,
}

impl CsvReportWriter {
    pub fn create(dir: &Path, stem: &str, max_rows: Option<u64>) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(format!("{stem}.csv"));
        let writer = Self::open(&path)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            stem: stem.to_string(),
            max_rows: max_rows.map(|rows| rows.max(1)),
            rows_in_file: 0,
            file_index: 0,
            writer,
            paths: vec![path],
        })
    }

    fn open(path: &Path) -> Result<csv::Writer<File>> {
        csv::WriterBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))
    }

    fn rotate(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.file_index += 1;
        let path = self
            .dir
            .join(format!("{}-{}.csv", self.stem, self.file_index));
        self.writer = Self::open(&path)?;
        self.paths.push(path);
        self.rows_in_file = 0;
        Ok(())
    }

    pub fn write_row<I, S>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        if self.max_rows.is_some_and(|max| self.rows_in_file >= max) {
            self.rotate()?;
        }
        self.writer.write_record(row)?;
        self.rows_in_file += 1;
        Ok(())
    }

    /// Flushes and returns every file written, in order.
    pub fn finish(mut self) -> Result<Vec<PathBuf>> {
        self.writer.flush()?;
        Ok(self.paths)
    }
}

/// Writes the configuration, result and latency sections as CSV.
pub fn write_csv(report: &BenchReport, config: &Config, now: DateTime<Local>) -> Result<Vec<PathBuf>> {
    let stem = csv_file_stem(config, now);
    let max_rows = config.csv_file_split.then_some(config.csv_max_line);
    let mut writer = CsvReportWriter::create(&config.csv_dir, &stem, max_rows)?;

    writer.write_row(["Main Configurations"])?;
    for (key, value) in main_configuration(config) {
        writer.write_row([key.to_string(), value])?;
    }
    writer.write_row(["Create schema cost (s)".to_string(), format!("{:.3}", report.create_schema_secs)])?;
    writer.write_row(["Elapsed time (s)".to_string(), format!("{:.3}", report.elapsed_secs)])?;

    writer.write_row(["Result Matrix"])?;
    writer.write_row(RESULT_HEADER)?;
    for kind in &report.kinds {
        writer.write_row(result_row(kind))?;
    }

    writer.write_row(["Latency (ms) Matrix"])?;
    writer.write_row(LATENCY_HEADER)?;
    for kind in &report.kinds {
        writer.write_row(latency_row(kind))?;
    }

    let paths = writer.finish()?;
    tracing::info!(files = paths.len(), dir = %config.csv_dir.display(), "wrote csv report");
    Ok(paths)
}

pub fn write_json(report: &BenchReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, serde_json::to_vec_pretty(report)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
