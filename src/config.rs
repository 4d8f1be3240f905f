use crate::error::BenchError;
use anyhow::{Context, Result};
use chrono::DateTime;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "TSDB_BENCH_";

/// Number of entries in `operation_proportion`, one per operation kind.
pub const OPERATION_KIND_COUNT: usize = 11;
/// Number of entries in `insert_datatype_proportion`.
pub const DATA_TYPE_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStrategy {
    Hash,
    Mod,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Ms,
    Us,
}

impl Precision {
    /// Ticks of this precision per millisecond.
    pub fn per_milli(self) -> i64 {
        match self {
            Self::Ms => 1,
            Self::Us => 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfOrderMode {
    /// Per-record Poisson jitter of delivery position.
    Poisson,
    /// A fraction of whole batches delivered in reverse.
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
    Record,
    Records,
    Columnar,
}

macro_rules! impl_from_str {
    ($ty:ty, $($text:literal => $variant:expr),+ $(,)?) => {
        impl FromStr for $ty {
            type Err = BenchError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                match raw.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($variant),)+
                    other => Err(BenchError::config(format!(
                        "unknown {} value {other:?}",
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

impl_from_str!(GroupStrategy, "hash" => GroupStrategy::Hash, "mod" => GroupStrategy::Mod, "div" => GroupStrategy::Div);
impl_from_str!(Precision, "ms" => Precision::Ms, "us" => Precision::Us);
impl_from_str!(OutOfOrderMode, "poisson" => OutOfOrderMode::Poisson, "0" => OutOfOrderMode::Poisson, "batch" => OutOfOrderMode::Batch, "1" => OutOfOrderMode::Batch);
impl_from_str!(InsertMode, "record" => InsertMode::Record, "records" => InsertMode::Records, "columnar" => InsertMode::Columnar, "tablet" => InsertMode::Columnar);

impl fmt::Display for InsertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Record => "record",
            Self::Records => "records",
            Self::Columnar => "columnar",
        };
        f.write_str(name)
    }
}

/// Ratios used to partition sensors across generator families.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunctionRatios {
    pub constant: f64,
    pub line: f64,
    pub random: f64,
    pub sin: f64,
    pub square: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: String,
    pub secondary_backend: String,
    pub double_insert: bool,
    pub replication_queue: usize,
    pub insert_mode: InsertMode,
    pub create_schema: bool,
    /// Delete existing data of the written devices before registering schema.
    pub is_delete_data: bool,
    /// Pause after the delete so the target can settle.
    pub init_wait_time_ms: u64,

    pub group_number: usize,
    pub sg_strategy: GroupStrategy,
    pub device_number: usize,
    pub sensor_number: usize,
    pub client_number: usize,
    pub client_bind: bool,
    pub benchmark_index: usize,
    pub sensor_ts_alignment: bool,

    pub batch_size_per_write: usize,
    pub mul_dev_batch: bool,
    pub loop_count: u64,
    pub point_step: i64,
    pub timestamp_precision: Precision,
    pub start_time: String,
    pub string_length: usize,
    pub insert_datatype_proportion: String,

    pub function_catalog: Option<PathBuf>,
    pub constant_ratio: f64,
    pub line_ratio: f64,
    pub random_ratio: f64,
    pub sin_ratio: f64,
    pub square_ratio: f64,
    pub data_seed: u64,

    pub operation_proportion: String,
    pub out_of_order: bool,
    pub out_of_order_mode: OutOfOrderMode,
    pub out_of_order_ratio: f64,
    pub lambda: f64,
    pub max_k: u64,
    pub real_insert_rate: f64,

    pub op_interval_ms: u64,
    pub write_operation_timeout_ms: u64,
    pub read_operation_timeout_ms: u64,

    pub query_seed: u64,
    pub query_device_num: usize,
    pub query_sensor_num: usize,
    pub query_aggregate_fun: String,
    pub query_interval: i64,
    pub query_lower_value: f64,
    pub group_by_time_unit: i64,
    pub step_size: i64,
    /// Aim precise-point queries half a step off the write grid so they match nothing.
    pub empty_precise_point_query: bool,

    pub digest_significant_figures: u8,
    pub log_print_interval_secs: u64,
    pub csv_output: bool,
    pub csv_dir: PathBuf,
    pub csv_max_line: u64,
    pub csv_file_split: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            secondary_backend: "memory".to_string(),
            double_insert: false,
            replication_queue: 1024,
            insert_mode: InsertMode::Records,
            create_schema: true,
            is_delete_data: false,
            init_wait_time_ms: 5_000,

            group_number: 1,
            sg_strategy: GroupStrategy::Mod,
            device_number: 2,
            sensor_number: 5,
            client_number: 2,
            client_bind: true,
            benchmark_index: 0,
            sensor_ts_alignment: true,

            batch_size_per_write: 100,
            mul_dev_batch: false,
            loop_count: 10_000,
            point_step: 7_000,
            timestamp_precision: Precision::Ms,
            start_time: "2018-08-30T00:00:00+08:00".to_string(),
            string_length: 2,
            insert_datatype_proportion: "1:1:1:1:1:1".to_string(),

            function_catalog: None,
            constant_ratio: 0.352,
            line_ratio: 0.054,
            random_ratio: 0.512,
            sin_ratio: 0.036,
            square_ratio: 0.054,
            data_seed: 666,

            operation_proportion: "1:0:0:0:0:0:0:0:0:0:0".to_string(),
            out_of_order: false,
            out_of_order_mode: OutOfOrderMode::Poisson,
            out_of_order_ratio: 0.5,
            lambda: 3.0,
            max_k: 10,
            real_insert_rate: 1.0,

            op_interval_ms: 0,
            write_operation_timeout_ms: 120_000,
            read_operation_timeout_ms: 300_000,

            query_seed: 1_516_580_959_202,
            query_device_num: 1,
            query_sensor_num: 1,
            query_aggregate_fun: "count".to_string(),
            query_interval: 10_000,
            query_lower_value: 0.0,
            group_by_time_unit: 5_000,
            step_size: 1,
            empty_precise_point_query: false,

            digest_significant_figures: 3,
            log_print_interval_secs: 5,
            csv_output: false,
            csv_dir: PathBuf::from("data/csvOutput"),
            csv_max_line: 10_000_000,
            csv_file_split: true,
        }
    }
}

impl Config {
    /// Loads an optional TOML file, then applies `TSDB_BENCH_*` environment overrides.
    /// The result is not validated; callers finish with [`Config::prepare`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                toml::from_str::<Config>(&contents)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => Config::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        override_string("BACKEND", &mut self.backend);
        override_string("SECONDARY_BACKEND", &mut self.secondary_backend);
        override_parsed("DOUBLE_INSERT", &mut self.double_insert)?;
        override_parsed("REPLICATION_QUEUE", &mut self.replication_queue)?;
        override_parsed("INSERT_MODE", &mut self.insert_mode)?;
        override_parsed("CREATE_SCHEMA", &mut self.create_schema)?;
        override_parsed("IS_DELETE_DATA", &mut self.is_delete_data)?;
        override_parsed("INIT_WAIT_TIME_MS", &mut self.init_wait_time_ms)?;

        override_parsed("GROUP_NUMBER", &mut self.group_number)?;
        override_parsed("SG_STRATEGY", &mut self.sg_strategy)?;
        override_parsed("DEVICE_NUMBER", &mut self.device_number)?;
        override_parsed("SENSOR_NUMBER", &mut self.sensor_number)?;
        override_parsed("CLIENT_NUMBER", &mut self.client_number)?;
        override_parsed("CLIENT_BIND", &mut self.client_bind)?;
        override_parsed("BENCHMARK_INDEX", &mut self.benchmark_index)?;
        override_parsed("SENSOR_TS_ALIGNMENT", &mut self.sensor_ts_alignment)?;

        override_parsed("BATCH_SIZE_PER_WRITE", &mut self.batch_size_per_write)?;
        override_parsed("MUL_DEV_BATCH", &mut self.mul_dev_batch)?;
        override_parsed("LOOP", &mut self.loop_count)?;
        override_parsed("POINT_STEP", &mut self.point_step)?;
        override_parsed("TIMESTAMP_PRECISION", &mut self.timestamp_precision)?;
        override_string("START_TIME", &mut self.start_time);
        override_parsed("STRING_LENGTH", &mut self.string_length)?;
        override_string("INSERT_DATATYPE_PROPORTION", &mut self.insert_datatype_proportion);

        if let Some(value) = env_optional("FUNCTION_CATALOG") {
            self.function_catalog = Some(PathBuf::from(value));
        }
        override_parsed("CONSTANT_RATIO", &mut self.constant_ratio)?;
        override_parsed("LINE_RATIO", &mut self.line_ratio)?;
        override_parsed("RANDOM_RATIO", &mut self.random_ratio)?;
        override_parsed("SIN_RATIO", &mut self.sin_ratio)?;
        override_parsed("SQUARE_RATIO", &mut self.square_ratio)?;
        override_parsed("DATA_SEED", &mut self.data_seed)?;

        override_string("OPERATION_PROPORTION", &mut self.operation_proportion);
        override_parsed("OUT_OF_ORDER", &mut self.out_of_order)?;
        override_parsed("OUT_OF_ORDER_MODE", &mut self.out_of_order_mode)?;
        override_parsed("OUT_OF_ORDER_RATIO", &mut self.out_of_order_ratio)?;
        override_parsed("LAMBDA", &mut self.lambda)?;
        override_parsed("MAX_K", &mut self.max_k)?;
        override_parsed("REAL_INSERT_RATE", &mut self.real_insert_rate)?;

        override_parsed("OP_INTERVAL_MS", &mut self.op_interval_ms)?;
        override_parsed("WRITE_OPERATION_TIMEOUT_MS", &mut self.write_operation_timeout_ms)?;
        override_parsed("READ_OPERATION_TIMEOUT_MS", &mut self.read_operation_timeout_ms)?;

        override_parsed("QUERY_SEED", &mut self.query_seed)?;
        override_parsed("QUERY_DEVICE_NUM", &mut self.query_device_num)?;
        override_parsed("QUERY_SENSOR_NUM", &mut self.query_sensor_num)?;
        override_string("QUERY_AGGREGATE_FUN", &mut self.query_aggregate_fun);
        override_parsed("QUERY_INTERVAL", &mut self.query_interval)?;
        override_parsed("QUERY_LOWER_VALUE", &mut self.query_lower_value)?;
        override_parsed("GROUP_BY_TIME_UNIT", &mut self.group_by_time_unit)?;
        override_parsed("STEP_SIZE", &mut self.step_size)?;
        override_parsed("EMPTY_PRECISE_POINT_QUERY", &mut self.empty_precise_point_query)?;

        override_parsed("DIGEST_SIGNIFICANT_FIGURES", &mut self.digest_significant_figures)?;
        override_parsed("LOG_PRINT_INTERVAL_SECS", &mut self.log_print_interval_secs)?;
        override_parsed("CSV_OUTPUT", &mut self.csv_output)?;
        if let Some(value) = env_optional("CSV_DIR") {
            self.csv_dir = PathBuf::from(value);
        }
        override_parsed("CSV_MAX_LINE", &mut self.csv_max_line)?;
        override_parsed("CSV_FILE_SPLIT", &mut self.csv_file_split)?;
        Ok(())
    }

    /// Normalizes soft settings and validates the rest. Run once before the benchmark starts.
    pub fn prepare(mut self) -> Result<Self, BenchError> {
        if !(self.real_insert_rate > 0.0 && self.real_insert_rate <= 1.0) {
            tracing::error!(
                rate = self.real_insert_rate,
                "real_insert_rate must be within (0, 1]; using 1.0"
            );
            self.real_insert_rate = 1.0;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        for (name, value) in [
            ("device_number", self.device_number),
            ("sensor_number", self.sensor_number),
            ("client_number", self.client_number),
            ("group_number", self.group_number),
            ("batch_size_per_write", self.batch_size_per_write),
        ] {
            if value == 0 {
                return Err(BenchError::config(format!("{name} must be positive")));
            }
        }
        if self.group_number > self.device_number {
            return Err(BenchError::config(format!(
                "group_number ({}) exceeds device_number ({})",
                self.group_number, self.device_number
            )));
        }
        if self.client_bind && self.client_number > self.device_number {
            return Err(BenchError::config(format!(
                "client_number ({}) exceeds device_number ({}) while client_bind is set",
                self.client_number, self.device_number
            )));
        }
        if self.point_step <= 0 {
            return Err(BenchError::config("point_step must be positive"));
        }
        if self.empty_precise_point_query && self.scaled_point_step() < 2 {
            return Err(BenchError::config(
                "empty_precise_point_query needs a point_step of at least 2 time units",
            ));
        }
        if self.mul_dev_batch {
            if !self.client_bind {
                return Err(BenchError::config("mul_dev_batch requires client_bind"));
            }
            if self.device_number % self.client_number != 0 {
                return Err(BenchError::config(format!(
                    "mul_dev_batch needs device_number ({}) divisible by client_number ({})",
                    self.device_number, self.client_number
                )));
            }
            let per_client = self.device_number / self.client_number;
            if self.batch_size_per_write % per_client != 0 {
                return Err(BenchError::config(format!(
                    "mul_dev_batch needs batch_size_per_write ({}) divisible by devices per client ({per_client})",
                    self.batch_size_per_write
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.out_of_order_ratio) {
            return Err(BenchError::config("out_of_order_ratio must be within [0, 1]"));
        }
        if !(self.lambda >= 0.0 && self.lambda.is_finite()) {
            return Err(BenchError::config("lambda must be a finite non-negative number"));
        }
        if self.digest_significant_figures > 5 {
            return Err(BenchError::config(
                "digest_significant_figures must be within 0..=5",
            ));
        }
        if self.query_interval < 0 || self.group_by_time_unit <= 0 || self.step_size < 0 {
            return Err(BenchError::config(
                "query_interval, group_by_time_unit and step_size must not be negative (unit must be positive)",
            ));
        }
        if self.query_device_num == 0 || self.query_sensor_num == 0 {
            return Err(BenchError::config(
                "query_device_num and query_sensor_num must be positive",
            ));
        }
        if self.csv_file_split && self.csv_max_line == 0 {
            return Err(BenchError::config("csv_max_line must be positive"));
        }
        self.operation_ratios()?;
        self.data_type_ratios()?;
        self.start_timestamp()?;
        Ok(())
    }

    pub fn operation_ratios(&self) -> Result<Vec<f64>, BenchError> {
        parse_ratios(
            "operation_proportion",
            &self.operation_proportion,
            OPERATION_KIND_COUNT,
        )
    }

    pub fn data_type_ratios(&self) -> Result<Vec<f64>, BenchError> {
        parse_ratios(
            "insert_datatype_proportion",
            &self.insert_datatype_proportion,
            DATA_TYPE_COUNT,
        )
    }

    pub fn function_ratios(&self) -> FunctionRatios {
        FunctionRatios {
            constant: self.constant_ratio,
            line: self.line_ratio,
            random: self.random_ratio,
            sin: self.sin_ratio,
            square: self.square_ratio,
        }
    }

    /// First grid timestamp, in the configured precision.
    pub fn start_timestamp(&self) -> Result<i64, BenchError> {
        let parsed = DateTime::parse_from_rfc3339(self.start_time.trim()).map_err(|err| {
            BenchError::config(format!("invalid start_time {:?}: {err}", self.start_time))
        })?;
        Ok(parsed.timestamp_millis() * self.timestamp_precision.per_milli())
    }

    /// Grid step between consecutive points of one device, in the configured precision.
    pub fn scaled_point_step(&self) -> i64 {
        self.point_step * self.timestamp_precision.per_milli()
    }

    pub fn scaled_query_interval(&self) -> i64 {
        self.query_interval * self.timestamp_precision.per_milli()
    }

    pub fn scaled_group_by_unit(&self) -> i64 {
        self.group_by_time_unit * self.timestamp_precision.per_milli()
    }

    pub fn first_device_index(&self) -> usize {
        self.benchmark_index * self.device_number
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_operation_timeout_ms.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_operation_timeout_ms.max(1))
    }

    pub fn op_interval(&self) -> Option<Duration> {
        (self.op_interval_ms > 0).then(|| Duration::from_millis(self.op_interval_ms))
    }

    pub fn init_wait(&self) -> Option<Duration> {
        (self.init_wait_time_ms > 0).then(|| Duration::from_millis(self.init_wait_time_ms))
    }

    pub fn log_print_interval(&self) -> Option<Duration> {
        (self.log_print_interval_secs > 0)
            .then(|| Duration::from_secs(self.log_print_interval_secs))
    }
}

/// Parses a colon separated ratio list such as `1:0:2`.
pub fn parse_ratios(name: &str, raw: &str, expected: usize) -> Result<Vec<f64>, BenchError> {
    let ratios = raw
        .split(':')
        .map(|part| {
            part.trim().parse::<f64>().map_err(|_| {
                BenchError::config(format!("{name} has a non-numeric entry {part:?}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if ratios.len() != expected {
        return Err(BenchError::config(format!(
            "{name} needs {expected} entries, got {}",
            ratios.len()
        )));
    }
    if ratios.iter().any(|ratio| !ratio.is_finite() || *ratio < 0.0) {
        return Err(BenchError::config(format!("{name} has a negative entry")));
    }
    if ratios.iter().sum::<f64>() <= 0.0 {
        return Err(BenchError::config(format!("{name} sums to zero")));
    }
    Ok(ratios)
}

fn env_optional(key: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{key}"))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn override_string(key: &str, slot: &mut String) {
    if let Some(value) = env_optional(key) {
        *slot = value;
    }
}

fn override_parsed<T>(key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(raw) = env_optional(key) {
        *slot = raw
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("invalid {ENV_PREFIX}{key}"))?;
    }
    Ok(())
}
