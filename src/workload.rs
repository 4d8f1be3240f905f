//! Deterministic workload synthesis shared by every client.

pub mod batch;
pub mod operation;
pub mod out_of_order;
pub mod query;
pub mod sequencer;

pub use batch::{Batch, BatchBuilder, BatchSegment, Record};
pub use operation::OperationKind;
pub use out_of_order::OutOfOrderScheduler;
pub use query::{Query, QueryGenerator};
pub use sequencer::OperationSequencer;

use crate::config::Config;
use crate::error::BenchError;
use crate::function::{assign_functions, FunctionCatalog};
use crate::generator::DataPointGenerator;
use crate::schema::{assign_data_types, build_schemas, client_streams, DeviceSchema};
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Derives an independent generator seed from a base seed and a stream index.
pub fn mix_seed(base: u64, index: u64) -> u64 {
    xxh3_64_with_seed(&index.to_le_bytes(), base)
}

/// Immutable state built once before any client starts.
#[derive(Debug)]
pub struct Workload {
    pub config: Arc<Config>,
    pub schemas: Vec<Arc<DeviceSchema>>,
    pub generator: Arc<DataPointGenerator>,
    pub operation_ratios: Vec<f64>,
    pub start_timestamp: i64,
}

impl Workload {
    pub fn prepare(config: Arc<Config>) -> Result<Self, BenchError> {
        let catalog = match &config.function_catalog {
            Some(path) => FunctionCatalog::from_path(path)?,
            None => FunctionCatalog::builtin()?,
        };
        let functions = assign_functions(
            config.function_ratios(),
            config.sensor_number,
            config.data_seed,
            &catalog,
        )?;
        let data_types = assign_data_types(&config)?;
        let schemas = build_schemas(&config, &data_types);
        let generator = Arc::new(DataPointGenerator::new(
            functions,
            data_types,
            config.string_length,
        ));
        let operation_ratios = config.operation_ratios()?;
        let start_timestamp = config.start_timestamp()?;

        tracing::info!(
            devices = schemas.len(),
            sensors = config.sensor_number,
            clients = config.client_number,
            "workload prepared"
        );
        Ok(Self {
            config,
            schemas,
            generator,
            operation_ratios,
            start_timestamp,
        })
    }

    /// Batch builder over the devices written by `client`.
    pub fn batch_builder(&self, client: usize) -> Result<BatchBuilder, BenchError> {
        let streams = client_streams(
            &self.schemas,
            self.config.client_number,
            self.config.client_bind,
            client,
        );
        BatchBuilder::new(
            streams,
            self.generator.clone(),
            batch::BatchSettings {
                start_timestamp: self.start_timestamp,
                point_step: self.config.scaled_point_step(),
                batch_size: self.config.batch_size_per_write,
                multi_device: self.config.mul_dev_batch,
                insert_rate: self.config.real_insert_rate,
                seed: mix_seed(self.config.data_seed, client as u64),
            },
        )
    }

    pub fn sequencer(&self, client: usize) -> Result<OperationSequencer, BenchError> {
        OperationSequencer::new(
            self.config.loop_count,
            &self.operation_ratios,
            mix_seed(self.config.query_seed, client as u64),
        )
    }

    pub fn out_of_order(&self, client: usize) -> Option<OutOfOrderScheduler> {
        self.config.out_of_order.then(|| {
            OutOfOrderScheduler::new(
                self.config.out_of_order_mode,
                self.config.lambda,
                self.config.max_k,
                self.config.out_of_order_ratio,
                mix_seed(self.config.data_seed, client as u64),
            )
        })
    }

    pub fn query_generator(&self, client: usize) -> QueryGenerator {
        QueryGenerator::new(
            &self.config,
            self.schemas.clone(),
            self.start_timestamp,
            mix_seed(self.config.query_seed, client as u64),
        )
    }
}
