use crate::error::BenchError;
use crate::generator::{DataPointGenerator, Value};
use crate::schema::{DeviceSchema, DeviceStream};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub timestamp: i64,
    /// Grid position within the device stream, counted before insert-rate sampling.
    pub position: u64,
    pub values: Vec<Value>,
}

/// Records of one device inside a batch.
#[derive(Debug, Clone)]
pub struct BatchSegment {
    pub device: Arc<DeviceSchema>,
    /// Stream position of the first generated record, before sampling.
    pub first_position: u64,
    pub records: Vec<Record>,
}

impl BatchSegment {
    pub fn point_count(&self) -> u64 {
        (self.records.len() * self.device.sensor_count()) as u64
    }
}

/// One transmission unit. Holds a single segment unless multi-device batching is on.
#[derive(Debug, Clone)]
pub struct Batch {
    pub segments: Vec<BatchSegment>,
}

impl Batch {
    pub fn record_count(&self) -> usize {
        self.segments.iter().map(|s| s.records.len()).sum()
    }

    pub fn point_count(&self) -> u64 {
        self.segments.iter().map(BatchSegment::point_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.records.is_empty())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub start_timestamp: i64,
    pub point_step: i64,
    pub batch_size: usize,
    pub multi_device: bool,
    pub insert_rate: f64,
    pub seed: u64,
}

/// Turns a client's record steps into batches over its device streams.
#[derive(Debug)]
pub struct BatchBuilder {
    streams: Vec<DeviceStream>,
    cursors: Vec<u64>,
    next_stream: usize,
    generator: Arc<DataPointGenerator>,
    settings: BatchSettings,
    rng: StdRng,
}

impl BatchBuilder {
    pub fn new(
        streams: Vec<DeviceStream>,
        generator: Arc<DataPointGenerator>,
        settings: BatchSettings,
    ) -> Result<Self, BenchError> {
        if streams.is_empty() {
            return Err(BenchError::config("client has no devices to write"));
        }
        if settings.batch_size == 0 {
            return Err(BenchError::config("batch size must be positive"));
        }
        if settings.multi_device && settings.batch_size % streams.len() != 0 {
            return Err(BenchError::config(format!(
                "batch size {} is not divisible by the {} devices of a multi-device batch",
                settings.batch_size,
                streams.len()
            )));
        }
        if !(settings.insert_rate > 0.0 && settings.insert_rate <= 1.0) {
            return Err(BenchError::config(format!(
                "insert rate {} outside (0, 1]",
                settings.insert_rate
            )));
        }
        Ok(Self {
            cursors: vec![0; streams.len()],
            streams,
            next_stream: 0,
            generator,
            rng: StdRng::seed_from_u64(settings.seed),
            settings,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.settings.batch_size
    }

    pub fn devices(&self) -> Vec<Arc<DeviceSchema>> {
        self.streams.iter().map(|s| s.device.clone()).collect()
    }

    fn timestamp(&self, stream: usize, position: u64) -> i64 {
        let stream = &self.streams[stream];
        let slot = position * stream.lanes + stream.lane;
        self.settings.start_timestamp + slot as i64 * self.settings.point_step
    }

    fn sampled(&mut self) -> bool {
        self.settings.insert_rate >= 1.0 || self.rng.gen_bool(self.settings.insert_rate)
    }

    fn take_segment(&mut self, stream: usize, records: usize, sample_records: bool) -> BatchSegment {
        let first_position = self.cursors[stream];
        self.cursors[stream] += records as u64;
        let mut out = Vec::with_capacity(records);
        for offset in 0..records as u64 {
            if sample_records && !self.sampled() {
                continue;
            }
            let position = first_position + offset;
            let timestamp = self.timestamp(stream, position);
            out.push(Record {
                timestamp,
                position,
                values: self.generator.row(timestamp),
            });
        }
        BatchSegment {
            device: self.streams[stream].device.clone(),
            first_position,
            records: out,
        }
    }

    /// Builds the next batch from `records` grid steps. Returns `None` when
    /// sampling removed everything; the grid positions are consumed either way.
    pub fn build(&mut self, records: usize) -> Option<Batch> {
        if records == 0 {
            return None;
        }
        let segments = if self.settings.multi_device {
            let devices = self.streams.len();
            let mut segments = Vec::with_capacity(devices);
            for stream in 0..devices {
                let share = records / devices + usize::from(stream < records % devices);
                if share == 0 {
                    continue;
                }
                let include = self.sampled();
                let segment = self.take_segment(stream, share, false);
                if include {
                    segments.push(segment);
                }
            }
            segments
        } else {
            let stream = self.next_stream;
            self.next_stream = (self.next_stream + 1) % self.streams.len();
            let segment = self.take_segment(stream, records, true);
            if segment.records.is_empty() {
                Vec::new()
            } else {
                vec![segment]
            }
        };

        let batch = Batch { segments };
        (!batch.is_empty()).then_some(batch)
    }
}
