use crate::config::{Config, GroupStrategy};
use crate::error::BenchError;
use crate::workload::mix_seed;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

const DATA_TYPE_STREAM: u64 = 0x7479_7065;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float,
    Double,
    Text,
}

impl DataType {
    /// Order used by `insert_datatype_proportion`.
    pub const ALL: [DataType; 6] = [
        DataType::Boolean,
        DataType::Int32,
        DataType::Int64,
        DataType::Float,
        DataType::Double,
        DataType::Text,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Text => "TEXT",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one device. Built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSchema {
    pub group_id: usize,
    pub device_id: usize,
    pub sensors: Vec<String>,
    pub data_types: Vec<DataType>,
    pub aligned: bool,
}

impl DeviceSchema {
    pub fn device_name(&self) -> String {
        format!("d_{}", self.device_id)
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }
}

pub fn sensor_name(index: usize) -> String {
    format!("s_{index}")
}

/// Resolves one data type per sensor index from the configured proportions.
pub fn assign_data_types(config: &Config) -> Result<Vec<DataType>, BenchError> {
    let ratios = config.data_type_ratios()?;
    let total: f64 = ratios.iter().sum();
    let mut bounds = Vec::with_capacity(ratios.len());
    let mut acc = 0.0;
    for ratio in &ratios {
        acc += ratio / total;
        bounds.push(acc);
    }

    let mut rng = StdRng::seed_from_u64(mix_seed(config.data_seed, DATA_TYPE_STREAM));
    let fallback = ratios
        .iter()
        .rposition(|ratio| *ratio > 0.0)
        .unwrap_or(DataType::ALL.len() - 1);
    Ok((0..config.sensor_number)
        .map(|_| {
            let draw: f64 = rng.gen();
            let slot = bounds
                .iter()
                .zip(&ratios)
                .position(|(bound, ratio)| *ratio > 0.0 && draw < *bound)
                .unwrap_or(fallback);
            DataType::ALL[slot]
        })
        .collect())
}

fn group_for(strategy: GroupStrategy, device_id: usize, offset: usize, devices: usize, groups: usize) -> usize {
    match strategy {
        GroupStrategy::Mod => device_id % groups,
        GroupStrategy::Div => (device_id - offset) * groups / devices,
        GroupStrategy::Hash => {
            (xxh3_64(format!("d_{device_id}").as_bytes()) % groups as u64) as usize
        }
    }
}

/// Builds every device of this benchmark instance.
pub fn build_schemas(config: &Config, data_types: &[DataType]) -> Vec<Arc<DeviceSchema>> {
    let first = config.first_device_index();
    let sensors: Vec<String> = (0..config.sensor_number).map(sensor_name).collect();
    (first..first + config.device_number)
        .map(|device_id| {
            Arc::new(DeviceSchema {
                group_id: group_for(
                    config.sg_strategy,
                    device_id,
                    first,
                    config.device_number,
                    config.group_number,
                ),
                device_id,
                sensors: sensors.clone(),
                data_types: data_types.to_vec(),
                aligned: config.sensor_ts_alignment,
            })
        })
        .collect()
}

/// A device as seen by one client. When several clients share a device they
/// stripe its timestamp grid: this writer owns positions `lane, lane + lanes, ...`.
#[derive(Debug, Clone)]
pub struct DeviceStream {
    pub device: Arc<DeviceSchema>,
    pub lane: u64,
    pub lanes: u64,
}

/// Devices written by `client`.
pub fn client_streams(
    schemas: &[Arc<DeviceSchema>],
    clients: usize,
    client_bind: bool,
    client: usize,
) -> Vec<DeviceStream> {
    let devices = schemas.len();
    let single = |device: &Arc<DeviceSchema>| DeviceStream {
        device: device.clone(),
        lane: 0,
        lanes: 1,
    };

    if client_bind {
        let start = devices * client / clients;
        let end = devices * (client + 1) / clients;
        return schemas[start..end].iter().map(single).collect();
    }

    if clients < devices {
        return schemas
            .iter()
            .enumerate()
            .filter(|(index, _)| index % clients == client)
            .map(|(_, device)| single(device))
            .collect();
    }

    let index = client % devices;
    let lanes = clients / devices + usize::from(index < clients % devices);
    vec![DeviceStream {
        device: schemas[index].clone(),
        lane: (client / devices) as u64,
        lanes: lanes as u64,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn schemas(devices: usize) -> Vec<Arc<DeviceSchema>> {
        let config = Config {
            device_number: devices,
            ..Config::default()
        };
        let types = assign_data_types(&config).unwrap();
        build_schemas(&config, &types)
    }

    #[test]
    fn bound_clients_partition_devices() {
        let schemas = schemas(7);
        let mut seen = Vec::new();
        for client in 0..3 {
            let streams = client_streams(&schemas, 3, true, client);
            assert!(!streams.is_empty());
            seen.extend(streams.iter().map(|s| s.device.device_id));
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn shared_devices_stripe_lanes() {
        let schemas = schemas(2);
        let mut lanes: HashMap<usize, Vec<(u64, u64)>> = HashMap::new();
        for client in 0..5 {
            let streams = client_streams(&schemas, 5, false, client);
            assert_eq!(streams.len(), 1);
            let stream = &streams[0];
            lanes
                .entry(stream.device.device_id)
                .or_default()
                .push((stream.lane, stream.lanes));
        }
        let mut device0 = lanes.remove(&0).unwrap();
        device0.sort_unstable();
        assert_eq!(device0, vec![(0, 3), (1, 3), (2, 3)]);
        let mut device1 = lanes.remove(&1).unwrap();
        device1.sort_unstable();
        assert_eq!(device1, vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn data_types_follow_single_nonzero_ratio() {
        let config = Config {
            insert_datatype_proportion: "0:0:0:0:1:0".to_string(),
            sensor_number: 20,
            ..Config::default()
        };
        let types = assign_data_types(&config).unwrap();
        assert_eq!(types.len(), 20);
        assert!(types.iter().all(|t| *t == DataType::Double));
    }

    #[test]
    fn group_strategies_stay_in_range() {
        for strategy in [GroupStrategy::Hash, GroupStrategy::Mod, GroupStrategy::Div] {
            let config = Config {
                device_number: 10,
                group_number: 3,
                sg_strategy: strategy,
                ..Config::default()
            };
            let types = assign_data_types(&config).unwrap();
            let built = build_schemas(&config, &types);
            assert!(built.iter().all(|d| d.group_id < 3));
        }
        let config = Config {
            device_number: 4,
            group_number: 2,
            sg_strategy: GroupStrategy::Div,
            ..Config::default()
        };
        let built = build_schemas(&config, &assign_data_types(&config).unwrap());
        let groups: Vec<_> = built.iter().map(|d| d.group_id).collect();
        assert_eq!(groups, vec![0, 0, 1, 1]);
    }
}
