use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "tsdb-bench",
    version,
    about = "Workload generator and latency harness for time-series databases"
)]
pub struct Args {
    /// TOML configuration file; TSDB_BENCH_* variables override it.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub backend: Option<String>,
    #[arg(long)]
    pub clients: Option<usize>,
    #[arg(long)]
    pub devices: Option<usize>,
    #[arg(long)]
    pub loop_count: Option<u64>,
    #[arg(long)]
    pub operation_proportion: Option<String>,
    /// Mirror accepted batches to this backend.
    #[arg(long)]
    pub secondary_backend: Option<String>,
    #[arg(long, default_value_t = false)]
    pub csv: bool,
    #[arg(long)]
    pub csv_dir: Option<PathBuf>,
    #[arg(long)]
    pub json_output: Option<PathBuf>,
}

impl Args {
    /// Command-line flags win over file and environment settings.
    pub fn apply(&self, config: &mut Config) {
        if let Some(backend) = &self.backend {
            config.backend = backend.clone();
        }
        if let Some(clients) = self.clients {
            config.client_number = clients;
        }
        if let Some(devices) = self.devices {
            config.device_number = devices;
        }
        if let Some(loop_count) = self.loop_count {
            config.loop_count = loop_count;
        }
        if let Some(proportion) = &self.operation_proportion {
            config.operation_proportion = proportion.clone();
        }
        if let Some(secondary) = &self.secondary_backend {
            config.secondary_backend = secondary.clone();
            config.double_insert = true;
        }
        if self.csv {
            config.csv_output = true;
        }
        if let Some(dir) = &self.csv_dir {
            config.csv_dir = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_loaded_settings() {
        let args = Args::parse_from([
            "tsdb-bench",
            "--backend",
            "null",
            "--clients",
            "4",
            "--secondary-backend",
            "memory",
            "--csv",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.backend, "null");
        assert_eq!(config.client_number, 4);
        assert!(config.double_insert);
        assert!(config.csv_output);
        assert_eq!(config.loop_count, Config::default().loop_count);
    }
}
