use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use log::warn;

use wnsim_net::scenario::{execute, DataRate, Direction, RateManagerConfig, RunReport, ScenarioConfig};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
/// Runs the multi-AP wifi scenario and prints the per-flow statistics
struct Args {
    /// Path to YAML file with scenario configuration (defaults are used if absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Random seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of access points
    #[arg(long)]
    aps: Option<u32>,

    /// Number of stations per access point
    #[arg(long)]
    stations: Option<u32>,

    /// Traffic duration in seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// UDP payload size in bytes
    #[arg(long)]
    payload_size: Option<u32>,

    /// Data rate of on/off sources, e.g. 10Mbps
    #[arg(long)]
    data_rate: Option<DataRate>,

    /// Traffic direction: uplink, downlink or both
    #[arg(long)]
    direction: Option<Direction>,

    /// Rate adaptation policy: onoe, arf, aarf, ideal or constant:<mode>
    #[arg(long)]
    rate_manager: Option<RateManagerConfig>,

    /// Enable RTS/CTS
    #[arg(long)]
    rts_cts: bool,

    /// Record packet events
    #[arg(long)]
    packet_trace: bool,

    /// Record node positions
    #[arg(long)]
    mobility_trace: bool,

    /// Directory for trace files (traces are kept in memory otherwise)
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Path to produced JSON file with the run report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to produced CSV file with the throughput series
    #[arg(long)]
    throughput_csv: Option<PathBuf>,

    /// Exit with error if the throughput is below the expected minimum
    #[arg(long)]
    strict: bool,
}

impl Args {
    fn scenario_config(&self) -> Result<ScenarioConfig> {
        let mut config = match &self.config {
            Some(path) => ScenarioConfig::from_file(path)
                .with_context(|| format!("can't load config {}", path.display()))?,
            None => ScenarioConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(aps) = self.aps {
            config.aps = aps;
        }
        if let Some(stations) = self.stations {
            config.stations_per_ap = stations;
        }
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if let Some(payload_size) = self.payload_size {
            config.payload_size = payload_size;
        }
        if let Some(data_rate) = self.data_rate {
            config.data_rate = data_rate;
        }
        if let Some(direction) = self.direction {
            config.direction = direction;
        }
        if let Some(rate_manager) = &self.rate_manager {
            config.rate_manager = rate_manager.clone();
        }
        if self.rts_cts {
            config.rts_cts = true;
        }
        if self.packet_trace {
            config.packet_trace = true;
        }
        if self.mobility_trace {
            config.mobility_trace = true;
        }
        if let Some(dir) = &self.trace_dir {
            config.trace_dir = Some(dir.clone());
        }
        Ok(config)
    }
}

fn write_throughput(path: &Path, report: &RunReport) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for sample in report.throughput.iter() {
        writer.serialize(sample)?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();
    let config = args.scenario_config()?;
    let report = execute(config)?;
    println!("{}", report);

    if let Some(path) = &args.output {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("can't write report {}", path.display()))?;
    }
    if let Some(path) = &args.throughput_csv {
        write_throughput(path, &report).with_context(|| format!("can't write {}", path.display()))?;
    }
    if !report.validation.passed {
        warn!("throughput check failed");
        if args.strict {
            anyhow::bail!(
                "average throughput {:.3} Mbit/s is below the expected minimum",
                report.average_throughput_mbps
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> ScenarioConfig {
        let args = Args::parse_from(std::iter::once("wnsim-run").chain(args.iter().copied()));
        args.scenario_config().unwrap()
    }

    #[test]
    fn test_defaults() {
        assert_eq!(config(&[]), ScenarioConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            "--rate-manager",
            "onoe",
            "--rts-cts",
            "--packet-trace",
            "--stations",
            "3",
            "--direction",
            "downlink",
        ]);
        assert_eq!(config.rate_manager, RateManagerConfig::Onoe);
        assert!(config.rts_cts);
        assert!(config.packet_trace);
        assert!(!config.mobility_trace);
        assert_eq!(config.stations_per_ap, 3);
        assert_eq!(config.direction, Direction::Downlink);
    }

    #[test]
    fn test_trace_dir_alone_enables_no_trace() {
        let config = config(&["--trace-dir", "traces", "--mobility-trace"]);
        assert_eq!(config.trace_dir, Some(PathBuf::from("traces")));
        assert!(config.mobility_trace);
        assert!(!config.packet_trace);
    }

    #[test]
    fn test_unknown_rate_manager() {
        let result = Args::try_parse_from(["wnsim-run", "--rate-manager", "minstrel"]);
        assert!(result.is_err());
    }
}
