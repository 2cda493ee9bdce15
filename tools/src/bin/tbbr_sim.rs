// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs::File;
use std::io::BufWriter;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::CommandFactory;
use clap::Parser;
use log::info;
use log::warn;

use tbbr::qlog::events::EventImportance;
use tbbr::Config;
use tbbr::CongestionControlAlgorithm;
use tbbr_tools::sim::LinkConfig;
use tbbr_tools::sim::SimReport;
use tbbr_tools::sim::Simulator;
use tbbr_tools::Result;
use tbbr_tools::Summary;

#[derive(Parser, Debug, Clone)]
#[clap(name = "tbbr_sim")]
pub struct SimOpt {
    /// Bottleneck bandwidth in bytes per second.
    #[clap(long, default_value = "1250000", value_name = "BYTES")]
    pub bandwidth: f64,

    /// Round-trip propagation delay in milliseconds.
    #[clap(long, default_value = "50", value_name = "TIME")]
    pub rtt: u64,

    /// Bottleneck buffer in bytes.
    #[clap(long, default_value = "100000", value_name = "BYTES")]
    pub buffer: u64,

    /// Simulated time in seconds.
    #[clap(short, long, default_value = "20", value_name = "TIME")]
    pub duration: u64,

    /// Size of a full segment in bytes.
    #[clap(long, default_value = "1000", value_name = "BYTES")]
    pub segment_size: u64,

    /// Congestion control algorithm, support BBR/DUMMY.
    #[clap(long, default_value = "BBR", value_name = "STR")]
    pub cc: CongestionControlAlgorithm,

    /// Gain applied to the bandwidth-delay product to get the cwnd.
    #[clap(long, default_value = "2.0", value_name = "NUM")]
    pub cwnd_gain: f64,

    /// Maximum random delay added to each acknowledgement in milliseconds.
    #[clap(long, default_value = "0", value_name = "TIME")]
    pub jitter: u64,

    /// Seed of the jitter generator.
    #[clap(long, default_value = "0", value_name = "NUM")]
    pub seed: u64,

    /// Space segments by the pacing rate of the congestion controller.
    #[clap(long)]
    pub pacing: bool,

    /// Save qlog events to the file.
    #[clap(long, value_name = "FILE")]
    pub qlog: Option<String>,

    /// Qlog event level, support CORE/BASE/EXTRA.
    #[clap(long, default_value = "BASE", value_name = "STR")]
    pub qlog_level: EventImportance,

    /// Log level, support OFF/ERROR/WARN/INFO/DEBUG/TRACE.
    #[clap(long, default_value = "INFO", value_name = "STR")]
    pub log_level: log::LevelFilter,

    /// Log file path. If no file is specified, logs will be written to `stderr`.
    #[clap(long, value_name = "FILE")]
    pub log_file: Option<String>,
}

fn parse_option() -> std::result::Result<SimOpt, clap::error::Error> {
    let option = SimOpt::parse();

    if option.duration == 0 {
        return Err(SimOpt::command().error(
            ErrorKind::InvalidValue,
            "The simulated duration should be positive",
        ));
    }

    if option.rtt == 0 {
        return Err(SimOpt::command().error(ErrorKind::InvalidValue, "The rtt should be positive"));
    }

    Ok(option)
}

fn process_option(option: &SimOpt) -> Result<()> {
    env_logger::builder()
        .target(tbbr_tools::log_target(&option.log_file)?)
        .filter_level(option.log_level)
        .format_timestamp_millis()
        .init();
    Ok(())
}

fn config(option: &SimOpt) -> Config {
    let mut conf = Config::new();
    conf.set_congestion_control_algorithm(option.cc);
    conf.set_segment_size(option.segment_size);
    conf.set_cwnd_gain(option.cwnd_gain);
    conf
}

fn link_config(option: &SimOpt) -> LinkConfig {
    LinkConfig {
        bandwidth: option.bandwidth,
        rtt: Duration::from_millis(option.rtt),
        buffer: option.buffer,
        jitter: Duration::from_millis(option.jitter),
        duration: Duration::from_secs(option.duration),
        pacing: option.pacing,
        seed: option.seed,
    }
}

fn print_report(option: &SimOpt, report: &SimReport) -> Result<()> {
    println!();
    println!(
        "{:?} over {} bytes/s, rtt {} ms, buffer {} bytes: {:.3} Mbps ({:.1}% of the link)",
        option.cc,
        option.bandwidth,
        option.rtt,
        option.buffer,
        report.throughput_mbps(),
        report.throughput_mbps() * 1_000_000.0 / 8.0 / option.bandwidth * 100.0
    );
    println!(
        "segments: sent {}, acked {}, dropped {}, lost {}",
        report.segments_sent,
        report.segments_acked,
        report.segments_dropped,
        report.segments_lost
    );

    match Summary::new(&report.rtt_samples) {
        Some(s) => {
            println!("rtt(ms):");
            println!(
                "\tmin: {:.2}, max: {:.2}, mean: {:.2}",
                s.min, s.max, s.mean
            );
            println!("\tmedian: {:.2}, p90: {:.2}", s.median, s.p90);
        }
        None => println!("rtt(ms): no samples"),
    }

    println!(
        "final state: phase {}, cwnd {}, pacing rate {}",
        report.final_phase.unwrap_or("-"),
        report.final_cwnd,
        report
            .final_pacing_rate
            .map_or("-".to_string(), |r| format!("{:.0}", r))
    );
    for (time, phase) in report.phase_history.iter() {
        println!("\t{:>10.3}s {}", time.as_secs_f64(), phase);
    }
    println!("stats: {}", serde_json::to_string(&report.cc_stats)?);
    println!();
    Ok(())
}

fn main() -> Result<()> {
    // Parse simulator option.
    let option = match parse_option() {
        Ok(option) => option,
        Err(e) => e.exit(),
    };

    // Process simulator option.
    process_option(&option)?;

    let conf = config(&option);
    let mut sim = Simulator::new(link_config(&option), &conf)?;
    if let Some(path) = &option.qlog {
        let file = match File::create(path) {
            Ok(file) => file,
            Err(e) => {
                warn!("create qlog file {} error: {:?}", path, e);
                return Err(Box::new(e));
            }
        };
        sim.set_qlog(
            Box::new(BufWriter::new(file)),
            "tbbr_sim".to_string(),
            option.qlog_level,
            &conf,
        )?;
        info!("qlog events are written to {}", path);
    }

    let report = sim.run()?;
    print_report(&option, &report)
}
