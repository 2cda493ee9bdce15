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

use std::fs::create_dir_all;
use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::path::Path;

use clap::error::ErrorKind;
use clap::CommandFactory;
use clap::Parser;
use log::debug;
use log::warn;

use tbbr_tools::trace;
use tbbr_tools::trace::TraceReport;
use tbbr_tools::Result;
use tbbr_tools::Summary;

#[derive(Parser, Debug, Clone)]
#[clap(name = "tbbr_trace")]
pub struct TraceOpt {
    /// ns-2 trace files. With two files, the first one is compared against
    /// the second one.
    #[clap(value_name = "FILE")]
    pub files: Vec<String>,

    /// Node enqueuing the packets of the flow.
    #[clap(long, default_value = "0", value_name = "NUM")]
    pub src_node: u32,

    /// Node receiving the packets of the flow.
    #[clap(long, default_value = "1", value_name = "NUM")]
    pub dst_node: u32,

    /// Save throughput and delay series of each trace as CSV files in the
    /// directory.
    #[clap(long, value_name = "DIR")]
    pub csv_dir: Option<String>,

    /// Log level, support OFF/ERROR/WARN/INFO/DEBUG/TRACE.
    #[clap(long, default_value = "INFO", value_name = "STR")]
    pub log_level: log::LevelFilter,

    /// Log file path. If no file is specified, logs will be written to `stderr`.
    #[clap(long, value_name = "FILE")]
    pub log_file: Option<String>,
}

fn parse_option() -> std::result::Result<TraceOpt, clap::error::Error> {
    let option = TraceOpt::parse();

    if option.files.is_empty() || option.files.len() > 2 {
        return Err(TraceOpt::command().error(
            ErrorKind::WrongNumberOfValues,
            "Specify one trace file, or two trace files to compare",
        ));
    }

    Ok(option)
}

fn process_option(option: &TraceOpt) -> Result<()> {
    env_logger::builder()
        .target(tbbr_tools::log_target(&option.log_file)?)
        .filter_level(option.log_level)
        .format_timestamp_millis()
        .init();

    if let Some(csv_dir) = &option.csv_dir {
        if let Err(e) = create_dir_all(csv_dir) {
            warn!("create csv directory {} error: {:?}", csv_dir, e);
            return Err(Box::new(e));
        }
    }
    Ok(())
}

fn analyze_file(option: &TraceOpt, path: &str) -> Result<TraceReport> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!("open trace file {} error: {:?}", path, e);
            return Err(Box::new(e));
        }
    };
    let report = trace::analyze(BufReader::new(file), option.src_node, option.dst_node)?;
    debug!("{}: {} lines skipped", path, report.skipped_lines);

    if let Some(csv_dir) = &option.csv_dir {
        let stem = Path::new(path)
            .file_stem()
            .map_or("trace".into(), |s| s.to_string_lossy());
        let dir = Path::new(csv_dir);

        let out = File::create(dir.join(format!("{}_throughput.csv", stem)))?;
        TraceReport::write_csv(BufWriter::new(out), "time,mbps", &report.throughput)?;
        let out = File::create(dir.join(format!("{}_delay.csv", stem)))?;
        TraceReport::write_csv(BufWriter::new(out), "time,delay", &report.delay)?;
    }

    Ok(report)
}

fn print_report(path: &str, report: &TraceReport) {
    println!();
    println!("{}:", path);
    match Summary::new(&report.throughput_values()) {
        Some(s) => println!(
            "\tthroughput(Mbps): mean: {:.3}, median: {:.3}, max: {:.3}",
            s.mean, s.median, s.max
        ),
        None => println!("\tthroughput(Mbps): no samples"),
    }
    match Summary::new(&report.delay_values()) {
        Some(s) => println!(
            "\tdelay(ms): min: {:.2}, mean: {:.2}, median: {:.2}, p90: {:.2}, max: {:.2}",
            s.min, s.mean, s.median, s.p90, s.max
        ),
        None => println!("\tdelay(ms): no samples"),
    }
}

fn mean_throughput(report: &TraceReport) -> f64 {
    Summary::new(&report.throughput_values()).map_or(0.0, |s| s.mean)
}

fn main() -> Result<()> {
    // Parse analyzer option.
    let option = match parse_option() {
        Ok(option) => option,
        Err(e) => e.exit(),
    };

    // Process analyzer option.
    process_option(&option)?;

    let mut reports = Vec::with_capacity(option.files.len());
    for path in option.files.iter() {
        let report = analyze_file(&option, path)?;
        print_report(path, &report);
        reports.push(report);
    }

    if let [first, second] = reports.as_slice() {
        match tbbr_tools::improvement(mean_throughput(first), mean_throughput(second)) {
            Some(v) => println!(
                "\nmean throughput of {} over {}: {:+.2}%",
                option.files[0], option.files[1], v
            ),
            None => println!("\nno throughput in {} to compare with", option.files[1]),
        }
    }
    println!();
    Ok(())
}
