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

//! Throughput and delay analysis of ns-2 packet traces.
//!
//! A trace line looks like:
//!
//! ```text
//! r 1.234 0 1 tcp 1040 ------- 1 0.0 1.0 17 42
//! ```
//!
//! with the event type, time, link source and destination nodes, packet
//! type, size, flags, flow id, source and destination addresses, sequence
//! number and packet id.

use std::collections::HashMap;
use std::io::BufRead;

use log::*;

use crate::Result;

/// Width of a throughput window in seconds.
pub const THROUGHPUT_WINDOW: f64 = 0.1;

/// Lines with no more fields than this are ignored.
const MIN_FIELDS: usize = 10;

/// A packet event of an ns-2 trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    /// Event type: `+` enqueue, `-` dequeue, `r` receive, `d` drop.
    pub event: String,

    /// Event time in seconds.
    pub time: f64,

    /// Link source node.
    pub src_node: u32,

    /// Link destination node.
    pub dst_node: u32,

    /// Packet size in bytes.
    pub size: u64,

    /// Sequence number.
    pub seq: String,
}

impl TraceRecord {
    /// Parse a trace line. Return None for short or malformed lines.
    pub fn parse(line: &str) -> Option<TraceRecord> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() <= MIN_FIELDS {
            return None;
        }

        Some(TraceRecord {
            event: fields[0].to_string(),
            time: fields[1].parse().ok()?,
            src_node: fields[2].parse().ok()?,
            dst_node: fields[3].parse().ok()?,
            size: fields[5].parse().ok()?,
            seq: fields[10].to_string(),
        })
    }
}

/// Streaming analyzer of a trace.
#[derive(Debug)]
pub struct TraceAnalyzer {
    /// Receiving node of the measured flow.
    dst_node: u32,

    /// Sending node of the measured flow.
    src_node: u32,

    /// Start of the current throughput window.
    window_start: f64,

    /// Bytes received in the current window.
    window_bytes: u64,

    /// Enqueue time of packets not yet received, by sequence number.
    send_times: HashMap<String, f64>,

    /// Number of lines skipped.
    skipped: u64,

    report: TraceReport,
}

/// Time series extracted from a trace.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TraceReport {
    /// Throughput windows as (window start in seconds, Mbps).
    pub throughput: Vec<(f64, f64)>,

    /// One-way delays as (receive time in seconds, delay in seconds).
    pub delay: Vec<(f64, f64)>,

    /// Number of lines skipped.
    pub skipped_lines: u64,
}

impl TraceAnalyzer {
    pub fn new(src_node: u32, dst_node: u32) -> Self {
        Self {
            dst_node,
            src_node,
            window_start: 0.0,
            window_bytes: 0,
            send_times: HashMap::new(),
            skipped: 0,
            report: TraceReport::default(),
        }
    }

    /// Process a raw trace line.
    pub fn process_line(&mut self, line: &str) {
        match TraceRecord::parse(line) {
            Some(record) => self.process(&record),
            None => self.skipped += 1,
        }
    }

    /// Process a trace record.
    pub fn process(&mut self, record: &TraceRecord) {
        if record.event == "r" && record.dst_node == self.dst_node {
            self.on_receive(record);
        }

        if record.event == "+" && record.src_node == self.src_node {
            self.send_times.insert(record.seq.clone(), record.time);
        }
    }

    fn on_receive(&mut self, record: &TraceRecord) {
        if record.time > self.window_start + THROUGHPUT_WINDOW {
            // The first window is a warm-up window and is not reported.
            if self.window_start > 0.0 {
                self.push_window(self.window_start, self.window_bytes);
            }

            self.window_bytes = record.size;
            self.window_start += THROUGHPUT_WINDOW;

            // Windows without any received packet.
            while self.window_start + THROUGHPUT_WINDOW < record.time {
                self.push_window(self.window_start, 0);
                self.window_start += THROUGHPUT_WINDOW;
            }
        } else {
            self.window_bytes += record.size;
        }

        if let Some(sent) = self.send_times.remove(&record.seq) {
            self.report.delay.push((record.time, record.time - sent));
        }
    }

    fn push_window(&mut self, start: f64, bytes: u64) {
        let mbps = bytes as f64 * 8.0 / THROUGHPUT_WINDOW / 1_000_000.0;
        self.report.throughput.push((start, mbps));
    }

    /// Close the last partial window and return the series.
    pub fn finish(mut self) -> TraceReport {
        if self.window_bytes > 0 {
            self.push_window(self.window_start, self.window_bytes);
        }
        self.report.skipped_lines = self.skipped;

        debug!(
            "trace analyzed: {} throughput windows, {} delay samples, {} lines skipped",
            self.report.throughput.len(),
            self.report.delay.len(),
            self.report.skipped_lines
        );
        self.report
    }
}

/// Analyze a whole trace.
pub fn analyze<R: BufRead>(reader: R, src_node: u32, dst_node: u32) -> Result<TraceReport> {
    let mut analyzer = TraceAnalyzer::new(src_node, dst_node);
    for line in reader.lines() {
        analyzer.process_line(&line?);
    }
    Ok(analyzer.finish())
}

impl TraceReport {
    /// Throughput values in Mbps.
    pub fn throughput_values(&self) -> Vec<f64> {
        self.throughput.iter().map(|(_, v)| *v).collect()
    }

    /// Delay values in milliseconds.
    pub fn delay_values(&self) -> Vec<f64> {
        self.delay.iter().map(|(_, v)| *v * 1000.0).collect()
    }

    /// Write a two-column CSV series.
    pub fn write_csv<W: std::io::Write>(
        mut writer: W,
        header: &str,
        series: &[(f64, f64)],
    ) -> Result<()> {
        writeln!(writer, "{}", header)?;
        for (t, v) in series {
            writeln!(writer, "{:.6},{:.6}", t, v)?;
        }
        writer.flush()?;
        Ok(())
    }
}
