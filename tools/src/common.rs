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

use std::fs::OpenOptions;

use statrs::statistics::Data;
use statrs::statistics::Distribution;
use statrs::statistics::Max;
use statrs::statistics::Min;
use statrs::statistics::OrderStatistics;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Return the log target. If no file is specified, logs will be written to
/// `stderr`.
pub fn log_target(log_file: &Option<String>) -> Result<env_logger::Target> {
    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        return Ok(env_logger::Target::Pipe(Box::new(file)));
    }
    Ok(env_logger::Target::Stderr)
}

/// Summary statistics of a series of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
}

impl Summary {
    /// Summarize the samples, or return None if there is none.
    pub fn new(samples: &[f64]) -> Option<Summary> {
        if samples.is_empty() {
            return None;
        }

        let mut s = Data::new(samples.to_vec());
        Some(Summary {
            count: samples.len(),
            min: s.min(),
            max: s.max(),
            mean: s.mean().unwrap_or(0.0),
            median: s.median(),
            p90: s.percentile(90),
        })
    }
}

/// Relative improvement of `value` over `baseline` in percent.
pub fn improvement(value: f64, baseline: f64) -> Option<f64> {
    if baseline == 0.0 {
        return None;
    }
    Some((value - baseline) / baseline * 100.0)
}


pub mod sim;
pub mod timer_queue;
pub mod trace;
