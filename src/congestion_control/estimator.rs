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

//! Bandwidth and round-trip time estimator for a network path.
//!
//! The estimator keeps the all-time maximum delivery rate and the all-time
//! minimum round-trip time seen on the path. Unlike the windowed filters of
//! the full BBR algorithm, samples never expire: the maximum only grows and
//! the minimum only shrinks for the lifetime of the estimator.

use std::time::Duration;

use crate::Error;
use crate::Result;

/// Path model built from delivery samples.
#[derive(Debug, Clone)]
pub struct PathEstimator {
    /// Maximum observed delivery rate in bytes per second.
    max_bandwidth: f64,

    /// Minimum observed round-trip time. `None` until the first sample
    /// arrives.
    min_rtt: Option<Duration>,
}

impl PathEstimator {
    pub fn new() -> Self {
        Self {
            max_bandwidth: 0.0,
            min_rtt: None,
        }
    }

    /// Check that a delivery sample can be used to update the model.
    pub fn validate(delivered_bytes: u64, sample_rtt: Duration) -> Result<()> {
        if delivered_bytes == 0 {
            return Err(Error::InvalidSample("zero delivered bytes".into()));
        }
        if sample_rtt.is_zero() {
            return Err(Error::InvalidSample("zero rtt".into()));
        }
        Ok(())
    }

    /// Update the model with a delivery sample.
    ///
    /// An invalid sample leaves the model untouched.
    pub fn update(&mut self, delivered_bytes: u64, sample_rtt: Duration) -> Result<()> {
        Self::validate(delivered_bytes, sample_rtt)?;

        let bandwidth = delivered_bytes as f64 / sample_rtt.as_secs_f64();
        if bandwidth > self.max_bandwidth {
            self.max_bandwidth = bandwidth;
        }
        self.min_rtt = Some(self.min_rtt.map_or(sample_rtt, |rtt| rtt.min(sample_rtt)));

        Ok(())
    }

    /// Maximum observed delivery rate in bytes per second.
    pub fn max_bandwidth(&self) -> f64 {
        self.max_bandwidth
    }

    /// Minimum observed round-trip time, if any sample was accepted.
    pub fn min_rtt(&self) -> Option<Duration> {
        self.min_rtt
    }

    /// Estimated bandwidth-delay product in bytes, before any gain.
    pub fn bdp(&self) -> f64 {
        match self.min_rtt() {
            Some(rtt) => self.max_bandwidth * rtt.as_secs_f64(),
            None => 0.0,
        }
    }
}

impl Default for PathEstimator {
    fn default() -> Self {
        Self::new()
    }
}
