// Copyright (c) 2024 The TQUIC Authors.
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

#![allow(unused_variables)]

use std::time::Duration;

use super::estimator::PathEstimator;
use super::CongestionController;
use super::CongestionStats;
use crate::Result;

/// Dummy is a simple congestion controller with a static congestion window.
/// It is intended to be used for testing and experiments.
#[derive(Debug)]
pub struct Dummy {
    /// Congestion window in bytes.
    cwnd: u64,

    /// Congestion statistics.
    stats: CongestionStats,
}

impl Dummy {
    pub fn new(initial_cwnd: u64) -> Self {
        Self {
            cwnd: initial_cwnd,
            stats: Default::default(),
        }
    }
}

impl CongestionController for Dummy {
    fn name(&self) -> &str {
        "DUMMY"
    }

    fn on_delivery_sample(
        &mut self,
        delivered_bytes: u64,
        sample_rtt: Duration,
        now: Duration,
    ) -> Result<()> {
        if let Err(e) = PathEstimator::validate(delivered_bytes, sample_rtt) {
            self.stats.samples_rejected = self.stats.samples_rejected.saturating_add(1);
            return Err(e);
        }

        self.stats.samples_accepted = self.stats.samples_accepted.saturating_add(1);
        self.stats.bytes_delivered_in_total = self
            .stats
            .bytes_delivered_in_total
            .saturating_add(delivered_bytes);
        Ok(())
    }

    fn on_timer_expiry(&mut self, timer_id: u64, now: Duration) {
        self.stats.timer_expiries = self.stats.timer_expiries.saturating_add(1);
    }

    fn congestion_window(&self) -> u64 {
        self.cwnd
    }

    fn minimal_window(&self) -> u64 {
        self.cwnd
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn dummy_init() {
        let d = Dummy::new(1200 * 10);
        assert_eq!(d.name(), "DUMMY");
        assert_eq!(d.congestion_window(), 1200 * 10);
        assert_eq!(d.minimal_window(), 1200 * 10);
        assert_eq!(d.stats().samples_accepted, 0);
        assert_eq!(d.pacing_rate(), None);
        assert_eq!(d.phase_name(), None);
    }

    #[test]
    fn dummy_stats() -> Result<()> {
        let mut d = Dummy::new(1200 * 10);
        let rtt = Duration::from_millis(100);

        d.on_delivery_sample(1200, rtt, rtt)?;
        d.on_delivery_sample(2400, rtt, rtt * 2)?;
        assert_eq!(d.stats().samples_accepted, 2);
        assert_eq!(d.stats().bytes_delivered_in_total, 3600);

        // Invalid samples are counted but otherwise ignored.
        assert!(matches!(
            d.on_delivery_sample(0, rtt, rtt * 3),
            Err(Error::InvalidSample(_))
        ));
        assert!(matches!(
            d.on_delivery_sample(1200, Duration::ZERO, rtt * 3),
            Err(Error::InvalidSample(_))
        ));
        assert_eq!(d.stats().samples_rejected, 2);
        assert_eq!(d.stats().bytes_delivered_in_total, 3600);

        d.on_timer_expiry(7, rtt * 10);
        assert_eq!(d.stats().timer_expiries, 1);

        // The window never moves.
        assert_eq!(d.congestion_window(), 1200 * 10);
        Ok(())
    }
}
