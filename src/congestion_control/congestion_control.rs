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

#![allow(unused_variables)]

use core::str::FromStr;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::Config;
use crate::Error;
use crate::Result;
pub use bbr::Bbr;
pub use bbr::BbrConfig;
pub use bbr::BbrStateMachine;
pub use dummy::Dummy;
pub use estimator::PathEstimator;

/// Available congestion control algorithm
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum CongestionControlAlgorithm {
    /// BBR uses measurements of a transport connection's delivery rate and
    /// round-trip time to build a model of the network path. The model is
    /// then used to control the sending rate and the maximum volume of data
    /// allowed in flight.
    #[default]
    Bbr,

    /// Dummy keeps a static congestion window and does not pace. It is
    /// intended to be used as a baseline for experiments.
    Dummy,
}

impl FromStr for CongestionControlAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<CongestionControlAlgorithm> {
        if algor.eq_ignore_ascii_case("bbr") {
            Ok(CongestionControlAlgorithm::Bbr)
        } else if algor.eq_ignore_ascii_case("dummy") {
            Ok(CongestionControlAlgorithm::Dummy)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Congestion control statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CongestionStats {
    /// Number of delivery samples used to update the path model.
    pub samples_accepted: u64,

    /// Number of delivery samples dropped as invalid.
    pub samples_rejected: u64,

    /// Total bytes reported as delivered by accepted samples.
    pub bytes_delivered_in_total: u64,

    /// Number of state transitions.
    pub phase_transitions: u64,

    /// Number of timer expiry events.
    pub timer_expiries: u64,
}

/// Congestion control interfaces shared by different algorithms.
pub trait CongestionController {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Callback for each delivery sample: `delivered_bytes` were acknowledged
    /// over `sample_rtt`, observed at time `now`.
    fn on_delivery_sample(
        &mut self,
        delivered_bytes: u64,
        sample_rtt: Duration,
        now: Duration,
    ) -> Result<()>;

    /// Callback for a timer owned by the transport.
    fn on_timer_expiry(&mut self, timer_id: u64, now: Duration) {}

    /// Current congestion window.
    fn congestion_window(&self) -> u64;

    /// Current pacing rate estimated by Congestion Control Algorithm (CCA)
    /// in bytes per second. If CCA does not estimate pacing rate, return None.
    fn pacing_rate(&self) -> Option<f64> {
        None
    }

    /// Current bandwidth estimate in bytes per second, if the algorithm
    /// models the path.
    fn bandwidth_estimate(&self) -> Option<f64> {
        None
    }

    /// Minimal congestion window.
    fn minimal_window(&self) -> u64;

    /// Name of the current internal state, if the algorithm has one.
    fn phase_name(&self) -> Option<&'static str> {
        None
    }

    /// Congestion stats.
    fn stats(&self) -> &CongestionStats;
}

impl fmt::Debug for dyn CongestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion controller.")
    }
}

/// Build a congestion controller.
pub fn build_congestion_controller(conf: &Config) -> Result<Box<dyn CongestionController>> {
    match conf.congestion_control_algorithm {
        CongestionControlAlgorithm::Bbr => Ok(Box::new(Bbr::new(BbrConfig::from(conf))?)),
        CongestionControlAlgorithm::Dummy => {
            if conf.segment_size == 0 {
                return Err(Error::InvalidConfig("zero segment size".into()));
            }
            let initial_cwnd = conf
                .initial_window_segments
                .saturating_mul(conf.segment_size);
            Ok(Box::new(Dummy::new(initial_cwnd.max(conf.segment_size))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn congestion_control_name() {
        let cases = [
            ("bbr", Ok(CongestionControlAlgorithm::Bbr)),
            ("Bbr", Ok(CongestionControlAlgorithm::Bbr)),
            ("BBR", Ok(CongestionControlAlgorithm::Bbr)),
            ("dummy", Ok(CongestionControlAlgorithm::Dummy)),
            ("Dummy", Ok(CongestionControlAlgorithm::Dummy)),
            ("DUMMY", Ok(CongestionControlAlgorithm::Dummy)),
            ("cubic", Err(Error::InvalidConfig("unknown".into()))),
            ("bbrr", Err(Error::InvalidConfig("unknown".into()))),
        ];

        for (name, algor) in cases {
            assert_eq!(CongestionControlAlgorithm::from_str(name), algor);
        }
        assert_eq!(
            CongestionControlAlgorithm::default(),
            CongestionControlAlgorithm::Bbr
        );
    }

    #[test]
    fn build_bbr() -> Result<()> {
        let conf = Config::new();
        let mut cc = build_congestion_controller(&conf)?;
        assert_eq!(cc.name(), "BBR");
        assert_eq!(cc.congestion_window(), crate::DEFAULT_SEGMENT_SIZE);
        assert_eq!(cc.minimal_window(), crate::DEFAULT_SEGMENT_SIZE);
        assert_eq!(cc.pacing_rate(), Some(0.0));
        assert_eq!(cc.phase_name(), Some("startup"));
        assert_eq!(cc.bandwidth_estimate(), Some(0.0));
        assert_eq!(format!("{:?}", cc), "congestion controller.");

        cc.on_delivery_sample(5000, Duration::from_millis(50), Duration::from_secs(1))?;
        assert_eq!(cc.congestion_window(), 10000);
        assert_eq!(cc.stats().samples_accepted, 1);
        Ok(())
    }

    #[test]
    fn build_dummy() -> Result<()> {
        let mut conf = Config::new();
        conf.set_congestion_control_algorithm(CongestionControlAlgorithm::Dummy);
        conf.set_segment_size(1200);
        conf.set_initial_window_segments(8);

        let cc = build_congestion_controller(&conf)?;
        assert_eq!(cc.name(), "DUMMY");
        assert_eq!(cc.congestion_window(), 9600);
        assert_eq!(cc.pacing_rate(), None);
        assert_eq!(cc.phase_name(), None);
        assert_eq!(cc.bandwidth_estimate(), None);
        Ok(())
    }

    #[test]
    fn build_invalid() {
        let mut conf = Config::new();
        conf.set_segment_size(0);
        assert!(matches!(
            build_congestion_controller(&conf),
            Err(Error::InvalidConfig(_))
        ));

        conf.set_congestion_control_algorithm(CongestionControlAlgorithm::Dummy);
        assert!(matches!(
            build_congestion_controller(&conf),
            Err(Error::InvalidConfig(_))
        ));

        let mut conf = Config::new();
        conf.set_cwnd_gain(-2.0);
        assert!(matches!(
            build_congestion_controller(&conf),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn stats_serialize() -> Result<()> {
        let stats = CongestionStats {
            samples_accepted: 3,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&stats)?,
            "{\"samples_accepted\":3,\"samples_rejected\":0,\"bytes_delivered_in_total\":0,\"phase_transitions\":0,\"timer_expiries\":0}"
        );
        Ok(())
    }
}

mod bbr;
mod dummy;
mod estimator;
