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

//! TBBR is a lightweight congestion control core modelled on BBR.
//!
//! A sender feeds the controller one delivery sample per acknowledgement
//! (bytes delivered, the round-trip time they took and the current time)
//! and reads back the pacing rate and the congestion window to use for the
//! next transmissions.
//!
//! ## Get started
//!
//! ```
//! use std::time::Duration;
//! use tbbr::{Bbr, BbrConfig, CongestionController};
//!
//! let mut bbr = Bbr::new(BbrConfig::new(1000)).unwrap();
//! bbr.on_delivery_sample(5000, Duration::from_millis(50), Duration::from_secs(1))
//!     .unwrap();
//! assert_eq!(bbr.congestion_window(), 10000);
//! ```
//!
//! The `tools` crate of the workspace contains a link simulator and an ns-2
//! trace analyzer built on this library.
//!
//! ## Feature flags
//!
//! * `ffi`: Build and expose the FFI API.

use std::time::Duration;

/// Default size of a full segment in bytes.
pub const DEFAULT_SEGMENT_SIZE: u64 = 1000;

/// Default gain applied to the bandwidth-delay product to get the cwnd.
pub const DEFAULT_CWND_GAIN: f64 = 2.0;

/// Default number of segments the cwnd must exceed to leave Startup.
pub const DEFAULT_STARTUP_EXIT_SEGMENTS: u64 = 10;

/// Default interval between two ProbeRTT rounds.
pub const DEFAULT_PROBE_RTT_INTERVAL: Duration = Duration::from_secs(10);

/// Default duration of a ProbeRTT round.
pub const DEFAULT_PROBE_RTT_DURATION: Duration = Duration::from_millis(200);

/// Default congestion window during ProbeRTT, in segments.
pub const DEFAULT_PROBE_RTT_CWND_SEGMENTS: u64 = 4;

/// Default static window of the Dummy controller, in segments.
pub const DEFAULT_INITIAL_WINDOW_SEGMENTS: u64 = 10;

/// A specialized [`Result`] type for congestion control operations.
///
/// [`Result`]: https://doc.rust-lang.org/std/result/enum.Result.html
pub type Result<T> = std::result::Result<T, Error>;

/// Configurations about congestion control.
#[derive(Debug, Clone)]
pub struct Config {
    /// The congestion control algorithm used for a path.
    pub(crate) congestion_control_algorithm: CongestionControlAlgorithm,

    /// Size of a full segment in bytes.
    pub(crate) segment_size: u64,

    /// Gain applied to the bandwidth-delay product to get the cwnd.
    pub(crate) cwnd_gain: f64,

    /// Minimum time between two ProbeRTT rounds.
    pub(crate) probe_rtt_interval: Duration,

    /// How long a ProbeRTT round lasts.
    pub(crate) probe_rtt_duration: Duration,

    /// Startup ends once the cwnd exceeds this many segments.
    pub(crate) startup_exit_segments: u64,

    /// Window used during ProbeRTT, in segments.
    pub(crate) probe_rtt_cwnd_segments: u64,

    /// Static window of the Dummy controller, in segments.
    pub(crate) initial_window_segments: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            congestion_control_algorithm: CongestionControlAlgorithm::default(),
            segment_size: DEFAULT_SEGMENT_SIZE,
            cwnd_gain: DEFAULT_CWND_GAIN,
            probe_rtt_interval: DEFAULT_PROBE_RTT_INTERVAL,
            probe_rtt_duration: DEFAULT_PROBE_RTT_DURATION,
            startup_exit_segments: DEFAULT_STARTUP_EXIT_SEGMENTS,
            probe_rtt_cwnd_segments: DEFAULT_PROBE_RTT_CWND_SEGMENTS,
            initial_window_segments: DEFAULT_INITIAL_WINDOW_SEGMENTS,
        }
    }
}

impl Config {
    /// Create default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the congestion control algorithm.
    pub fn congestion_control_algorithm(&self) -> CongestionControlAlgorithm {
        self.congestion_control_algorithm
    }

    /// Return the size of a full segment in bytes.
    pub fn segment_size(&self) -> u64 {
        self.segment_size
    }

    /// Set the congestion control algorithm. The default value is BBR.
    pub fn set_congestion_control_algorithm(&mut self, cca: CongestionControlAlgorithm) {
        self.congestion_control_algorithm = cca;
    }

    /// Set the size of a full segment in bytes.
    /// The default value is 1000 bytes.
    pub fn set_segment_size(&mut self, v: u64) {
        self.segment_size = v;
    }

    /// Set the cwnd gain for BBR. The default value is 2.0
    pub fn set_cwnd_gain(&mut self, v: f64) {
        self.cwnd_gain = v;
    }

    /// Set the minimum time between two ProbeRTT rounds.
    /// The default value is 10 seconds.
    pub fn set_probe_rtt_interval(&mut self, v: Duration) {
        self.probe_rtt_interval = v;
    }

    /// Set the duration of a ProbeRTT round.
    /// The default value is 200 milliseconds.
    pub fn set_probe_rtt_duration(&mut self, v: Duration) {
        self.probe_rtt_duration = v;
    }

    /// Set the number of segments the cwnd must exceed to leave Startup.
    /// The default value is `10`.
    pub fn set_startup_exit_segments(&mut self, v: u64) {
        self.startup_exit_segments = v;
    }

    /// Set the cwnd used during ProbeRTT in segments.
    /// The default value is `4`.
    pub fn set_probe_rtt_cwnd_segments(&mut self, v: u64) {
        self.probe_rtt_cwnd_segments = v;
    }

    /// Set the static window of the Dummy controller in segments.
    /// The default value is `10`.
    pub fn set_initial_window_segments(&mut self, v: u64) {
        self.initial_window_segments = v;
    }
}


pub use crate::congestion_control::build_congestion_controller;
pub use crate::congestion_control::Bbr;
pub use crate::congestion_control::BbrConfig;
pub use crate::congestion_control::BbrStateMachine;
pub use crate::congestion_control::CongestionControlAlgorithm;
pub use crate::congestion_control::CongestionController;
pub use crate::congestion_control::CongestionStats;
pub use crate::congestion_control::Dummy;
pub use crate::congestion_control::PathEstimator;
pub use crate::error::Error;

#[path = "congestion_control/congestion_control.rs"]
mod congestion_control;

#[path = "qlog/qlog.rs"]
pub mod qlog;

#[cfg(feature = "ffi")]
mod ffi;

pub mod error;
