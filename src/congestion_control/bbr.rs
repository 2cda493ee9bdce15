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

//! BBR Congestion Control.
//!
//! BBR uses measurements of a transport connection's delivery rate and
//! round-trip time to build a model of the path: the maximum bandwidth
//! available to the connection and its minimum round-trip delay. The model
//! drives both how fast the sender paces data and how much data it allows
//! in flight.
//!
//! This is a simplified four-phase variant. Bandwidth and RTT are all-time
//! max/min values, Startup ends once the window exceeds a fixed number of
//! segments, and ProbeRTT is entered on a fixed interval and held for a fixed
//! duration.

use core::str::FromStr;
use std::fmt;
use std::time::Duration;

use log::*;
use serde::Serialize;

use super::estimator::PathEstimator;
use super::{CongestionController, CongestionStats};
use crate::Config;
use crate::Error;
use crate::Result;

/// BBR configurable parameters.
#[derive(Debug, Clone)]
pub struct BbrConfig {
    /// Size of a full segment in bytes.
    segment_size: u64,

    /// Gain applied to the bandwidth-delay product to get the cwnd.
    cwnd_gain: f64,

    /// Startup ends once the cwnd exceeds this many segments.
    startup_exit_segments: u64,

    /// Minimum time between two ProbeRTT rounds.
    probe_rtt_interval: Duration,

    /// How long ProbeRTT holds the reduced window.
    probe_rtt_duration: Duration,

    /// Window used during ProbeRTT, in segments.
    probe_rtt_cwnd_segments: u64,
}

impl BbrConfig {
    pub fn new(segment_size: u64) -> Self {
        Self {
            segment_size,
            ..Self::default()
        }
    }

    /// Set the cwnd gain. The default value is `2.0`.
    pub fn set_cwnd_gain(&mut self, v: f64) {
        self.cwnd_gain = v;
    }

    /// Set the number of segments the cwnd must exceed to leave Startup.
    /// The default value is `10`.
    pub fn set_startup_exit_segments(&mut self, v: u64) {
        self.startup_exit_segments = v;
    }

    /// Set the interval between ProbeRTT rounds. The default value is 10s.
    pub fn set_probe_rtt_interval(&mut self, v: Duration) {
        self.probe_rtt_interval = v;
    }

    /// Set the duration of a ProbeRTT round. The default value is 200ms.
    pub fn set_probe_rtt_duration(&mut self, v: Duration) {
        self.probe_rtt_duration = v;
    }

    /// Set the ProbeRTT window in segments. The default value is `4`.
    pub fn set_probe_rtt_cwnd_segments(&mut self, v: u64) {
        self.probe_rtt_cwnd_segments = v;
    }

    /// Check whether the parameters can drive a controller.
    pub fn validate(&self) -> Result<()> {
        if self.segment_size == 0 {
            return Err(Error::InvalidConfig("zero segment size".into()));
        }
        if !self.cwnd_gain.is_finite() || self.cwnd_gain <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "cwnd gain {}",
                self.cwnd_gain
            )));
        }
        if self.probe_rtt_cwnd_segments == 0 {
            return Err(Error::InvalidConfig("zero probe rtt cwnd".into()));
        }
        Ok(())
    }
}

impl Default for BbrConfig {
    fn default() -> Self {
        Self {
            segment_size: crate::DEFAULT_SEGMENT_SIZE,
            cwnd_gain: crate::DEFAULT_CWND_GAIN,
            startup_exit_segments: crate::DEFAULT_STARTUP_EXIT_SEGMENTS,
            probe_rtt_interval: crate::DEFAULT_PROBE_RTT_INTERVAL,
            probe_rtt_duration: crate::DEFAULT_PROBE_RTT_DURATION,
            probe_rtt_cwnd_segments: crate::DEFAULT_PROBE_RTT_CWND_SEGMENTS,
        }
    }
}

impl From<&Config> for BbrConfig {
    fn from(conf: &Config) -> Self {
        Self {
            segment_size: conf.segment_size,
            cwnd_gain: conf.cwnd_gain,
            startup_exit_segments: conf.startup_exit_segments,
            probe_rtt_interval: conf.probe_rtt_interval,
            probe_rtt_duration: conf.probe_rtt_duration,
            probe_rtt_cwnd_segments: conf.probe_rtt_cwnd_segments,
        }
    }
}

/// Pacing gain used in Startup.
const STARTUP_PACING_GAIN: f64 = 1.0;

/// The number of phases in the ProbeBW gain cycle.
const GAIN_CYCLE_LEN: usize = 8;

/// Pacing gain of the probe-up phase.
const PROBE_UP_PACING_GAIN: f64 = 1.25;

/// Pacing gain of the probe-down phase, draining the queue built while
/// probing up.
const PROBE_DOWN_PACING_GAIN: f64 = 0.75;

/// Pacing gain of the cruising phases.
const CRUISE_PACING_GAIN: f64 = 1.0;

/// BBR State Machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BbrStateMachine {
    /// Discover the bottleneck bandwidth.
    Startup,

    /// Drain the queue created during Startup.
    Drain,

    /// Cycle the pacing gain to probe for more bandwidth.
    #[serde(rename = "probe_bw")]
    ProbeBW,

    /// Shrink the window to refresh the minimum RTT.
    #[serde(rename = "probe_rtt")]
    ProbeRTT,
}

impl BbrStateMachine {
    pub fn as_str(&self) -> &'static str {
        match self {
            BbrStateMachine::Startup => "startup",
            BbrStateMachine::Drain => "drain",
            BbrStateMachine::ProbeBW => "probe_bw",
            BbrStateMachine::ProbeRTT => "probe_rtt",
        }
    }
}

impl FromStr for BbrStateMachine {
    type Err = Error;

    fn from_str(name: &str) -> Result<BbrStateMachine> {
        match name {
            "startup" => Ok(BbrStateMachine::Startup),
            "drain" => Ok(BbrStateMachine::Drain),
            "probe_bw" => Ok(BbrStateMachine::ProbeBW),
            "probe_rtt" => Ok(BbrStateMachine::ProbeRTT),
            _ => Err(Error::InvalidState(format!("unknown bbr state {}", name))),
        }
    }
}

impl fmt::Display for BbrStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BBR Congestion Control Algorithm.
///
/// All timestamps are offsets from the caller's clock origin.
#[derive(Debug)]
pub struct Bbr {
    /// Configurable parameters.
    config: BbrConfig,

    /// Statistics.
    stats: CongestionStats,

    /// State.
    state: BbrStateMachine,

    /// Max bandwidth and min RTT of the path.
    estimator: PathEstimator,

    /// The dynamic gain factor used to scale the bandwidth estimate to
    /// produce the pacing rate.
    pacing_gain: f64,

    /// The gain factor used to scale the estimated BDP to produce the cwnd.
    cwnd_gain: f64,

    /// The current pacing rate in bytes per second.
    pacing_rate: f64,

    /// The congestion window in bytes.
    cwnd: u64,

    /// Time of the last entry into ProbeRTT.
    last_rtt_probe_time: Duration,

    /// Time the current state was (re)stamped.
    phase_start_time: Duration,

    /// Current index of the ProbeBW gain cycle.
    cycle_index: usize,
}

impl Bbr {
    pub fn new(config: BbrConfig) -> Result<Self> {
        config.validate()?;

        let mut bbr = Self {
            cwnd: config.segment_size,
            cwnd_gain: config.cwnd_gain,
            config,
            stats: Default::default(),
            state: BbrStateMachine::Startup,
            estimator: PathEstimator::new(),
            pacing_gain: STARTUP_PACING_GAIN,
            pacing_rate: 0.0,
            last_rtt_probe_time: Duration::ZERO,
            phase_start_time: Duration::ZERO,
            cycle_index: 0,
        };
        bbr.enter_startup();

        Ok(bbr)
    }

    /// Current state.
    pub fn phase(&self) -> BbrStateMachine {
        self.state
    }

    /// Current pacing rate in bytes per second.
    pub fn pacing_rate(&self) -> f64 {
        self.pacing_rate
    }

    /// Current congestion window in bytes.
    pub fn congestion_window(&self) -> u64 {
        self.cwnd
    }

    /// Current pacing gain.
    pub fn pacing_gain(&self) -> f64 {
        self.pacing_gain
    }

    /// Current cwnd gain.
    pub fn cwnd_gain(&self) -> f64 {
        self.cwnd_gain
    }

    /// Maximum observed delivery rate in bytes per second.
    pub fn max_bandwidth(&self) -> f64 {
        self.estimator.max_bandwidth()
    }

    /// Minimum observed round-trip time.
    pub fn min_rtt(&self) -> Option<Duration> {
        self.estimator.min_rtt()
    }

    /// Time the current state was last stamped.
    pub fn phase_start_time(&self) -> Duration {
        self.phase_start_time
    }

    /// Time of the last entry into ProbeRTT.
    pub fn last_rtt_probe_time(&self) -> Duration {
        self.last_rtt_probe_time
    }

    /// Position within the ProbeBW gain cycle.
    pub fn probe_cycle_index(&self) -> usize {
        self.cycle_index
    }

    /// Size of a full segment in bytes.
    pub fn segment_size(&self) -> u64 {
        self.config.segment_size
    }

    /// Enter the Startup state.
    fn enter_startup(&mut self) {
        self.state = BbrStateMachine::Startup;
        self.pacing_gain = STARTUP_PACING_GAIN;
    }

    /// Estimate whether bandwidth growth slowed down in Startup.
    ///
    /// Growth is assumed to slow once the window has grown past a fixed
    /// number of segments.
    fn is_bandwidth_growth_slowed(&self) -> bool {
        self.estimator.max_bandwidth() > 0.0
            && self.cwnd
                > self
                    .config
                    .startup_exit_segments
                    .saturating_mul(self.config.segment_size)
    }

    /// Bytes in flight that exactly fill the pipe (the unscaled BDP).
    fn target_inflight(&self) -> u64 {
        self.estimator.bdp().floor() as u64
    }

    /// Advance the ProbeBW gain cycle and return the pacing gain of the new
    /// phase.
    fn cycle_gain(&mut self) -> f64 {
        self.cycle_index = (self.cycle_index + 1) % GAIN_CYCLE_LEN;
        match self.cycle_index {
            0 => PROBE_UP_PACING_GAIN,
            1 => PROBE_DOWN_PACING_GAIN,
            _ => CRUISE_PACING_GAIN,
        }
    }

    /// Check whether the ProbeRTT interval elapsed.
    fn is_time_to_probe_rtt(&self, now: Duration) -> bool {
        now.saturating_sub(self.last_rtt_probe_time) > self.config.probe_rtt_interval
    }

    /// Check whether ProbeRTT held the reduced window for long enough.
    fn is_probe_rtt_done(&self, now: Duration) -> bool {
        now.saturating_sub(self.phase_start_time) > self.config.probe_rtt_duration
    }

    fn transit(&mut self, state: BbrStateMachine, now: Duration) {
        debug!(
            "{}. state {} -> {} at {:?}, max_bandwidth={:.2}, min_rtt={:?}, cwnd={}",
            self.name(),
            self.state,
            state,
            now,
            self.estimator.max_bandwidth(),
            self.estimator.min_rtt(),
            self.cwnd
        );

        self.state = state;
        self.phase_start_time = now;
        self.stats.phase_transitions = self.stats.phase_transitions.saturating_add(1);
    }

    /// In Drain, the queue built during Startup is shed.
    fn enter_drain(&mut self, now: Duration) {
        self.transit(BbrStateMachine::Drain, now);
    }

    /// ProbeBW holds a near-optimal operating point, alternately probing for
    /// more bandwidth and draining the resulting queue.
    fn enter_probe_bw(&mut self, now: Duration) {
        self.transit(BbrStateMachine::ProbeBW, now);
    }

    /// ProbeRTT shrinks the window to flush the queue and get an unbiased
    /// minimum RTT sample.
    fn enter_probe_rtt(&mut self, now: Duration) {
        self.last_rtt_probe_time = now;
        self.transit(BbrStateMachine::ProbeRTT, now);
    }

    /// On every delivery sample, BBR checks whether it should move to the
    /// next state.
    fn update_state(&mut self, now: Duration) {
        // The stamp advances on every sample outside ProbeRTT, so only the
        // ProbeRTT duration check depends on the real entry time.
        if self.state != BbrStateMachine::ProbeRTT {
            self.phase_start_time = now;
        }

        match self.state {
            BbrStateMachine::Startup => {
                if self.is_bandwidth_growth_slowed() {
                    self.enter_drain(now);
                }
            }

            BbrStateMachine::Drain => {
                // The window is used as an approximation of the inflight.
                if self.cwnd <= self.target_inflight() {
                    self.enter_probe_bw(now);
                }
            }

            BbrStateMachine::ProbeBW => {
                self.pacing_gain = self.cycle_gain();
                if self.is_time_to_probe_rtt(now) {
                    self.enter_probe_rtt(now);
                }
            }

            BbrStateMachine::ProbeRTT => {
                if self.is_probe_rtt_done(now) {
                    self.enter_probe_bw(now);
                }
            }
        }
    }

    /// BBR adjusts its control parameters to adapt to the updated model.
    fn update_control_parameters(&mut self) {
        self.set_pacing_rate();
        self.set_cwnd();
    }

    fn set_pacing_rate(&mut self) {
        self.pacing_rate = self.pacing_gain * self.estimator.max_bandwidth();
    }

    /// Window for the ProbeRTT state.
    fn probe_rtt_cwnd(&self) -> u64 {
        self.config
            .probe_rtt_cwnd_segments
            .saturating_mul(self.config.segment_size)
    }

    fn set_cwnd(&mut self) {
        let target_cwnd = (self.cwnd_gain * self.estimator.bdp()).round() as u64;

        // A floor of one segment keeps the flow sending even with tiny BDPs.
        self.cwnd = target_cwnd.max(self.config.segment_size);

        self.modulate_cwnd_for_probe_rtt();
    }

    /// BBR bounds the cwnd in ProbeRTT.
    fn modulate_cwnd_for_probe_rtt(&mut self) {
        if self.state == BbrStateMachine::ProbeRTT {
            self.cwnd = self.probe_rtt_cwnd();
        }
    }
}

impl CongestionController for Bbr {
    fn name(&self) -> &str {
        "BBR"
    }

    fn on_delivery_sample(
        &mut self,
        delivered_bytes: u64,
        sample_rtt: Duration,
        now: Duration,
    ) -> Result<()> {
        if let Err(e) = self.estimator.update(delivered_bytes, sample_rtt) {
            self.stats.samples_rejected = self.stats.samples_rejected.saturating_add(1);
            warn!(
                "{}. drop delivery sample, delivered={}, rtt={:?}: {:?}",
                self.name(),
                delivered_bytes,
                sample_rtt,
                e
            );
            return Err(e);
        }

        self.stats.samples_accepted = self.stats.samples_accepted.saturating_add(1);
        self.stats.bytes_delivered_in_total = self
            .stats
            .bytes_delivered_in_total
            .saturating_add(delivered_bytes);

        self.update_state(now);
        self.update_control_parameters();

        trace!(
            "{}. state={}, pacing_gain={}, max_bandwidth={:.2}, min_rtt={:?}, pacing_rate={:.2}, cwnd={}",
            self.name(),
            self.state,
            self.pacing_gain,
            self.estimator.max_bandwidth(),
            self.estimator.min_rtt(),
            self.pacing_rate,
            self.cwnd
        );

        Ok(())
    }

    fn on_timer_expiry(&mut self, timer_id: u64, now: Duration) {
        // Timeouts belong to the transport, nothing to adjust here.
        self.stats.timer_expiries = self.stats.timer_expiries.saturating_add(1);
        trace!("{}. timer {} expired at {:?}", self.name(), timer_id, now);
    }

    fn congestion_window(&self) -> u64 {
        self.cwnd
    }

    fn pacing_rate(&self) -> Option<f64> {
        Some(self.pacing_rate)
    }

    fn bandwidth_estimate(&self) -> Option<f64> {
        Some(self.estimator.max_bandwidth())
    }

    fn minimal_window(&self) -> u64 {
        self.config.segment_size
    }

    fn phase_name(&self) -> Option<&'static str> {
        Some(self.state.as_str())
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}
