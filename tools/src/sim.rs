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

//! Discrete-event simulation of a single bulk flow crossing a bottleneck
//! link with a tail-drop buffer.
//!
//! The sender is window limited: it keeps sending full segments as long as
//! the bytes in flight stay within the congestion window. When pacing is
//! enabled, consecutive segments are also spaced by the pacing rate of the
//! controller.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use log::*;
use priority_queue::double_priority_queue::DoublePriorityQueue;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tbbr::qlog::events::CongestionStateUpdatedTrigger;
use tbbr::qlog::events::EventData;
use tbbr::qlog::events::EventImportance;
use tbbr::qlog::QlogWriter;
use tbbr::qlog::TraceSeq;
use tbbr::qlog::VantagePoint;
use tbbr::BbrStateMachine;
use tbbr::CongestionController;
use tbbr::CongestionStats;
use tbbr::Config;

use crate::timer_queue::TimerQueue;
use crate::Result;

/// Timer used to resume sending once the pacing gap has elapsed.
pub const SEND_TIMER: u64 = 0;

/// Retransmission timer of the oldest outstanding segment.
pub const RTO_TIMER: u64 = 1;

/// Lower bound of the retransmission timeout.
const MIN_RTO: Duration = Duration::from_secs(1);

/// The retransmission timeout is this multiple of the minimum observed RTT.
const RTO_RTT_MULTIPLIER: u32 = 4;

/// Properties of the simulated path.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Bottleneck bandwidth in bytes per second.
    pub bandwidth: f64,

    /// Round-trip propagation delay.
    pub rtt: Duration,

    /// Bottleneck buffer in bytes.
    pub buffer: u64,

    /// Maximum random delay added to each acknowledgement.
    pub jitter: Duration,

    /// Simulated time.
    pub duration: Duration,

    /// Space segments by the pacing rate of the controller.
    pub pacing: bool,

    /// Seed of the jitter generator.
    pub seed: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bandwidth: 1_250_000.0,
            rtt: Duration::from_millis(50),
            buffer: 100_000,
            jitter: Duration::ZERO,
            duration: Duration::from_secs(10),
            pacing: false,
            seed: 0,
        }
    }
}

impl LinkConfig {
    /// Check the link and return the time the bottleneck takes to serialize
    /// one segment.
    fn validate(&self, segment_size: u64) -> Result<Duration> {
        if !self.bandwidth.is_finite() || self.bandwidth < 1.0 {
            return Err(format!("invalid bandwidth {}", self.bandwidth).into());
        }
        if self.rtt.is_zero() {
            return Err("zero rtt".into());
        }
        if self.duration.is_zero() {
            return Err("zero duration".into());
        }
        if self.buffer < segment_size {
            return Err(format!(
                "buffer {} is smaller than a segment of {} bytes",
                self.buffer, segment_size
            )
            .into());
        }

        // A segment must leave the bottleneck within the simulated time.
        let tx_time = Duration::try_from_secs_f64(segment_size as f64 / self.bandwidth)
            .ok()
            .filter(|t| *t <= self.duration)
            .ok_or_else(|| {
                format!(
                    "a segment of {} bytes takes longer than {:?} at {} bytes/s",
                    segment_size, self.duration, self.bandwidth
                )
            })?;
        Ok(tx_time)
    }
}

/// Outcome of a simulation run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SimReport {
    /// Simulated time.
    pub duration: Duration,

    /// Segments handed to the link.
    pub segments_sent: u64,

    /// Segments acknowledged.
    pub segments_acked: u64,

    /// Segments dropped by the bottleneck buffer.
    pub segments_dropped: u64,

    /// Segments declared lost by the retransmission timer.
    pub segments_lost: u64,

    /// Bytes acknowledged.
    pub bytes_delivered: u64,

    /// Round-trip time of every acknowledged segment, in milliseconds.
    pub rtt_samples: Vec<f64>,

    /// Time and name of every state the controller entered.
    pub phase_history: Vec<(Duration, &'static str)>,

    /// Statistics of the congestion controller at the end of the run.
    pub cc_stats: CongestionStats,

    /// Congestion window at the end of the run.
    pub final_cwnd: u64,

    /// Pacing rate at the end of the run.
    pub final_pacing_rate: Option<f64>,

    /// State of the controller at the end of the run.
    pub final_phase: Option<&'static str>,
}

impl SimReport {
    /// Average goodput in Mbps over the simulated time.
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes_delivered as f64 * 8.0 / secs / 1_000_000.0
    }
}

/// A segment waiting for its acknowledgement.
#[derive(Debug)]
struct SentSegment {
    /// Time the segment was sent.
    sent_time: Duration,

    /// Total bytes delivered when the segment was sent.
    delivered: u64,
}

/// Simulator of one flow driven by a congestion controller.
pub struct Simulator {
    link: LinkConfig,

    segment_size: u64,

    /// Serialization time of a segment at the bottleneck.
    tx_time: Duration,

    cc: Box<dyn CongestionController>,

    rng: StdRng,

    timers: TimerQueue,

    /// Arrival time of the acknowledgement of each segment in the network.
    acks: DoublePriorityQueue<u64, Duration>,

    /// Segments sent and not yet acknowledged or lost, by sequence number.
    outstanding: BTreeMap<u64, SentSegment>,

    next_seq: u64,

    bytes_in_flight: u64,

    /// Total bytes acknowledged.
    delivered: u64,

    /// Time the bottleneck finishes serializing its backlog.
    link_free_at: Duration,

    /// Earliest time the next segment may leave when pacing.
    next_send_time: Duration,

    /// Minimum RTT observed by the sender.
    min_rtt: Option<Duration>,

    phase: Option<&'static str>,

    qlog: Option<QlogWriter>,

    report: SimReport,
}

impl Simulator {
    /// Create a simulator using the congestion controller described by
    /// `conf`.
    pub fn new(link: LinkConfig, conf: &Config) -> Result<Self> {
        let segment_size = conf.segment_size();
        let tx_time = link.validate(segment_size)?;
        let cc = tbbr::build_congestion_controller(conf)?;
        let phase = cc.phase_name();

        Ok(Self {
            rng: StdRng::seed_from_u64(link.seed),
            link,
            segment_size,
            tx_time,
            cc,
            timers: TimerQueue::with_capacity(2),
            acks: DoublePriorityQueue::new(),
            outstanding: BTreeMap::new(),
            next_seq: 0,
            bytes_in_flight: 0,
            delivered: 0,
            link_free_at: Duration::ZERO,
            next_send_time: Duration::ZERO,
            min_rtt: None,
            phase,
            qlog: None,
            report: SimReport::default(),
        })
    }

    /// Write qlog events of the run to `writer`. Events less important than
    /// `level` are skipped.
    pub fn set_qlog(
        &mut self,
        writer: Box<dyn std::io::Write + Send + Sync>,
        title: String,
        level: EventImportance,
        conf: &Config,
    ) -> Result<()> {
        let trace = TraceSeq::new(
            Some(title.clone()),
            Some(format!(
                "{} bytes/s bottleneck, {:?} rtt, {} bytes buffer",
                self.link.bandwidth, self.link.rtt, self.link.buffer
            )),
            VantagePoint::network(Some("bottleneck".to_string())),
        );

        let mut qlog = QlogWriter::new(
            Some(title),
            Some("tbbr link simulation".to_string()),
            trace,
            level,
            writer,
            Duration::ZERO,
        );
        qlog.start()?;
        qlog.add_event_data(Duration::ZERO, EventData::parameters_set(conf))?;
        self.qlog = Some(qlog);
        Ok(())
    }

    /// Run the simulation to its end.
    pub fn run(mut self) -> Result<SimReport> {
        info!(
            "{} simulation: {} bytes/s, rtt {:?}, buffer {} bytes, duration {:?}",
            self.cc.name(),
            self.link.bandwidth,
            self.link.rtt,
            self.link.buffer,
            self.link.duration
        );

        self.timers.add(SEND_TIMER, Duration::ZERO, Duration::ZERO);
        loop {
            let next_ack = self.acks.peek_min().map(|(_, t)| *t);
            let now = match (next_ack, self.timers.next_expiration()) {
                (Some(a), Some(t)) => a.min(t),
                (Some(a), None) => a,
                (None, Some(t)) => t,
                (None, None) => break,
            };
            if now > self.link.duration {
                break;
            }

            while let Some(seq) = self.next_ack(now) {
                self.on_ack(seq, now);
            }

            while let Some(timer) = self.timers.next_expire(now) {
                match timer {
                    SEND_TIMER => (),
                    RTO_TIMER => self.on_rto(now),
                    _ => warn!("unknown timer {}", timer),
                }
            }

            self.try_send(now);
        }

        Ok(self.finish())
    }

    fn next_ack(&mut self, now: Duration) -> Option<u64> {
        let arrived = matches!(self.acks.peek_min(), Some((_, t)) if *t <= now);
        if !arrived {
            return None;
        }
        self.acks.pop_min().map(|(seq, _)| seq)
    }

    /// Send as many segments as the window and the pacing gap allow.
    fn try_send(&mut self, now: Duration) {
        while self.bytes_in_flight + self.segment_size <= self.cc.congestion_window() {
            if self.link.pacing && self.next_send_time > now {
                self.timers
                    .add(SEND_TIMER, self.next_send_time - now, now);
                return;
            }

            self.send_segment(now);

            if self.link.pacing {
                if let Some(rate) = self.cc.pacing_rate().filter(|r| *r > 0.0) {
                    // The pacing gap never exceeds the minimal RTO.
                    let gap = Duration::try_from_secs_f64(self.segment_size as f64 / rate)
                        .unwrap_or(MIN_RTO)
                        .min(MIN_RTO);
                    self.next_send_time = now + gap;
                }
            }
        }
    }

    fn send_segment(&mut self, now: Duration) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.report.segments_sent += 1;
        self.bytes_in_flight += self.segment_size;
        self.outstanding.insert(
            seq,
            SentSegment {
                sent_time: now,
                delivered: self.delivered,
            },
        );

        let backlog =
            self.link_free_at.saturating_sub(now).as_secs_f64() * self.link.bandwidth;
        if backlog + self.segment_size as f64 > self.link.buffer as f64 {
            self.report.segments_dropped += 1;
            trace!(
                "segment {} dropped at {:?}, backlog {:.0} bytes",
                seq,
                now,
                backlog
            );
        } else {
            let depart = self.link_free_at.max(now).saturating_add(self.tx_time);
            self.link_free_at = depart;
            let jitter = self.jitter();
            let ack_time = depart.saturating_add(self.link.rtt).saturating_add(jitter);
            self.acks.push(seq, ack_time);
        }

        if self.timers.expiration(&RTO_TIMER).is_none() {
            self.set_rto_timer(now);
        }
    }

    fn jitter(&mut self) -> Duration {
        if self.link.jitter.is_zero() {
            return Duration::ZERO;
        }
        let max = self.link.jitter.as_micros() as u64;
        Duration::from_micros(self.rng.gen_range(0..=max))
    }

    fn on_ack(&mut self, seq: u64, now: Duration) {
        let sent = match self.outstanding.remove(&seq) {
            Some(sent) => sent,
            None => {
                trace!("ack of segment {} already declared lost", seq);
                return;
            }
        };

        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(self.segment_size);
        self.delivered += self.segment_size;
        self.report.segments_acked += 1;
        self.report.bytes_delivered += self.segment_size;

        let delivered_bytes = self.delivered - sent.delivered;
        let rtt = now.saturating_sub(sent.sent_time);
        self.min_rtt = Some(self.min_rtt.map_or(rtt, |min_rtt| min_rtt.min(rtt)));
        self.report.rtt_samples.push(rtt.as_secs_f64() * 1000.0);

        match self.cc.on_delivery_sample(delivered_bytes, rtt, now) {
            Ok(()) => {
                let event = EventData::RecoveryMetricsUpdated {
                    min_rtt: self.min_rtt.map(|r| r.as_secs_f32() * 1000.0),
                    latest_rtt: Some(rtt.as_secs_f32() * 1000.0),
                    congestion_window: Some(self.cc.congestion_window()),
                    pacing_rate: self.cc.pacing_rate(),
                    bandwidth_estimate: self.cc.bandwidth_estimate(),
                    delivered_bytes: Some(delivered_bytes),
                };
                self.log_event(now, event);
            }
            Err(e) => {
                warn!("delivery sample of segment {} rejected: {:?}", seq, e);
                let event = EventData::RecoveryDeliverySampleRejected {
                    delivered_bytes,
                    sample_rtt: rtt.as_secs_f32() * 1000.0,
                };
                self.log_event(now, event);
            }
        }

        self.check_phase(now);
        self.set_rto_timer(now);
    }

    fn on_rto(&mut self, now: Duration) {
        self.cc.on_timer_expiry(RTO_TIMER, now);
        self.log_event(now, EventData::RecoveryTimerExpired { timer_id: RTO_TIMER });

        let rto = self.rto();
        let lost: Vec<u64> = self
            .outstanding
            .iter()
            .take_while(|(_, sent)| sent.sent_time + rto <= now)
            .map(|(seq, _)| *seq)
            .collect();

        for seq in lost.iter() {
            self.outstanding.remove(seq);
            self.acks.remove(seq);
            self.bytes_in_flight = self.bytes_in_flight.saturating_sub(self.segment_size);
        }
        self.report.segments_lost += lost.len() as u64;
        debug!(
            "rto {:?} expired at {:?}, {} segments lost",
            rto,
            now,
            lost.len()
        );

        self.check_phase(now);
        self.set_rto_timer(now);
    }

    /// Arm the retransmission timer for the oldest outstanding segment.
    fn set_rto_timer(&mut self, now: Duration) {
        match self.outstanding.first_key_value() {
            Some((_, sent)) => {
                let expiry = sent.sent_time + self.rto();
                self.timers.add(RTO_TIMER, expiry.saturating_sub(now), now);
            }
            None => self.timers.del(&RTO_TIMER),
        }
    }

    fn rto(&self) -> Duration {
        match self.min_rtt {
            Some(min_rtt) => (min_rtt * RTO_RTT_MULTIPLIER).max(MIN_RTO),
            None => MIN_RTO,
        }
    }

    fn check_phase(&mut self, now: Duration) {
        let phase = self.cc.phase_name();
        if phase == self.phase {
            return;
        }

        let old = self.phase;
        self.phase = phase;
        let new = match phase {
            Some(new) => new,
            None => return,
        };
        debug!("{} enter {} at {:?}", self.cc.name(), new, now);
        self.report.phase_history.push((now, new));

        let trigger = match (old.map(BbrStateMachine::from_str), BbrStateMachine::from_str(new)) {
            (Some(Ok(old)), Ok(new)) => CongestionStateUpdatedTrigger::from_transition(old, new),
            _ => None,
        };
        let event = EventData::RecoveryCongestionStateUpdated {
            old: old.map(|s| s.to_string()),
            new: new.to_string(),
            trigger,
        };
        self.log_event(now, event);
    }

    fn log_event(&mut self, now: Duration, event: EventData) {
        if let Some(qlog) = self.qlog.as_mut() {
            match qlog.add_event_data(now, event) {
                Ok(()) | Err(tbbr::Error::Done) => (),
                Err(e) => warn!("qlog event dropped: {:?}", e),
            }
        }
    }

    fn finish(mut self) -> SimReport {
        let end = self.link.duration;
        let message = format!(
            "{} segments sent, {} acked, {} dropped, {} lost",
            self.report.segments_sent,
            self.report.segments_acked,
            self.report.segments_dropped,
            self.report.segments_lost
        );
        self.log_event(
            end,
            EventData::SimulationMarker {
                marker_type: "simulation_end".to_string(),
                message: Some(message),
            },
        );
        if let Some(qlog) = self.qlog.as_mut() {
            if let Err(e) = qlog.flush() {
                warn!("qlog flush failed: {:?}", e);
            }
        }

        let mut report = self.report;
        report.duration = end;
        report.cc_stats = self.cc.stats().clone();
        report.final_cwnd = self.cc.congestion_window();
        report.final_pacing_rate = self.cc.pacing_rate();
        report.final_phase = self.cc.phase_name();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::io::Seek;
    use tbbr::CongestionControlAlgorithm;

    fn dummy_config() -> Config {
        let mut conf = Config::new();
        conf.set_congestion_control_algorithm(CongestionControlAlgorithm::Dummy);
        conf
    }

    #[test]
    fn sim_invalid_link() {
        let conf = Config::new();

        let link = LinkConfig {
            bandwidth: 0.0,
            ..LinkConfig::default()
        };
        assert!(Simulator::new(link, &conf).is_err());

        let link = LinkConfig {
            buffer: 500,
            ..LinkConfig::default()
        };
        assert!(Simulator::new(link, &conf).is_err());

        let link = LinkConfig {
            rtt: Duration::ZERO,
            ..LinkConfig::default()
        };
        assert!(Simulator::new(link, &conf).is_err());

        // Serializing one segment would outlast the run.
        let link = LinkConfig {
            bandwidth: 1.0,
            duration: Duration::from_secs(10),
            ..LinkConfig::default()
        };
        assert!(Simulator::new(link, &conf).is_err());

        // Serializing one segment would overflow the clock.
        let mut huge_segment = Config::new();
        huge_segment.set_segment_size(u64::MAX);
        let link = LinkConfig {
            bandwidth: 1.0,
            buffer: u64::MAX,
            duration: Duration::MAX,
            ..LinkConfig::default()
        };
        assert!(Simulator::new(link, &huge_segment).is_err());
    }

    #[test]
    fn sim_slow_link() -> Result<()> {
        // One 1000 byte segment every 100ms.
        let link = LinkConfig {
            bandwidth: 10_000.0,
            buffer: 10_000,
            duration: Duration::from_secs(5),
            ..LinkConfig::default()
        };
        let report = Simulator::new(link, &dummy_config())?.run()?;
        assert!(report.segments_acked > 0);
        assert!(report.segments_acked <= 50);
        Ok(())
    }

    #[test]
    fn sim_bbr_leaves_startup() -> Result<()> {
        let link = LinkConfig::default();
        let report = Simulator::new(link.clone(), &Config::new())?.run()?;

        assert!(report.segments_acked > 0);
        assert!(report.cc_stats.phase_transitions >= 1);
        assert_eq!(report.phase_history.first().map(|p| p.1), Some("drain"));
        assert_eq!(
            report.cc_stats.phase_transitions,
            report.phase_history.len() as u64
        );
        assert_eq!(report.cc_stats.samples_accepted, report.segments_acked);
        assert!(report.final_cwnd >= 1000);
        assert!(report.final_pacing_rate.is_some());

        // Goodput is bounded by the bottleneck.
        let capacity = link.bandwidth * link.duration.as_secs_f64();
        assert!(report.bytes_delivered as f64 <= capacity);
        assert!(report.throughput_mbps() <= link.bandwidth * 8.0 / 1_000_000.0);

        // No ack returns earlier than one propagation delay.
        let min_rtt = report.rtt_samples.iter().cloned().fold(f64::MAX, f64::min);
        assert!(min_rtt >= 50.0);
        Ok(())
    }

    #[test]
    fn sim_bbr_with_pacing() -> Result<()> {
        let link = LinkConfig {
            pacing: true,
            duration: Duration::from_secs(5),
            ..LinkConfig::default()
        };
        let report = Simulator::new(link, &Config::new())?.run()?;
        assert!(report.segments_acked > 0);
        assert_eq!(report.cc_stats.samples_rejected, 0);
        Ok(())
    }

    #[test]
    fn sim_dummy_static_window() -> Result<()> {
        let link = LinkConfig {
            duration: Duration::from_secs(5),
            ..LinkConfig::default()
        };
        let report = Simulator::new(link, &dummy_config())?.run()?;

        assert!(report.segments_acked > 0);
        assert!(report.phase_history.is_empty());
        assert_eq!(report.cc_stats.phase_transitions, 0);
        assert_eq!(report.final_cwnd, 10000);
        assert_eq!(report.final_pacing_rate, None);
        assert_eq!(report.final_phase, None);
        assert_eq!(report.segments_dropped, 0);
        assert_eq!(report.segments_lost, 0);
        Ok(())
    }

    #[test]
    fn sim_drops_and_timeouts() -> Result<()> {
        // The initial window of ten segments overflows a two segment buffer.
        let link = LinkConfig {
            bandwidth: 100_000.0,
            buffer: 2000,
            duration: Duration::from_secs(5),
            ..LinkConfig::default()
        };
        let report = Simulator::new(link, &dummy_config())?.run()?;

        assert!(report.segments_dropped > 0);
        assert!(report.segments_lost > 0);
        assert!(report.cc_stats.timer_expiries > 0);
        assert!(report.segments_acked + report.segments_lost <= report.segments_sent);
        Ok(())
    }

    #[test]
    fn sim_deterministic() -> Result<()> {
        let link = LinkConfig {
            jitter: Duration::from_millis(5),
            duration: Duration::from_secs(3),
            seed: 7,
            ..LinkConfig::default()
        };
        let first = Simulator::new(link.clone(), &Config::new())?.run()?;
        let second = Simulator::new(link, &Config::new())?.run()?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn sim_qlog() -> Result<()> {
        let link = LinkConfig {
            duration: Duration::from_secs(2),
            ..LinkConfig::default()
        };
        let conf = Config::new();
        let mut file = tempfile::tempfile()?;

        let mut sim = Simulator::new(link, &conf)?;
        sim.set_qlog(
            Box::new(file.try_clone()?),
            "sim".to_string(),
            EventImportance::Extra,
            &conf,
        )?;
        sim.run()?;

        let mut log = String::new();
        file.rewind()?;
        file.read_to_string(&mut log)?;

        let mut lines = log.lines();
        let header = lines.next().unwrap_or_default();
        assert!(header.starts_with(r#" {"qlog_format":"JSON-SEQ","qlog_version":"0.4""#));
        assert!(log.contains("recovery:parameters_set"));
        assert!(log.contains("recovery:metrics_updated"));
        assert!(log.contains(r#""old":"startup","new":"drain","trigger":"bandwidth_plateau""#));
        assert!(log.contains("simulation_end"));

        for line in lines {
            let _: serde_json::Value = serde_json::from_str(line.trim())?;
        }
        Ok(())
    }

    #[test]
    fn sim_qlog_level() -> Result<()> {
        // Timeouts happen on this link, see sim_drops_and_timeouts.
        let link = LinkConfig {
            bandwidth: 100_000.0,
            buffer: 2000,
            duration: Duration::from_secs(5),
            ..LinkConfig::default()
        };
        let conf = dummy_config();

        let mut logs = Vec::new();
        for level in [EventImportance::Extra, EventImportance::Base] {
            let mut file = tempfile::tempfile()?;
            let mut sim = Simulator::new(link.clone(), &conf)?;
            sim.set_qlog(Box::new(file.try_clone()?), "sim".to_string(), level, &conf)?;
            let report = sim.run()?;
            assert!(report.cc_stats.timer_expiries > 0);

            let mut log = String::new();
            file.rewind()?;
            file.read_to_string(&mut log)?;
            logs.push(log);
        }

        assert!(logs[0].contains("recovery:timer_expired"));
        assert!(logs[0].contains("generic:marker"));

        assert!(!logs[1].contains("recovery:timer_expired"));
        assert!(!logs[1].contains("generic:marker"));
        assert!(logs[1].contains("recovery:parameters_set"));
        assert!(logs[1].contains("recovery:metrics_updated"));
        Ok(())
    }
}
