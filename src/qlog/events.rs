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

//! Concrete qlog event definitions for congestion control, following the
//! recovery events of draft-ietf-quic-qlog-quic-events-06.

use core::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::BbrStateMachine;
use crate::CongestionControlAlgorithm;
use crate::Config;
use crate::Error;
use crate::Result;

/// A timestamped congestion control event.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Event {
    /// The "time" field indicates the timestamp at which the event occurred.
    pub time: f32,

    /// The data field is a generic object. It contains the per-event metadata
    /// and its form and semantics are defined per specific sort of event.
    #[serde(flatten)]
    pub data: EventData,
}

impl Event {
    pub fn new(time: f32, data: EventData) -> Self {
        Event { time, data }
    }

    /// Return the importance of the event.
    pub fn importance(&self) -> EventImportance {
        self.data.importance()
    }
}


#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(tag = "name", content = "data")]
pub enum EventData {
    /// Initial congestion control parameters. They are typically set once and
    /// never change.
    #[serde(rename = "recovery:parameters_set")]
    RecoveryParametersSet {
        congestion_control: Option<String>,
        segment_size: Option<u64>,
        cwnd_gain: Option<f64>,
        startup_exit_segments: Option<u64>,
        probe_rtt_interval: Option<f32>,
        probe_rtt_duration: Option<f32>,
        probe_rtt_cwnd_segments: Option<u64>,
    },

    /// This event is emitted when one or more of the observable recovery
    /// metrics changes value. Rates are in bytes per second and RTTs in
    /// milliseconds.
    #[serde(rename = "recovery:metrics_updated")]
    RecoveryMetricsUpdated {
        min_rtt: Option<f32>,
        latest_rtt: Option<f32>,
        congestion_window: Option<u64>,
        pacing_rate: Option<f64>,
        bandwidth_estimate: Option<f64>,
        delivered_bytes: Option<u64>,
    },

    /// This event signifies when the congestion controller enters a
    /// significant new state and changes its behaviour.
    #[serde(rename = "recovery:congestion_state_updated")]
    RecoveryCongestionStateUpdated {
        old: Option<String>,
        new: String,
        trigger: Option<CongestionStateUpdatedTrigger>,
    },

    /// A delivery sample was dropped because it carried no bytes or no
    /// round-trip time.
    #[serde(rename = "recovery:delivery_sample_rejected")]
    RecoveryDeliverySampleRejected {
        delivered_bytes: u64,
        sample_rtt: f32,
    },

    /// A transport timer fired.
    #[serde(rename = "recovery:timer_expired")]
    RecoveryTimerExpired { timer_id: u64 },

    /// Used to indicate when specific emulation conditions are triggered at set
    /// times
    #[serde(rename = "generic:marker")]
    SimulationMarker {
        marker_type: String,
        message: Option<String>,
    },
}

impl EventData {
    /// Return importance of the concrete event.
    pub fn importance(&self) -> EventImportance {
        use crate::qlog::EventData::*;
        match *self {
            RecoveryParametersSet { .. } => EventImportance::Base,
            RecoveryMetricsUpdated { .. } => EventImportance::Core,
            RecoveryCongestionStateUpdated { .. } => EventImportance::Base,
            RecoveryDeliverySampleRejected { .. } => EventImportance::Base,
            RecoveryTimerExpired { .. } => EventImportance::Extra,
            SimulationMarker { .. } => EventImportance::Extra,
        }
    }

    /// Return the `recovery:parameters_set` event describing a configuration.
    pub fn parameters_set(conf: &Config) -> EventData {
        let name = match conf.congestion_control_algorithm {
            CongestionControlAlgorithm::Bbr => "bbr",
            CongestionControlAlgorithm::Dummy => "dummy",
        };
        let is_bbr = conf.congestion_control_algorithm == CongestionControlAlgorithm::Bbr;

        EventData::RecoveryParametersSet {
            congestion_control: Some(name.to_string()),
            segment_size: Some(conf.segment_size),
            cwnd_gain: is_bbr.then_some(conf.cwnd_gain),
            startup_exit_segments: is_bbr.then_some(conf.startup_exit_segments),
            probe_rtt_interval: is_bbr
                .then(|| conf.probe_rtt_interval.as_secs_f32() * 1000.0),
            probe_rtt_duration: is_bbr
                .then(|| conf.probe_rtt_duration.as_secs_f32() * 1000.0),
            probe_rtt_cwnd_segments: is_bbr.then_some(conf.probe_rtt_cwnd_segments),
        }
    }
}

/// An "importance indicator" in decreasing order of importance and expected
/// usage.
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub enum EventImportance {
    /// The "Core" events are the events that SHOULD be present in all qlog
    /// files for a given protocol.
    Core = 0,

    /// The "Base" events add additional debugging options and CAN be present
    /// in qlog files.
    Base = 1,

    /// The "Extra" events are considered mostly useful for low-level debugging
    /// of the implementation, rather than the protocol.
    Extra = 2,
}

impl EventImportance {
    /// Return true if this importance level is included by `other`.
    pub fn is_contained_in(&self, other: &EventImportance) -> bool {
        self <= other
    }
}

impl FromStr for EventImportance {
    type Err = Error;

    fn from_str(level: &str) -> Result<EventImportance> {
        if level.eq_ignore_ascii_case("core") {
            Ok(EventImportance::Core)
        } else if level.eq_ignore_ascii_case("base") {
            Ok(EventImportance::Base)
        } else if level.eq_ignore_ascii_case("extra") {
            Ok(EventImportance::Extra)
        } else {
            Err(Error::InvalidConfig(format!("unknown qlog level {}", level)))
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum CongestionStateUpdatedTrigger {
    /// Startup saw the window outgrow its exit threshold.
    BandwidthPlateau,

    /// Drain shrank the window down to the estimated BDP.
    QueueDrained,

    /// The ProbeRTT interval elapsed.
    ProbeRttInterval,

    /// ProbeRTT held the reduced window for long enough.
    ProbeRttDone,
}

impl CongestionStateUpdatedTrigger {
    /// Return the trigger of a BBR state transition.
    pub fn from_transition(old: BbrStateMachine, new: BbrStateMachine) -> Option<Self> {
        match (old, new) {
            (BbrStateMachine::Startup, BbrStateMachine::Drain) => Some(Self::BandwidthPlateau),
            (BbrStateMachine::Drain, BbrStateMachine::ProbeBW) => Some(Self::QueueDrained),
            (BbrStateMachine::ProbeBW, BbrStateMachine::ProbeRTT) => Some(Self::ProbeRttInterval),
            (BbrStateMachine::ProbeRTT, BbrStateMachine::ProbeBW) => Some(Self::ProbeRttDone),
            _ => None,
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn serialize_metrics_updated_event() {
        let event_data = EventData::RecoveryMetricsUpdated {
            min_rtt: Some(50.0),
            latest_rtt: None,
            congestion_window: Some(10000),
            pacing_rate: Some(100000.0),
            bandwidth_estimate: Some(100000.0),
            delivered_bytes: Some(5000),
        };

        let event = Event::new(1000.0, event_data);
        assert_eq!(event.importance(), EventImportance::Core);
        assert_eq!(
            serde_json::to_string_pretty(&event).unwrap(),
            r#"{
  "time": 1000.0,
  "name": "recovery:metrics_updated",
  "data": {
    "min_rtt": 50.0,
    "congestion_window": 10000,
    "pacing_rate": 100000.0,
    "bandwidth_estimate": 100000.0,
    "delivered_bytes": 5000
  }
}"#
        );
    }

    #[test]
    fn serialize_congestion_state_updated_event() {
        let old = BbrStateMachine::ProbeBW;
        let new = BbrStateMachine::ProbeRTT;
        let event = Event::new(
            10500.0,
            EventData::RecoveryCongestionStateUpdated {
                old: Some(old.to_string()),
                new: new.to_string(),
                trigger: CongestionStateUpdatedTrigger::from_transition(old, new),
            },
        );

        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"time":10500.0,"name":"recovery:congestion_state_updated","data":{"old":"probe_bw","new":"probe_rtt","trigger":"probe_rtt_interval"}}"#
        );

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn transition_triggers() {
        use BbrStateMachine::*;
        let cases = [
            (Startup, Drain, Some(CongestionStateUpdatedTrigger::BandwidthPlateau)),
            (Drain, ProbeBW, Some(CongestionStateUpdatedTrigger::QueueDrained)),
            (ProbeBW, ProbeRTT, Some(CongestionStateUpdatedTrigger::ProbeRttInterval)),
            (ProbeRTT, ProbeBW, Some(CongestionStateUpdatedTrigger::ProbeRttDone)),
            (Startup, ProbeRTT, None),
            (Drain, Drain, None),
        ];

        for (old, new, trigger) in cases {
            assert_eq!(
                CongestionStateUpdatedTrigger::from_transition(old, new),
                trigger
            );
        }
    }

    #[test]
    fn parameters_set_from_config() {
        let mut conf = Config::new();
        let json = serde_json::to_string(&EventData::parameters_set(&conf)).unwrap();
        assert_eq!(
            json,
            r#"{"name":"recovery:parameters_set","data":{"congestion_control":"bbr","segment_size":1000,"cwnd_gain":2.0,"startup_exit_segments":10,"probe_rtt_interval":10000.0,"probe_rtt_duration":200.0,"probe_rtt_cwnd_segments":4}}"#
        );

        conf.set_congestion_control_algorithm(CongestionControlAlgorithm::Dummy);
        let json = serde_json::to_string(&EventData::parameters_set(&conf)).unwrap();
        assert_eq!(
            json,
            r#"{"name":"recovery:parameters_set","data":{"congestion_control":"dummy","segment_size":1000}}"#
        );
    }

    #[test]
    fn event_importance() {
        assert!(EventImportance::Core.is_contained_in(&EventImportance::Base));
        assert!(EventImportance::Base.is_contained_in(&EventImportance::Base));
        assert!(!EventImportance::Extra.is_contained_in(&EventImportance::Base));

        let event = EventData::RecoveryTimerExpired { timer_id: 1 };
        assert_eq!(event.importance(), EventImportance::Extra);

        assert_eq!(EventImportance::from_str("core"), Ok(EventImportance::Core));
        assert_eq!(EventImportance::from_str("Base"), Ok(EventImportance::Base));
        assert_eq!(EventImportance::from_str("EXTRA"), Ok(EventImportance::Extra));
        assert!(matches!(
            EventImportance::from_str("verbose"),
            Err(Error::InvalidConfig(_))
        ));
    }
}
