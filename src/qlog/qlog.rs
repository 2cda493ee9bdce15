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

//! Streaming qlog output for congestion control events.
//!
//! A qlog file is a JSON text sequence: one header record describing the
//! trace, followed by one record per event. Event times are milliseconds
//! relative to the time origin of the writer.

use std::io::Write;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use self::events::Event;
use self::events::EventData;
use self::events::EventImportance;
use crate::Error;
use crate::Result;

/// Version of the qlog main schema the records follow.
pub const QLOG_VERSION: &str = "0.4";

/// Serialization format of the file.
pub const JSON_TEXT_SEQS: &str = "JSON-SEQ";

/// Header record of a qlog file.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QlogFileSeq {
    pub qlog_format: String,
    pub qlog_version: String,
    pub title: Option<String>,
    pub description: Option<String>,

    /// All events of the file belong to this trace.
    pub trace: TraceSeq,
}

/// Metadata of the trace carried by a file.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct TraceSeq {
    pub title: Option<String>,
    pub description: Option<String>,
    pub vantage_point: VantagePoint,
}

impl TraceSeq {
    pub fn new(
        title: Option<String>,
        description: Option<String>,
        vantage_point: VantagePoint,
    ) -> Self {
        TraceSeq {
            title,
            description,
            vantage_point,
        }
    }
}

/// Where the events of a trace are observed from.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct VantagePoint {
    pub name: Option<String>,

    pub r#type: VantagePointType,

    /// Side of the flow the events describe.
    pub flow: Option<VantagePointType>,
}

impl VantagePoint {
    /// Return a vantage point on the path, looking at the sending side of
    /// the flow.
    pub fn network(name: Option<String>) -> VantagePoint {
        Self {
            name,
            r#type: VantagePointType::Network,
            flow: Some(VantagePointType::Client),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum VantagePointType {
    /// The sender of the flow.
    Client,

    /// A point on the path between the endpoints.
    Network,
}

/// Writer of a qlog file, one record per line.
pub struct QlogWriter {
    header: QlogFileSeq,

    /// Events less important than this are skipped.
    level: EventImportance,

    writer: Box<dyn Write + Send + Sync>,

    /// Whether the header record was written.
    started: bool,

    /// Time origin of the events, as an offset from the caller's clock
    /// origin.
    start_time: Duration,
}

impl QlogWriter {
    pub fn new(
        title: Option<String>,
        description: Option<String>,
        trace: TraceSeq,
        level: EventImportance,
        writer: Box<dyn Write + Send + Sync>,
        start_time: Duration,
    ) -> Self {
        let header = QlogFileSeq {
            qlog_format: JSON_TEXT_SEQS.to_string(),
            qlog_version: QLOG_VERSION.to_string(),
            title,
            description,
            trace,
        };

        QlogWriter {
            header,
            level,
            writer,
            started: false,
            start_time,
        }
    }

    /// Write the header record. It can only be written once.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::Done);
        }

        let header = self.header.clone();
        self.write_record(&header)?;
        self.started = true;
        Ok(())
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        if !self.started {
            return Err(Error::InvalidState("qlog not started".into()));
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Write an event. Return `Error::Done` if the event is below the level
    /// of the writer.
    pub fn add_event(&mut self, event: Event) -> Result<()> {
        if !self.started {
            return Err(Error::InvalidState("qlog not started".into()));
        }
        if !event.importance().is_contained_in(&self.level) {
            return Err(Error::Done);
        }

        self.write_record(&event)
    }

    /// Write an event that happened at `time`.
    pub fn add_event_data(&mut self, time: Duration, event_data: EventData) -> Result<()> {
        let event = Event::new(self.relative_time(time), event_data);
        self.add_event(event)
    }

    /// Return the milliseconds elapsed from the time origin to `time`.
    pub fn relative_time(&self, time: Duration) -> f32 {
        time.saturating_sub(self.start_time).as_secs_f32() * 1000.0
    }

    fn write_record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        self.writer.write_all(b" ")?;
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::io::Seek;

    fn new_trace_seq() -> TraceSeq {
        TraceSeq::new(
            Some("qlog trace".to_string()),
            Some("qlog trace description".to_string()),
            VantagePoint::network(Some("bottleneck".to_string())),
        )
    }

    fn new_state_event(old: &str, new: &str) -> EventData {
        EventData::RecoveryCongestionStateUpdated {
            old: Some(old.to_string()),
            new: new.to_string(),
            trigger: None,
        }
    }

    #[test]
    fn qlog_writer_operations() -> Result<()> {
        let file = tempfile::tempfile()?;
        let mut reader = file.try_clone()?;
        let mut qlog_writer = QlogWriter::new(
            Some("title".to_string()),
            Some("description".to_string()),
            new_trace_seq(),
            EventImportance::Base,
            Box::new(file),
            Duration::from_secs(1),
        );

        // Nothing can be written before the header.
        let event1 = Event::new(0.0, new_state_event("startup", "drain"));
        assert!(matches!(
            qlog_writer.add_event(event1.clone()),
            Err(Error::InvalidState(_))
        ));
        assert!(qlog_writer.flush().is_err());

        qlog_writer.start()?;
        assert_eq!(qlog_writer.start(), Err(Error::Done));

        qlog_writer.add_event(event1)?;

        // Extra events are below the Base level.
        let event2 = EventData::RecoveryTimerExpired { timer_id: 3 };
        assert_eq!(
            qlog_writer.add_event_data(Duration::from_secs(2), event2),
            Err(Error::Done)
        );

        let event3 = new_state_event("drain", "probe_bw");
        qlog_writer.add_event_data(Duration::from_millis(1500), event3)?;
        qlog_writer.flush()?;

        let mut log = String::new();
        reader.rewind()?;
        reader.read_to_string(&mut log)?;

        assert_eq!(
            log,
            r#" {"qlog_format":"JSON-SEQ","qlog_version":"0.4","title":"title","description":"description","trace":{"title":"qlog trace","description":"qlog trace description","vantage_point":{"name":"bottleneck","type":"network","flow":"client"}}}
 {"time":0.0,"name":"recovery:congestion_state_updated","data":{"old":"startup","new":"drain"}}
 {"time":500.0,"name":"recovery:congestion_state_updated","data":{"old":"drain","new":"probe_bw"}}
"#
        );

        Ok(())
    }

    #[test]
    fn qlog_core_level() -> Result<()> {
        let mut qlog_writer = QlogWriter::new(
            None,
            None,
            new_trace_seq(),
            EventImportance::Core,
            Box::new(std::io::sink()),
            Duration::ZERO,
        );
        qlog_writer.start()?;

        let metrics = EventData::RecoveryMetricsUpdated {
            min_rtt: Some(50.0),
            latest_rtt: Some(52.0),
            congestion_window: Some(10000),
            pacing_rate: None,
            bandwidth_estimate: None,
            delivered_bytes: Some(1000),
        };
        qlog_writer.add_event_data(Duration::from_millis(10), metrics)?;
        assert_eq!(
            qlog_writer.add_event_data(Duration::from_millis(20), new_state_event("startup", "drain")),
            Err(Error::Done)
        );
        Ok(())
    }

    #[test]
    fn qlog_relative_time() {
        let qlog_writer = QlogWriter::new(
            None,
            None,
            new_trace_seq(),
            EventImportance::Extra,
            Box::new(std::io::sink()),
            Duration::from_millis(100),
        );

        assert_eq!(qlog_writer.relative_time(Duration::from_millis(350)), 250.0);

        // Times before the origin are clamped.
        assert_eq!(qlog_writer.relative_time(Duration::from_millis(10)), 0.0);
    }

    #[test]
    fn qlog_writer_io_error() {
        struct BrokenWriter;

        impl std::io::Write for BrokenWriter {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut qlog_writer = QlogWriter::new(
            None,
            None,
            new_trace_seq(),
            EventImportance::Base,
            Box::new(BrokenWriter),
            Duration::ZERO,
        );
        assert!(matches!(qlog_writer.start(), Err(Error::IoError(_))));
    }
}

pub mod events;
