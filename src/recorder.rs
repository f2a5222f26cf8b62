//! Session recorder
//!
//! Append-only log of everything the participant experiences, flushed once
//! to the data server when the session ends.
//!
//! Lifecycle: `Idle` → `begin` → `Active` → `end` → `Finished` → `send` →
//! `Flushed`. Out-of-order calls are programmer errors and each returns its
//! own `RecorderError`.

use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;

use crate::sim::EntityId;
use crate::sim::clock::Clock;
use crate::transport::{Completion, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecorderError {
    #[error("data recorder is not active")]
    NotActive,
    #[error("data recorder already started")]
    AlreadyStarted,
    #[error("data recorder already stopped")]
    AlreadyEnded,
    #[error("session data already sent")]
    AlreadySent,
}

/// Where the recorder is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Active,
    Finished,
    /// Terminal
    Flushed,
}

/// Type-specific part of a record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordKind {
    /// The ball changed hands
    Throw {
        from: Option<EntityId>,
        to: EntityId,
        from_name: Option<String>,
        to_name: String,
    },
    /// Mind-wandering self-report; `None` if the probe timed out
    Probe { report: Option<u8> },
    /// Pointer-down on the canvas
    Click {
        x: f32,
        y: f32,
        target: Option<EntityId>,
    },
    /// Counts synthesized at send time
    Summary {
        throws: usize,
        probes: usize,
        participant_throw_fraction: f64,
    },
}

/// One entry in the session log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub condition: String,
    /// Milliseconds since `begin`
    pub time: u64,
    pub id: String,
    #[serde(flatten)]
    pub kind: RecordKind,
}

/// Body of the POST to the data server
#[derive(Debug, Clone, Serialize)]
pub struct SessionPayload {
    pub id: String,
    pub condition: String,
    pub started: u64,
    pub finished: u64,
    pub elapsed: u64,
    pub data: Vec<Record>,
}

pub struct Recorder {
    id: String,
    condition: String,
    url: Option<String>,
    clock: Rc<dyn Clock>,
    data: Vec<Record>,
    started: Option<u64>,
    finished: Option<u64>,
    flushed: bool,
    /// Participant to compute the summary for, if enabled
    summary_for: Option<EntityId>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("id", &self.id)
            .field("condition", &self.condition)
            .field("state", &self.state())
            .field("records", &self.data.len())
            .finish()
    }
}

impl Recorder {
    pub fn new(
        id: impl Into<String>,
        condition: impl Into<String>,
        url: Option<String>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            id: id.into(),
            condition: condition.into(),
            url,
            clock,
            data: Vec::new(),
            started: None,
            finished: None,
            flushed: false,
            summary_for: None,
        }
    }

    /// Prefix the sent log with a summary computed for `participant`
    pub fn enable_summary(&mut self, participant: EntityId) {
        self.summary_for = Some(participant);
    }

    pub fn state(&self) -> RecorderState {
        match (self.started, self.finished, self.flushed) {
            (_, _, true) => RecorderState::Flushed,
            (None, _, _) => RecorderState::Idle,
            (Some(_), None, _) => RecorderState::Active,
            (Some(_), Some(_), _) => RecorderState::Finished,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == RecorderState::Active
    }

    pub fn records(&self) -> &[Record] {
        &self.data
    }

    /// Start recording and capture the start time
    pub fn begin(&mut self) -> Result<(), RecorderError> {
        if self.started.is_some() {
            return Err(RecorderError::AlreadyStarted);
        }
        self.started = Some(self.clock.now_ms());
        log::debug!("Recorder started for {}", self.id);
        Ok(())
    }

    /// Append an event stamped with the time since `begin`
    pub fn record(&mut self, kind: RecordKind) -> Result<(), RecorderError> {
        let Some(started) = self.started.filter(|_| self.is_active()) else {
            return Err(RecorderError::NotActive);
        };
        let time = self.clock.now_ms().saturating_sub(started);
        self.data.push(Record {
            condition: self.condition.clone(),
            time,
            id: self.id.clone(),
            kind,
        });
        Ok(())
    }

    /// Stop recording and capture the end time
    pub fn end(&mut self) -> Result<(), RecorderError> {
        match self.state() {
            RecorderState::Idle => Err(RecorderError::NotActive),
            RecorderState::Active => {
                self.finished = Some(self.clock.now_ms());
                log::debug!("Recorder stopped with {} records", self.data.len());
                Ok(())
            }
            RecorderState::Finished | RecorderState::Flushed => Err(RecorderError::AlreadyEnded),
        }
    }

    /// Summary over the records so far
    pub fn summary(&self, participant: EntityId) -> RecordKind {
        let mut throws = 0;
        let mut from_participant = 0;
        let mut probes = 0;
        for record in &self.data {
            match &record.kind {
                // The opening assignment has no thrower and is not a throw
                RecordKind::Throw { from: Some(from), .. } => {
                    throws += 1;
                    if *from == participant {
                        from_participant += 1;
                    }
                }
                RecordKind::Probe { .. } => probes += 1,
                _ => {}
            }
        }
        let participant_throw_fraction = if throws == 0 {
            0.0
        } else {
            from_participant as f64 / throws as f64
        };
        RecordKind::Summary {
            throws,
            probes,
            participant_throw_fraction,
        }
    }

    /// The document `send` transmits. Only meaningful once finished.
    pub fn payload(&self) -> Result<SessionPayload, RecorderError> {
        let (Some(started), Some(finished)) = (self.started, self.finished) else {
            return Err(RecorderError::NotActive);
        };

        let mut data = Vec::with_capacity(self.data.len() + 1);
        if let Some(participant) = self.summary_for {
            data.push(Record {
                condition: self.condition.clone(),
                time: finished.saturating_sub(started),
                id: self.id.clone(),
                kind: self.summary(participant),
            });
        }
        data.extend(self.data.iter().cloned());

        Ok(SessionPayload {
            id: self.id.clone(),
            condition: self.condition.clone(),
            started,
            finished,
            elapsed: finished.saturating_sub(started),
            data,
        })
    }

    /// End the session if needed and transmit the log exactly once.
    ///
    /// `done` fires when the transmission settles, whatever the outcome.
    /// Failures are logged, never retried.
    pub fn send(
        &mut self,
        transport: &dyn Transport,
        done: Option<Completion>,
    ) -> Result<(), RecorderError> {
        match self.state() {
            RecorderState::Flushed => return Err(RecorderError::AlreadySent),
            RecorderState::Idle => return Err(RecorderError::NotActive),
            RecorderState::Active => self.end()?,
            RecorderState::Finished => {}
        }
        let payload = self.payload()?;
        self.flushed = true;

        let settle: Completion = Box::new(move |result: Result<(), TransportError>| {
            match &result {
                Ok(()) => log::info!("Session data delivered"),
                Err(e) => log::warn!("Session data delivery failed: {e}"),
            }
            if let Some(done) = done {
                done(result);
            }
        });

        let Some(url) = self.url.as_deref() else {
            settle(Err(TransportError::NoEndpoint));
            return Ok(());
        };
        match serde_json::to_value(&payload) {
            Ok(body) => transport.post_json(url, body, settle),
            Err(e) => settle(Err(TransportError::from(e))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::clock::ManualClock;
    use crate::transport::MemoryTransport;
    use std::cell::Cell;

    fn recorder(clock: &ManualClock) -> Recorder {
        Recorder::new(
            "p-17",
            "2",
            Some("http://localhost/data".into()),
            Rc::new(clock.clone()),
        )
    }

    fn throw(from: Option<u32>, to: u32) -> RecordKind {
        RecordKind::Throw {
            from: from.map(EntityId),
            to: EntityId(to),
            from_name: from.map(|f| format!("Player {f}")),
            to_name: format!("Player {to}"),
        }
    }

    #[test]
    fn test_record_before_begin_fails() {
        let clock = ManualClock::new(0);
        let mut rec = recorder(&clock);
        assert_eq!(rec.record(throw(None, 1)), Err(RecorderError::NotActive));
        assert_eq!(rec.end(), Err(RecorderError::NotActive));
    }

    #[test]
    fn test_lifecycle_guards() {
        let clock = ManualClock::new(1_000);
        let mut rec = recorder(&clock);
        rec.begin().unwrap();
        assert_eq!(rec.begin(), Err(RecorderError::AlreadyStarted));

        clock.advance(250);
        rec.record(throw(None, 1)).unwrap();
        assert_eq!(rec.records()[0].time, 250);

        rec.end().unwrap();
        assert_eq!(rec.record(throw(Some(1), 2)), Err(RecorderError::NotActive));
        assert_eq!(rec.end(), Err(RecorderError::AlreadyEnded));
        assert_eq!(rec.state(), RecorderState::Finished);
    }

    #[test]
    fn test_send_ends_and_flushes_once() {
        let clock = ManualClock::new(5_000);
        let transport = MemoryTransport::new();
        let mut rec = recorder(&clock);
        rec.begin().unwrap();
        clock.advance(1_200);
        rec.record(throw(None, 0)).unwrap();
        clock.advance(800);

        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        rec.send(&transport, Some(Box::new(move |_| counter.set(counter.get() + 1))))
            .unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(rec.state(), RecorderState::Flushed);
        assert_eq!(rec.send(&transport, None), Err(RecorderError::AlreadySent));
        assert_eq!(rec.record(throw(None, 0)), Err(RecorderError::NotActive));

        let sent = transport.deliveries();
        assert_eq!(sent.len(), 1);
        let body = &sent[0].body;
        assert_eq!(body["elapsed"], 2_000);
        assert_eq!(body["started"], 5_000);
        assert_eq!(body["finished"], 7_000);
        assert_eq!(body["data"][0]["type"], "throw");
        assert_eq!(body["data"][0]["time"], 1_200);
        assert_eq!(body["data"][0]["id"], "p-17");
    }

    #[test]
    fn test_summary_prefix() {
        let clock = ManualClock::new(0);
        let transport = MemoryTransport::new();
        let mut rec = recorder(&clock);
        rec.enable_summary(EntityId(0));
        rec.begin().unwrap();
        rec.record(throw(None, 0)).unwrap();
        rec.record(throw(Some(0), 1)).unwrap();
        rec.record(throw(Some(1), 2)).unwrap();
        rec.record(RecordKind::Probe { report: Some(1) }).unwrap();
        rec.send(&transport, None).unwrap();

        let body = &transport.deliveries()[0].body;
        let summary = &body["data"][0];
        assert_eq!(summary["type"], "summary");
        assert_eq!(summary["throws"], 2);
        assert_eq!(summary["probes"], 1);
        let fraction = summary["participant_throw_fraction"].as_f64().unwrap();
        assert!((fraction - 0.5).abs() < 1e-9);
        assert_eq!(body["data"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_failed_delivery_still_completes() {
        let clock = ManualClock::new(0);
        let transport = MemoryTransport::failing();
        let mut rec = recorder(&clock);
        rec.begin().unwrap();
        let settled = Rc::new(Cell::new(false));
        let flag = Rc::clone(&settled);
        rec.send(&transport, Some(Box::new(move |r| flag.set(r.is_err()))))
            .unwrap();
        assert!(settled.get());
        assert_eq!(rec.state(), RecorderState::Flushed);
    }

    #[test]
    fn test_send_without_endpoint_settles() {
        let clock = ManualClock::new(0);
        let transport = MemoryTransport::new();
        let mut rec = Recorder::new("p", "1", None, Rc::new(clock.clone()));
        rec.begin().unwrap();
        let settled = Rc::new(Cell::new(false));
        let flag = Rc::clone(&settled);
        rec.send(&transport, Some(Box::new(move |r| {
            flag.set(matches!(r, Err(TransportError::NoEndpoint)))
        })))
        .unwrap();
        assert!(settled.get());
        assert_eq!(transport.count(), 0);
    }
}
