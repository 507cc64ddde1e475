//! The contract between the driver and whatever decodes the demo.

use crate::events::{DemoEvent, Header};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("decoding failed at position {position}: {message}")]
    Decoding { position: u64, message: String },
    #[error("malformed recording: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("source has no header")]
    MissingHeader,
}

/// The result of advancing a source by one tick
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Step {
    pub events: Vec<DemoEvent>,
    pub has_more: bool,
}

pub trait EventSource: Send {
    /// Initial parse phase, reads the header and returns the events produced
    /// while doing so.
    fn open(&mut self) -> Result<Vec<DemoEvent>, SourceError>;

    /// Only available once [`EventSource::open`] succeeded
    fn header(&self) -> Option<&Header>;

    fn step(&mut self) -> Result<Step, SourceError>;

    /// Monotonically increasing, in the same unit as
    /// [`Header::playback_ticks`]
    fn position(&self) -> u64;

    /// Denominator of the driver's progress, defaults to
    /// [`Header::playback_ticks`]
    fn total(&self) -> u64 {
        self.header().map(|h| h.playback_ticks).unwrap_or(0)
    }
}

impl<S> EventSource for Box<S>
where
    S: EventSource + ?Sized,
{
    fn open(&mut self) -> Result<Vec<DemoEvent>, SourceError> {
        (**self).open()
    }

    fn header(&self) -> Option<&Header> {
        (**self).header()
    }

    fn step(&mut self) -> Result<Step, SourceError> {
        (**self).step()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn total(&self) -> u64 {
        (**self).total()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RecordedTick {
    pub tick: u64,
    pub events: Vec<DemoEvent>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Recording {
    pub header: Header,
    /// Events emitted while parsing the header, before the first tick
    #[serde(default)]
    pub preamble: Vec<DemoEvent>,
    pub ticks: Vec<RecordedTick>,
}

/// Replays a previously recorded event stream, one recorded tick per step.
#[derive(Debug)]
pub struct RecordedSource {
    recording: Recording,
    opened: bool,
    next: usize,
    position: u64,
}

impl RecordedSource {
    pub fn new(recording: Recording) -> Self {
        Self {
            recording,
            opened: false,
            next: 0,
            position: 0,
        }
    }

    pub fn from_json(buf: &[u8]) -> Result<Self, SourceError> {
        let recording: Recording = serde_json::from_slice(buf)?;
        Ok(Self::new(recording))
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }
}

impl EventSource for RecordedSource {
    fn open(&mut self) -> Result<Vec<DemoEvent>, SourceError> {
        self.opened = true;

        let mut events = Vec::with_capacity(self.recording.preamble.len() + 1);
        events.push(DemoEvent::HeaderParsed(self.recording.header.clone()));
        events.extend(self.recording.preamble.iter().cloned());
        Ok(events)
    }

    fn header(&self) -> Option<&Header> {
        self.opened.then_some(&self.recording.header)
    }

    fn step(&mut self) -> Result<Step, SourceError> {
        let tick = match self.recording.ticks.get(self.next) {
            Some(t) => t,
            None => return Ok(Step::default()),
        };

        if tick.tick < self.position {
            return Err(SourceError::Decoding {
                position: self.position,
                message: format!("tick {} goes backwards", tick.tick),
            });
        }

        self.next += 1;
        self.position = tick.tick;

        Ok(Step {
            events: tick.events.clone(),
            has_more: self.next < self.recording.ticks.len(),
        })
    }

    fn position(&self) -> u64 {
        self.position
    }
}
