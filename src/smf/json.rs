//! JSON serialization types for parsed MIDI data

use super::event::MidiEvent;
use super::reader::{ParsedTrack, SmfHeader};
use serde::Serialize;

/// Top-level JSON structure for an SMF.
#[derive(Debug, Clone, Serialize)]
pub struct SmfJson {
    /// SMF format (0 or 1)
    pub format: u16,
    /// Ticks per quarter note
    pub division: u16,
    /// Parsed tracks
    pub tracks: Vec<TrackJson>,
}

/// JSON representation of one track.
#[derive(Debug, Clone, Serialize)]
pub struct TrackJson {
    /// Tick of the end-of-track marker
    pub end_tick: u64,
    /// Events in file order
    pub events: Vec<EventJson>,
}

/// JSON representation of one event.
#[derive(Debug, Clone, Serialize)]
pub struct EventJson {
    /// Absolute tick
    pub tick: u64,
    /// Event kind ("note_on", "note_off", "control", "pitch_bend", "sysex")
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bend: Option<i16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
}

impl SmfJson {
    pub fn new(header: &SmfHeader, tracks: &[ParsedTrack]) -> Self {
        Self {
            format: header.format,
            division: header.division,
            tracks: tracks
                .iter()
                .map(|track| TrackJson {
                    end_tick: track.end_tick,
                    events: track
                        .events
                        .iter()
                        .map(|timed| EventJson::new(timed.tick, &timed.event))
                        .collect(),
                })
                .collect(),
        }
    }
}

impl EventJson {
    fn new(tick: u64, event: &MidiEvent) -> Self {
        let mut json = Self {
            tick,
            kind: "",
            channel: None,
            note: None,
            velocity: None,
            controller: None,
            value: None,
            bend: None,
            data: Vec::new(),
        };
        match event {
            MidiEvent::NoteOn { channel, note, velocity } => {
                json.kind = "note_on";
                json.channel = Some(*channel);
                json.note = Some(*note);
                json.velocity = Some(*velocity);
            }
            MidiEvent::NoteOff { channel, note, velocity } => {
                json.kind = "note_off";
                json.channel = Some(*channel);
                json.note = Some(*note);
                json.velocity = Some(*velocity);
            }
            MidiEvent::Control { channel, controller, value } => {
                json.kind = "control";
                json.channel = Some(*channel);
                json.controller = Some(*controller);
                json.value = Some(*value);
            }
            MidiEvent::PitchBend { channel, bend } => {
                json.kind = "pitch_bend";
                json.channel = Some(*channel);
                json.bend = Some(*bend);
            }
            MidiEvent::Sysex { data } => {
                json.kind = "sysex";
                json.data = data.clone();
            }
        }
        json
    }
}
