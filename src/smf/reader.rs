//! Standard MIDI File parser
//!
//! Covers what the verification path needs: the header chunk, track chunks,
//! channel-voice messages (with running status), SysEx and meta events.
//! Voice messages the writer never produces (program change, aftertouch) are
//! decoded for their length and skipped.

use super::event::MidiEvent;
use super::vlq;
use super::writer::PITCH_WHEEL_CENTER;
use crate::error::{Error, Result};

/// Parsed header chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmfHeader {
    pub format: u16,
    pub track_count: u16,
    pub division: u16,
}

/// An event with its absolute tick.
#[derive(Debug, Clone)]
pub struct TimedEvent {
    pub tick: u64,
    pub event: MidiEvent,
}

/// A parsed track: events in file order plus the end-of-track tick.
#[derive(Debug, Clone, Default)]
pub struct ParsedTrack {
    pub events: Vec<TimedEvent>,
    pub end_tick: u64,
}

/// SMF byte-stream reader.
pub struct SmfReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SmfReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::SmfParse("unexpected end of data".into()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn peek_u8(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::SmfParse("unexpected end of data".into()))
    }

    fn read_u16_be(&mut self) -> Result<u16> {
        let hi = self.read_u8()? as u16;
        let lo = self.read_u8()? as u16;
        Ok((hi << 8) | lo)
    }

    fn read_u32_be(&mut self) -> Result<u32> {
        let hi = self.read_u16_be()? as u32;
        let lo = self.read_u16_be()? as u32;
        Ok((hi << 16) | lo)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::SmfParse("unexpected end of data".into()))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_vlq(&mut self) -> Result<u32> {
        let (value, used) = vlq::decode(&self.data[self.pos..])
            .ok_or_else(|| Error::SmfParse("bad variable-length quantity".into()))?;
        self.pos += used;
        Ok(value)
    }

    /// Parse the MThd chunk.
    pub fn parse_header(&mut self) -> Result<SmfHeader> {
        if self.read_bytes(4)? != b"MThd" {
            return Err(Error::SmfParse("missing MThd chunk".into()));
        }
        let length = self.read_u32_be()? as usize;
        if length < 6 {
            return Err(Error::SmfParse("header chunk too short".into()));
        }
        let header = SmfHeader {
            format: self.read_u16_be()?,
            track_count: self.read_u16_be()?,
            division: self.read_u16_be()?,
        };
        self.read_bytes(length - 6)?;
        Ok(header)
    }

    /// Parse one MTrk chunk.
    pub fn parse_track(&mut self) -> Result<ParsedTrack> {
        if self.read_bytes(4)? != b"MTrk" {
            return Err(Error::SmfParse("missing MTrk chunk".into()));
        }
        let length = self.read_u32_be()? as usize;
        let chunk_end = self
            .pos
            .checked_add(length)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::SmfParse("track chunk overruns file".into()))?;

        let mut track = ParsedTrack::default();
        let mut tick = 0u64;
        let mut running_status: Option<u8> = None;

        while self.pos < chunk_end {
            tick += u64::from(self.read_vlq()?);

            let status = if self.peek_u8()? & 0x80 != 0 {
                self.read_u8()?
            } else {
                running_status
                    .ok_or_else(|| Error::SmfParse("data byte without running status".into()))?
            };

            match status {
                0xF0 => {
                    running_status = None;
                    let len = self.read_vlq()? as usize;
                    let payload = self.read_bytes(len)?;
                    let mut data = Vec::with_capacity(len + 1);
                    data.push(0xF0);
                    data.extend_from_slice(payload);
                    track.events.push(TimedEvent { tick, event: MidiEvent::Sysex { data } });
                }
                0xF7 => {
                    // escape form: raw bytes, carried through as-is
                    running_status = None;
                    let len = self.read_vlq()? as usize;
                    let data = self.read_bytes(len)?.to_vec();
                    track.events.push(TimedEvent { tick, event: MidiEvent::Sysex { data } });
                }
                0xFF => {
                    running_status = None;
                    let kind = self.read_u8()?;
                    let len = self.read_vlq()? as usize;
                    self.read_bytes(len)?;
                    if kind == 0x2F {
                        track.end_tick = tick;
                        break;
                    }
                }
                _ => {
                    running_status = Some(status);
                    let channel = status & 0x0F;
                    match status & 0xF0 {
                        0x80 => {
                            let note = self.read_u8()?;
                            let velocity = self.read_u8()?;
                            track.events.push(TimedEvent {
                                tick,
                                event: MidiEvent::NoteOff { channel, note, velocity },
                            });
                        }
                        0x90 => {
                            let note = self.read_u8()?;
                            let velocity = self.read_u8()?;
                            track.events.push(TimedEvent {
                                tick,
                                event: MidiEvent::NoteOn { channel, note, velocity },
                            });
                        }
                        0xB0 => {
                            let controller = self.read_u8()?;
                            let value = self.read_u8()?;
                            track.events.push(TimedEvent {
                                tick,
                                event: MidiEvent::Control { channel, controller, value },
                            });
                        }
                        0xE0 => {
                            let lsb = u16::from(self.read_u8()?);
                            let msb = u16::from(self.read_u8()?);
                            let wire = i32::from(lsb | (msb << 7));
                            track.events.push(TimedEvent {
                                tick,
                                event: MidiEvent::PitchBend {
                                    channel,
                                    bend: (wire - PITCH_WHEEL_CENTER) as i16,
                                },
                            });
                        }
                        // two-data-byte messages we do not model
                        0xA0 => {
                            self.read_bytes(2)?;
                        }
                        // one-data-byte messages we do not model
                        0xC0 | 0xD0 => {
                            self.read_bytes(1)?;
                        }
                        _ => {
                            return Err(Error::SmfParse(format!(
                                "unexpected status byte 0x{:02X}",
                                status
                            )));
                        }
                    }
                }
            }
        }

        self.pos = chunk_end;
        Ok(track)
    }

    /// Parse the whole file: header plus every track it announces.
    pub fn parse(&mut self) -> Result<(SmfHeader, Vec<ParsedTrack>)> {
        let header = self.parse_header()?;
        let mut tracks = Vec::with_capacity(usize::from(header.track_count));
        for _ in 0..header.track_count {
            tracks.push(self.parse_track()?);
        }
        Ok((header, tracks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smf::Smf;

    #[test]
    fn test_round_trip() {
        let mut smf = Smf::new(0x7FFF, 2);
        smf.insert_control(0, 0, 0, 14, 0);
        smf.insert_pitch_bend(0, 0, 0, -147);
        smf.insert_note_on(0, 0, 0, 36, 0x7F);
        smf.insert_note_off(0, 512, 0, 36, 0x7F);
        smf.insert_sysex(1, 0, vec![0xF0, 0x0F, 0x01, 0xF7]);
        smf.set_track_end(0, 512);
        smf.set_track_end(1, 512);

        let bytes = smf.to_bytes();
        let (header, tracks) = SmfReader::new(&bytes).parse().unwrap();

        assert_eq!(header.format, 1);
        assert_eq!(header.track_count, 2);
        assert_eq!(header.division, 0x7FFF);

        assert_eq!(tracks[0].events.len(), 4);
        assert_eq!(tracks[0].end_tick, 512);
        assert!(matches!(
            tracks[0].events[1].event,
            MidiEvent::PitchBend { channel: 0, bend: -147 }
        ));
        assert_eq!(tracks[0].events[3].tick, 512);

        assert_eq!(tracks[1].events.len(), 1);
        assert!(matches!(
            &tracks[1].events[0].event,
            MidiEvent::Sysex { data } if data == &[0xF0, 0x0F, 0x01, 0xF7]
        ));
    }

    #[test]
    fn test_running_status() {
        // header + one track using running status for two note-ons
        let mut bytes = vec![];
        bytes.extend_from_slice(b"MThd");
        bytes.extend_from_slice(&6u32.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&96u16.to_be_bytes());
        let body: &[u8] = &[
            0x00, 0x90, 36, 0x7F, // note on with status
            0x10, 40, 0x7F, // running status note on
            0x00, 0xFF, 0x2F, 0x00,
        ];
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(body);

        let (header, tracks) = SmfReader::new(&bytes).parse().unwrap();
        assert_eq!(header.format, 0);
        assert_eq!(tracks[0].events.len(), 2);
        assert!(matches!(
            tracks[0].events[1].event,
            MidiEvent::NoteOn { note: 40, .. }
        ));
        assert_eq!(tracks[0].events[1].tick, 0x10);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(SmfReader::new(b"not a midi file").parse().is_err());
    }
}
