//! APU register stream to MIDI translation
//!
//! The translator walks a time-ordered list of register writes captured from
//! an emulator, mirrors them into a model of the chip's four channels, and
//! emits note, controller, pitch-wheel and SysEx events onto a shared MIDI
//! timeline. Each channel maps to its own track and MIDI channel; register
//! fields map to the controller numbers in [`cc`].

pub mod bits;
pub mod pitch;
pub mod state;
pub mod wave;

use crate::error::Result;
use crate::smf::Smf;
use bits::{extract, max_of};
use pitch::{build_noise_table, note_and_bend};
use state::{combine, ApuState, Slot};
use std::path::Path;
use wave::WavetableSet;

/// One APU register write captured from the emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegWrite {
    /// Source time units (chip cycles) since the start of the song.
    pub time: u64,
    /// Register address relative to 0xFF00.
    pub address: u8,
    /// Byte written.
    pub value: u8,
}

/// MIDI controller numbers the translator emits.
pub mod cc {
    /// Envelope start volume / wave output level
    pub const VOLUME: u8 = 7;
    /// Pan mute (0x7F = muted)
    pub const PAN_MUTE: u8 = 9;
    /// Pan position (0 = left, 64 = center, 127 = right)
    pub const PANPOT: u8 = 10;
    /// Envelope direction
    pub const ENV_DIRECTION: u8 = 12;
    /// Envelope period
    pub const ENV_PERIOD: u8 = 13;
    /// Sound-length enable
    pub const SOUND_LEN_ENABLE: u8 = 14;
    /// Sound length
    pub const SOUND_LEN: u8 = 15;
    /// Sweep speed
    pub const SWEEP_SPEED: u8 = 16;
    /// Sweep shift
    pub const SWEEP_SHIFT: u8 = 17;
    /// Sweep direction
    pub const SWEEP_DIRECTION: u8 = 18;
    /// Duty cycle
    pub const DUTY: u8 = 19;
    /// Noise mode (long/short)
    pub const NOISE_MODE: u8 = 20;
    /// Active wavetable index
    pub const WAVETABLE: u8 = 21;
    /// Legato switch
    pub const LEGATO: u8 = 68;
}

/// Game Boy master clock in Hz.
pub const GB_CLOCK: u32 = 0x40_0000;

/// Default MIDI division. High, so that tick rounding error stays small and
/// the song is easy to edit afterwards.
pub const DEFAULT_PPQN: u16 = 0x7FFF;

/// One track (and MIDI channel) per APU channel.
pub const TRACK_COUNT: usize = 4;

/// Track carrying the wave channel and its SysEx wavetable dump.
const WAVE_TRACK: usize = 2;

const MIDI_BPM: u64 = 120;
const MIDI_CC_MAX: u8 = 0x7F;
const NOTE_VELOCITY: u8 = 0x7F;

/// The chip's length counter ticks at 256 Hz.
const SOUND_LEN_HZ: u64 = 256;

/// Translation knobs.
#[derive(Debug, Clone, Copy)]
pub struct TranslateConfig {
    /// MIDI ticks per quarter note.
    pub ppqn: u16,
    /// Source time units per second.
    pub time_units_per_second: u32,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            ppqn: DEFAULT_PPQN,
            time_units_per_second: GB_CLOCK,
        }
    }
}

/// Chip-time to MIDI-tick conversion, with seconds as the intermediate.
#[derive(Debug, Clone, Copy)]
struct TimeMap {
    units_per_second: u32,
    ticks_per_second: u64,
    ticks_per_len_tick: u64,
}

impl TimeMap {
    fn new(config: &TranslateConfig) -> Self {
        let ticks_per_second = u64::from(config.ppqn) * MIDI_BPM / 60;
        Self {
            units_per_second: config.time_units_per_second,
            ticks_per_second,
            ticks_per_len_tick: (ticks_per_second as f64 / SOUND_LEN_HZ as f64).round() as u64,
        }
    }

    fn midi_tick(&self, time: u64) -> u64 {
        let seconds = time as f64 / f64::from(self.units_per_second);
        (seconds * self.ticks_per_second as f64).round() as u64
    }
}

/// Register-stream to MIDI translator.
///
/// One call translates one song; no state survives between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct Translator {
    config: TranslateConfig,
}

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TranslateConfig) -> Self {
        Self { config }
    }

    /// Translate a register-write list and write the MIDI file.
    pub fn translate(&self, writes: &[RegWrite], output: &Path) -> Result<()> {
        self.translate_to_smf(writes).write_file(output)
    }

    /// Translate a register-write list into an in-memory MIDI file.
    pub fn translate_to_smf(&self, writes: &[RegWrite]) -> Smf {
        let mut song = Song::new(writes, &self.config);
        song.run();
        song.finish()
    }
}

/// Per-song translation context: the chip mirror, the per-channel playback
/// bookkeeping, and the MIDI file under construction.
struct Song<'a> {
    writes: &'a [RegWrite],
    clock: TimeMap,
    state: ApuState,
    smf: Smf,
    /// Note number of the note currently sounding on each channel.
    current_note: [Option<u8>; TRACK_COUNT],
    /// Whether legato (CC 68) is currently switched on per channel.
    legato: [bool; TRACK_COUNT],
    /// MIDI tick at which each channel's length counter runs out.
    scheduled_end: [u64; TRACK_COUNT],
    waves: WavetableSet,
    /// Most recently announced wavetable index (CC 21).
    announced_wave: Option<usize>,
    noise_pitches: Vec<u8>,
    ticks_passed: u64,
}

impl<'a> Song<'a> {
    fn new(writes: &'a [RegWrite], config: &TranslateConfig) -> Self {
        Self {
            writes,
            clock: TimeMap::new(config),
            state: ApuState::default(),
            smf: Smf::new(config.ppqn, TRACK_COUNT),
            current_note: [None; TRACK_COUNT],
            legato: [false; TRACK_COUNT],
            scheduled_end: [0; TRACK_COUNT],
            waves: WavetableSet::new(),
            announced_wave: None,
            noise_pitches: build_noise_table(),
            ticks_passed: 0,
        }
    }

    fn run(&mut self) {
        for index in 0..self.writes.len() {
            let write = self.writes[index];
            let tick = self.clock.midi_tick(write.time);
            self.expire_sound_lengths(tick);
            self.dispatch(index, tick, write);
            self.ticks_passed = self.ticks_passed.max(tick);
        }
    }

    fn finish(mut self) -> Smf {
        // retire anything still ringing so no note outlasts the song
        for channel in 0..TRACK_COUNT {
            if let Some(note) = self.current_note[channel].take() {
                self.smf.insert_note_off(
                    channel,
                    self.ticks_passed,
                    channel as u8,
                    note,
                    NOTE_VELOCITY,
                );
            }
        }
        self.smf.insert_sysex(WAVE_TRACK, 0, self.waves.to_sysex());
        for track in 0..TRACK_COUNT {
            self.smf.set_track_end(track, self.ticks_passed);
        }
        self.smf
    }

    /// Retire notes whose length counter has run out. The cutoff is only
    /// observed when the stream yields the next write, so the note-off lands
    /// at that write's tick rather than at the exact expiry.
    fn expire_sound_lengths(&mut self, tick: u64) {
        for channel in 0..TRACK_COUNT {
            if self.scheduled_end[channel] <= tick
                && self.state.common(channel).sound_length_enable.value == 1
            {
                if let Some(note) = self.current_note[channel].take() {
                    self.smf
                        .insert_note_off(channel, tick, channel as u8, note, NOTE_VELOCITY);
                }
            }
        }
    }

    fn dispatch(&mut self, index: usize, tick: u64, write: RegWrite) {
        let channel = usize::from(write.address.saturating_sub(0x10) / 5);
        let value = write.value;
        match 0xFF00u16 + u16::from(write.address) {
            0xFF10 => {
                let sq1 = &mut self.state.square1;
                common_write(
                    &mut self.smf,
                    tick,
                    channel as u8,
                    value,
                    &mut [
                        (&mut sq1.sweep_speed, (6, 4), cc::SWEEP_SPEED),
                        (&mut sq1.sweep_direction, (3, 3), cc::SWEEP_DIRECTION),
                        (&mut sq1.sweep_shift, (2, 0), cc::SWEEP_SHIFT),
                    ],
                );
            }
            0xFF11 | 0xFF16 => self.duty_and_length(tick, channel, value),
            0xFF12 | 0xFF17 | 0xFF21 => self.envelope(tick, channel, value),
            0xFF13 | 0xFF18 | 0xFF1D => self.pitch_lsb(index, tick, channel, value),
            0xFF14 | 0xFF19 | 0xFF1E | 0xFF23 => self.pitch_msb_trigger(index, tick, channel, value),
            0xFF1A => self.wave_dac(tick, value),
            0xFF1B => {
                let wav = &mut self.state.wave;
                common_write(
                    &mut self.smf,
                    tick,
                    channel as u8,
                    value,
                    &mut [(&mut wav.common.sound_length, (7, 0), cc::SOUND_LEN)],
                );
            }
            0xFF1C => self.wave_volume(tick, value),
            0xFF20 => {
                let noise = &mut self.state.noise;
                common_write(
                    &mut self.smf,
                    tick,
                    channel as u8,
                    value,
                    &mut [(&mut noise.common.sound_length, (5, 0), cc::SOUND_LEN)],
                );
            }
            0xFF22 => {
                let noise = &mut self.state.noise;
                common_write(
                    &mut self.smf,
                    tick,
                    channel as u8,
                    value,
                    &mut [(&mut noise.mode, (3, 3), cc::NOISE_MODE)],
                );
                // pitch only takes effect when the channel is triggered
                noise.pitch.set(value & 0xF7);
            }
            0xFF25 => self.panning(tick, value),
            0xFF30..=0xFF3F => self.wave_ram(write.address, value),
            _ => {}
        }
    }

    fn duty_and_length(&mut self, tick: u64, channel: usize, value: u8) {
        if let Some((duty, length)) = self.state.square_mut(channel) {
            common_write(
                &mut self.smf,
                tick,
                channel as u8,
                value,
                &mut [
                    (duty, (7, 6), cc::DUTY),
                    (length, (5, 0), cc::SOUND_LEN),
                ],
            );
        }
    }

    fn envelope(&mut self, tick: u64, channel: usize, value: u8) {
        if let Some(env) = self.state.envelope_mut(channel) {
            common_write(
                &mut self.smf,
                tick,
                channel as u8,
                value,
                &mut [
                    (&mut env.start_vol, (7, 4), cc::VOLUME),
                    (&mut env.direction, (3, 3), cc::ENV_DIRECTION),
                    (&mut env.period, (2, 0), cc::ENV_PERIOD),
                ],
            );
        }
    }

    /// NRx3: low eight period bits. Bends the running note when the other
    /// half of the period is already known.
    fn pitch_lsb(&mut self, index: usize, tick: u64, channel: usize, value: u8) {
        let Some(pitch) = self.state.melodic(channel) else {
            return;
        };
        if pitch.msb.known {
            let cur = combine(pitch.msb.value, value);
            self.pitch_bend(index, tick, channel, cur, pitch.pitch());
        }
        if let Some(pitch) = self.state.melodic_mut(channel) {
            pitch.lsb.set(value);
        }
    }

    /// NRx4: length-enable, trigger, and (on melodic channels) the top three
    /// period bits.
    fn pitch_msb_trigger(&mut self, index: usize, tick: u64, channel: usize, value: u8) {
        {
            let common = self.state.common_mut(channel);
            common_write(
                &mut self.smf,
                tick,
                channel as u8,
                value,
                &mut [(&mut common.sound_length_enable, (6, 6), cc::SOUND_LEN_ENABLE)],
            );
        }

        let trigger = extract(value, 7, 7) == 1;
        let melodic = self.state.melodic(channel);

        if trigger {
            let common = *self.state.common(channel);
            if common.sound_length_enable.value == 1
                && common.sound_length_enable.known
                && common.sound_length.known
            {
                let len_max: u64 = if channel == WAVE_TRACK { 256 } else { 64 };
                let remaining = len_max - u64::from(common.sound_length.value);
                // retriggering before the cutoff arrives overwrites it, so a
                // channel only goes silent if it really runs out
                self.scheduled_end[channel] = tick + remaining * self.clock.ticks_per_len_tick;
            }

            if self.legato[channel] {
                self.smf
                    .insert_control(channel, tick, channel as u8, cc::LEGATO, 0);
                self.legato[channel] = false;
            }

            let (note, prev_pitch) = match melodic {
                Some(pitch) => {
                    let cur = combine(value & 0b111, pitch.lsb.value);
                    let (note, bend) = note_and_bend(cur);
                    self.smf.insert_pitch_bend(channel, tick, channel as u8, bend);
                    (note, pitch.pitch())
                }
                None => {
                    let cur = self.state.noise.pitch.value;
                    (self.noise_note(cur), u16::from(cur))
                }
            };
            self.insert_note(index, tick, channel, note, prev_pitch);
        } else if let Some(pitch) = melodic {
            if pitch.lsb.known {
                let cur = combine(value & 0b111, pitch.lsb.value);
                self.pitch_bend(index, tick, channel, cur, pitch.pitch());
            }
        }

        if let Some(pitch) = self.state.melodic_mut(channel) {
            pitch.msb.set(value & 0b111);
        }
    }

    /// Pitch moved without a retrigger: bend the wheel and, when the bend
    /// crosses into another semitone slot, restart the note with legato on.
    fn pitch_bend(&mut self, index: usize, tick: u64, channel: usize, cur: u16, prev: u16) {
        if cur == prev {
            return;
        }
        let (note, bend) = note_and_bend(cur);
        self.smf.insert_pitch_bend(channel, tick, channel as u8, bend);
        if self.current_note[channel] != Some(note) {
            self.insert_note(index, tick, channel, note, prev);
            if !self.legato[channel] {
                self.smf
                    .insert_control(channel, tick, channel as u8, cc::LEGATO, 0x7F);
                self.legato[channel] = true;
            }
        }
    }

    /// Retire the current note and start `note`, unless a same-tick pitch
    /// or trigger write on this channel follows in the stream. Writes at one
    /// chip cycle commonly re-specify a pitch in halves; only the last
    /// writer gets to start the note, which keeps identical overlapping
    /// notes out of the file.
    fn insert_note(&mut self, index: usize, tick: u64, channel: usize, note: u8, prev_pitch: u16) {
        if self.suppressed_by_lookahead(index, tick, channel, prev_pitch) {
            return;
        }
        if let Some(playing) = self.current_note[channel].take() {
            self.smf
                .insert_note_off(channel, tick, channel as u8, playing, NOTE_VELOCITY);
        }
        self.smf
            .insert_note_on(channel, tick, channel as u8, note, NOTE_VELOCITY);
        self.current_note[channel] = Some(note);
    }

    /// Constant-window lookahead over same-tick writes. Only the first
    /// pitch/trigger write on the same channel decides; other same-tick
    /// writes are skipped.
    fn suppressed_by_lookahead(
        &self,
        index: usize,
        tick: u64,
        channel: usize,
        prev_pitch: u16,
    ) -> bool {
        let base = channel as u8 * 5 + 0x10;
        for write in &self.writes[index + 1..] {
            if self.clock.midi_tick(write.time) != tick {
                break;
            }
            if write.address != base + 3 && write.address != base + 4 {
                continue;
            }
            if channel == 3 {
                return true;
            }
            // simulate the upcoming write's effect on the channel pitch;
            // only an actual note change (or a retrigger) suppresses
            let mut next_trigger = false;
            let next_pitch = if write.address == base + 3 {
                combine(((prev_pitch >> 8) & 0b111) as u8, write.value)
            } else {
                next_trigger = write.value & 0x80 != 0;
                combine(write.value & 0b111, (prev_pitch & 0xFF) as u8)
            };
            let (next_note, _) = note_and_bend(next_pitch);
            return self.current_note[channel] != Some(next_note) || next_trigger;
        }
        false
    }

    /// NR30: wave DAC gate. A 0-to-1 transition snapshots the wave RAM into
    /// the uniqueness list and announces its index on CC 21.
    fn wave_dac(&mut self, tick: u64, value: u8) {
        let dac = extract(value, 7, 7);
        if self.state.wave.dac_on.value == 0 && dac == 1 {
            let table = self.state.wave.snapshot();
            let wave_index = self.waves.intern(table);
            if self.announced_wave != Some(wave_index) {
                self.smf.insert_control(
                    WAVE_TRACK,
                    tick,
                    WAVE_TRACK as u8,
                    cc::WAVETABLE,
                    wave_index as u8,
                );
                self.announced_wave = Some(wave_index);
            }
        }
        self.state.wave.dac_on.set(dac);
    }

    /// NR32: the wave channel's 2-bit output level.
    fn wave_volume(&mut self, tick: u64, value: u8) {
        let level = extract(value, 6, 5);
        if self.state.wave.volume.must_emit(level) {
            let volume = match level {
                0b01 => 127,
                0b10 => 64,
                0b11 => 32,
                _ => 0,
            };
            self.smf
                .insert_control(WAVE_TRACK, tick, WAVE_TRACK as u8, cc::VOLUME, volume);
        }
        self.state.wave.volume.set(level);
    }

    /// NR51: per-channel left/right enables, mapped to a pan-mute switch
    /// plus a pan position.
    fn panning(&mut self, tick: u64, value: u8) {
        for channel in 0..TRACK_COUNT {
            let bits = ((value >> (3 + channel)) & 0b10) | ((value >> channel) & 0b01);
            let panning = self.state.common(channel).panning;
            if panning.must_emit(bits) {
                if bits == 0 {
                    self.smf
                        .insert_control(channel, tick, channel as u8, cc::PAN_MUTE, 0x7F);
                } else {
                    if panning.value == 0 || !panning.known {
                        self.smf
                            .insert_control(channel, tick, channel as u8, cc::PAN_MUTE, 0);
                    }
                    let position = match bits {
                        0b01 => 0x7F,
                        0b10 => 0,
                        _ => 64,
                    };
                    self.smf
                        .insert_control(channel, tick, channel as u8, cc::PANPOT, position);
                }
            }
            self.state.common_mut(channel).panning.set(bits);
        }
    }

    /// Wave RAM is only captured while the DAC is off; each byte carries two
    /// 4-bit samples, high nibble first.
    fn wave_ram(&mut self, address: u8, value: u8) {
        if self.state.wave.dac_on.value != 0 {
            return;
        }
        let slot = usize::from(address - 0x30) * 2;
        self.state.wave.wavetable[slot].set(value >> 4);
        self.state.wave.wavetable[slot + 1].set(value & 0x0F);
        self.state.wave.wavetable_known = true;
    }

    fn noise_note(&self, code: u8) -> u8 {
        self.noise_pitches
            .iter()
            .position(|&pitch| pitch == code)
            .unwrap_or(self.noise_pitches.len()) as u8
    }
}

/// Extract each listed bit range from `value` and, when it differs from the
/// mirrored field or the field was never written, emit the paired controller
/// scaled to the MIDI 0..127 range. The mirror is updated either way.
fn common_write(
    smf: &mut Smf,
    tick: u64,
    channel: u8,
    value: u8,
    fields: &mut [(&mut Slot, (u8, u8), u8)],
) {
    for (slot, (hi, lo), controller) in fields.iter_mut() {
        let raw = extract(value, *hi, *lo);
        if slot.must_emit(raw) {
            let scaled = scale_cc(raw, max_of(*hi, *lo));
            smf.insert_control(usize::from(channel), tick, channel, *controller, scaled);
        }
        slot.set(raw);
    }
}

/// Scale a raw register field onto 0..127.
fn scale_cc(raw: u8, raw_max: u8) -> u8 {
    (f32::from(MIDI_CC_MAX) * (f32::from(raw) / f32::from(raw_max))).round() as u8
}
