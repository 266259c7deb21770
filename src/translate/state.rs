//! Mirror of the APU register state
//!
//! The translator keeps a copy of every tracked register field so that each
//! incoming write can be compared against what the chip already held. Fields
//! start out unknown; the first write always has a MIDI consequence even when
//! the raw value matches the zero-initialized mirror.

/// A tracked register field: the last value written plus whether any write
/// has touched it yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slot {
    pub value: u8,
    pub known: bool,
}

impl Slot {
    /// True when writing `value` must produce a MIDI event.
    pub fn must_emit(&self, value: u8) -> bool {
        self.value != value || !self.known
    }

    pub fn set(&mut self, value: u8) {
        self.value = value;
        self.known = true;
    }
}

/// Combine the 3-bit period MSB with the 8-bit LSB into the 11-bit value.
pub fn combine(msb: u8, lsb: u8) -> u16 {
    u16::from(lsb) | (u16::from(msb) << 8)
}

/// Fields every channel carries: NRx1 length, NRx4 length-enable, and the
/// channel's two NR51 panning bits (bit 1 = left, bit 0 = right).
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelCommon {
    pub sound_length: Slot,
    pub sound_length_enable: Slot,
    pub panning: Slot,
}

/// NRx2 volume envelope fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct Envelope {
    pub start_vol: Slot,
    pub direction: Slot,
    pub period: Slot,
}

/// NRx3/NRx4 11-bit period, tracked as two half-slots so that each half can
/// become known independently.
#[derive(Debug, Clone, Copy, Default)]
pub struct MelodicPitch {
    pub lsb: Slot,
    pub msb: Slot,
}

impl MelodicPitch {
    /// The last fully-stored period value.
    pub fn pitch(&self) -> u16 {
        combine(self.msb.value, self.lsb.value)
    }
}

/// Square channel 1 (with period sweep).
#[derive(Debug, Clone, Copy, Default)]
pub struct Square1 {
    pub common: ChannelCommon,
    pub envelope: Envelope,
    pub pitch: MelodicPitch,
    pub duty_cycle: Slot,
    pub sweep_speed: Slot,
    pub sweep_direction: Slot,
    pub sweep_shift: Slot,
}

/// Square channel 2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Square2 {
    pub common: ChannelCommon,
    pub envelope: Envelope,
    pub pitch: MelodicPitch,
    pub duty_cycle: Slot,
}

/// Wave channel: DAC gate, 2-bit output level, and the 32 4-bit samples of
/// wave RAM, each tracked as its own slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaveChannel {
    pub common: ChannelCommon,
    pub pitch: MelodicPitch,
    pub dac_on: Slot,
    pub volume: Slot,
    pub wavetable: [Slot; 32],
    pub wavetable_known: bool,
}

impl WaveChannel {
    /// Current wave RAM sample values, ignoring per-slot coverage.
    pub fn snapshot(&self) -> [u8; 32] {
        let mut samples = [0u8; 32];
        for (sample, slot) in samples.iter_mut().zip(self.wavetable.iter()) {
            *sample = slot.value;
        }
        samples
    }
}

/// Noise channel. `pitch` holds the raw NR43 value with the width bit
/// cleared; it only takes effect when the channel is triggered.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoiseChannel {
    pub common: ChannelCommon,
    pub envelope: Envelope,
    pub mode: Slot,
    pub pitch: Slot,
}

/// Snapshot of everything the translator tracks across the four channels.
#[derive(Debug, Clone, Default)]
pub struct ApuState {
    pub square1: Square1,
    pub square2: Square2,
    pub wave: WaveChannel,
    pub noise: NoiseChannel,
}

impl ApuState {
    /// Shared NRx1/NRx4/panning block of a channel. Channel indices above 3
    /// fold onto the noise channel; the dispatcher never produces them.
    pub fn common(&self, channel: usize) -> &ChannelCommon {
        match channel {
            0 => &self.square1.common,
            1 => &self.square2.common,
            2 => &self.wave.common,
            _ => &self.noise.common,
        }
    }

    pub fn common_mut(&mut self, channel: usize) -> &mut ChannelCommon {
        match channel {
            0 => &mut self.square1.common,
            1 => &mut self.square2.common,
            2 => &mut self.wave.common,
            _ => &mut self.noise.common,
        }
    }

    /// Period pair of a melodic channel; `None` for the noise channel.
    pub fn melodic(&self, channel: usize) -> Option<MelodicPitch> {
        match channel {
            0 => Some(self.square1.pitch),
            1 => Some(self.square2.pitch),
            2 => Some(self.wave.pitch),
            _ => None,
        }
    }

    pub fn melodic_mut(&mut self, channel: usize) -> Option<&mut MelodicPitch> {
        match channel {
            0 => Some(&mut self.square1.pitch),
            1 => Some(&mut self.square2.pitch),
            2 => Some(&mut self.wave.pitch),
            _ => None,
        }
    }

    /// Envelope block of a channel; `None` for the wave channel.
    pub fn envelope_mut(&mut self, channel: usize) -> Option<&mut Envelope> {
        match channel {
            0 => Some(&mut self.square1.envelope),
            1 => Some(&mut self.square2.envelope),
            3 => Some(&mut self.noise.envelope),
            _ => None,
        }
    }

    /// Duty-cycle and sound-length slots of a square channel.
    pub fn square_mut(&mut self, channel: usize) -> Option<(&mut Slot, &mut Slot)> {
        match channel {
            0 => Some((&mut self.square1.duty_cycle, &mut self.square1.common.sound_length)),
            1 => Some((&mut self.square2.duty_cycle, &mut self.square2.common.sound_length)),
            _ => None,
        }
    }
}
