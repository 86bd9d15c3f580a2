//! Channel-voice MIDI decoding.
//!
//! The transport hands us one status byte plus whatever data bytes followed
//! it. High nibble = message type, low nibble = channel. Only note on/off
//! drive the engine; everything else decodes so callers can log or route it.

/// Controller number of "All Notes Off".
pub const CC_ALL_NOTES_OFF: u8 = 123;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOff { channel: u8, note: u8, velocity: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    PolyPressure { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// 14-bit value centered on 0 (range -8192..=8191).
    PitchBend { channel: u8, value: i16 },
    /// 0xF0..=0xFF: sysex, clock, transport and friends.
    System { status: u8 },
}

impl MidiMessage {
    /// Decode a status byte and its data bytes.
    ///
    /// Returns `None` for data bytes in the status position or when a
    /// channel message is missing data. A note-on with velocity 0 decodes as
    /// note-off.
    pub fn parse(status: u8, data: &[u8]) -> Option<Self> {
        if status < 0x80 {
            return None;
        }
        let channel = status & 0x0F;
        let d = |i: usize| data.get(i).map(|b| b & 0x7F);

        let msg = match status >> 4 {
            0x8 => MidiMessage::NoteOff { channel, note: d(0)?, velocity: d(1).unwrap_or(0) },
            0x9 => {
                let (note, velocity) = (d(0)?, d(1)?);
                if velocity == 0 {
                    MidiMessage::NoteOff { channel, note, velocity: 0 }
                } else {
                    MidiMessage::NoteOn { channel, note, velocity }
                }
            }
            0xA => MidiMessage::PolyPressure { channel, note: d(0)?, pressure: d(1)? },
            0xB => MidiMessage::ControlChange { channel, controller: d(0)?, value: d(1)? },
            0xC => MidiMessage::ProgramChange { channel, program: d(0)? },
            0xD => MidiMessage::ChannelPressure { channel, pressure: d(0)? },
            0xE => {
                let raw = i16::from(d(0)?) | (i16::from(d(1)?) << 7);
                MidiMessage::PitchBend { channel, value: raw - 8192 }
            }
            _ => MidiMessage::System { status },
        };
        Some(msg)
    }

    /// Decode a complete message where `bytes[0]` is the status byte.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        Self::parse(status, data)
    }

    /// Channel of a channel-voice message.
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::PolyPressure { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::ChannelPressure { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => Some(channel),
            MidiMessage::System { .. } => None,
        }
    }
}
