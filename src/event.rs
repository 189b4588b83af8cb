//! The event model of a track, along with the decoder and encoder of single messages.

use crate::{
    prelude::*,
    primitive::{
        decode_text, encode_text, read_slice, read_u16, read_u24, read_u7, read_u8,
        read_varlen, read_varlen_slice, write_varlen, write_varlen_slice, Fps,
    },
};

/// A timed message inside a track.
///
/// The delta time counts MIDI ticks since the previous event of the same track.
///
/// Events are immutable once built: the only way to obtain one is through [`Event::new`] (or one
/// of its shorthands) or by decoding it from a file.
/// Deserialized events go through the same range checks as decoded ones.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    delta: u28,
    kind: EventKind,
}
impl Event {
    /// Create an event from its delta time and contents.
    #[inline]
    pub fn new(delta: u28, kind: EventKind) -> Event {
        Event { delta, kind }
    }

    /// Create a channel voice event.
    #[inline]
    pub fn midi(delta: u28, channel: u4, message: MidiMessage) -> Event {
        Event::new(delta, EventKind::Midi { channel, message })
    }

    /// Create a meta event.
    #[inline]
    pub fn meta(delta: u28, meta: MetaMessage) -> Event {
        Event::new(delta, EventKind::Meta(meta))
    }

    /// Create a system exclusive event.
    ///
    /// See [`EventKind::Sysex`] for the meaning of a leading `0xF0` byte.
    #[inline]
    pub fn sysex(delta: u28, payload: Vec<u8>) -> Event {
        Event::new(delta, EventKind::Sysex(payload))
    }

    /// Ticks elapsed since the previous event of the track.
    #[inline]
    pub fn delta(&self) -> u28 {
        self.delta
    }

    /// What this event does.
    #[inline]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Consume the event, keeping only its contents.
    #[inline]
    pub fn into_kind(self) -> EventKind {
        self.kind
    }

    /// A fieldless tag identifying the variant of this event.
    #[inline]
    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// Decode exactly one message from the start of `raw`, advancing it past the message.
    ///
    /// `running_status` holds the status byte of the last channel voice message of the stream
    /// being decoded. It should start out as `None` for each new track and be shared between
    /// consecutive calls.
    ///
    /// Returns `Ok(None)` if the message was a meta event of an unknown type. Its bytes are
    /// consumed, but no event is produced.
    ///
    /// In case of failure the slice might be left in the middle of a message.
    pub fn read(raw: &mut &[u8], running_status: &mut Option<u8>) -> Result<Option<Event>> {
        let (delta, kind) = Self::read_parts(raw, running_status)?;
        Ok(kind.map(|kind| Event { delta, kind }))
    }

    /// Like `read`, but also yields the delta time of skipped messages.
    pub(crate) fn read_parts(
        raw: &mut &[u8],
        running_status: &mut Option<u8>,
    ) -> Result<(u28, Option<EventKind>)> {
        let delta = read_varlen(raw)?;
        let kind = EventKind::read(raw, running_status)?;
        Ok((delta, kind))
    }

    /// Encode this event.
    ///
    /// `running_status` keeps track of the last status written, in order to make use of running
    /// status. It should start out as `None` for each track and be shared between consecutive
    /// calls.
    pub(crate) fn write<W: Write>(
        &self,
        running_status: &mut Option<u8>,
        out: &mut W,
    ) -> WriteResult<W> {
        write_varlen(out, self.delta)?;
        self.kind.write(running_status, out)
    }
}

/// The contents of an event, without its timing.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    /// A channel voice message, such as a note or a controller change.
    Midi {
        channel: u4,
        message: MidiMessage,
    },
    /// Information about the track that is not sent to devices, like tempo or lyrics.
    Meta(MetaMessage),
    /// Manufacturer-specific data.
    ///
    /// Messages starting a SysEx dump (status `0xF0`) keep the `0xF0` marker as the first byte
    /// of the payload. Raw and continuation packets (status `0xF7`) are stored verbatim, without
    /// any marker.
    /// When encoding, a payload starting with `0xF0` is written as a `0xF0` message and anything
    /// else as a `0xF7` message, so decoding an encoded payload always yields the same bytes.
    Sysex(Vec<u8>),
}
impl EventKind {
    fn read(raw: &mut &[u8], running_status: &mut Option<u8>) -> Result<Option<EventKind>> {
        let mut status = *raw.first().ok_or(err_truncated!("failed to read status"))?;
        if status < 0x80 {
            //Running status! The byte is the first data byte, so it is left unconsumed
            status = running_status.ok_or(err_track!(
                "event missing status with no running status active"
            ))?;
        } else {
            *raw = &raw[1..];
        }
        let kind = match status {
            0x80..=0xEF => {
                *running_status = Some(status);
                let (channel, message) = MidiMessage::read(status, raw)?;
                Some(EventKind::Midi { channel, message })
            }
            //Meta and SysEx messages neither use nor modify the running status
            0xFF => MetaMessage::read(raw)?.map(EventKind::Meta),
            0xF0 => {
                let data = read_varlen_slice(raw)?;
                let mut payload = Vec::with_capacity(1 + data.len());
                payload.push(0xF0);
                payload.extend_from_slice(data);
                Some(EventKind::Sysex(payload))
            }
            0xF7 => Some(EventKind::Sysex(read_varlen_slice(raw)?.to_vec())),
            0xF1..=0xF6 => bail!(err_track!(
                "standard midi files cannot contain system common events"
            )),
            0xF8..=0xFE => bail!(err_track!(
                "standard midi files cannot contain system realtime events"
            )),
            0x00..=0x7F => bail!(err_track!("invalid running status without top bit set")),
        };
        Ok(kind)
    }

    fn write<W: Write>(&self, running_status: &mut Option<u8>, out: &mut W) -> WriteResult<W> {
        //Only channel voice statuses are ever omitted. Anything else forces the next one out
        match self {
            EventKind::Midi { channel, message } => {
                let status = message.status_nibble() << 4 | channel.as_int();
                if Some(status) != *running_status {
                    out.write(&[status])?;
                    *running_status = Some(status);
                }
                message.write(out)?;
            }
            EventKind::Meta(meta) => {
                *running_status = None;
                out.write(&[0xFF])?;
                meta.write(out)?;
            }
            EventKind::Sysex(payload) => {
                *running_status = None;
                match payload.split_first() {
                    Some((0xF0, data)) => {
                        out.write(&[0xF0])?;
                        write_varlen_slice(out, data)?;
                    }
                    _ => {
                        out.write(&[0xF7])?;
                        write_varlen_slice(out, payload)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// A fieldless tag identifying the variant of this event.
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::Midi { message, .. } => message.event_type(),
            EventKind::Meta(meta) => meta.event_type(),
            EventKind::Sysex(_) => EventType::Sysex,
        }
    }
}

/// A fieldless tag for every decodable event variant.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventType {
    NoteOff,
    NoteOn,
    NotePressure,
    Controller,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    SequenceNumber,
    Text,
    Copyright,
    TrackName,
    InstrumentName,
    Lyric,
    Marker,
    CuePoint,
    ChannelPrefix,
    EndOfTrack,
    Tempo,
    SmpteOffset,
    TimeSignature,
    KeySignature,
    SequencerSpecific,
    Sysex,
}
impl EventType {
    /// Whether this is one of the channel voice message types.
    pub fn is_channel_voice(self) -> bool {
        matches!(
            self,
            EventType::NoteOff
                | EventType::NoteOn
                | EventType::NotePressure
                | EventType::Controller
                | EventType::ProgramChange
                | EventType::ChannelPressure
                | EventType::PitchBend
        )
    }

    /// Whether this is one of the meta message types.
    pub fn is_meta(self) -> bool {
        !self.is_channel_voice() && self != EventType::Sysex
    }
}

/// A message addressed to one of the 16 MIDI channels.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MidiMessage {
    /// Release a key.
    NoteOff { key: u7, vel: u7 },
    /// Press a key.
    ///
    /// A velocity of zero is conventionally treated as a `NoteOff`.
    NoteOn { key: u7, vel: u7 },
    /// Polyphonic aftertouch on a single held key.
    NotePressure { key: u7, pressure: u7 },
    /// Set a controller, like modulation (`1`) or sustain (`64`).
    Controller { controller: u7, value: u7 },
    /// Select the instrument of the channel.
    ProgramChange { program: u7 },
    /// Aftertouch applied to the whole channel.
    ChannelPressure { pressure: u7 },
    /// Bend the pitch of the whole channel.
    ///
    /// `0x2000` is the center, `0x0000` and `0x3FFF` the lowest and highest bend.
    PitchBend { bend: u14 },
}
impl MidiMessage {
    /// Read the data bytes of a message with the given status, which must be in the range
    /// `0x80 ..= 0xEF`.
    fn read(status: u8, raw: &mut &[u8]) -> Result<(u4, MidiMessage)> {
        let channel = u4::new(status & 0x0F);
        let msg = match status >> 4 {
            0x8 => {
                let key = read_u7(raw)?;
                let vel = read_u7(raw)?;
                MidiMessage::NoteOff { key, vel }
            }
            0x9 => {
                let key = read_u7(raw)?;
                let vel = read_u7(raw)?;
                MidiMessage::NoteOn { key, vel }
            }
            0xA => {
                let key = read_u7(raw)?;
                let pressure = read_u7(raw)?;
                MidiMessage::NotePressure { key, pressure }
            }
            0xB => {
                let controller = read_u7(raw)?;
                let value = read_u7(raw)?;
                MidiMessage::Controller { controller, value }
            }
            0xC => MidiMessage::ProgramChange {
                program: read_u7(raw)?,
            },
            0xD => MidiMessage::ChannelPressure {
                pressure: read_u7(raw)?,
            },
            0xE => {
                //Least significant half first
                let lsb = read_u7(raw)?.as_int() as u16;
                let msb = read_u7(raw)?.as_int() as u16;
                MidiMessage::PitchBend {
                    bend: u14::new(msb << 7 | lsb),
                }
            }
            _ => bail!(err_track!("status is not a channel voice message")),
        };
        Ok((channel, msg))
    }

    /// The top nibble of the status byte of this message.
    pub fn status_nibble(&self) -> u8 {
        match self {
            MidiMessage::NoteOff { .. } => 0x8,
            MidiMessage::NoteOn { .. } => 0x9,
            MidiMessage::NotePressure { .. } => 0xA,
            MidiMessage::Controller { .. } => 0xB,
            MidiMessage::ProgramChange { .. } => 0xC,
            MidiMessage::ChannelPressure { .. } => 0xD,
            MidiMessage::PitchBend { .. } => 0xE,
        }
    }

    /// A fieldless tag identifying the variant of this message.
    pub fn event_type(&self) -> EventType {
        match self {
            MidiMessage::NoteOff { .. } => EventType::NoteOff,
            MidiMessage::NoteOn { .. } => EventType::NoteOn,
            MidiMessage::NotePressure { .. } => EventType::NotePressure,
            MidiMessage::Controller { .. } => EventType::Controller,
            MidiMessage::ProgramChange { .. } => EventType::ProgramChange,
            MidiMessage::ChannelPressure { .. } => EventType::ChannelPressure,
            MidiMessage::PitchBend { .. } => EventType::PitchBend,
        }
    }

    /// Write the data bytes following the status.
    fn write<W: Write>(&self, out: &mut W) -> WriteResult<W> {
        match *self {
            MidiMessage::NoteOff { key, vel } => out.write(&[key.as_int(), vel.as_int()]),
            MidiMessage::NoteOn { key, vel } => out.write(&[key.as_int(), vel.as_int()]),
            MidiMessage::NotePressure { key, pressure } => {
                out.write(&[key.as_int(), pressure.as_int()])
            }
            MidiMessage::Controller { controller, value } => {
                out.write(&[controller.as_int(), value.as_int()])
            }
            MidiMessage::ProgramChange { program } => out.write(&[program.as_int()]),
            MidiMessage::ChannelPressure { pressure } => out.write(&[pressure.as_int()]),
            MidiMessage::PitchBend { bend } => {
                let raw = bend.as_int();
                out.write(&[(raw & 0x7F) as u8, (raw >> 7) as u8])
            }
        }
    }
}

/// A meta event, introduced by the `0xFF` status.
///
/// Meta events only exist in files: they describe the track and are never sent to devices.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MetaMessage {
    /// The number of a sequence.
    SequenceNumber(u16),
    Text(String),
    Copyright(String),
    /// The name of the track (or of the sequence, in the first track of a file).
    TrackName(String),
    InstrumentName(String),
    Lyric(String),
    /// A rehearsal letter or section name.
    Marker(String),
    /// A description of something happening at this point, like a sound effect starting.
    CuePoint(String),
    /// The MIDI channel that the following meta and sysex events refer to.
    ChannelPrefix(u8),
    /// Marks the end of the track. Must be the last event.
    EndOfTrack,
    /// Microseconds per quarter note.
    Tempo(u24),
    /// The starting point of the track in SMPTE time.
    SmpteOffset(SmpteOffset),
    /// The time signature in effect from this event onwards.
    TimeSignature(TimeSignature),
    /// The key signature in effect from this event onwards.
    KeySignature(KeySignature),
    /// Opaque data for a specific sequencer program.
    SequencerSpecific(Vec<u8>),
}
impl MetaMessage {
    /// The payload length that meta messages of the given type must declare, if the type has a
    /// fixed size.
    pub fn fixed_len(type_byte: u8) -> Option<usize> {
        Some(match type_byte {
            0x00 => 2,
            0x20 => 1,
            0x2F => 0,
            0x51 => 3,
            0x54 => 5,
            0x58 => 4,
            0x59 => 2,
            _ => return None,
        })
    }

    fn fixed_len_error(type_byte: u8) -> Error {
        match type_byte {
            0x00 => err_track!("sequence number events must have 2 bytes of data"),
            0x20 => err_track!("channel prefix events must have 1 byte of data"),
            0x2F => err_track!("end of track events must have no data"),
            0x51 => err_track!("tempo events must have 3 bytes of data"),
            0x54 => err_track!("smpte offset events must have 5 bytes of data"),
            0x58 => err_track!("time signature events must have 4 bytes of data"),
            0x59 => err_track!("key signature events must have 2 bytes of data"),
            _ => err_track!("invalid meta event length"),
        }
    }

    /// The meta-type byte that identifies this message on the wire.
    pub fn meta_type(&self) -> u8 {
        match self {
            MetaMessage::SequenceNumber(_) => 0x00,
            MetaMessage::Text(_) => 0x01,
            MetaMessage::Copyright(_) => 0x02,
            MetaMessage::TrackName(_) => 0x03,
            MetaMessage::InstrumentName(_) => 0x04,
            MetaMessage::Lyric(_) => 0x05,
            MetaMessage::Marker(_) => 0x06,
            MetaMessage::CuePoint(_) => 0x07,
            MetaMessage::ChannelPrefix(_) => 0x20,
            MetaMessage::EndOfTrack => 0x2F,
            MetaMessage::Tempo(_) => 0x51,
            MetaMessage::SmpteOffset(_) => 0x54,
            MetaMessage::TimeSignature(_) => 0x58,
            MetaMessage::KeySignature(_) => 0x59,
            MetaMessage::SequencerSpecific(_) => 0x7F,
        }
    }

    /// A fieldless tag identifying the variant of this message.
    pub fn event_type(&self) -> EventType {
        match self {
            MetaMessage::SequenceNumber(_) => EventType::SequenceNumber,
            MetaMessage::Text(_) => EventType::Text,
            MetaMessage::Copyright(_) => EventType::Copyright,
            MetaMessage::TrackName(_) => EventType::TrackName,
            MetaMessage::InstrumentName(_) => EventType::InstrumentName,
            MetaMessage::Lyric(_) => EventType::Lyric,
            MetaMessage::Marker(_) => EventType::Marker,
            MetaMessage::CuePoint(_) => EventType::CuePoint,
            MetaMessage::ChannelPrefix(_) => EventType::ChannelPrefix,
            MetaMessage::EndOfTrack => EventType::EndOfTrack,
            MetaMessage::Tempo(_) => EventType::Tempo,
            MetaMessage::SmpteOffset(_) => EventType::SmpteOffset,
            MetaMessage::TimeSignature(_) => EventType::TimeSignature,
            MetaMessage::KeySignature(_) => EventType::KeySignature,
            MetaMessage::SequencerSpecific(_) => EventType::SequencerSpecific,
        }
    }

    /// The text carried by this message, if it is one of the text meta messages.
    pub fn text(&self) -> Option<&str> {
        match self {
            MetaMessage::Text(text)
            | MetaMessage::Copyright(text)
            | MetaMessage::TrackName(text)
            | MetaMessage::InstrumentName(text)
            | MetaMessage::Lyric(text)
            | MetaMessage::Marker(text)
            | MetaMessage::CuePoint(text) => Some(text),
            _ => None,
        }
    }

    /// Read a meta message, starting right after the `0xFF` status.
    ///
    /// Unknown meta messages are skipped and yield `None`.
    fn read(raw: &mut &[u8]) -> Result<Option<MetaMessage>> {
        let type_byte = read_u8(raw)?;
        let len = read_varlen(raw)?.as_int() as usize;
        if let Some(expected) = Self::fixed_len(type_byte) {
            ensure!(len == expected, Self::fixed_len_error(type_byte));
        }
        let mut data = read_slice(raw, len)?;
        Ok(Some(match type_byte {
            0x00 => MetaMessage::SequenceNumber(read_u16(&mut data)?),
            0x01 => MetaMessage::Text(decode_text(data)),
            0x02 => MetaMessage::Copyright(decode_text(data)),
            0x03 => MetaMessage::TrackName(decode_text(data)),
            0x04 => MetaMessage::InstrumentName(decode_text(data)),
            0x05 => MetaMessage::Lyric(decode_text(data)),
            0x06 => MetaMessage::Marker(decode_text(data)),
            0x07 => MetaMessage::CuePoint(decode_text(data)),
            0x20 => MetaMessage::ChannelPrefix(read_u8(&mut data)?),
            0x2F => MetaMessage::EndOfTrack,
            0x51 => MetaMessage::Tempo(read_u24(&mut data)?),
            0x54 => MetaMessage::SmpteOffset(SmpteOffset {
                hours: data[0],
                minutes: data[1],
                seconds: data[2],
                frames: data[3],
                frame_hundredths: data[4],
            }),
            0x58 => MetaMessage::TimeSignature(TimeSignature {
                numerator: data[0],
                denominator_pow2: data[1],
                clocks_per_click: data[2],
                thirty_seconds_per_24_clocks: data[3],
            }),
            0x59 => MetaMessage::KeySignature(KeySignature {
                sharps_or_flats: data[0] as i8,
                tonality: data[1],
            }),
            0x7F => MetaMessage::SequencerSpecific(data.to_vec()),
            _ => {
                log::debug!(
                    "skipping unknown meta event {:#04x} with {} bytes of data",
                    type_byte,
                    len
                );
                return Ok(None);
            }
        }))
    }

    /// The raw payload bytes of this message, as written after the length prefix.
    fn payload(&self) -> Cow<'_, [u8]> {
        match self {
            MetaMessage::SequenceNumber(num) => Cow::Owned(num.to_be_bytes().to_vec()),
            MetaMessage::Text(text)
            | MetaMessage::Copyright(text)
            | MetaMessage::TrackName(text)
            | MetaMessage::InstrumentName(text)
            | MetaMessage::Lyric(text)
            | MetaMessage::Marker(text)
            | MetaMessage::CuePoint(text) => encode_text(text),
            MetaMessage::ChannelPrefix(chan) => Cow::Owned(vec![*chan]),
            MetaMessage::EndOfTrack => Cow::Borrowed(&[]),
            MetaMessage::Tempo(micros) => Cow::Owned(micros.as_int().to_be_bytes()[1..].to_vec()),
            MetaMessage::SmpteOffset(smpte) => Cow::Owned(smpte.encode().to_vec()),
            MetaMessage::TimeSignature(sig) => Cow::Owned(sig.encode().to_vec()),
            MetaMessage::KeySignature(key) => Cow::Owned(key.encode().to_vec()),
            MetaMessage::SequencerSpecific(data) => Cow::Borrowed(&data[..]),
        }
    }

    /// Write the meta message, not including the `0xFF` status.
    fn write<W: Write>(&self, out: &mut W) -> WriteResult<W> {
        let type_byte = self.meta_type();
        let payload = self.payload();
        debug_assert!(Self::fixed_len(type_byte).map_or(true, |len| len == payload.len()));
        out.write(&[type_byte])?;
        write_varlen_slice(out, &payload)
    }
}

/// An SMPTE time, marking the time at which a track should start.
///
/// The fields hold the raw bytes as stored in the file.
/// The `hours` byte additionally encodes the frame rate in its bits 5 and 6, see
/// [`SmpteOffset::fps`].
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmpteOffset {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
    pub frame_hundredths: u8,
}
impl SmpteOffset {
    /// The hour component, without the frame rate bits.
    #[inline]
    pub fn hour(&self) -> u8 {
        self.hours & 0x1F
    }

    /// The frame rate encoded in the hours byte.
    #[inline]
    pub fn fps(&self) -> Fps {
        Fps::from_code(self.hours >> 5)
    }

    /// Convert this timestamp into a single floating-point number of seconds.
    pub fn as_seconds(&self) -> f64 {
        let whole = self.hour() as u32 * 3600 + self.minutes as u32 * 60 + self.seconds as u32;
        whole as f64
            + (self.frames as f64 + self.frame_hundredths as f64 / 100.0) / self.fps().as_f64()
    }

    fn encode(&self) -> [u8; 5] {
        [
            self.hours,
            self.minutes,
            self.seconds,
            self.frames,
            self.frame_hundredths,
        ]
    }
}

/// A time signature, with its fields in wire order.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeSignature {
    pub numerator: u8,
    /// The denominator, as a power of two (`2` means a quarter note, `3` an eighth note...).
    pub denominator_pow2: u8,
    /// MIDI clocks per metronome click.
    pub clocks_per_click: u8,
    /// Number of notated 32nd notes per 24 MIDI clocks (a quarter note).
    pub thirty_seconds_per_24_clocks: u8,
}
impl TimeSignature {
    /// The actual denominator value, `2^denominator_pow2`.
    ///
    /// Saturates at `2^31` for out-of-range exponents.
    #[inline]
    pub fn denominator(&self) -> u32 {
        1 << self.denominator_pow2.min(31)
    }

    fn encode(&self) -> [u8; 4] {
        [
            self.numerator,
            self.denominator_pow2,
            self.clocks_per_click,
            self.thirty_seconds_per_24_clocks,
        ]
    }
}

/// A key signature.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeySignature {
    /// Negative numbers indicate number of flats and positive numbers indicate number of sharps.
    pub sharps_or_flats: i8,
    /// `0` for a major key, `1` for a minor key.
    pub tonality: u8,
}
impl KeySignature {
    #[inline]
    pub fn is_minor(&self) -> bool {
        self.tonality != 0
    }

    fn encode(&self) -> [u8; 2] {
        [self.sharps_or_flats as u8, self.tonality]
    }
}
