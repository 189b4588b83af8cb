//! # Overview
//!
//! `smfkit` decodes Standard Midi Files (SMF) into typed events, encodes them back into bytes and
//! derives a wall-clock timeline from the tick-based event stream.
//!
//! Usage is as simple as:
//!
//! ```rust,no_run
//! use smfkit::Smf;
//!
//! let bytes = std::fs::read("song.mid").unwrap();
//! let smf = Smf::parse(&bytes).unwrap();
//!
//! for (i, track) in smf.tracks().iter().enumerate() {
//!     println!("track {} ({:?}) has {} events", i, track.name(), track.len());
//! }
//! println!("the song lasts {:.2} seconds", smf.duration());
//! ```
//!
//! The [`Smf`](struct.Smf.html) struct is the main type in the crate.
//! It owns its tracks, each track owns its events, and every event is a closed sum type that can
//! be matched exhaustively.
//!
//! # Tempo map
//!
//! MIDI files count time in ticks, and the duration of a tick depends on the tempo in effect.
//! When an `Smf` is built, the tempo and time signature changes found in the first track are
//! merged into a single timeline, available through [`Smf::tempo_map`](struct.Smf.html#method.tempo_map).
//! The timeline also provides the total duration in seconds and conversions between ticks and
//! seconds.
//!
//! # Writing Standard Midi Files
//!
//! Saving SMF files is as simple as using the `Smf::save` method:
//!
//! ```rust,no_run
//! # use smfkit::Smf;
//! # let bytes = std::fs::read("song.mid").unwrap();
//! let smf = Smf::parse(&bytes).unwrap();
//! smf.save("rewritten.mid").unwrap();
//!
//! let in_memory = smf.to_bytes().unwrap();
//! println!("midi file fits in {} bytes!", in_memory.len());
//! ```
//!
//! The encoder always makes use of running status, so a rewritten file may be smaller than the
//! file it was read from, but decoding it yields exactly the same events.
//!
//! # About features
//!
//! - The `parallel` feature
//!
//!   Enabled by default. Large files have their tracks decoded and encoded on multiple threads,
//!   through the `rayon` dependency. Results are identical to the single-threaded path.
//!
//! - The `strict` feature
//!
//!   By default `smfkit` will read files that break the SMF standard in harmless ways, such as
//!   over-long varlen integers, data bytes with the top bit set or tracks missing their
//!   `EndOfTrack` event.
//!   With the `strict` feature these are rejected with `ErrorKind::MalformedTrack` errors.
//!
//! - The `serde` feature
//!
//!   Derives `Serialize` and `Deserialize` for events and timeline entries.
//!   Deserialization runs the same checks as the constructors: a `Track` is read back from its
//!   event list alone, and a `Header` from its format and raw division.
//!
//! # Logging
//!
//! Recoverable oddities in the input, like skipped unknown meta events, are reported through the
//! `log` facade at the `debug` level. The library never installs a logger.

macro_rules! bail {
    ($err:expr) => {{
        return Err($err.into());
    }};
}
macro_rules! ensure {
    ($cond:expr, $err:expr) => {{
        if !$cond {
            bail!($err)
        }
    }};
}

/// All of the errors this crate produces.
#[macro_use]
mod error;

mod prelude {
    pub(crate) use crate::{
        error::{Error, ErrorKind, Result, StdResult},
        io::{Write, WriteResult},
        primitive::{u14, u15, u24, u28, u4, u7, SplitChecked},
    };
    pub(crate) use std::{borrow::Cow, fmt, fs::File, io, mem, path::Path};
}

mod event;
pub mod io;
mod primitive;
mod riff;
mod smf;
mod tempo;

pub use crate::{
    error::{Error, ErrorKind, Result},
    event::{
        Event, EventKind, EventType, KeySignature, MetaMessage, MidiMessage, SmpteOffset,
        TimeSignature,
    },
    primitive::Fps,
    smf::{parse, write, EventIter, Format, Header, Smf, Track, TrackIter},
    tempo::{TempoMap, TimeSigTempoEvent},
};

/// Exotically-sized integers used by the MIDI standard.
pub mod num {
    pub use crate::primitive::{u14, u15, u24, u28, u4, u7};
}

#[cfg(test)]
mod test;
