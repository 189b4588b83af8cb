//! Conversion of tick-based tracks into a wall-clock timeline.
//!
//! Tempo and time signature changes are read from the first track only, which is where format 1
//! files keep their tempo map.

use crate::{
    event::{EventKind, MetaMessage},
    prelude::*,
    smf::Track,
};
use std::collections::BTreeMap;

/// Tempo assumed until the first tempo event, in microseconds per quarter note (120 BPM).
const DEFAULT_TEMPO: u32 = 500_000;
const DEFAULT_BPM: f64 = 120.0;
const DEFAULT_NUMERATOR: u8 = 4;
const DEFAULT_DENOMINATOR: u32 = 4;

/// A point in the timeline where the tempo, the time signature or both change.
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeSigTempoEvent {
    time_seconds: f64,
    tick: u64,
    bpm: f64,
    new_tempo: bool,
    new_time_signature: bool,
    numerator: u8,
    denominator: u32,
}
impl TimeSigTempoEvent {
    /// Seconds elapsed from the start of the file until this change.
    #[inline]
    pub fn time_seconds(&self) -> f64 {
        self.time_seconds
    }

    /// Absolute tick of this change.
    #[inline]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Tempo in effect from this change onwards, in beats (quarter notes) per minute.
    #[inline]
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Whether the tempo changes at this point.
    #[inline]
    pub fn new_tempo(&self) -> bool {
        self.new_tempo
    }

    /// Whether the time signature changes at this point.
    #[inline]
    pub fn new_time_signature(&self) -> bool {
        self.new_time_signature
    }

    #[inline]
    pub fn numerator(&self) -> u8 {
        self.numerator
    }

    /// The actual denominator of the time signature, not its power of two.
    #[inline]
    pub fn denominator(&self) -> u32 {
        self.denominator
    }
}

/// A stretch of the timeline played at a constant tempo.
#[derive(Copy, Clone, PartialEq, Debug)]
struct TempoSegment {
    tick: u64,
    seconds: f64,
    micros_per_quarter: u32,
}

/// Changes found at a single tick of the tempo track.
#[derive(Default)]
struct Change {
    seconds: f64,
    tempo: Option<u32>,
    time_signature: Option<(u8, u8)>,
}

/// The tempo and time signature timeline of a file, along with its total duration.
#[derive(Clone, PartialEq, Debug)]
pub struct TempoMap {
    ticks_per_quarter: f64,
    duration: f64,
    events: Vec<TimeSigTempoEvent>,
    segments: Vec<TempoSegment>,
}
impl TempoMap {
    /// Walk the tracks of a file and compute its timeline.
    ///
    /// The tempo track is the first one. If other tracks last longer, the remaining ticks are
    /// played at the last tempo of the tempo track.
    pub fn build(ticks_per_quarter: u15, tracks: &[Track]) -> TempoMap {
        let tpq = ticks_per_quarter.as_int().max(1) as f64;
        let secs_per_tick = |micros: u32| micros as f64 / 1_000_000.0 / tpq;

        let mut tick = 0;
        let mut tempo = DEFAULT_TEMPO;
        let mut duration = 0.0;
        let mut changes: BTreeMap<u64, Change> = BTreeMap::new();
        let mut segments = vec![TempoSegment {
            tick: 0,
            seconds: 0.0,
            micros_per_quarter: DEFAULT_TEMPO,
        }];

        for ev in tracks.first().map(Track::events).unwrap_or_default() {
            let delta = ev.delta().as_int() as u64;
            tick += delta;
            duration += delta as f64 * secs_per_tick(tempo);
            let meta = match ev.kind() {
                EventKind::Meta(meta) => meta,
                _ => continue,
            };
            match meta {
                MetaMessage::Tempo(micros) if micros.as_int() == 0 => {
                    log::debug!("ignoring zero tempo at tick {}", tick);
                }
                MetaMessage::Tempo(micros) => {
                    tempo = micros.as_int();
                    //The time at which a tick is first reached is kept, later values overwrite
                    changes
                        .entry(tick)
                        .or_insert_with(|| Change {
                            seconds: duration,
                            ..Change::default()
                        })
                        .tempo = Some(tempo);
                    match segments.last_mut() {
                        Some(last) if last.tick == tick => last.micros_per_quarter = tempo,
                        _ => segments.push(TempoSegment {
                            tick,
                            seconds: duration,
                            micros_per_quarter: tempo,
                        }),
                    }
                }
                MetaMessage::TimeSignature(sig) => {
                    changes
                        .entry(tick)
                        .or_insert_with(|| Change {
                            seconds: duration,
                            ..Change::default()
                        })
                        .time_signature = Some((sig.numerator, sig.denominator_pow2));
                }
                _ => {}
            }
        }

        //Tracks outliving the tempo track continue at its last tempo
        let end = tracks.iter().map(Track::total_ticks).max().unwrap_or(0);
        if end > tick {
            log::trace!("extending duration by {} ticks past the tempo track", end - tick);
            duration += (end - tick) as f64 * secs_per_tick(tempo);
        }

        let mut bpm = DEFAULT_BPM;
        let mut numerator = DEFAULT_NUMERATOR;
        let mut denominator = DEFAULT_DENOMINATOR;
        let events = changes
            .into_iter()
            .map(|(tick, change)| {
                if let Some(micros) = change.tempo {
                    bpm = 60.0 / (micros as f64 / 1_000_000.0);
                }
                if let Some((num, den_pow2)) = change.time_signature {
                    numerator = num;
                    denominator = 1 << den_pow2.min(31);
                }
                TimeSigTempoEvent {
                    time_seconds: change.seconds,
                    tick,
                    bpm,
                    new_tempo: change.tempo.is_some(),
                    new_time_signature: change.time_signature.is_some(),
                    numerator,
                    denominator,
                }
            })
            .collect();

        TempoMap {
            ticks_per_quarter: tpq,
            duration,
            events,
            segments,
        }
    }

    /// Total duration of the file, in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Every tempo or time signature change, in ascending tick order.
    /// At most one entry exists per tick.
    #[inline]
    pub fn events(&self) -> &[TimeSigTempoEvent] {
        &self.events
    }

    /// The time in seconds at which the given absolute tick plays.
    ///
    /// Ticks past the last tempo change are converted at the last tempo.
    pub fn seconds_at(&self, tick: u64) -> f64 {
        let idx = self.segments.partition_point(|seg| seg.tick <= tick);
        match self.segments.get(idx.saturating_sub(1)) {
            Some(seg) => seg.seconds + (tick - seg.tick) as f64 * self.secs_per_tick(seg),
            None => 0.0,
        }
    }

    /// The last tick that plays at or before the given time in seconds.
    pub fn tick_at(&self, seconds: f64) -> u64 {
        if seconds.is_nan() || seconds <= 0.0 {
            return 0;
        }
        let idx = self.segments.partition_point(|seg| seg.seconds <= seconds);
        match self.segments.get(idx.saturating_sub(1)) {
            Some(seg) => {
                let ticks = (seconds - seg.seconds) / self.secs_per_tick(seg);
                //Absorb floating point error right below a tick boundary
                seg.tick + (ticks + 1e-9).floor() as u64
            }
            None => 0,
        }
    }

    fn secs_per_tick(&self, seg: &TempoSegment) -> f64 {
        seg.micros_per_quarter as f64 / 1_000_000.0 / self.ticks_per_quarter
    }
}
