//! Specific to the SMF packaging of MIDI streams.

use crate::{
    event::{Event, EventKind, MetaMessage},
    io::IoWrap,
    prelude::*,
    primitive::{read_slice, read_u16, read_u32},
    riff,
    tempo::{TempoMap, TimeSigTempoEvent},
};

/// How many bytes per event to estimate when allocating memory when writing.
///
/// Since the writer uses running status, a value a bit over `3` allocates enough for almost all
/// tracks. Text-heavy tracks are small enough that reallocating doesn't matter.
const EVENTS_TO_BYTES: f32 = 3.4;

/// How many bytes must a MIDI body have in order to enable multithreading.
///
/// When writing, the MIDI body size is estimated from the event count using `EVENTS_TO_BYTES`.
#[cfg(feature = "parallel")]
const PARALLEL_ENABLE_THRESHOLD: usize = 3 * 1024;

/// A parsed Standard Midi File.
///
/// Holds the header, a non-empty list of tracks and the tempo map derived from them.
/// An `Smf` cannot be modified once built: to change it, take its tracks out with
/// [`Smf::into_tracks`] and build a new one.
#[derive(Clone, Debug, PartialEq)]
pub struct Smf {
    header: Header,
    tracks: Vec<Track>,
    tempo_map: TempoMap,
}
impl Smf {
    /// Build a file out of a header and its tracks, computing its tempo map.
    ///
    /// Fails with `InvalidInput` if there are no tracks.
    /// With the `strict` feature, a `SingleTrack` file with several tracks is rejected as a
    /// malformed header.
    pub fn new(header: Header, tracks: Vec<Track>) -> Result<Smf> {
        ensure!(!tracks.is_empty(), err_input!("midi files must have at least one track"));
        if cfg!(feature = "strict") {
            ensure!(
                header.format != Format::SingleTrack || tracks.len() == 1,
                err_header!("singletrack format file has multiple tracks")
            );
        }
        let tempo_map = TempoMap::build(header.ticks_per_quarter, &tracks);
        Ok(Smf {
            header,
            tracks,
            tempo_map,
        })
    }

    /// Parse a `.mid` Standard Midi File (or a `.rmi` RMID file wrapping one) from its raw bytes.
    ///
    /// Any error aborts the whole parse: no partially decoded file is ever produced.
    pub fn parse(raw: &[u8]) -> Result<Smf> {
        let (header, tracks) = parse(raw)?;
        let tracks = tracks.collect_tracks()?;
        ensure!(!tracks.is_empty(), err_header!("file declares no tracks"));
        Smf::new(header, tracks)
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.header.format
    }

    #[inline]
    pub fn ticks_per_quarter(&self) -> u15 {
        self.header.ticks_per_quarter
    }

    /// The tracks of this file, in file order.
    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Consume the file, keeping only its tracks.
    #[inline]
    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }

    /// The merged tempo and time signature timeline of this file.
    #[inline]
    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    /// Shorthand for `self.tempo_map().events()`.
    #[inline]
    pub fn timeline(&self) -> &[TimeSigTempoEvent] {
        self.tempo_map.events()
    }

    /// Total duration of the file, in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.tempo_map.duration()
    }

    /// Encodes and writes the file to the given generic writer.
    ///
    /// Note that this function requires a `smfkit::io::Write` writer, not a `std::io::Write`
    /// writer. Use [`Smf::write_std`] to write into a standard stream.
    pub fn write<W: Write>(&self, out: &mut W) -> WriteResult<W> {
        write(&self.header, &self.tracks, out)
    }

    /// Encodes and writes the file to the given `std::io::Write` writer.
    pub fn write_std<W: io::Write>(&self, out: W) -> io::Result<()> {
        self.write(&mut IoWrap(out))
    }

    /// Encodes the file into a new in-memory buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }

    /// Encodes and writes the file to the given path, creating or truncating it.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fn save_impl(smf: &Smf, path: &Path) -> io::Result<()> {
            smf.write_std(File::create(path)?)
        }
        save_impl(self, path.as_ref())
    }
}

/// Parse the header of a raw Standard Midi File, leaving its tracks to be decoded lazily.
///
/// This is the low-level counterpart of [`Smf::parse`]: no memory is allocated and each track
/// is only decoded when its [`EventIter`] is advanced.
pub fn parse(raw: &[u8]) -> Result<(Header, TrackIter<'_>)> {
    let mut raw = riff::unwrap(raw)?;
    let id = read_slice(&mut raw, 4)?;
    ensure!(id == b"MThd", err_header!("file does not start with an MThd chunk"));
    let len = read_u32(&mut raw)?;
    ensure!(len == 6, err_header!("header chunk must be 6 bytes long"));
    let (header, track_count) = Header::read(read_slice(&mut raw, 6)?)?;
    log::trace!(
        "read {:?} header declaring {} tracks at {} ticks per quarter",
        header.format,
        track_count,
        header.ticks_per_quarter
    );
    Ok((header, TrackIter::new(raw, track_count)))
}

/// Encode a header and its tracks into the given writer.
///
/// Errors from the writer are passed through untouched. Files that cannot be represented, with
/// over 65535 tracks, a track larger than 4GB or a message payload of 2^28 bytes or more, produce
/// the writer's `invalid_input` error.
///
/// Large files are encoded on several threads when the `parallel` feature is enabled.
pub fn write<W: Write>(header: &Header, tracks: &[Track], out: &mut W) -> WriteResult<W> {
    Chunk::write_header(header, tracks.len(), out)?;

    #[cfg(feature = "parallel")]
    {
        let event_count = tracks.iter().map(Track::len).sum::<usize>();
        if (event_count as f32 * EVENTS_TO_BYTES) > PARALLEL_ENABLE_THRESHOLD as f32 {
            use rayon::prelude::*;

            log::trace!("encoding {} tracks in parallel", tracks.len());
            //Each track gets its own buffer, then buffers are written out in file order
            let mut track_chunks = Vec::new();
            tracks
                .par_iter()
                .map(|track| -> Result<Vec<u8>> {
                    let mut track_chunk = Vec::new();
                    Chunk::write_to_vec(track, &mut track_chunk)?;
                    Ok(track_chunk)
                })
                .collect_into_vec(&mut track_chunks);

            for result in track_chunks {
                let track_chunk = result.map_err(|err| W::invalid_input(err.message()))?;
                out.write(&track_chunk)?;
            }
            return Ok(());
        }
    }

    //Write the tracks into a reusable buffer before writing them out, so that chunk lengths can
    //be patched in
    let mut buf = Vec::new();
    for track in tracks {
        Chunk::write_to_vec(track, &mut buf).map_err(|err| W::invalid_input(err.message()))?;
        out.write(&buf)?;
    }
    Ok(())
}

/// A raw chunk, as found in the body of an SMF file.
#[derive(Copy, Clone, Debug)]
struct Chunk<'a> {
    id: [u8; 4],
    data: &'a [u8],
}
impl<'a> Chunk<'a> {
    /// Read the chunk at the start of `raw`, advancing it to the next chunk.
    /// Returns `None` only when `raw` is exactly empty.
    fn read(raw: &mut &'a [u8]) -> Result<Option<Chunk<'a>>> {
        if raw.is_empty() {
            return Ok(None);
        }
        let mut id = [0; 4];
        id.copy_from_slice(read_slice(raw, 4)?);
        let len = read_u32(raw)?;
        let data = raw
            .split_checked(len as usize)
            .ok_or(err_truncated!("reached eof before chunk ended"))?;
        log::trace!("read {:?} chunk of {} bytes", String::from_utf8_lossy(&id), len);
        Ok(Some(Chunk { id, data }))
    }

    /// Write the 14-byte header chunk into a writer.
    fn write_header<W: Write>(header: &Header, track_count: usize, out: &mut W) -> WriteResult<W> {
        let track_count = u16::try_from(track_count)
            .map_err(|_| W::invalid_input("more than 65535 tracks"))?;
        let mut chunk = [0; 14];
        chunk[..4].copy_from_slice(b"MThd");
        chunk[4..8].copy_from_slice(&6u32.to_be_bytes());
        chunk[8..].copy_from_slice(&header.encode(track_count));
        out.write(&chunk)
    }

    /// Write a single track chunk into a `Vec`, replacing its previous contents.
    fn write_to_vec(track: &Track, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        out.reserve(8 + (track.len() as f32 * EVENTS_TO_BYTES) as usize);
        //The length is patched in after encoding the events
        out.extend_from_slice(b"MTrk\0\0\0\0");
        let mut running_status = None;
        for ev in track.events() {
            ev.write(&mut running_status, out)?;
        }
        let len = u32::try_from(out.len() - 8)
            .map_err(|_| err_input!("midi chunk size exceeds 32 bit range"))?;
        out[4..8].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }
}

#[derive(Copy, Clone, Debug)]
struct ChunkIter<'a> {
    /// Starts at the current index, ends at EOF.
    raw: &'a [u8],
}
impl<'a> Iterator for ChunkIter<'a> {
    type Item = Result<Chunk<'a>>;
    fn next(&mut self) -> Option<Result<Chunk<'a>>> {
        let chunk = Chunk::read(&mut self.raw).transpose();
        if let Some(Err(_)) = chunk {
            //Never resume reading from a corrupted position
            self.raw = &[];
        }
        chunk
    }
}

/// The two supported layouts of a Standard Midi File.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Format {
    /// A single track containing all channels. Format `0`.
    SingleTrack,
    /// Several tracks played in parallel, the first one usually carrying the tempo map.
    /// Format `1`.
    MultiTrack,
}
impl Format {
    /// Interpret the raw format field of a header.
    ///
    /// Format `2` (sequential tracks) is valid SMF but unsupported, while any other value is a
    /// malformed header.
    pub fn from_bits(bits: u16) -> Result<Format> {
        Ok(match bits {
            0 => Format::SingleTrack,
            1 => Format::MultiTrack,
            2 => bail!(err_unsupported!("sequential (format 2) files are not supported")),
            _ => bail!(err_header!("invalid smf format")),
        })
    }

    /// The raw format field for this format.
    pub fn as_bits(self) -> u16 {
        match self {
            Format::SingleTrack => 0,
            Format::MultiTrack => 1,
        }
    }
}

/// The global settings of a file: its layout and its time division.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawHeader", into = "RawHeader")
)]
pub struct Header {
    format: Format,
    ticks_per_quarter: u15,
}
impl Header {
    /// Build a header from its format and raw division field.
    ///
    /// A division with the top bit set indicates SMPTE timecode timing, which is unsupported.
    /// A division of zero ticks per quarter note is malformed.
    pub fn new(format: Format, division: u16) -> Result<Header> {
        ensure!(
            division & 0x8000 == 0,
            err_unsupported!("smpte timecode division is not supported")
        );
        ensure!(division != 0, err_header!("division must be nonzero"));
        Ok(Header {
            format,
            ticks_per_quarter: u15::new(division),
        })
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Amount of MIDI ticks per quarter note (beat).
    #[inline]
    pub fn ticks_per_quarter(&self) -> u15 {
        self.ticks_per_quarter
    }

    /// Decode the 6-byte body of an `MThd` chunk, along with the declared track count.
    fn read(mut raw: &[u8]) -> Result<(Header, u16)> {
        let format = Format::from_bits(read_u16(&mut raw)?)?;
        let track_count = read_u16(&mut raw)?;
        let header = Header::new(format, read_u16(&mut raw)?)?;
        Ok((header, track_count))
    }

    fn encode(&self, track_count: u16) -> [u8; 6] {
        let mut bytes = [0; 6];
        bytes[0..2].copy_from_slice(&self.format.as_bits().to_be_bytes()[..]);
        bytes[2..4].copy_from_slice(&track_count.to_be_bytes()[..]);
        bytes[4..6].copy_from_slice(&self.ticks_per_quarter.as_int().to_be_bytes()[..]);
        bytes
    }
}

/// The serialized form of a `Header`, validated through `Header::new` on the way in.
#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct RawHeader {
    format: Format,
    division: u16,
}
#[cfg(feature = "serde")]
impl TryFrom<RawHeader> for Header {
    type Error = Error;
    fn try_from(raw: RawHeader) -> Result<Header> {
        Header::new(raw.format, raw.division)
    }
}
#[cfg(feature = "serde")]
impl From<Header> for RawHeader {
    fn from(header: Header) -> RawHeader {
        RawHeader {
            format: header.format,
            division: header.ticks_per_quarter.as_int(),
        }
    }
}

/// A single track: an ordered list of events, along with some data derived from them.
///
/// Serializes as its bare event list; the derived data is rebuilt on deserialization.
#[derive(Clone, PartialEq, Eq, Debug, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "Vec<Event>", into = "Vec<Event>")
)]
pub struct Track {
    events: Vec<Event>,
    total_ticks: u64,
    name: String,
}
impl Track {
    /// Build a track from its events, in playback order.
    pub fn new(events: Vec<Event>) -> Track {
        let total_ticks = events.iter().map(|ev| ev.delta().as_int() as u64).sum();
        let name = events
            .iter()
            .find_map(|ev| match ev.kind() {
                EventKind::Meta(MetaMessage::TrackName(name)) => Some(name.clone()),
                _ => None,
            })
            .unwrap_or_default();
        Track {
            events,
            total_ticks,
            name,
        }
    }

    #[inline]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[inline]
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// The sum of all delta times in the track.
    #[inline]
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// The text of the first `TrackName` event, or an empty string if there is none.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over the events along with their absolute tick.
    pub fn iter_ticks(&self) -> impl Iterator<Item = (u64, &Event)> + '_ {
        self.events.iter().scan(0u64, |tick, ev| {
            *tick += ev.delta().as_int() as u64;
            Some((*tick, ev))
        })
    }
}
impl From<Vec<Event>> for Track {
    #[inline]
    fn from(events: Vec<Event>) -> Track {
        Track::new(events)
    }
}
impl From<Track> for Vec<Event> {
    #[inline]
    fn from(track: Track) -> Vec<Event> {
        track.into_events()
    }
}

/// Lazily yields the track chunks of a file.
///
/// Yields exactly as many tracks as the header declares. If the file ends before then, a
/// `Truncated` error is yielded.
#[derive(Clone, Debug)]
pub struct TrackIter<'a> {
    chunks: ChunkIter<'a>,
    remaining: u16,
}
impl<'a> TrackIter<'a> {
    fn new(raw: &'a [u8], track_count: u16) -> TrackIter<'a> {
        TrackIter {
            chunks: ChunkIter { raw },
            remaining: track_count,
        }
    }

    /// Get the remaining unread bytes.
    #[inline]
    pub fn unread(&self) -> &'a [u8] {
        self.chunks.raw
    }

    /// Parse and collect the remaining tracks.
    pub fn collect_tracks(self) -> Result<Vec<Track>> {
        #[cfg(feature = "parallel")]
        {
            if self.unread().len() >= PARALLEL_ENABLE_THRESHOLD {
                use rayon::prelude::*;

                log::trace!("decoding {} tracks in parallel", self.remaining);
                let chunk_vec = self.collect::<Result<Vec<_>>>()?;
                return chunk_vec
                    .into_par_iter()
                    .map(EventIter::into_track)
                    .collect::<Result<Vec<Track>>>();
            }
        }
        self.map(|r| r.and_then(EventIter::into_track))
            .collect::<Result<Vec<Track>>>()
    }

    fn check_trailing(&mut self) -> Result<()> {
        let trailing = mem::take(&mut self.chunks.raw);
        if !trailing.is_empty() {
            if cfg!(feature = "strict") {
                bail!(err_track!("file has more chunks than declared"));
            }
            log::debug!("ignoring {} bytes after the declared tracks", trailing.len());
        }
        Ok(())
    }
}
impl<'a> Iterator for TrackIter<'a> {
    type Item = Result<EventIter<'a>>;

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }

    fn next(&mut self) -> Option<Result<EventIter<'a>>> {
        if self.remaining == 0 {
            return self.check_trailing().err().map(Err);
        }
        self.remaining -= 1;
        let result = match self.chunks.next() {
            Some(Ok(chunk)) if &chunk.id == b"MTrk" => Ok(EventIter::new(chunk.data)),
            Some(Ok(_)) => Err(err_track!("expected MTrk chunk")),
            Some(Err(err)) => Err(err),
            None => Err(err_truncated!("file has fewer tracks than declared")),
        };
        if result.is_err() {
            //Stop iterating after the first error
            self.remaining = 0;
            self.chunks.raw = &[];
        }
        Some(result)
    }
}

/// Decodes the events of a single track on demand.
///
/// Owns the running status of the track, so several tracks can be decoded independently.
/// Unknown meta events are skipped, and their delta time is added to the next event.
/// If the carried delta no longer fits in a `u28`, the next event is a `MalformedTrack` error,
/// since no single event could represent that gap.
#[derive(Clone, Debug)]
pub struct EventIter<'a> {
    raw: &'a [u8],
    running_status: Option<u8>,
    skipped_ticks: u32,
}
impl<'a> EventIter<'a> {
    /// Create an event iterator from raw track data, without the `MTrk` chunk header.
    #[inline]
    pub fn new(raw: &'a [u8]) -> EventIter<'a> {
        EventIter {
            raw,
            running_status: None,
            skipped_ticks: 0,
        }
    }

    /// Get the remaining unread bytes.
    #[inline]
    pub fn unread(&self) -> &'a [u8] {
        self.raw
    }

    /// Get the current running status of the track.
    #[inline]
    pub fn running_status(&self) -> Option<u8> {
        self.running_status
    }

    /// Modify the current running status of the track.
    #[inline]
    pub fn running_status_mut(&mut self) -> &mut Option<u8> {
        &mut self.running_status
    }

    /// Collect the remaining events into a `Track`.
    ///
    /// With the `strict` feature, the track must end with an `EndOfTrack` event.
    pub fn into_track(self) -> Result<Track> {
        let mut events = Vec::with_capacity(self.raw.len() / 3);
        let mut iter = self;
        for ev in &mut iter {
            events.push(ev?);
        }
        if iter.skipped_ticks > 0 {
            log::debug!(
                "dropping {} ticks of skipped events at the end of a track",
                iter.skipped_ticks
            );
        }
        let ends_properly = matches!(
            events.last().map(Event::kind),
            Some(EventKind::Meta(MetaMessage::EndOfTrack))
        );
        if !ends_properly {
            if cfg!(feature = "strict") {
                bail!(err_track!("track does not end with an end of track event"));
            }
            log::debug!("track does not end with an end of track event");
        }
        Ok(Track::new(events))
    }
}
impl<'a> Iterator for EventIter<'a> {
    type Item = Result<Event>;
    fn next(&mut self) -> Option<Result<Event>> {
        while !self.raw.is_empty() {
            let read = Event::read_parts(&mut self.raw, &mut self.running_status);
            let (delta, kind) = match read {
                Ok(parts) => parts,
                Err(err) => {
                    //Do not read from the middle of a broken message
                    self.raw = &[];
                    return Some(Err(err));
                }
            };
            let delta = self.skipped_ticks.saturating_add(delta.as_int());
            match kind {
                Some(kind) => {
                    self.skipped_ticks = 0;
                    let delta = match u28::try_from(delta) {
                        Some(delta) => delta,
                        None => {
                            self.raw = &[];
                            return Some(Err(err_track!(
                                "delta time overflows after skipping unknown events"
                            )));
                        }
                    };
                    return Some(Ok(Event::new(delta, kind)));
                }
                None => self.skipped_ticks = delta,
            }
        }
        None
    }
}
