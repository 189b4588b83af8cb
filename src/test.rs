use crate::{
    num::{u14, u24, u28, u4, u7},
    parse, write, ErrorKind, Event, EventIter, EventKind, EventType, Format, Fps, Header,
    KeySignature, MetaMessage, MidiMessage, Result, Smf, SmpteOffset, TimeSignature, Track,
};
use pretty_assertions::assert_eq;

/// Build a raw SMF file out of raw track bodies.
fn smf_bytes(format: u16, division: u16, tracks: &[&[u8]]) -> Vec<u8> {
    let mut out = b"MThd\0\0\0\x06".to_vec();
    out.extend_from_slice(&format.to_be_bytes());
    out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    out.extend_from_slice(&division.to_be_bytes());
    for track in tracks {
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(track.len() as u32).to_be_bytes());
        out.extend_from_slice(track);
    }
    out
}

fn midi(delta: u32, channel: u8, message: MidiMessage) -> Event {
    Event::midi(u28::new(delta), u4::new(channel), message)
}

fn note_on(delta: u32, key: u8, vel: u8) -> Event {
    midi(
        delta,
        0,
        MidiMessage::NoteOn {
            key: u7::new(key),
            vel: u7::new(vel),
        },
    )
}

fn note_off(delta: u32, key: u8) -> Event {
    midi(
        delta,
        0,
        MidiMessage::NoteOff {
            key: u7::new(key),
            vel: u7::new(0),
        },
    )
}

fn meta(delta: u32, meta: MetaMessage) -> Event {
    Event::meta(u28::new(delta), meta)
}

fn tempo(delta: u32, micros: u32) -> Event {
    meta(delta, MetaMessage::Tempo(u24::new(micros)))
}

fn end(delta: u32) -> Event {
    meta(delta, MetaMessage::EndOfTrack)
}

fn header(division: u16) -> Header {
    Header::new(Format::MultiTrack, division).unwrap()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn parse_err(raw: &[u8]) -> ErrorKind {
    Smf::parse(raw).unwrap_err().kind()
}

/// Decode every track sequentially through the lazy api.
fn collect_sequential(raw: &[u8]) -> Result<Vec<Track>> {
    let (_header, tracks) = parse(raw)?;
    tracks
        .map(|track| track.and_then(EventIter::into_track))
        .collect()
}

#[test]
fn decode_half_second_file() {
    let raw = smf_bytes(
        1,
        480,
        &[&[
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, //tempo 500000
            0x83, 0x60, 0x90, 0x3C, 0x40, //note on after 480 ticks
            0x00, 0xFF, 0x2F, 0x00,
        ]],
    );
    let smf = Smf::parse(&raw).unwrap();
    assert_eq!(smf.format(), Format::MultiTrack);
    assert_eq!(smf.ticks_per_quarter().as_int(), 480);
    assert_eq!(
        smf.tracks()[0].events(),
        &[tempo(0, 500_000), note_on(480, 60, 64), end(0)][..]
    );
    assert_eq!(smf.tracks()[0].total_ticks(), 480);
    assert!(close(smf.duration(), 0.5));
}

#[test]
fn running_status_survives_meta_events() {
    let raw = smf_bytes(
        0,
        96,
        &[&[
            0x00, 0x90, 0x3C, 0x40, //
            0x10, 0x3E, 0x40, //running status
            0x00, 0xFF, 0x01, 0x01, b'a', //
            0x10, 0x40, 0x40, //still running after the meta event
            0x00, 0xF0, 0x01, 0xF7, //
            0x10, 0x43, 0x00, //and after the sysex event
            0x00, 0xFF, 0x2F, 0x00,
        ]],
    );
    let smf = Smf::parse(&raw).unwrap();
    assert_eq!(
        smf.tracks()[0].events(),
        &[
            note_on(0, 60, 64),
            note_on(16, 62, 64),
            meta(0, MetaMessage::Text("a".to_string())),
            note_on(16, 64, 64),
            Event::sysex(u28::new(0), vec![0xF0, 0xF7]),
            note_on(16, 67, 0),
            end(0),
        ][..]
    );
}

#[test]
fn running_status_is_per_track() {
    let raw = smf_bytes(
        1,
        96,
        &[
            &[0x00, 0x90, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00],
            &[0x00, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00],
        ],
    );
    assert_eq!(parse_err(&raw), ErrorKind::MalformedTrack);
}

#[test]
fn running_status_compression_on_encode() {
    let smf = Smf::new(
        header(96),
        vec![Track::new(vec![
            note_on(0, 60, 64),
            note_on(0, 62, 64),
            note_off(0, 60),
            meta(0, MetaMessage::Text("x".to_string())),
            note_off(0, 62),
            end(0),
        ])],
    )
    .unwrap();
    let bytes = smf.to_bytes().unwrap();
    let expected_track: &[u8] = &[
        0x00, 0x90, 0x3C, 0x40, //
        0x00, 0x3E, 0x40, //
        0x00, 0x80, 0x3C, 0x00, //
        0x00, 0xFF, 0x01, 0x01, b'x', //
        0x00, 0x80, 0x3E, 0x00, //meta events reset the running status
        0x00, 0xFF, 0x2F, 0x00,
    ];
    assert_eq!(bytes, smf_bytes(1, 96, &[expected_track]));
}

#[test]
fn every_event_kind_roundtrips() {
    let smpte = SmpteOffset {
        hours: 0x61,
        minutes: 2,
        seconds: 3,
        frames: 4,
        frame_hundredths: 50,
    };
    let tracks = vec![
        Track::new(vec![
            meta(0, MetaMessage::SequenceNumber(7)),
            meta(0, MetaMessage::TrackName("Piano – café".to_string())),
            meta(0, MetaMessage::Copyright("(c)".to_string())),
            meta(0, MetaMessage::SmpteOffset(smpte)),
            meta(
                0,
                MetaMessage::TimeSignature(TimeSignature {
                    numerator: 6,
                    denominator_pow2: 3,
                    clocks_per_click: 36,
                    thirty_seconds_per_24_clocks: 8,
                }),
            ),
            meta(
                0,
                MetaMessage::KeySignature(KeySignature {
                    sharps_or_flats: -3,
                    tonality: 1,
                }),
            ),
            tempo(0, 428_571),
            meta(0, MetaMessage::Marker("intro".to_string())),
            meta(0, MetaMessage::CuePoint("go".to_string())),
            meta(100, MetaMessage::SequencerSpecific(vec![0x00, 0x00, 0x41])),
            end(0),
        ]),
        Track::new(vec![
            meta(0, MetaMessage::ChannelPrefix(9)),
            meta(0, MetaMessage::InstrumentName("Drums".to_string())),
            midi(
                0,
                9,
                MidiMessage::ProgramChange {
                    program: u7::new(5),
                },
            ),
            midi(
                0,
                9,
                MidiMessage::Controller {
                    controller: u7::new(7),
                    value: u7::new(100),
                },
            ),
            midi(
                10,
                9,
                MidiMessage::NoteOn {
                    key: u7::new(36),
                    vel: u7::new(127),
                },
            ),
            midi(
                0,
                9,
                MidiMessage::NotePressure {
                    key: u7::new(36),
                    pressure: u7::new(90),
                },
            ),
            midi(
                5,
                9,
                MidiMessage::ChannelPressure {
                    pressure: u7::new(80),
                },
            ),
            midi(
                5,
                15,
                MidiMessage::PitchBend {
                    bend: u14::new(0x3FFF),
                },
            ),
            midi(
                0,
                15,
                MidiMessage::PitchBend {
                    bend: u14::new(0x0081),
                },
            ),
            Event::sysex(u28::new(3), vec![0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7]),
            Event::sysex(u28::new(0), vec![0x43, 0x12, 0x00]),
            meta(0, MetaMessage::Lyric("la".to_string())),
            midi(
                0x0FFF_FFFF,
                9,
                MidiMessage::NoteOff {
                    key: u7::new(36),
                    vel: u7::new(0),
                },
            ),
            end(0),
        ]),
    ];
    let smf = Smf::new(header(960), tracks.clone()).unwrap();
    let bytes = smf.to_bytes().unwrap();
    let reparsed = Smf::parse(&bytes).unwrap();
    assert_eq!(reparsed.tracks(), &tracks[..]);
    assert_eq!(reparsed, smf);
    assert_eq!(reparsed.tracks()[0].name(), "Piano – café");
    assert_eq!(reparsed.tracks()[1].name(), "");
}

#[test]
fn running_status_can_be_inspected_and_seeded() {
    let mut events = EventIter::new(&[0x00, 0x90, 0x3C, 0x40]);
    assert_eq!(events.running_status(), None);
    assert_eq!(events.next().unwrap().unwrap(), note_on(0, 60, 64));
    assert_eq!(events.running_status(), Some(0x90));

    let mut events = EventIter::new(&[0x10, 0x3C, 0x00]);
    *events.running_status_mut() = Some(0x80);
    assert_eq!(events.next().unwrap().unwrap(), note_off(0x10, 60));
    assert!(events.next().is_none());
}

#[test]
fn event_types_split_into_voice_meta_and_sysex() {
    let voice = [
        EventType::NoteOff,
        EventType::NoteOn,
        EventType::NotePressure,
        EventType::Controller,
        EventType::ProgramChange,
        EventType::ChannelPressure,
        EventType::PitchBend,
    ];
    let metas = [
        EventType::SequenceNumber,
        EventType::Text,
        EventType::Copyright,
        EventType::TrackName,
        EventType::InstrumentName,
        EventType::Lyric,
        EventType::Marker,
        EventType::CuePoint,
        EventType::ChannelPrefix,
        EventType::EndOfTrack,
        EventType::Tempo,
        EventType::SmpteOffset,
        EventType::TimeSignature,
        EventType::KeySignature,
        EventType::SequencerSpecific,
    ];
    for ty in voice {
        assert!(ty.is_channel_voice() && !ty.is_meta(), "{:?}", ty);
    }
    for ty in metas {
        assert!(!ty.is_channel_voice() && ty.is_meta(), "{:?}", ty);
    }
    assert!(!EventType::Sysex.is_channel_voice() && !EventType::Sysex.is_meta());
}

#[test]
fn smpte_offset_at_drop_frame_rate() {
    let offset = SmpteOffset {
        hours: 0x40 | 1,
        minutes: 2,
        seconds: 3,
        frames: 15,
        frame_hundredths: 50,
    };
    assert_eq!(offset.hour(), 1);
    assert_eq!(offset.fps(), Fps::Fps29);
    let expected = 3600.0 + 120.0 + 3.0 + 15.5 * 1.001 / 30.0;
    assert!(close(offset.as_seconds(), expected));

    let offset = SmpteOffset {
        hours: 0x60 | 23,
        minutes: 0,
        seconds: 0,
        frames: 0,
        frame_hundredths: 0,
    };
    assert_eq!((offset.hour(), offset.fps()), (23, Fps::Fps30));
    assert!(close(offset.as_seconds(), 23.0 * 3600.0));
}

#[test]
fn meta_accessors() {
    let minor = KeySignature {
        sharps_or_flats: -3,
        tonality: 1,
    };
    let major = KeySignature {
        tonality: 0,
        ..minor
    };
    assert!(minor.is_minor());
    assert!(!major.is_minor());

    assert_eq!(MetaMessage::Lyric("la".to_string()).text(), Some("la"));
    assert_eq!(MetaMessage::CuePoint("go".to_string()).text(), Some("go"));
    assert_eq!(MetaMessage::EndOfTrack.text(), None);
    assert_eq!(MetaMessage::SequencerSpecific(b"abc".to_vec()).text(), None);
}

#[test]
fn pitch_bend_is_two_seven_bit_halves() {
    let mut raw: &[u8] = &[0x00, 0xE3, 0x00, 0x40];
    let ev = Event::read(&mut raw, &mut None).unwrap().unwrap();
    assert_eq!(
        ev.kind(),
        &EventKind::Midi {
            channel: u4::new(3),
            message: MidiMessage::PitchBend {
                bend: u14::new(0x2000)
            },
        }
    );
    assert_eq!(ev.event_type(), EventType::PitchBend);
    assert!(ev.event_type().is_channel_voice());
}

#[test]
fn fixed_length_metas_are_validated() {
    let cases: &[(u8, u8)] = &[
        (0x51, 2),
        (0x51, 4),
        (0x58, 3),
        (0x59, 1),
        (0x00, 1),
        (0x20, 2),
        (0x2F, 1),
        (0x54, 4),
    ];
    for &(type_byte, len) in cases {
        let mut track = vec![0x00, 0xFF, type_byte, len];
        track.extend(std::iter::repeat(0).take(len as usize));
        track.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        let raw = smf_bytes(0, 96, &[&track]);
        assert_eq!(
            parse_err(&raw),
            ErrorKind::MalformedTrack,
            "meta {:#04x} with {} bytes",
            type_byte,
            len
        );
    }
}

#[test]
fn unknown_meta_is_skipped() {
    let mut raw: &[u8] = &[0x00, 0xFF, 0x10, 0x05, 1, 2, 3, 4, 5, 0x90, 0x3C];
    let mut running_status = None;
    assert_eq!(Event::read(&mut raw, &mut running_status).unwrap(), None);
    assert_eq!(raw, &[0x90, 0x3C]);
    assert_eq!(running_status, None);
}

#[test]
fn unknown_meta_delta_is_carried() {
    let raw = smf_bytes(
        1,
        480,
        &[&[
            0x10, 0xFF, 0x10, 0x02, 0xAA, 0xBB, //
            0x20, 0x90, 0x3C, 0x40, //
            0x00, 0xFF, 0x2F, 0x00,
        ]],
    );
    let smf = Smf::parse(&raw).unwrap();
    assert_eq!(
        smf.tracks()[0].events(),
        &[note_on(0x30, 60, 64), end(0)][..]
    );
    assert_eq!(smf.tracks()[0].total_ticks(), 0x30);
}

#[test]
fn carried_delta_must_fit_one_event() {
    let skipped: &[u8] = &[0xFF, 0xFF, 0xFF, 0x7F, 0xFF, 0x10, 0x00];
    let fits = [skipped, &[0x00, 0x90, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00][..]].concat();
    let smf = Smf::parse(&smf_bytes(1, 480, &[&fits])).unwrap();
    assert_eq!(smf.tracks()[0].events()[0], note_on(0x0FFF_FFFF, 60, 64));

    let overflows = [skipped, &[0x01, 0x90, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00][..]].concat();
    assert_eq!(
        parse_err(&smf_bytes(1, 480, &[&overflows])),
        ErrorKind::MalformedTrack
    );
}

#[test]
fn sysex_framing_is_symmetric() {
    let cases: &[(&[u8], &[u8])] = &[
        (&[0xF0, 0x7E, 0x7F, 0xF7], &[0x00, 0xF0, 0x03, 0x7E, 0x7F, 0xF7]),
        (&[0x43, 0x12], &[0x00, 0xF7, 0x02, 0x43, 0x12]),
        (&[0xF0], &[0x00, 0xF0, 0x00]),
        (&[], &[0x00, 0xF7, 0x00]),
    ];
    for &(payload, encoded) in cases {
        let track = Track::new(vec![Event::sysex(u28::new(0), payload.to_vec()), end(0)]);
        let bytes = Smf::new(header(96), vec![track]).unwrap().to_bytes().unwrap();
        let mut expected = encoded.to_vec();
        expected.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        assert_eq!(&bytes[22..], &expected[..]);

        let mut raw = encoded;
        let ev = Event::read(&mut raw, &mut None).unwrap().unwrap();
        assert_eq!(ev.kind(), &EventKind::Sysex(payload.to_vec()));
    }
}

#[test]
fn same_tick_changes_merge() {
    let smf = Smf::new(
        header(480),
        vec![Track::new(vec![
            tempo(0, 600_000),
            meta(
                0,
                MetaMessage::TimeSignature(TimeSignature {
                    numerator: 3,
                    denominator_pow2: 2,
                    clocks_per_click: 24,
                    thirty_seconds_per_24_clocks: 8,
                }),
            ),
            end(480),
        ])],
    )
    .unwrap();
    let timeline = smf.timeline();
    assert_eq!(timeline.len(), 1);
    let change = timeline[0];
    assert!(change.new_tempo() && change.new_time_signature());
    assert_eq!(change.tick(), 0);
    assert!(close(change.bpm(), 100.0));
    assert_eq!((change.numerator(), change.denominator()), (3, 4));
    assert!(close(smf.duration(), 0.6));
}

#[test]
fn longer_tracks_extend_duration_once() {
    let smf = Smf::new(
        header(480),
        vec![
            Track::new(vec![tempo(0, 1_000_000), end(480)]),
            Track::new(vec![note_on(960, 60, 64), end(0)]),
            Track::new(vec![note_on(720, 60, 64), end(0)]),
            Track::new(vec![end(100)]),
        ],
    )
    .unwrap();
    assert!(close(smf.duration(), 2.0));
    assert!(close(smf.tempo_map().seconds_at(960), 2.0));
    assert_eq!(smf.tempo_map().tick_at(1.5), 720);
}

#[test]
fn unsupported_headers_are_rejected() {
    let track: &[u8] = &[0x00, 0xFF, 0x2F, 0x00];
    assert_eq!(parse_err(&smf_bytes(2, 96, &[track])), ErrorKind::Unsupported);
    assert_eq!(
        parse_err(&smf_bytes(1, 0xE728, &[track])),
        ErrorKind::Unsupported
    );
    assert_eq!(
        parse_err(&smf_bytes(3, 96, &[track])),
        ErrorKind::MalformedHeader
    );
    assert_eq!(
        parse_err(&smf_bytes(1, 0, &[track])),
        ErrorKind::MalformedHeader
    );
    assert_eq!(
        Header::new(Format::SingleTrack, 0x8000).unwrap_err().kind(),
        ErrorKind::Unsupported
    );
    assert_eq!(Format::from_bits(2).unwrap_err().kind(), ErrorKind::Unsupported);
}

#[test]
fn malformed_headers_are_rejected() {
    let track: &[u8] = &[0x00, 0xFF, 0x2F, 0x00];
    let mut raw = smf_bytes(1, 96, &[track]);
    raw[0] = b'X';
    assert_eq!(parse_err(&raw), ErrorKind::MalformedHeader);

    let mut raw = smf_bytes(1, 96, &[track]);
    raw[7] = 7;
    assert_eq!(parse_err(&raw), ErrorKind::MalformedHeader);

    assert_eq!(parse_err(&smf_bytes(1, 96, &[])), ErrorKind::MalformedHeader);
}

#[test]
fn truncated_input() {
    let track: &[u8] = &[0x00, 0x90, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00];
    let raw = smf_bytes(1, 96, &[track]);

    assert_eq!(parse_err(&raw[..10]), ErrorKind::Truncated);
    assert_eq!(parse_err(&raw[..raw.len() - 2]), ErrorKind::Truncated);

    //Declare two tracks but only provide one
    let mut raw = raw.clone();
    raw[11] = 2;
    assert_eq!(parse_err(&raw), ErrorKind::Truncated);

    //A message cut short by the end of its chunk
    let raw = smf_bytes(1, 96, &[&[0x00, 0x90, 0x3C]]);
    assert_eq!(parse_err(&raw), ErrorKind::Truncated);
}

#[test]
fn only_track_chunks_after_header() {
    let mut raw = smf_bytes(1, 96, &[&[0x00, 0xFF, 0x2F, 0x00]]);
    raw[14..18].copy_from_slice(b"XFIH");
    assert_eq!(parse_err(&raw), ErrorKind::MalformedTrack);
}

#[test]
fn system_messages_are_rejected_in_tracks() {
    for status in [0xF1u8, 0xF2, 0xF6, 0xF8, 0xFE] {
        let raw = smf_bytes(0, 96, &[&[0x00, status, 0x00, 0x00, 0xFF, 0x2F, 0x00]]);
        assert_eq!(parse_err(&raw), ErrorKind::MalformedTrack, "status {:#04x}", status);
    }
}

#[test]
fn rmid_files_are_unwrapped() {
    let smf = smf_bytes(0, 96, &[&[0x00, 0x90, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00]]);
    let mut body = b"RMID".to_vec();
    body.extend_from_slice(b"data");
    body.extend_from_slice(&(smf.len() as u32).to_le_bytes());
    body.extend_from_slice(&smf);
    let mut rmid = b"RIFF".to_vec();
    rmid.extend_from_slice(&(body.len() as u32).to_le_bytes());
    rmid.extend_from_slice(&body);

    assert_eq!(Smf::parse(&rmid).unwrap(), Smf::parse(&smf).unwrap());
}

#[test]
fn empty_file_is_invalid_input() {
    assert_eq!(
        Smf::new(header(96), Vec::new()).unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
}

#[test]
fn too_many_tracks_is_invalid_input() {
    let tracks = vec![Track::default(); 0x1_0000];
    let mut out = Vec::new();
    assert_eq!(
        write(&header(96), &tracks, &mut out).unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
}

#[test]
#[cfg(not(feature = "strict"))]
fn lenient_decoding() {
    //Out of range data byte and no end of track event, followed by garbage
    let mut raw = smf_bytes(0, 96, &[&[0x00, 0x90, 0xBC, 0x40]]);
    raw.extend_from_slice(b"junk");
    let smf = Smf::parse(&raw).unwrap();
    assert_eq!(smf.tracks()[0].events(), &[note_on(0, 60, 64)][..]);
}

#[test]
#[cfg(feature = "strict")]
fn strict_decoding() {
    let missing_end = smf_bytes(0, 96, &[&[0x00, 0x90, 0x3C, 0x40]]);
    assert_eq!(parse_err(&missing_end), ErrorKind::MalformedTrack);

    let high_data_byte = smf_bytes(0, 96, &[&[0x00, 0x90, 0xBC, 0x40, 0x00, 0xFF, 0x2F, 0x00]]);
    assert_eq!(parse_err(&high_data_byte), ErrorKind::MalformedTrack);

    let mut trailing = smf_bytes(0, 96, &[&[0x00, 0xFF, 0x2F, 0x00]]);
    trailing.extend_from_slice(b"MTrk\0\0\0\0");
    assert_eq!(parse_err(&trailing), ErrorKind::MalformedTrack);

    let single_with_two = smf_bytes(0, 96, &[&[0x00, 0xFF, 0x2F, 0x00], &[0x00, 0xFF, 0x2F, 0x00]]);
    assert_eq!(parse_err(&single_with_two), ErrorKind::MalformedHeader);
}

#[test]
fn parallel_and_sequential_decoding_agree() {
    let tracks = (0..4)
        .map(|t| {
            let mut events = (0..1500)
                .map(|i| note_on(i % 7, (i % 128) as u8, ((i + t) % 128) as u8))
                .collect::<Vec<_>>();
            events.push(end(0));
            Track::new(events)
        })
        .collect::<Vec<_>>();
    let bytes = Smf::new(header(480), tracks.clone())
        .unwrap()
        .to_bytes()
        .unwrap();
    let smf = Smf::parse(&bytes).unwrap();
    assert_eq!(smf.tracks(), &tracks[..]);
    assert_eq!(collect_sequential(&bytes).unwrap(), tracks);
}

#[test]
fn std_writers_match_in_memory_encoding() {
    let smf = Smf::new(
        header(96),
        vec![Track::new(vec![tempo(0, 500_000), note_on(96, 60, 64), end(0)])],
    )
    .unwrap();
    let mut std_out = Vec::new();
    smf.write_std(&mut std_out).unwrap();
    assert_eq!(std_out, smf.to_bytes().unwrap());

    let path = std::env::temp_dir().join(format!("smfkit-save-{}.mid", std::process::id()));
    smf.save(&path).unwrap();
    let saved = std::fs::read(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(Smf::parse(&saved).unwrap(), smf);
}

#[cfg(feature = "serde")]
#[test]
fn deserialization_validates_like_construction() {
    let json = serde_json::to_string(&header(480)).unwrap();
    assert_eq!(json, r#"{"format":"MultiTrack","division":480}"#);
    assert_eq!(serde_json::from_str::<Header>(&json).unwrap(), header(480));
    for bad in [
        r#"{"format":"MultiTrack","division":0}"#,
        r#"{"format":"SingleTrack","division":32768}"#,
    ] {
        assert!(serde_json::from_str::<Header>(bad).is_err(), "{}", bad);
    }

    let track = Track::new(vec![
        meta(0, MetaMessage::TrackName("lead".to_string())),
        note_on(240, 60, 64),
        end(240),
    ]);
    let back: Track = serde_json::from_str(&serde_json::to_string(&track).unwrap()).unwrap();
    assert_eq!(back, track);

    //Derived data is rebuilt from the events
    let rebuilt: Track = serde_json::from_str(r#"[{"delta":480,"kind":{"Meta":"EndOfTrack"}}]"#)
        .unwrap();
    assert_eq!((rebuilt.total_ticks(), rebuilt.name()), (480, ""));
    assert!(serde_json::from_str::<Track>(
        r#"{"events":[],"total_ticks":0,"name":"bogus"}"#
    )
    .is_err());

    let good = serde_json::to_value(note_on(0, 60, 64)).unwrap();
    let mut bad_channel = good.clone();
    bad_channel["kind"]["Midi"]["channel"] = 200.into();
    assert!(serde_json::from_value::<Event>(bad_channel).is_err());
    let mut bad_key = good.clone();
    bad_key["kind"]["Midi"]["message"]["NoteOn"]["key"] = 255.into();
    assert!(serde_json::from_value::<Event>(bad_key).is_err());
    let mut bad_delta = good.clone();
    bad_delta["delta"] = 0x1000_0000.into();
    assert!(serde_json::from_value::<Event>(bad_delta).is_err());
    assert_eq!(serde_json::from_value::<Event>(good).unwrap(), note_on(0, 60, 64));

    let decoded = Smf::new(header(480), vec![back]).unwrap();
    let built = Smf::new(header(480), vec![track]).unwrap();
    assert_eq!(decoded.to_bytes().unwrap(), built.to_bytes().unwrap());
}
