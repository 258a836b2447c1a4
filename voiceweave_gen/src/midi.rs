// MIDI output from generated pianorolls.
//
// Converts a Pianoroll into a Standard MIDI File (SMF Format 1) for
// playback: one track per instrument plus a tempo track. Pianoroll
// timesteps map to sixteenth notes; consecutive cells holding the same
// pitch merge into one held note, and a pitch change or empty cell ends
// the sounding note.
//
// Pitch index 0 maps to `MidiSettings::base_pitch` so the pianoroll's
// compact pitch range lands in a singable register.
//
// Uses the `midly` crate for MIDI writing.

use midly::{
    Format, Header, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;
use voiceweave_roll::Pianoroll;

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;

/// Ticks per pianoroll timestep (a sixteenth note).
const TICKS_PER_STEP: u32 = TICKS_PER_QUARTER as u32 / 4;

/// Output parameters for MIDI rendering.
#[derive(Debug, Clone, Copy)]
pub struct MidiSettings {
    /// MIDI pitch for pianoroll pitch index 0.
    pub base_pitch: u8,
    pub tempo_bpm: u16,
    /// General MIDI program for every track.
    pub program: u8,
}

impl Default for MidiSettings {
    fn default() -> Self {
        MidiSettings {
            base_pitch: 36, // C2
            tempo_bpm: 72,
            program: 52, // choir aahs
        }
    }
}

/// Convert a pianoroll to MIDI and write it to a file.
pub fn write_midi(
    roll: &Pianoroll,
    path: &Path,
    settings: &MidiSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    let smf = roll_to_smf(roll, settings);
    let mut buf = Vec::new();
    smf.write(&mut buf)?;
    std::fs::write(path, &buf)?;
    Ok(())
}

/// Convert a pianoroll to an in-memory SMF.
pub fn roll_to_smf(roll: &Pianoroll, settings: &MidiSettings) -> Smf<'static> {
    let shape = roll.shape();
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    // Track 0: tempo track.
    let mut tempo_track: Track<'static> = Vec::new();
    let tempo_microseconds = 60_000_000 / u32::from(settings.tempo_bpm);
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(midly::MetaMessage::Tempo(u24::new(tempo_microseconds))),
    });
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
    });
    smf.tracks.push(tempo_track);

    // One track per instrument.
    for instrument in 0..shape.instruments {
        let channel = u4::new((instrument % 16) as u8);
        let mut track: Track<'static> = Vec::new();

        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(settings.program),
                },
            },
        });

        let mut last_event_tick: u32 = 0;
        let mut sounding: Option<u8> = None;

        for t in 0..shape.timesteps {
            let tick = t as u32 * TICKS_PER_STEP;
            let cell_pitch = roll
                .pitch_at(t, instrument)
                .map(|p| midi_pitch(p, settings.base_pitch));

            if cell_pitch == sounding {
                continue; // held note or continued silence
            }

            if let Some(pitch) = sounding.take() {
                track.push(note_off(channel, pitch, tick - last_event_tick));
                last_event_tick = tick;
            }
            if let Some(pitch) = cell_pitch {
                track.push(note_on(channel, pitch, tick - last_event_tick));
                last_event_tick = tick;
                sounding = Some(pitch);
            }
        }

        // End the final note at the piece boundary.
        if let Some(pitch) = sounding.take() {
            let end_tick = shape.timesteps as u32 * TICKS_PER_STEP;
            track.push(note_off(channel, pitch, end_tick - last_event_tick));
        }

        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
    }

    smf
}

fn midi_pitch(pitch_index: usize, base_pitch: u8) -> u8 {
    (usize::from(base_pitch) + pitch_index).min(127) as u8
}

fn note_on(channel: u4, pitch: u8, delta: u32) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::NoteOn {
                key: u7::new(pitch),
                vel: u7::new(80),
            },
        },
    }
}

fn note_off(channel: u4, pitch: u8, delta: u32) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::NoteOff {
                key: u7::new(pitch),
                vel: u7::new(0),
            },
        },
    }
}
