//! Frequency → note-name mapping on the equal-tempered 12-note scale.
//!
//! Reference pitch is A4 = 440 Hz (MIDI 69).  The mapping is pure and
//! deterministic: the same input always yields the same string.

// ---------------------------------------------------------------------------
// Chromatic scale
// ---------------------------------------------------------------------------

/// The twelve chromatic note names, starting at C.
const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

// ---------------------------------------------------------------------------
// hz_to_note
// ---------------------------------------------------------------------------

/// Convert a frequency in Hz to a note name like `"A4"`.
///
/// Computes the fractional MIDI number `69 + 12·log2(hz / 440)`, rounds to
/// the nearest integer, and maps it to a name-octave pair.  The octave
/// convention places middle C at `"C4"` (MIDI 60).
///
/// Returns the sentinel `"N/A"` when `pitch_hz` is zero, negative, or not
/// finite — callers must never treat a non-positive frequency as a note.
///
/// # Example
///
/// ```rust
/// use pitch_worker::pitch::hz_to_note;
///
/// assert_eq!(hz_to_note(440.0), "A4");
/// assert_eq!(hz_to_note(261.63), "C4");
/// assert_eq!(hz_to_note(0.0), "N/A");
/// ```
pub fn hz_to_note(pitch_hz: f64) -> String {
    if pitch_hz <= 0.0 || !pitch_hz.is_finite() {
        return "N/A".to_string();
    }

    let midi = 69.0 + 12.0 * (pitch_hz / 440.0).log2();
    let midi = midi.round() as i64;

    // Euclidean mod/div so sub-audio frequencies (negative MIDI numbers)
    // still land on a valid name instead of panicking or wrapping oddly.
    let name = NOTE_NAMES[midi.rem_euclid(12) as usize];
    let octave = midi.div_euclid(12) - 1;

    format!("{name}{octave}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert_eq!(hz_to_note(440.0), "A4");
    }

    #[test]
    fn middle_c() {
        assert_eq!(hz_to_note(261.63), "C4");
    }

    #[test]
    fn non_positive_is_na() {
        assert_eq!(hz_to_note(0.0), "N/A");
        assert_eq!(hz_to_note(-5.0), "N/A");
        assert_eq!(hz_to_note(f64::NEG_INFINITY), "N/A");
    }

    #[test]
    fn non_finite_is_na() {
        assert_eq!(hz_to_note(f64::NAN), "N/A");
        assert_eq!(hz_to_note(f64::INFINITY), "N/A");
    }

    #[test]
    fn octave_extremes() {
        // Piano range: A0 at the bottom, C8 at the top.
        assert_eq!(hz_to_note(27.5), "A0");
        assert_eq!(hz_to_note(4186.01), "C8");
    }

    #[test]
    fn sub_audio_frequency_maps_below_octave_zero() {
        // 8.18 Hz is MIDI 0 → C-1 in this octave convention.
        assert_eq!(hz_to_note(8.18), "C-1");
    }

    #[test]
    fn slightly_detuned_frequencies_round_to_nearest_note() {
        assert_eq!(hz_to_note(442.0), "A4");
        assert_eq!(hz_to_note(438.0), "A4");
    }

    #[test]
    fn idempotent() {
        let a = hz_to_note(329.63);
        let b = hz_to_note(329.63);
        assert_eq!(a, b);
        assert_eq!(a, "E4");
    }
}
