//! Raw audio I/O boundary: microphone capture and speaker playback, both
//! excluded from the core's scope but needed by anything that
//! drives the core end to end, such as the client binary.

/// Non-blocking source of interleaved stereo float32 samples from a
/// microphone (or any other analogue-in device). Mirrors
/// [`crate::capture::MediaCapture`]'s non-blocking contract: a call
/// returns whatever is currently available, never blocks, and an empty
/// result means "nothing new yet", not an error.
pub trait AudioInput: Send {
    /// Returns up to `max_samples` interleaved samples currently buffered
    /// by the device, oldest first. May return fewer than requested, or
    /// none.
    fn read_samples(&mut self, max_samples: usize) -> Vec<f32>;
}

/// Sink for interleaved stereo float32 samples destined for a speaker (or
/// any other analogue-out device).
pub trait AudioOutput: Send {
    fn write_samples(&mut self, samples: &[f32]);
}

/// An input that never has anything buffered. Used when a client joins
/// muted (`--no-audio`) so the audio-send thread still has a well-formed
/// collaborator to poll instead of a special-cased `Option`.
#[derive(Default)]
pub struct SilentAudioInput;

impl AudioInput for SilentAudioInput {
    fn read_samples(&mut self, _max_samples: usize) -> Vec<f32> {
        Vec::new()
    }
}

/// An input that always has a steady sine tone buffered, at a configurable
/// frequency. Exists to drive a "tone vs. silence" mixing scenario without
/// a real microphone.
pub struct ToneAudioInput {
    frequency_hz: f32,
    sample_rate_hz: f32,
    phase: f32,
}

impl ToneAudioInput {
    pub fn new(frequency_hz: f32, sample_rate_hz: f32) -> Self {
        Self {
            frequency_hz,
            sample_rate_hz,
            phase: 0.0,
        }
    }
}

impl AudioInput for ToneAudioInput {
    fn read_samples(&mut self, max_samples: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(max_samples);
        let step = std::f32::consts::TAU * self.frequency_hz / self.sample_rate_hz;
        // Interleaved stereo: identical tone on both channels.
        for _ in 0..max_samples / 2 {
            let sample = self.phase.sin();
            out.push(sample);
            out.push(sample);
            self.phase = (self.phase + step) % std::f32::consts::TAU;
        }
        out
    }
}

/// An output that discards everything written to it. Used where a
/// collaborator is required but the caller doesn't care about playback
/// (tests, headless scenario harnesses).
#[derive(Default)]
pub struct DiscardAudioOutput;

impl AudioOutput for DiscardAudioOutput {
    fn write_samples(&mut self, _samples: &[f32]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_input_never_produces_samples() {
        let mut input = SilentAudioInput;
        assert!(input.read_samples(960).is_empty());
    }

    #[test]
    fn tone_input_produces_requested_sample_count() {
        let mut input = ToneAudioInput::new(440.0, 48_000.0);
        let samples = input.read_samples(960);
        assert_eq!(samples.len(), 960);
    }

    #[test]
    fn tone_input_is_not_silent() {
        let mut input = ToneAudioInput::new(440.0, 48_000.0);
        let samples = input.read_samples(960);
        assert!(samples.iter().any(|s| s.abs() > 0.01));
    }
}
