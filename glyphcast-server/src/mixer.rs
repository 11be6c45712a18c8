//! Global source registry for the audio mixer. The rwlock
//! protects only membership — each source's ring buffer is lock-free/
//! low-contention on its own and is read outside the rwlock.
//!
//! A single ring read by every other client's audio-render thread is
//! single-producer/single-consumer in name only — multiple consumers
//! popping the same ring steal each other's samples. The fix: one ring per
//! (producer, consumer) pair. `AudioSource` is a producer's fan-out point;
//! each consumer that attaches gets its own `Ring` with an independent read
//! offset, fed by the same `push` call from the producer's receive thread.

use std::collections::HashMap;
use std::sync::Arc;

use glyphcast_rt::Ring;
use parking_lot::RwLock;

/// One client's outbound audio, fanned out to every other client currently
/// listening to it.
#[derive(Default)]
pub struct AudioSource {
    consumers: RwLock<HashMap<u32, Arc<Ring<f32>>>>,
}

impl AudioSource {
    fn new() -> Self {
        Self::default()
    }

    /// Gives `consumer_id` its own ring fed by this source, sized to hold
    /// `capacity` samples. Re-attaching an already-registered consumer
    /// replaces its ring (and so resets its read position).
    fn register_consumer(&self, consumer_id: u32, capacity: usize) -> Arc<Ring<f32>> {
        let ring = Arc::new(Ring::new(capacity));
        self.consumers.write().insert(consumer_id, Arc::clone(&ring));
        ring
    }

    fn unregister_consumer(&self, consumer_id: u32) {
        self.consumers.write().remove(&consumer_id);
    }

    /// Fans `samples` out to every currently-attached consumer ring.
    pub fn push(&self, samples: &[f32]) {
        for ring in self.consumers.read().values() {
            ring.extend_overwrite(samples.iter().copied());
        }
    }
}

/// Registry of `client_id -> AudioSource`, keyed by the producing client.
#[derive(Default)]
pub struct Mixer {
    sources: RwLock<HashMap<u32, Arc<AudioSource>>>,
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `client_id` as an audio producer. Must be called before
    /// any `push` for that id, and before any other client's audio-render
    /// thread can attach to it.
    pub fn register_producer(&self, client_id: u32) {
        self.sources.write().insert(client_id, Arc::new(AudioSource::new()));
    }

    /// Removes `client_id` as a producer. Consumers already attached keep
    /// whatever they've buffered but stop receiving new samples.
    pub fn unregister_producer(&self, client_id: u32) {
        self.sources.write().remove(&client_id);
    }

    /// Pushes decoded samples from `producer_id` out to its attached
    /// consumers. A no-op if `producer_id` isn't (or is no longer)
    /// registered — e.g. a late packet arriving after the client left.
    pub fn push(&self, producer_id: u32, samples: &[f32]) {
        if let Some(source) = self.sources.read().get(&producer_id) {
            source.push(samples);
        }
    }

    /// Every currently-registered producer id except `exclude`.
    pub fn producer_ids_excluding(&self, exclude: u32) -> Vec<u32> {
        self.sources.read().keys().copied().filter(|id| *id != exclude).collect()
    }

    /// Attaches `consumer_id` to `producer_id`'s fan-out, returning its own
    /// dedicated ring. `None` if `producer_id` isn't registered.
    pub fn attach_consumer(&self, producer_id: u32, consumer_id: u32, capacity: usize) -> Option<Arc<Ring<f32>>> {
        self.sources
            .read()
            .get(&producer_id)
            .map(|source| source.register_consumer(consumer_id, capacity))
    }

    /// Detaches `consumer_id` from `producer_id`'s fan-out.
    pub fn detach_consumer(&self, producer_id: u32, consumer_id: u32) {
        if let Some(source) = self.sources.read().get(&producer_id) {
            source.unregister_consumer(consumer_id);
        }
    }

    /// Detaches `consumer_id` from every producer it may be attached to.
    /// Called once when a client's audio-render thread exits.
    pub fn detach_consumer_everywhere(&self, consumer_id: u32) {
        for source in self.sources.read().values() {
            source.unregister_consumer(consumer_id);
        }
    }
}

/// Target audio cadence constants.
pub const MIX_CYCLE_SAMPLES: usize = 480; // 10ms @ 48kHz/channel
pub const ENCODE_CYCLE_SAMPLES: usize = 960; // 20ms @ 48kHz/channel
pub const CHANNELS: usize = 2;

/// Sums `sources` sample-for-sample into `scratch` (already sized to
/// `frame_len` and zeroed by the caller), applying soft clipping to the
/// final sum. Each source contributes whatever it currently has buffered,
/// adaptively draining more than `frame_len` when it's running behind —
/// callers are expected to have already done that read and
/// hand in per-source sample slices of equal length.
pub fn mix_sources(scratch: &mut [f32], per_source: &[Vec<f32>]) {
    scratch.fill(0.0);
    for samples in per_source {
        for (out, sample) in scratch.iter_mut().zip(samples.iter()) {
            *out += *sample;
        }
    }
    for sample in scratch.iter_mut() {
        *sample = soft_clip(*sample);
    }
}

/// `tanh`-based soft clip: keeps near-unity signals linear, compresses
/// everything above it instead of hard-clipping to a flat-topped square
/// wave.
fn soft_clip(sample: f32) -> f32 {
    sample.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_ids_excludes_self() {
        let mixer = Mixer::new();
        mixer.register_producer(1);
        mixer.register_producer(2);
        let ids = mixer.producer_ids_excluding(1);
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn each_consumer_gets_its_own_independent_ring() {
        let mixer = Mixer::new();
        mixer.register_producer(1);

        let ring_a = mixer.attach_consumer(1, 2, 16).unwrap();
        let ring_b = mixer.attach_consumer(1, 3, 16).unwrap();

        mixer.push(1, &[1.0, 2.0, 3.0]);

        // Consumer A drains first; consumer B must still see all three
        // samples, proving they don't share one underlying queue.
        assert_eq!(ring_a.pop_up_to(3), vec![1.0, 2.0, 3.0]);
        assert_eq!(ring_b.pop_up_to(3), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn push_to_unregistered_producer_is_a_noop() {
        let mixer = Mixer::new();
        mixer.push(99, &[1.0, 2.0]);
    }

    #[test]
    fn detach_consumer_everywhere_removes_from_all_sources() {
        let mixer = Mixer::new();
        mixer.register_producer(1);
        mixer.register_producer(2);
        mixer.attach_consumer(1, 9, 16).unwrap();
        mixer.attach_consumer(2, 9, 16).unwrap();

        mixer.detach_consumer_everywhere(9);

        mixer.push(1, &[1.0]);
        mixer.push(2, &[1.0]);
        // No panics, and re-attaching gets a fresh empty ring rather than
        // whatever (if anything) leaked through.
        let ring = mixer.attach_consumer(1, 9, 16).unwrap();
        assert!(ring.is_empty());
    }

    #[test]
    fn mix_sums_and_soft_clips() {
        let mut scratch = vec![0.0f32; 4];
        let sources = vec![vec![0.9, 0.9, 0.9, 0.9], vec![0.9, 0.9, 0.9, 0.9]];
        mix_sources(&mut scratch, &sources);
        for sample in scratch {
            assert!(sample <= 1.0);
            assert!(sample > 0.9);
        }
    }

    #[test]
    fn silence_mixes_to_silence() {
        let mut scratch = vec![0.0f32; 4];
        mix_sources(&mut scratch, &[]);
        assert_eq!(scratch, vec![0.0; 4]);
    }
}
