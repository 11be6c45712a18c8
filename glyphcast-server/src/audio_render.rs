//! Per-client audio-render thread: n-1 mixing at 10ms cadence,
//! Opus-packetized at 20ms, enqueued into the client's outgoing audio FIFO.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glyphcast_collab::codec::AudioCodec;
use glyphcast_rt::Ring;

use crate::client::{ClientRecord, AUDIO_RING_CAPACITY_SAMPLES};
use crate::mixer::{mix_sources, Mixer, CHANNELS, ENCODE_CYCLE_SAMPLES, MIX_CYCLE_SAMPLES};

/// 100 iterations/second.
pub const AUDIO_RENDER_INTERVAL: Duration = Duration::from_millis(10);

/// Reads `target` interleaved samples from `ring`, adaptively: drains extra
/// backlog first if the source is more than 2x latency behind, and reads
/// nothing (silence) if the source is less than half-full. Always returns exactly `target` samples, zero-padded if short.
fn read_adaptive(ring: &Ring<f32>, target: usize) -> Vec<f32> {
    let occupancy = ring.len();

    if occupancy > target * 2 {
        let backlog = occupancy - target;
        let _ = ring.pop_up_to(backlog);
    } else if occupancy < target / 2 {
        return vec![0.0; target];
    }

    let mut samples = ring.pop_up_to(target);
    samples.resize(target, 0.0);
    samples
}

/// Keeps this thread's attachment to every other currently-registered
/// producer's `AudioSource` in sync with the mixer's live membership,
/// attaching new joiners and dropping departed ones each tick rather than
/// only once at thread start.
fn sync_attachments(mixer: &Mixer, consumer_id: u32, rings: &mut HashMap<u32, Arc<Ring<f32>>>) {
    let live = mixer.producer_ids_excluding(consumer_id);

    rings.retain(|producer_id, _| {
        let keep = live.contains(producer_id);
        if !keep {
            mixer.detach_consumer(*producer_id, consumer_id);
        }
        keep
    });

    for producer_id in live {
        rings.entry(producer_id).or_insert_with(|| {
            mixer
                .attach_consumer(producer_id, consumer_id, AUDIO_RING_CAPACITY_SAMPLES)
                .expect("producer_ids_excluding just reported this id as registered")
        });
    }
}

pub fn audio_render_thread_run(client: Arc<ClientRecord>, mixer: Arc<Mixer>, mut codec: Box<dyn AudioCodec>) {
    let mix_target = MIX_CYCLE_SAMPLES * CHANNELS;
    let encode_target = ENCODE_CYCLE_SAMPLES * CHANNELS;

    let mut scratch = vec![0.0f32; mix_target];
    let mut accumulated = Vec::with_capacity(encode_target * 2);
    let mut rings: HashMap<u32, Arc<Ring<f32>>> = HashMap::new();

    while !client.shutting_down.load(Ordering::Acquire) {
        let tick_start = Instant::now();

        sync_attachments(&mixer, client.client_id, &mut rings);

        let per_source: Vec<Vec<f32>> = rings.values().map(|ring| read_adaptive(ring, mix_target)).collect();

        mix_sources(&mut scratch, &per_source);
        accumulated.extend_from_slice(&scratch);

        while accumulated.len() >= encode_target {
            let block: Vec<f32> = accumulated.drain(..encode_target).collect();
            match codec.encode(&block) {
                Ok(packet) => client.outgoing_audio.push(packet),
                Err(err) => log::warn!("client {}: opus encode failed: {err}", client.client_id),
            }
        }

        let elapsed = tick_start.elapsed();
        if elapsed < AUDIO_RENDER_INTERVAL {
            std::thread::sleep(AUDIO_RENDER_INTERVAL - elapsed);
        }
    }

    mixer.detach_consumer_everywhere(client.client_id);
    log::debug!("audio-render thread for client {} exiting", client.client_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_read_pads_short_ring_with_silence() {
        let ring = Ring::new(16);
        ring.extend_overwrite([1.0, 1.0]);
        let samples = read_adaptive(&ring, 8);
        assert_eq!(samples.len(), 8);
        assert_eq!(&samples[2..], &[0.0; 6]);
    }

    #[test]
    fn adaptive_read_drains_backlog_before_reading() {
        let ring = Ring::new(64);
        ring.extend_overwrite((0..32).map(|n| n as f32));
        let samples = read_adaptive(&ring, 8);
        assert_eq!(samples.len(), 8);
        // backlog of 24 was drained and discarded; the 8 returned are the
        // tail of what remained.
        assert_eq!(samples, vec![24.0, 25.0, 26.0, 27.0, 28.0, 29.0, 30.0, 31.0]);
    }

    #[test]
    fn sync_attachments_tracks_join_and_leave() {
        let mixer = Mixer::new();
        mixer.register_producer(1);
        let mut rings = HashMap::new();

        sync_attachments(&mixer, 9, &mut rings);
        assert_eq!(rings.len(), 1);
        assert!(rings.contains_key(&1));

        mixer.register_producer(2);
        sync_attachments(&mixer, 9, &mut rings);
        assert_eq!(rings.len(), 2);

        mixer.unregister_producer(1);
        sync_attachments(&mixer, 9, &mut rings);
        assert_eq!(rings.len(), 1);
        assert!(rings.contains_key(&2));
    }

    #[test]
    fn two_consumers_of_the_same_producer_each_see_the_full_stream() {
        let mixer = Mixer::new();
        mixer.register_producer(1);
        let mut rings_a = HashMap::new();
        let mut rings_b = HashMap::new();

        sync_attachments(&mixer, 2, &mut rings_a);
        sync_attachments(&mixer, 3, &mut rings_b);

        mixer.push(1, &[1.0, 2.0, 3.0, 4.0]);

        assert_eq!(rings_a[&1].pop_up_to(4), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(rings_b[&1].pop_up_to(4), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
