//! Per-client send scheduler: audio-first, rate-limited video,
//! with a bounded sleep between iterations.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glyphcast_proto::types::AsciiFrameHeader;
use glyphcast_proto::PacketType;

use crate::client::ClientRecord;

/// At most this many audio packets drained per iteration (no rate limit
/// beyond the batch cap itself).
const AUDIO_BATCH: usize = 8;
/// Video is sent at most once per this interval (≈60Hz).
const VIDEO_MIN_INTERVAL: Duration = Duration::from_micros(16_667);
/// Idle sleep between iterations when there's nothing to send.
const IDLE_SLEEP: Duration = Duration::from_micros(100);
/// Persistent network errors within this window escalate to connection loss.
const ERROR_WINDOW: Duration = Duration::from_secs(1);
const ERROR_THRESHOLD: u32 = 3;

pub fn send_thread_run(client: Arc<ClientRecord>) {
    let mut error_window_start: Option<Instant> = None;
    let mut last_sent_generation: u32 = 0;

    loop {
        let mut sent_anything = false;

        let packets = client.outgoing_audio.try_pop_up_to(AUDIO_BATCH);
        for packet in packets {
            sent_anything = true;
            let result = client.send_sealed(PacketType::Audio, &packet);
            record_send_result(&client, &mut error_window_start, result.is_ok());
        }

        let due_for_video = {
            let last = *client.last_video_send.lock();
            last.elapsed() >= VIDEO_MIN_INTERVAL
        };

        if due_for_video {
            let generation = client.outgoing_video.generation();
            if generation != last_sent_generation {
                if let Some(frame) = client.outgoing_video.snapshot() {
                    if !frame.bytes.is_empty() {
                        sent_anything = true;
                        let caps = *client.display.lock();
                        let sub_header = AsciiFrameHeader {
                            width: caps.width,
                            height: caps.height,
                            color_mode: caps.color_mode,
                            content_hash: glyphcast_proto::checksum(&frame.bytes),
                        };
                        let mut payload = sub_header.encode().to_vec();
                        payload.extend_from_slice(&frame.bytes);

                        let result = client.send_sealed(PacketType::AsciiFrame, &payload);
                        record_send_result(&client, &mut error_window_start, result.is_ok());
                        if result.is_ok() {
                            client.frames_sent.fetch_add(1, Ordering::Relaxed);
                            last_sent_generation = generation;
                        }
                    } else {
                        last_sent_generation = generation;
                    }
                }
            }
            *client.last_video_send.lock() = Instant::now();
        }

        let draining_and_drained =
            client.shutting_down.load(Ordering::Acquire) && client.outgoing_audio.is_closed() && client.outgoing_audio.is_empty();
        if draining_and_drained {
            break;
        }

        if !sent_anything {
            std::thread::sleep(IDLE_SLEEP);
        }
    }

    log::debug!("send thread for client {} exiting", client.client_id);
}

fn record_send_result(client: &Arc<ClientRecord>, error_window_start: &mut Option<Instant>, ok: bool) {
    if ok {
        client.network_error_streak.store(0, Ordering::Relaxed);
        *error_window_start = None;
        return;
    }

    let now = Instant::now();
    let start = *error_window_start.get_or_insert(now);
    if now.duration_since(start) > ERROR_WINDOW {
        client.network_error_streak.store(1, Ordering::Relaxed);
        *error_window_start = Some(now);
        return;
    }

    let streak = client.network_error_streak.fetch_add(1, Ordering::Relaxed) + 1;
    if streak >= ERROR_THRESHOLD {
        client.connection_lost.store(true, Ordering::Release);
        log::warn!("client {}: {streak} network errors within {ERROR_WINDOW:?}, marking connection lost", client.client_id);
    }
}
