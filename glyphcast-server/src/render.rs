//! Per-client video render thread: one thread per connected
//! client, composing every other client's latest frame into this client's
//! outgoing double-buffer.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glyphcast_collab::renderer::{AsciiRenderer, FrameSource};

use crate::client::{ClientRecord, OutgoingVideoFrame};
use crate::manager::ClientManager;

/// 60 iterations/second.
pub const RENDER_INTERVAL: Duration = Duration::from_micros(16_667);

pub fn render_thread_run(
    client: Arc<ClientRecord>,
    manager: Arc<ClientManager>,
    renderer: Arc<dyn AsciiRenderer>,
) {
    let mut last_seen_versions: HashMap<u32, u64> = HashMap::new();

    while !client.shutting_down.load(Ordering::Acquire) {
        let tick_start = Instant::now();

        let others = manager.snapshot_excluding(client.client_id);

        let mut any_new = last_seen_versions.is_empty();
        for other in &others {
            let version = other.incoming_video.version();
            if last_seen_versions.get(&other.client_id).copied() != Some(version) {
                any_new = true;
            }
            last_seen_versions.insert(other.client_id, version);
        }

        if any_new {
            let snapshots: Vec<(u32, Option<Arc<glyphcast_collab::renderer::PixelFrame>>)> =
                others.iter().map(|other| (other.client_id, other.incoming_video.load())).collect();
            let sources: Vec<FrameSource<'_>> = snapshots
                .iter()
                .map(|(id, frame)| FrameSource {
                    client_id: *id,
                    frame: frame.as_deref(),
                })
                .collect();

            let caps = *client.display.lock();
            let rendered = renderer.render(&sources, caps.width, caps.height, caps.color_mode);

            client.outgoing_video.publish(
                rendered.content_hash,
                OutgoingVideoFrame {
                    bytes: rendered.bytes,
                    rendered_at: Instant::now(),
                },
            );
        }

        let elapsed = tick_start.elapsed();
        if elapsed < RENDER_INTERVAL {
            std::thread::sleep(RENDER_INTERVAL - elapsed);
        }
    }

    log::debug!("render thread for client {} exiting", client.client_id);
}
