//! Connection lifecycle supervisor: accepts connections,
//! drives the handshake, spawns the four per-client worker threads, and
//! tears them down in the documented join order when a client leaves.

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use glyphcast_collab::codec::OpusCodec;
use glyphcast_collab::crypto::{Crypto, X25519ChaChaSession};
use glyphcast_collab::renderer::{AsciiRenderer, ScalarAsciiRenderer};
use glyphcast_net::{StreamTransport, Transport};
use glyphcast_proto::types::{JoinAccept, JoinRequest, RosterEntry, ServerStateMessage};
use glyphcast_proto::PacketType;

use crate::client::{ClientRecord, DisplayCaps};
use crate::config::{ServerConfig, Timeouts};
use crate::error::ServerError;
use crate::manager::ClientManager;
use crate::mixer::Mixer;
use crate::{audio_render, recv, render, send};

/// How often the accept loop polls the shutdown flag between
/// non-blocking `accept` attempts.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How often the per-client supervisor loop wakes to check for the
/// keepalive deadline, `connection_lost`, or `shutting_down`.
const SUPERVISOR_TICK: Duration = Duration::from_millis(250);
/// Upper bound the accept loop waits for in-flight clients to finish
/// draining once a shutdown has been requested.
const SHUTDOWN_DRAIN_BUDGET: Duration = Duration::from_secs(5);

/// Binds the listener and runs until `shutdown` is observed (or forever, if
/// the caller never sets it — `main.rs` wires a ctrl-c handler to it).
pub fn run_server(config: ServerConfig, shutdown: Arc<AtomicBool>) -> Result<(), ServerError> {
    let listener = TcpListener::bind(config.bind_addr())?;
    listener.set_nonblocking(true)?;
    log::info!("listening on {}", config.bind_addr());

    let manager = Arc::new(ClientManager::new());
    let mixer = Arc::new(Mixer::new());
    let renderer: Arc<dyn AsciiRenderer> = Arc::new(ScalarAsciiRenderer);
    let next_client_id = Arc::new(AtomicU32::new(1));
    let timeouts = Timeouts::default();

    if !config.no_discovery {
        let discovery_shutdown = Arc::clone(&shutdown);
        let listener_port = config.port;
        std::thread::spawn(move || crate::discovery::discovery_thread_run(listener_port, listener_port, discovery_shutdown));
    }

    while !shutdown.load(Ordering::Acquire) {
        let stream = match listener.accept() {
            Ok((stream, addr)) => {
                log::debug!("accepted connection from {addr}");
                stream
            }
            Err(err) if is_would_block(&err) => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(err) => {
                log::warn!("accept failed: {err}");
                continue;
            }
        };

        if manager.len() >= config.max_clients {
            log::warn!("rejecting connection: at max_clients ({})", config.max_clients);
            drop(stream);
            continue;
        }

        let manager = Arc::clone(&manager);
        let mixer = Arc::clone(&mixer);
        let renderer = Arc::clone(&renderer);
        let next_client_id = Arc::clone(&next_client_id);
        let insecure = config.insecure_handshake;
        let no_audio_mixer = config.no_audio_mixer;

        std::thread::spawn(move || {
            if let Err(err) =
                supervise_connection(stream, manager, mixer, renderer, &next_client_id, insecure, no_audio_mixer, timeouts)
            {
                log::warn!("connection supervisor exited with error: {err}");
            }
        });
    }

    log::info!("shutdown requested, draining {} client(s)", manager.len());
    for client in manager.snapshot() {
        client.begin_draining();
    }

    let drain_deadline = Instant::now() + SHUTDOWN_DRAIN_BUDGET;
    while !manager.is_empty() && Instant::now() < drain_deadline {
        std::thread::sleep(Duration::from_millis(50));
    }

    Ok(())
}

fn is_would_block(err: &std::io::Error) -> bool {
    matches!(err.kind(), std::io::ErrorKind::WouldBlock)
}

/// Drives one connection through its entire lifecycle: handshake, the four
/// worker threads, keepalive supervision, and ordered teardown. Runs on its
/// own thread for the lifetime of the connection.
fn supervise_connection(
    stream: TcpStream,
    manager: Arc<ClientManager>,
    mixer: Arc<Mixer>,
    renderer: Arc<dyn AsciiRenderer>,
    next_client_id: &AtomicU32,
    insecure_handshake: bool,
    no_audio_mixer: bool,
    timeouts: Timeouts,
) -> Result<(), ServerError> {
    let (client, recv_half) = match handshake(stream, next_client_id, insecure_handshake) {
        Ok(pair) => pair,
        Err(err) => {
            log::warn!("handshake failed: {err}");
            return Err(err);
        }
    };

    client.active.store(true, Ordering::Release);
    client.crypto_ready.store(true, Ordering::Release);

    manager.insert(Arc::clone(&client));
    if !no_audio_mixer {
        mixer.register_producer(client.client_id);
    }
    broadcast_server_state(&manager);
    log::info!("client {} joined", client.client_id);

    let render_handle = spawn_worker("render", client.client_id, {
        let client = Arc::clone(&client);
        let manager = Arc::clone(&manager);
        let renderer = Arc::clone(&renderer);
        move || render::render_thread_run(client, manager, renderer)
    });

    let audio_render_handle = if no_audio_mixer {
        None
    } else {
        Some(spawn_worker("audio-render", client.client_id, {
            let client = Arc::clone(&client);
            let mixer = Arc::clone(&mixer);
            move || match OpusCodec::new() {
                Ok(codec) => audio_render::audio_render_thread_run(client, mixer, Box::new(codec)),
                Err(err) => log::error!("client {}: failed to start opus encoder: {err}", client.client_id),
            }
        }))
    };

    let send_handle = spawn_worker("send", client.client_id, {
        let client = Arc::clone(&client);
        move || send::send_thread_run(client)
    });

    let recv_handle = spawn_worker("recv", client.client_id, {
        let client = Arc::clone(&client);
        let mixer = Arc::clone(&mixer);
        move || match OpusCodec::new() {
            Ok(codec) => recv::recv_thread_run(client, recv_half, mixer, Box::new(codec)),
            Err(err) => log::error!("client {}: failed to start opus decoder: {err}", client.client_id),
        }
    });

    supervise_keepalive(&client, &timeouts);

    client.begin_draining();

    // Join order matters: render and audio-render stop
    // producing before send is allowed to finish draining, and the
    // transport is only closed once receive has also returned.
    let _ = render_handle.join();
    if let Some(audio_render_handle) = audio_render_handle {
        let _ = audio_render_handle.join();
    }
    let _ = send_handle.join();
    let _ = recv_handle.join();

    manager.remove(client.client_id);
    if !no_audio_mixer {
        mixer.unregister_producer(client.client_id);
    }
    broadcast_server_state(&manager);
    log::info!("client {} left", client.client_id);

    Ok(())
}

fn spawn_worker<F>(role: &'static str, client_id: u32, body: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(format!("{role}-{client_id}"))
        .spawn(body)
        .unwrap_or_else(|err| panic!("failed to spawn {role} thread for client {client_id}: {err}"))
}

/// Polls `last_recv_instant` until the client starts draining or its
/// connection is declared lost. Sends a PING once the connection has been
/// idle past `keepalive_idle`; three unanswered probes
/// escalate to `connection_lost`.
fn supervise_keepalive(client: &Arc<ClientRecord>, timeouts: &Timeouts) {
    let mut last_probe_sent: Option<Instant> = None;

    loop {
        if client.shutting_down.load(Ordering::Acquire) || client.connection_lost.load(Ordering::Acquire) {
            return;
        }

        let idle_for = client.last_recv_instant.lock().elapsed();
        let due_for_probe = last_probe_sent.map(|sent| sent.elapsed() >= timeouts.keepalive_probe_interval).unwrap_or(true);

        if idle_for >= timeouts.keepalive_idle && due_for_probe {
            let missed = client.missed_pings.fetch_add(1, Ordering::Relaxed) + 1;
            if missed > timeouts.keepalive_missed_probes {
                log::warn!("client {}: {missed} missed keepalive probes, marking connection lost", client.client_id);
                client.connection_lost.store(true, Ordering::Release);
                return;
            }
            let _ = client.send_sealed(PacketType::Ping, b"");
            last_probe_sent = Some(Instant::now());
        }

        std::thread::sleep(SUPERVISOR_TICK);
    }
}

/// Carries out the handshake: reads the
/// client's `CLIENT_JOIN`/`JoinRequest`, completes the ECDH exchange, and
/// replies with a `CLIENT_JOIN`/`JoinAccept` carrying the assigned client
/// id. Returns the new client record plus the receive-half transport handle
/// (see [`crate::client::ClientRecord`] on the duplex split).
fn handshake(
    stream: TcpStream,
    next_client_id: &AtomicU32,
    insecure: bool,
) -> Result<(Arc<ClientRecord>, Box<dyn Transport>), ServerError> {
    // client_id 0 on this transport is the server-origin sentinel:
    // every packet the server sends, handshake included, carries it.
    let mut transport = StreamTransport::new(stream, 0)?;

    let (packet_type, _sender_id, payload) = transport.recv()?;
    if packet_type != PacketType::ClientJoin {
        return Err(ServerError::Handshake("expected CLIENT_JOIN as the first packet"));
    }
    let request: JoinRequest = postcard::from_bytes(&payload).map_err(glyphcast_proto::ProtocolError::from)?;

    let mut crypto = X25519ChaChaSession::new();
    let server_public = crypto.handshake_begin();
    let (_, done) = crypto.handshake_step(&request.public_key)?;
    if !done && !insecure {
        return Err(ServerError::Handshake("handshake did not complete in one round trip"));
    }

    let client_id = next_client_id.fetch_add(1, Ordering::AcqRel);

    let server_public: [u8; 32] = server_public
        .try_into()
        .map_err(|_| ServerError::Handshake("crypto collaborator returned a public key of unexpected length"))?;
    let accept = JoinAccept {
        client_id,
        public_key: server_public,
    };
    let accept_payload = postcard::to_allocvec(&accept).map_err(glyphcast_proto::ProtocolError::from)?;
    transport.send(PacketType::ClientJoin, &accept_payload)?;

    let recv_half: Box<dyn Transport> = Box::new(transport.try_clone()?);
    let record = ClientRecord::new(client_id, Box::new(transport), Box::new(crypto));
    *record.display.lock() = DisplayCaps {
        width: request.width,
        height: request.height,
        color_mode: request.color_mode,
    };

    Ok((record, recv_half))
}

/// Broadcasts the current membership roster to every connected client.
fn broadcast_server_state(manager: &ClientManager) {
    let roster: Vec<RosterEntry> = manager
        .snapshot()
        .iter()
        .map(|client| {
            let caps = *client.display.lock();
            RosterEntry {
                client_id: client.client_id,
                width: caps.width,
                height: caps.height,
                color_mode: caps.color_mode,
                audio_active: client.audio_active.load(Ordering::Relaxed),
                video_active: client.video_active.load(Ordering::Relaxed),
            }
        })
        .collect();

    let message = ServerStateMessage { roster };
    let payload = match postcard::to_allocvec(&message) {
        Ok(payload) => payload,
        Err(err) => {
            log::error!("failed to encode SERVER_STATE broadcast: {err}");
            return;
        }
    };

    for client in manager.snapshot() {
        if let Err(err) = client.send_sealed(PacketType::ServerState, &payload) {
            log::debug!("client {}: SERVER_STATE broadcast send failed: {err}", client.client_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyphcast_proto::types::ColorMode;
    use std::net::{TcpListener as StdListener, TcpStream as StdStream};

    fn connected_raw_pair() -> (TcpStream, TcpStream) {
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = StdStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    #[test]
    fn handshake_completes_and_assigns_sequential_ids() {
        let (server_stream, client_stream) = connected_raw_pair();
        let mut client_side = StreamTransport::new(client_stream, 0).unwrap();
        let next_id = AtomicU32::new(1);

        let mut session = X25519ChaChaSession::new();
        let client_public: [u8; 32] = session.handshake_begin().try_into().unwrap();
        let request = JoinRequest {
            width: 80,
            height: 24,
            color_mode: ColorMode::Mono,
            public_key: client_public,
        };
        client_side.send(PacketType::ClientJoin, &postcard::to_allocvec(&request).unwrap()).unwrap();

        let (record, _recv_half) = handshake(server_stream, &next_id, false).unwrap();
        assert_eq!(record.client_id, 1);

        let (_, _, reply) = client_side.recv().unwrap();
        let accept: JoinAccept = postcard::from_bytes(&reply).unwrap();
        assert_eq!(accept.client_id, 1);
        session.handshake_step(&accept.public_key).unwrap();
    }

    #[test]
    fn handshake_rejects_non_join_first_packet() {
        let (server_stream, mut client_side) = {
            let (server_stream, client_stream) = connected_raw_pair();
            (server_stream, StreamTransport::new(client_stream, 0).unwrap())
        };
        let next_id = AtomicU32::new(1);
        client_side.send(PacketType::Ping, b"").unwrap();
        assert!(handshake(server_stream, &next_id, false).is_err());
    }
}
