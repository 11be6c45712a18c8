//! glyphcast-client binary entry point: parses the CLI, completes the
//! handshake, and runs the video-send/audio-send/recv threads until
//! ctrl-c or the connection is lost.

use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;

use glyphcast_client::{announce_leave, announce_stream_start, connect_and_handshake, ClientConfig};
use glyphcast_collab::{DiscardAudioOutput, NullCapture, OpusCodec, SilentAudioInput, StdoutDisplay, ToneAudioInput};

fn main() -> anyhow::Result<()> {
    let config = ClientConfig::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("glyphcast-client v{}", env!("CARGO_PKG_VERSION"));
    log::info!("connecting to {}", config.server_addr());

    let (session, recv_half) = connect_and_handshake(&config)?;
    log::info!("joined as client {}", session.client_id);

    announce_stream_start(&session, config.audio, true)?;

    // Webcam/video-file capture hardware is an external collaborator this
    // crate never implements (see its contract in glyphcast_collab::capture);
    // NullCapture keeps the video-send thread well-formed until a real one
    // is wired in.
    let capture = Box::new(NullCapture);

    let audio_input: Box<dyn glyphcast_collab::AudioInput> = match (config.audio, config.test_tone_hz) {
        (true, Some(hz)) => Box::new(ToneAudioInput::new(hz, glyphcast_collab::codec::SAMPLE_RATE_HZ as f32)),
        _ => Box::new(SilentAudioInput),
    };
    let audio_output = Box::new(DiscardAudioOutput);
    let display = Box::new(StdoutDisplay);

    let send_codec = Box::new(OpusCodec::new()?);
    let recv_codec = Box::new(OpusCodec::new()?);

    let shutdown = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let handler_flag = std::sync::Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        log::info!("received interrupt, shutting down");
        handler_flag.store(true, Ordering::Release);
    })?;

    let running = glyphcast_client::session::RunningSession::spawn(
        session.clone(),
        recv_half,
        capture,
        audio_input,
        audio_output,
        display,
        send_codec,
        recv_codec,
    );

    while !shutdown.load(Ordering::Acquire) && !session.connection_lost.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(50));
    }

    announce_leave(&session);
    session.begin_draining();
    running.join();

    log::info!("glyphcast-client exiting");
    Ok(())
}
