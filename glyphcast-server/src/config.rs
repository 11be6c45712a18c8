use std::time::Duration;

use clap::Parser;

/// `server [--address A] [--port P] [--no-audio-mixer]`.
#[derive(Debug, Clone, Parser)]
#[command(name = "glyphcast-server", version, about = "ASCII-video/audio conferencing server")]
pub struct ServerConfig {
    /// Address to bind the listener on.
    #[arg(long, default_value = "0.0.0.0")]
    pub address: String,

    /// Port to bind the listener on.
    #[arg(long, default_value_t = 27224)]
    pub port: u16,

    /// Disables the audio mixer entirely; clients still exchange video.
    #[arg(long)]
    pub no_audio_mixer: bool,

    /// Maximum clients the server will accept simultaneously.
    #[arg(long, default_value_t = 9)]
    pub max_clients: usize,

    /// Disables host identity verification in the handshake. For test use
    /// only.
    #[arg(long, env = "GLYPHCAST_INSECURE_HANDSHAKE")]
    pub insecure_handshake: bool,

    /// Disables the UDP discovery beacon. The beacon is a convenience for
    /// clients that don't already know the server's address; it has no
    /// bearing on the core packet-framing or lifecycle invariants.
    #[arg(long)]
    pub no_discovery: bool,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Timeout defaults. Not currently exposed on the CLI; kept as
/// a separate struct so a future `--connect-timeout`-style flag doesn't
/// reshuffle `ServerConfig`.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub accept: Duration,
    pub send: Duration,
    pub recv: Duration,
    pub keepalive_idle: Duration,
    pub keepalive_probe_interval: Duration,
    pub keepalive_missed_probes: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            accept: Duration::from_secs(30),
            send: Duration::from_secs(10),
            recv: Duration::from_secs(10),
            keepalive_idle: Duration::from_secs(60),
            keepalive_probe_interval: Duration::from_secs(10),
            keepalive_missed_probes: 3,
        }
    }
}
