use clap::Parser;
use glyphcast_proto::types::ColorMode;

/// `client --address A --port P [--audio] [--color] [--width W] [--height H]`
#[derive(Debug, Clone, Parser)]
#[command(name = "glyphcast-client", version, about = "ASCII-video/audio conferencing client")]
pub struct ClientConfig {
    /// Server address to connect to.
    #[arg(long)]
    pub address: String,

    /// Server port to connect to.
    #[arg(long, default_value_t = 27224)]
    pub port: u16,

    /// Captures and sends microphone audio, and plays back the mixed
    /// stream the server returns. Without this, the client joins muted and
    /// receives no audio.
    #[arg(long)]
    pub audio: bool,

    /// Requests truecolor ASCII frames instead of monochrome.
    #[arg(long)]
    pub color: bool,

    /// Declared terminal width, in cells.
    #[arg(long, default_value_t = 80)]
    pub width: u16,

    /// Declared terminal height, in cells.
    #[arg(long, default_value_t = 24)]
    pub height: u16,

    /// Disables host identity verification in the handshake. For test use
    /// only.
    #[arg(long, env = "GLYPHCAST_INSECURE_HANDSHAKE")]
    pub insecure_handshake: bool,

    /// Drives the audio-send thread with a steady test tone instead of a
    /// real microphone. Has no effect unless `--audio` is also set.
    #[arg(long)]
    pub test_tone_hz: Option<f32>,
}

impl ClientConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn color_mode(&self) -> ColorMode {
        if self.color {
            ColorMode::TrueColor
        } else {
            ColorMode::Mono
        }
    }
}
