//! Audio codec boundary: Opus encode/decode over 20ms stereo float32 blocks
//! at 48kHz.

use crate::error::CollabError;

pub const SAMPLE_RATE_HZ: u32 = 48_000;
pub const CHANNELS: usize = 2;
/// 20ms at 48kHz stereo: 960 frames/channel, interleaved.
pub const FRAME_SAMPLES: usize = 960;
pub const BITRATE_BPS: i32 = 128_000;

/// Encode/decode primitive consumed by the audio render pipeline (§6.1).
/// Implementations own their own codec state (Opus encoders are stateful
/// across calls for bitrate adaptation); the core never inspects that
/// state directly.
pub trait AudioCodec: Send {
    fn encode(&mut self, samples_20ms: &[f32]) -> Result<Vec<u8>, CollabError>;
    fn decode(&mut self, opus_packet: &[u8]) -> Result<Vec<f32>, CollabError>;
}

/// Opus-backed codec at the fixed cadence the mixer produces: 960
/// interleaved stereo float32 samples in, one Opus packet out, and back.
pub struct OpusCodec {
    encoder: opus::Encoder,
    decoder: opus::Decoder,
}

impl OpusCodec {
    pub fn new() -> Result<Self, CollabError> {
        let mut encoder = opus::Encoder::new(SAMPLE_RATE_HZ, opus::Channels::Stereo, opus::Application::Audio)
            .map_err(|e| CollabError::Codec(e.to_string()))?;
        encoder
            .set_bitrate(opus::Bitrate::Bits(BITRATE_BPS))
            .map_err(|e| CollabError::Codec(e.to_string()))?;
        let decoder =
            opus::Decoder::new(SAMPLE_RATE_HZ, opus::Channels::Stereo).map_err(|e| CollabError::Codec(e.to_string()))?;

        Ok(Self { encoder, decoder })
    }
}

impl AudioCodec for OpusCodec {
    fn encode(&mut self, samples_20ms: &[f32]) -> Result<Vec<u8>, CollabError> {
        if samples_20ms.len() != FRAME_SAMPLES * CHANNELS {
            return Err(CollabError::Codec(format!(
                "expected {} interleaved samples, got {}",
                FRAME_SAMPLES * CHANNELS,
                samples_20ms.len()
            )));
        }
        self.encoder
            .encode_vec_float(samples_20ms, 4000)
            .map_err(|e| CollabError::Codec(e.to_string()))
    }

    fn decode(&mut self, opus_packet: &[u8]) -> Result<Vec<f32>, CollabError> {
        self.decoder
            .decode_vec_float(opus_packet, FRAME_SAMPLES * CHANNELS, false)
            .map_err(|e| CollabError::Codec(e.to_string()))
    }
}
