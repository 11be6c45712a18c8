//! Terminal display boundary: client-side rendering of a received ASCII
//! frame, explicitly excluded from the core's scope.

use std::io::Write;

/// Sink for a composited ASCII frame's bytes (UTF-8 with embedded ANSI SGR
/// sequences) plus the occasional out-of-band console
/// control. Implementations decide how (or whether) to paint a real
/// terminal; the core only needs something to hand bytes to.
pub trait TerminalDisplay: Send {
    /// Renders one frame's bytes. Called from the client's receive thread
    /// each time an `ASCII_FRAME` packet arrives; implementations must not
    /// block on user input.
    fn render_frame(&mut self, bytes: &[u8]);

    /// Handles a `CLEAR_CONSOLE` control packet.
    fn clear(&mut self);
}

/// Writes frames straight to stdout: a `\x1b[H` cursor-home (not a full
/// clear, to avoid flicker) before each frame, then the frame bytes
/// verbatim.
#[derive(Default)]
pub struct StdoutDisplay;

impl TerminalDisplay for StdoutDisplay {
    fn render_frame(&mut self, bytes: &[u8]) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(b"\x1b[H");
        let _ = stdout.write_all(bytes);
        let _ = stdout.flush();
    }

    fn clear(&mut self) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(b"\x1b[2J\x1b[H");
        let _ = stdout.flush();
    }
}

/// Records frames instead of painting anything, for tests that want to
/// assert on what the receive thread delivered without a real terminal.
#[derive(Default)]
pub struct RecordingDisplay {
    pub frames: Vec<Vec<u8>>,
    pub clears: usize,
}

impl TerminalDisplay for RecordingDisplay {
    fn render_frame(&mut self, bytes: &[u8]) {
        self.frames.push(bytes.to_vec());
    }

    fn clear(&mut self) {
        self.clears += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_display_captures_frames_in_order() {
        let mut display = RecordingDisplay::default();
        display.render_frame(b"first");
        display.render_frame(b"second");
        assert_eq!(display.frames, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn recording_display_counts_clears() {
        let mut display = RecordingDisplay::default();
        display.clear();
        display.clear();
        assert_eq!(display.clears, 2);
    }
}
