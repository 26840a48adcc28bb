//! Pluggable collaborator interfaces (§2, §4.7, §4.8): `Capturer`,
//! `VideoEncoder`/`VideoDecoder`, `AudioEncoder`/`AudioDecoder`,
//! `InputInjector`, `Renderer`. These are out-of-scope platform
//! integrations in the distilled spec; this crate defines the seams and
//! ships one concrete "software" implementation of each so the pipelines
//! are exercised end-to-end.

use anyhow::Result;
use tracing::debug;

use protocol::cursor::CursorImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: i32,
    pub height: i32,
    pub dpi: i32,
}

/// One captured desktop frame, in I420 (the format the video pipeline
/// always encodes from — a `Capturer` is responsible for any conversion out
/// of its native surface format).
pub struct CapturedFrame {
    pub dimensions: Dimensions,
    pub i420_data: Vec<u8>,
    pub cursor: Option<CursorImage>,
}

/// Captures desktop video frames at a caller-driven cadence.
pub trait Capturer: Send {
    fn capture(&mut self) -> Result<CapturedFrame>;

    /// Rebuild internal capture state for new dimensions (§8: a Dimensions
    /// change forces a capturer/encoder rebuild rather than an in-place
    /// resize, matching the original's full re-init on resolution change).
    fn set_dimensions(&mut self, dimensions: Dimensions) -> Result<()>;
}

/// A server-bound keyboard/mouse event, decoded from a `ServerBoundMessage`
/// and handed to the platform input layer.
pub enum InputEvent {
    Key { code: u32, pressed: bool },
    MouseButton { button: u8, pressed: bool, x: i32, y: i32 },
    MouseWheel { delta_x: i32, delta_y: i32 },
    MouseMotion { x: i32, y: i32, relative: bool },
    ReleaseAll,
    /// The client's believed caps/num-lock state (§4.6 `KeyboardState`);
    /// the injector toggles whichever of its own tracked lock keys
    /// disagrees so the two sides reconverge.
    KeyboardState { caps_lock: bool, num_lock: bool },
}

/// Injects input events into the host OS. Abstracted per the spec's
/// Non-goals around window-system integration.
pub trait InputInjector: Send {
    fn inject(&mut self, event: InputEvent) -> Result<()>;
}

/// Presents decoded video frames and the cursor to the local display.
/// Abstracted per the spec's Non-goals around rendering.
pub trait Renderer: Send {
    fn present(&mut self, i420_data: &[u8], dimensions: Dimensions) -> Result<()>;
    fn set_cursor(&mut self, cursor: Option<&CursorImage>) -> Result<()>;
}

/// Concrete "software" `InputInjector` (§4.6): real OS input injection
/// (SendInput/XTest/CGEvent) is the out-of-scope platform integration the
/// spec abstracts behind this trait. This implementation logs the decoded
/// event and counts events by kind, which is enough to exercise the
/// server's control-message dispatch end-to-end without a platform backend.
#[derive(Default)]
pub struct LoggingInjector {
    pub events_injected: u64,
    pub caps_lock: bool,
    pub num_lock: bool,
}

impl InputInjector for LoggingInjector {
    fn inject(&mut self, event: InputEvent) -> Result<()> {
        self.events_injected += 1;
        match event {
            InputEvent::Key { code, pressed } => debug!(code, pressed, "inject key"),
            InputEvent::MouseButton { button, pressed, x, y } => {
                debug!(button, pressed, x, y, "inject mouse button")
            }
            InputEvent::MouseWheel { delta_x, delta_y } => {
                debug!(delta_x, delta_y, "inject mouse wheel")
            }
            InputEvent::MouseMotion { x, y, relative } => {
                debug!(x, y, relative, "inject mouse motion")
            }
            InputEvent::ReleaseAll => debug!("release all input"),
            InputEvent::KeyboardState { caps_lock, num_lock } => {
                if self.caps_lock != caps_lock {
                    debug!("toggle caps lock to reconcile with client");
                    self.caps_lock = caps_lock;
                }
                if self.num_lock != num_lock {
                    debug!("toggle num lock to reconcile with client");
                    self.num_lock = num_lock;
                }
            }
        }
        Ok(())
    }
}

/// Concrete "software" `Renderer` (§4.8): real window-system presentation
/// is out of scope. This implementation tracks the last presented frame's
/// dimensions and cursor so the client pipeline is exercised end-to-end.
#[derive(Default)]
pub struct LoggingRenderer {
    pub frames_presented: u64,
    pub last_dimensions: Option<Dimensions>,
    pub cursor_visible: bool,
}

impl Renderer for LoggingRenderer {
    fn present(&mut self, i420_data: &[u8], dimensions: Dimensions) -> Result<()> {
        self.frames_presented += 1;
        self.last_dimensions = Some(dimensions);
        debug!(bytes = i420_data.len(), ?dimensions, "present frame");
        Ok(())
    }

    fn set_cursor(&mut self, cursor: Option<&CursorImage>) -> Result<()> {
        self.cursor_visible = cursor.is_some();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_injector_counts_events() {
        let mut injector = LoggingInjector::default();
        injector.inject(InputEvent::Key { code: 65, pressed: true }).unwrap();
        injector.inject(InputEvent::ReleaseAll).unwrap();
        assert_eq!(injector.events_injected, 2);
    }

    #[test]
    fn keyboard_state_reconciles_diverged_locks() {
        let mut injector = LoggingInjector::default();
        injector.inject(InputEvent::KeyboardState { caps_lock: true, num_lock: false }).unwrap();
        assert!(injector.caps_lock);
        assert!(!injector.num_lock);

        injector.inject(InputEvent::KeyboardState { caps_lock: true, num_lock: true }).unwrap();
        assert!(injector.caps_lock);
        assert!(injector.num_lock);
    }

    #[test]
    fn logging_renderer_tracks_last_frame() {
        let mut renderer = LoggingRenderer::default();
        let dims = Dimensions { width: 1920, height: 1080, dpi: 96 };
        renderer.present(&[0u8; 8], dims).unwrap();
        assert_eq!(renderer.frames_presented, 1);
        assert_eq!(renderer.last_dimensions, Some(dims));
        renderer.set_cursor(None).unwrap();
        assert!(!renderer.cursor_visible);
    }
}
