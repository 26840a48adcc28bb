//! Media Pipeline collaborators (§4.7, §4.8): `Capturer`,
//! `VideoEncoder`/`VideoDecoder`, `AudioEncoder`/`AudioDecoder`,
//! `InputInjector`, `Renderer`.

pub mod audio;
pub mod traits;
pub mod video;

pub use traits::{
    CapturedFrame, Capturer, Dimensions, InputEvent, InputInjector, LoggingInjector,
    LoggingRenderer, Renderer,
};
