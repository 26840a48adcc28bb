pub mod capture;
pub mod decoder;
pub mod encoder;

pub use capture::TestPatternCapturer;
pub use decoder::{DecodedFrame, Decoder};
pub use encoder::{EncodedFrame, Encoder};
