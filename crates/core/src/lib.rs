//! Core library for the Lightbar Visualiser.
//!
//! Drives an RGB light bar from two sources at once: raw PCM audio that is
//! played back while it is turned into brightness, and an idle gradient that
//! tints it. Each subsystem lives in its own module; [`Pipeline`] wires them
//! together.

pub mod audio;
pub mod cancel;
pub mod color;
pub mod compositor;
pub mod config;
pub mod error;
pub mod gradient;
pub mod light;
pub mod playback;

pub use audio::{AudioChunk, AudioSampler, ChunkPool};
pub use cancel::CancellationToken;
pub use color::{blend, lerp, pack, Color, Palette, REST_COLOR};
pub use compositor::{Compositor, Pipeline};
pub use config::{AudioConfig, GradientConfig, MixConfig, VisualiserConfig};
pub use error::{Result, VisualiserError};
pub use gradient::{AnimationCursor, GradientAnimator};
pub use light::{ColorChannel, LightSink};
pub use playback::{CpalPlayback, NullPlayback, PlaybackSink};
