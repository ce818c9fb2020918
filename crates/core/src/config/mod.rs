//! Build-time settings: audio format, queue sizes, gradient cadence and the
//! weights used when mixing audio with the gradient.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::color::{Color, FLOOR, REST_COLOR};

/// Directory the kernel exposes LED class devices under.
pub const DEFAULT_LED_ROOT: &str = "/sys/class/leds";

/// Top-level configuration structure for the visualiser.
///
/// Every value is fixed at build time; this type only exists so the
/// constants live in one place and tests can run the pipeline faster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisualiserConfig {
    pub led_root: LedRoot,
    pub audio: AudioConfig,
    pub gradient: GradientConfig,
    pub mix: MixConfig,
}

impl VisualiserConfig {
    pub fn with_led_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.led_root = LedRoot(root.into());
        self
    }
}

/// Root directory holding the `<id>:<color>` LED folders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedRoot(pub PathBuf);

impl Default for LedRoot {
    fn default() -> Self {
        Self(PathBuf::from(DEFAULT_LED_ROOT))
    }
}

impl AsRef<std::path::Path> for LedRoot {
    fn as_ref(&self) -> &std::path::Path {
        &self.0
    }
}

/// Configuration specific to the audio subsystem.
///
/// The input is 16-bit little-endian stereo PCM at 44.1 kHz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: usize,
    /// Size in bytes of every chunk read from the input.
    pub chunk_size: usize,
    /// Chunks that may wait between the reader and the compositor.
    pub queue_depth: usize,
    /// Idle chunks the pool keeps around for reuse.
    pub pool_capacity: usize,
    /// Sample blocks that may wait for the playback device.
    pub playback_queue_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            bytes_per_sample: 2,
            chunk_size: 4096,
            queue_depth: 8,
            pool_capacity: 16,
            playback_queue_depth: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientConfig {
    pub tick: Duration,
}

impl Default for GradientConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
        }
    }
}

/// Weights used when turning audio samples into light colors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixConfig {
    pub floor: i32,
    /// Interpolation weight between the two bytes of a sample pair.
    pub sample_weight: i32,
    /// Interpolation weight from the grayscale sample towards the gradient.
    pub gradient_weight: i32,
    pub rest_color: Color,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            floor: FLOOR,
            sample_weight: 255,
            gradient_weight: 200,
            rest_color: REST_COLOR,
        }
    }
}
