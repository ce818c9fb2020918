use std::path::PathBuf;

use crate::light::ColorChannel;

/// Result alias that carries the custom [`VisualiserError`] type.
pub type Result<T> = std::result::Result<T, VisualiserError>;

/// Common error type for the core crate.
///
/// Every variant is fatal to the pipeline. Nothing in the crate retries.
#[derive(Debug, thiserror::Error)]
pub enum VisualiserError {
    /// Free-form message, mostly used for startup failures that have no
    /// better home.
    #[error("{0}")]
    Message(String),
    /// A caller handed in data the crate cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// One of the three light channel files could not be opened.
    #[error("failed to open light channel {}: {source}", .path.display())]
    OpenChannel {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Writing a brightness value to a channel failed. Channels written
    /// before this one keep their new value.
    #[error("failed to write {channel} channel: {source}")]
    WriteChannel {
        channel: ColorChannel,
        #[source]
        source: std::io::Error,
    },
    /// The light sink was used after it had been closed.
    #[error("light sink is closed")]
    SinkClosed,
    /// Reading raw audio from the input stream failed. End of input is
    /// reported here too, as `UnexpectedEof`.
    #[error("failed to read audio input: {0}")]
    AudioRead(#[source] std::io::Error),
    /// The playback device could not be opened or reported a stream error.
    #[error("audio playback failed: {0}")]
    Playback(String),
}

impl VisualiserError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<String> for VisualiserError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
