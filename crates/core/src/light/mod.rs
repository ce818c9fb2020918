//! Brightness files of an RGB LED class device.
//!
//! A light bar shows up as three LED devices, `<id>:red`, `<id>:green` and
//! `<id>:blue`, each with a `brightness` file that takes a decimal value.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::{Color, Result, VisualiserError};

/// One of the three hardware channels, in write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChannel {
    Red,
    Green,
    Blue,
}

impl ColorChannel {
    pub const ALL: [ColorChannel; 3] = [Self::Red, Self::Green, Self::Blue];

    pub fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
        }
    }

    /// Brightness file of this channel for device `id` under `root`.
    pub fn brightness_path(self, root: &Path, id: &str) -> PathBuf {
        root.join(format!("{id}:{}", self.name())).join("brightness")
    }

    fn value(self, color: Color) -> u8 {
        match self {
            Self::Red => color.r(),
            Self::Green => color.g(),
            Self::Blue => color.b(),
        }
    }
}

impl fmt::Display for ColorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Write side of the light, shared between the compositor and shutdown.
///
/// A full three-channel write happens under one lock, so writes from
/// different threads never interleave.
pub struct LightSink<W: Write = File> {
    endpoints: Mutex<[Option<W>; 3]>,
}

impl LightSink<File> {
    /// Opens the red, green and blue brightness files of device `id`.
    ///
    /// Channels opened before a failure are closed again before the error is
    /// returned.
    pub fn open(root: impl AsRef<Path>, id: &str) -> Result<Self> {
        let root = root.as_ref();
        let sink = Self {
            endpoints: Mutex::new([None, None, None]),
        };

        for channel in ColorChannel::ALL {
            let path = channel.brightness_path(root, id);
            match OpenOptions::new().write(true).open(&path) {
                Ok(file) => sink.lock()[channel as usize] = Some(file),
                Err(source) => {
                    sink.close();
                    return Err(VisualiserError::OpenChannel { path, source });
                }
            }
        }

        tracing::info!(device = id, root = %root.display(), "opened light channels");
        Ok(sink)
    }
}

impl<W: Write> LightSink<W> {
    /// Builds a sink over already opened red, green and blue endpoints.
    pub fn from_endpoints(red: W, green: W, blue: W) -> Self {
        Self {
            endpoints: Mutex::new([Some(red), Some(green), Some(blue)]),
        }
    }

    /// Writes the three channels of `color` as decimal text.
    ///
    /// Stops at the first failing channel; earlier channels are not rolled
    /// back.
    pub fn write(&self, color: Color) -> Result<()> {
        let mut endpoints = self.lock();
        for channel in ColorChannel::ALL {
            let endpoint = endpoints[channel as usize]
                .as_mut()
                .ok_or(VisualiserError::SinkClosed)?;
            let text = channel.value(color).to_string();
            endpoint
                .write_all(text.as_bytes())
                .and_then(|()| endpoint.flush())
                .map_err(|source| VisualiserError::WriteChannel { channel, source })?;
        }
        Ok(())
    }

    /// Closes every endpoint that is still open. Safe to call repeatedly.
    pub fn close(&self) {
        let mut endpoints = self.lock();
        for (channel, slot) in ColorChannel::ALL.into_iter().zip(endpoints.iter_mut()) {
            if let Some(mut endpoint) = slot.take() {
                if let Err(err) = endpoint.flush() {
                    tracing::warn!(%channel, %err, "flush on close failed");
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().iter().all(Option::is_none)
    }

    fn lock(&self) -> MutexGuard<'_, [Option<W>; 3]> {
        // Endpoints stay usable after a panic elsewhere; the worst case is a
        // torn color, which a failed write already allows.
        match self.endpoints.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write> Drop for LightSink<W> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<W: Write> fmt::Debug for LightSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LightSink")
            .field("closed", &self.is_closed())
            .finish()
    }
}
