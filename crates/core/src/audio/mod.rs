//! Raw audio intake: pooled chunks, the reader thread, and the conversion of
//! sample bytes into grayscale brightness.

use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::color::{lerp, pack};
use crate::{AudioConfig, CancellationToken, Color, Result, VisualiserError};

/// One read's worth of raw interleaved PCM bytes.
///
/// Only the first [`AudioChunk::len`] bytes hold data from the last read.
#[derive(Debug)]
pub struct AudioChunk {
    buf: Vec<u8>,
    filled: usize,
}

impl AudioChunk {
    fn empty(size: usize) -> Self {
        Self {
            buf: vec![0; size],
            filled: 0,
        }
    }

    /// Wraps bytes that were produced elsewhere, e.g. in tests.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let filled = bytes.len();
        Self { buf: bytes, filled }
    }

    /// Returns the bytes filled by the last read.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    /// Returns the number of filled bytes.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Returns the size of the underlying buffer.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

/// Fixed-capacity free list of equally sized chunks.
///
/// A chunk is moved out on [`ChunkPool::acquire`] and moved back on
/// [`ChunkPool::release`], so a buffer can never be handed out twice while
/// still in use.
#[derive(Debug)]
pub struct ChunkPool {
    chunk_size: usize,
    free_tx: Sender<AudioChunk>,
    free_rx: Receiver<AudioChunk>,
}

impl ChunkPool {
    /// Creates a pool handing out `chunk_size` byte chunks and keeping at
    /// most `capacity` of them idle.
    pub fn new(chunk_size: usize, capacity: usize) -> Self {
        let (free_tx, free_rx) = bounded(capacity);
        Self {
            chunk_size,
            free_tx,
            free_rx,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns an idle chunk, allocating one if the free list is empty.
    pub fn acquire(&self) -> AudioChunk {
        match self.free_rx.try_recv() {
            Ok(mut chunk) => {
                chunk.filled = 0;
                chunk
            }
            Err(_) => AudioChunk::empty(self.chunk_size),
        }
    }

    /// Puts a chunk back for reuse. Chunks of the wrong size, or beyond the
    /// pool's capacity, are dropped.
    pub fn release(&self, chunk: AudioChunk) {
        if chunk.capacity() != self.chunk_size {
            return;
        }
        let _ = self.free_tx.try_send(chunk);
    }

    /// Number of chunks currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free_rx.len()
    }
}

/// Converts every adjacent pair of sample bytes into a brightness value.
///
/// Each pair `(s[i], s[i + 1])` becomes `lerp(s[i], s[i + 1], weight)`; with
/// the default weight of 255 that follows the second byte of every pair.
pub fn amplitude_samples(bytes: &[u8], weight: i32) -> impl Iterator<Item = i32> + '_ {
    bytes
        .windows(2)
        .map(move |pair| lerp(i32::from(pair[0]), i32::from(pair[1]), weight))
}

/// [`amplitude_samples`] as grayscale colors.
pub fn sample_colors(bytes: &[u8], weight: i32) -> impl Iterator<Item = Color> + '_ {
    amplitude_samples(bytes, weight).map(|sample| pack(sample, sample, sample))
}

/// What the reader thread hands to the compositor.
pub type ChunkMessage = Result<AudioChunk>;

/// Producer thread that reads raw audio into pooled chunks.
pub struct AudioSampler {
    chunks: Receiver<ChunkMessage>,
    thread: Option<JoinHandle<()>>,
}

impl AudioSampler {
    /// Starts reading `input` on a dedicated thread.
    ///
    /// A read error, end of input included, is sent down the queue as the
    /// last message and stops the thread.
    pub fn spawn<R>(
        input: R,
        config: &AudioConfig,
        pool: Arc<ChunkPool>,
        cancel: CancellationToken,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, chunks) = bounded(config.queue_depth);

        let thread = thread::Builder::new()
            .name("audio-reader".to_string())
            .spawn(move || {
                tracing::info!("audio reader started");
                read_loop(input, &pool, &tx, &cancel);
                tracing::info!("audio reader stopped");
            })
            .map_err(|e| VisualiserError::msg(format!("failed to spawn audio reader: {e}")))?;

        Ok(Self {
            chunks,
            thread: Some(thread),
        })
    }

    /// Queue the compositor consumes chunks from.
    pub fn chunks(&self) -> &Receiver<ChunkMessage> {
        &self.chunks
    }

    /// Waits for the reader thread to finish.
    ///
    /// Only call this when the input is known to be closed or failing; a
    /// reader parked in a blocking read does not observe cancellation until
    /// it returns.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Lets the reader thread run to completion on its own.
    pub fn detach(mut self) {
        self.thread.take();
    }
}

impl std::fmt::Debug for AudioSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSampler")
            .field("queued", &self.chunks.len())
            .finish()
    }
}

fn read_loop<R: Read>(
    mut input: R,
    pool: &ChunkPool,
    tx: &Sender<ChunkMessage>,
    cancel: &CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let mut chunk = pool.acquire();
        let message = match input.read(&mut chunk.buf) {
            Ok(0) => {
                pool.release(chunk);
                tracing::warn!("audio input reached end of stream");
                Err(VisualiserError::AudioRead(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "audio input closed",
                )))
            }
            Ok(read) => {
                chunk.filled = read;
                tracing::debug!(bytes = read, "read audio chunk");
                Ok(chunk)
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                pool.release(chunk);
                continue;
            }
            Err(e) => {
                pool.release(chunk);
                Err(VisualiserError::AudioRead(e))
            }
        };
        let fatal = message.is_err();

        select! {
            recv(cancel.signal()) -> _ => return,
            send(tx, message) -> sent => {
                if sent.is_err() || fatal {
                    return;
                }
            }
        }
    }
}
