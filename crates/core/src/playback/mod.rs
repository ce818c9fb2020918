//! Audio playback of the raw input stream.
//!
//! The cpal stream is not `Send` on every host, so it lives on a dedicated
//! thread for its whole life. The compositor only ever talks to that thread
//! through channels.

use std::collections::VecDeque;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::{AudioConfig, CancellationToken, Result, VisualiserError};

/// Destination for the raw audio bytes the compositor has processed.
pub trait PlaybackSink {
    /// Queues 16-bit little-endian PCM bytes for playback. May block until the
    /// device has room, but must give up as soon as `cancel` fires.
    fn submit(&mut self, bytes: &[u8], cancel: &CancellationToken) -> Result<()>;
}

/// Playback that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPlayback;

impl PlaybackSink for NullPlayback {
    fn submit(&mut self, _bytes: &[u8], _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }
}

impl<P: PlaybackSink + ?Sized> PlaybackSink for Box<P> {
    fn submit(&mut self, bytes: &[u8], cancel: &CancellationToken) -> Result<()> {
        (**self).submit(bytes, cancel)
    }
}

/// Plays audio on the default output device through cpal.
pub struct CpalPlayback {
    samples_tx: Option<Sender<Vec<f32>>>,
    faults: Receiver<String>,
    shutdown_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    carry: Option<u8>,
}

impl CpalPlayback {
    /// Opens the default output device at the configured rate and channel
    /// count. Blocks until the stream is playing or has failed to start.
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let (samples_tx, samples_rx) = bounded::<Vec<f32>>(config.playback_queue_depth);
        let (fault_tx, faults) = bounded::<String>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (init_tx, init_rx) = bounded::<std::result::Result<(), String>>(1);

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let thread = thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || {
                let stream = match build_stream(&stream_config, samples_rx, fault_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(()));
                tracing::info!(
                    sample_rate = stream_config.sample_rate.0,
                    channels = stream_config.channels,
                    "audio playback started"
                );

                // Parks until the handle is closed or dropped.
                let _ = shutdown_rx.recv();
                drop(stream);
                tracing::info!("audio playback stopped");
            })
            .map_err(|e| VisualiserError::Playback(format!("failed to spawn playback thread: {e}")))?;

        init_rx
            .recv()
            .map_err(|_| VisualiserError::Playback("playback thread died during startup".into()))?
            .map_err(VisualiserError::Playback)?;

        Ok(Self {
            samples_tx: Some(samples_tx),
            faults,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
            carry: None,
        })
    }

    /// Stops the stream and waits for the playback thread.
    pub fn close(&mut self) {
        self.samples_tx.take();
        self.shutdown_tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl PlaybackSink for CpalPlayback {
    fn submit(&mut self, bytes: &[u8], cancel: &CancellationToken) -> Result<()> {
        let samples = decode_pcm16(&mut self.carry, bytes);
        if samples.is_empty() {
            return Ok(());
        }
        let tx = self
            .samples_tx
            .as_ref()
            .ok_or_else(|| VisualiserError::Playback("playback is closed".into()))?;
        queue_samples(tx, &self.faults, samples, cancel)
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CpalPlayback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalPlayback")
            .field("open", &self.thread.is_some())
            .finish()
    }
}

fn build_stream(
    config: &cpal::StreamConfig,
    samples_rx: Receiver<Vec<f32>>,
    fault_tx: Sender<String>,
) -> std::result::Result<cpal::Stream, String> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("no audio output device found")?;

    let mut pending: VecDeque<f32> = VecDeque::new();
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                fill_output(data, &mut pending, &samples_rx);
            },
            move |err| {
                tracing::error!(%err, "audio output stream error");
                let _ = fault_tx.try_send(err.to_string());
            },
            None,
        )
        .map_err(|e| format!("failed to build audio stream: {e}"))?;

    stream
        .play()
        .map_err(|e| format!("failed to start audio stream: {e}"))?;

    Ok(stream)
}

/// Hands a block to the device callback, waiting for room in the queue.
///
/// A device fault or a dead stream ends the wait with an error; cancellation
/// ends it quietly and drops the block.
fn queue_samples(
    tx: &Sender<Vec<f32>>,
    faults: &Receiver<String>,
    samples: Vec<f32>,
    cancel: &CancellationToken,
) -> Result<()> {
    if let Ok(fault) = faults.try_recv() {
        return Err(VisualiserError::Playback(fault));
    }

    select! {
        recv(cancel.signal()) -> _ => Ok(()),
        recv(faults) -> fault => Err(VisualiserError::Playback(
            fault.unwrap_or_else(|_| "playback stream is gone".to_string()),
        )),
        send(tx, samples) -> sent => {
            sent.map_err(|_| VisualiserError::Playback("playback stream is gone".into()))
        }
    }
}

/// Fills a device buffer from queued sample blocks, padding with silence
/// when the queue runs dry.
fn fill_output(data: &mut [f32], pending: &mut VecDeque<f32>, samples_rx: &Receiver<Vec<f32>>) {
    for slot in data.iter_mut() {
        if pending.is_empty() {
            if let Ok(block) = samples_rx.try_recv() {
                pending.extend(block);
            }
        }
        *slot = pending.pop_front().unwrap_or(0.0);
    }
}

/// Decodes 16-bit little-endian samples, keeping an odd trailing byte for the
/// next call.
fn decode_pcm16(carry: &mut Option<u8>, bytes: &[u8]) -> Vec<f32> {
    let mut samples = Vec::with_capacity(bytes.len() / 2 + 1);
    let mut rest = bytes;

    if let Some(low) = carry.take() {
        match rest.split_first() {
            Some((&high, tail)) => {
                samples.push(to_f32(low, high));
                rest = tail;
            }
            None => {
                *carry = Some(low);
                return samples;
            }
        }
    }

    let mut pairs = rest.chunks_exact(2);
    samples.extend(pairs.by_ref().map(|pair| to_f32(pair[0], pair[1])));
    *carry = pairs.remainder().first().copied();
    samples
}

fn to_f32(low: u8, high: u8) -> f32 {
    f32::from(i16::from_le_bytes([low, high])) / 32_768.0
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::RecvTimeoutError;

    use super::*;

    #[test]
    fn decodes_little_endian_samples() {
        let mut carry = None;
        let samples = decode_pcm16(&mut carry, &[0x00, 0x40, 0x00, 0xc0, 0xff, 0x7f]);
        assert_eq!(samples, vec![0.5, -0.5, 32_767.0 / 32_768.0]);
        assert_eq!(carry, None);
    }

    #[test]
    fn odd_byte_is_carried_to_next_submission() {
        let mut carry = None;
        let first = decode_pcm16(&mut carry, &[0x00, 0x40, 0x00]);
        assert_eq!(first, vec![0.5]);
        assert_eq!(carry, Some(0x00));

        let second = decode_pcm16(&mut carry, &[0xc0]);
        assert_eq!(second, vec![-0.5]);
        assert_eq!(carry, None);
    }

    #[test]
    fn carry_survives_empty_submission() {
        let mut carry = Some(0x12);
        assert!(decode_pcm16(&mut carry, &[]).is_empty());
        assert_eq!(carry, Some(0x12));
    }

    #[test]
    fn output_is_padded_with_silence() {
        let (tx, rx) = bounded(2);
        tx.send(vec![0.25, 0.5, 0.75]).unwrap();
        let mut pending = VecDeque::new();
        let mut data = [1.0_f32; 5];

        fill_output(&mut data, &mut pending, &rx);

        assert_eq!(data, [0.25, 0.5, 0.75, 0.0, 0.0]);
    }

    #[test]
    fn output_spans_queued_blocks() {
        let (tx, rx) = bounded(2);
        tx.send(vec![0.1]).unwrap();
        tx.send(vec![0.2, 0.3]).unwrap();
        let mut pending = VecDeque::new();
        let mut data = [0.0_f32; 2];

        fill_output(&mut data, &mut pending, &rx);
        assert_eq!(data, [0.1, 0.2]);
        assert_eq!(pending, VecDeque::from(vec![0.3]));
    }

    #[test]
    fn null_playback_accepts_anything() {
        let mut playback: Box<dyn PlaybackSink> = Box::new(NullPlayback);
        assert!(playback.submit(&[1, 2, 3], &CancellationToken::new()).is_ok());
    }

    #[test]
    fn queued_block_reaches_device_queue() {
        let (tx, rx) = bounded(1);
        let (_fault_tx, faults) = bounded::<String>(1);

        queue_samples(&tx, &faults, vec![0.5], &CancellationToken::new()).unwrap();

        assert_eq!(rx.try_recv().unwrap(), vec![0.5]);
    }

    #[test]
    fn cancellation_releases_a_stalled_device_queue() {
        // The device callback never drains: the queue is full for good.
        let (tx, _stalled) = bounded(1);
        tx.send(vec![0.0]).unwrap();
        let (_fault_tx, faults) = bounded::<String>(1);
        let cancel = CancellationToken::new();

        let (done_tx, done) = bounded(1);
        let waiter_cancel = cancel.clone();
        std::thread::spawn(move || {
            let result = queue_samples(&tx, &faults, vec![0.25], &waiter_cancel);
            let _ = done_tx.send(result.is_ok());
        });

        assert_eq!(
            done.recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Timeout),
            "send should block while the queue is full"
        );
        cancel.cancel();
        assert_eq!(done.recv_timeout(Duration::from_secs(5)), Ok(true));
    }

    #[test]
    fn device_fault_ends_a_stalled_send() {
        let (tx, _stalled) = bounded(1);
        tx.send(vec![0.0]).unwrap();
        let (fault_tx, faults) = bounded::<String>(1);

        let (done_tx, done) = bounded(1);
        std::thread::spawn(move || {
            let result = queue_samples(&tx, &faults, vec![0.25], &CancellationToken::new());
            let _ = done_tx.send(result);
        });
        fault_tx.send("device unplugged".to_string()).unwrap();

        match done.recv_timeout(Duration::from_secs(5)).unwrap() {
            Err(VisualiserError::Playback(message)) => assert_eq!(message, "device unplugged"),
            other => panic!("expected a playback error, got {other:?}"),
        }
    }

    #[test]
    fn dead_stream_is_reported() {
        let (tx, _stalled) = bounded(1);
        tx.send(vec![0.0]).unwrap();
        let (fault_tx, faults) = bounded::<String>(1);
        drop(fault_tx);

        let err = queue_samples(&tx, &faults, vec![0.25], &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, VisualiserError::Playback(_)));
    }
}
