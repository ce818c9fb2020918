//! The compositing loop that merges audio and the idle gradient into light
//! updates, and the [`Pipeline`] that wires it to its producers.

use std::io::{Read, Write};
use std::sync::Arc;

use crossbeam_channel::{never, select, Receiver};

use crate::audio::{sample_colors, AudioChunk, AudioSampler, ChunkMessage, ChunkPool};
use crate::color::blend_with_floor;
use crate::{
    CancellationToken, Color, GradientAnimator, LightSink, MixConfig, Palette, PlaybackSink,
    Result, VisualiserConfig, VisualiserError,
};

/// Consumer side of the pipeline.
///
/// Holds the latest gradient color and turns every audio chunk into a run of
/// light writes, one per adjacent sample-byte pair.
pub struct Compositor<P, W: Write> {
    sink: Arc<LightSink<W>>,
    playback: P,
    pool: Arc<ChunkPool>,
    mix: MixConfig,
    current: Color,
}

impl<P, W> Compositor<P, W>
where
    P: PlaybackSink,
    W: Write,
{
    /// Creates a compositor that starts out with a black gradient color.
    pub fn new(sink: Arc<LightSink<W>>, playback: P, pool: Arc<ChunkPool>, mix: MixConfig) -> Self {
        Self {
            sink,
            playback,
            pool,
            mix,
            current: Color::BLACK,
        }
    }

    /// Latest gradient color seen by the loop.
    pub fn current_color(&self) -> Color {
        self.current
    }

    /// Returns the playback sink, e.g. to close it after the loop ended.
    pub fn into_playback(self) -> P {
        self.playback
    }

    /// Runs until `cancel` fires or a fatal error shows up.
    ///
    /// The three sources are served in whatever order they become ready.
    /// The audio reader always ends with an error, end of input included, so
    /// its queue closing without one is fatal as well. A gradient animator
    /// that hangs up is simply no longer waited on.
    pub fn run(
        &mut self,
        cancel: &CancellationToken,
        colors: &Receiver<Color>,
        chunks: &Receiver<ChunkMessage>,
    ) -> Result<()> {
        let closed_colors = never();
        let mut colors_open = true;

        loop {
            let color_rx = if colors_open { colors } else { &closed_colors };

            select! {
                recv(cancel.signal()) -> _ => {
                    tracing::debug!("compositor cancelled");
                    return Ok(());
                }
                recv(color_rx) -> color => match color {
                    Ok(color) => self.current = color,
                    Err(_) => {
                        tracing::debug!("gradient animator hung up");
                        colors_open = false;
                    }
                },
                recv(chunks) -> message => match message {
                    Ok(message) => self.process_chunk(message?, cancel)?,
                    Err(_) if cancel.is_cancelled() => return Ok(()),
                    Err(_) => {
                        return Err(VisualiserError::msg("audio reader stopped without a reason"));
                    }
                },
            }
        }
    }

    /// Plays `chunk`, writes one light color per sample pair, then returns the
    /// chunk to the pool.
    ///
    /// Writes stop as soon as `cancel` fires.
    pub fn process_chunk(&mut self, chunk: AudioChunk, cancel: &CancellationToken) -> Result<()> {
        let result = self.render_chunk(&chunk, cancel);
        self.pool.release(chunk);
        result
    }

    fn render_chunk(&mut self, chunk: &AudioChunk, cancel: &CancellationToken) -> Result<()> {
        self.playback.submit(chunk.bytes(), cancel)?;

        tracing::debug!(bytes = chunk.len(), gradient = %self.current, "rendering chunk");
        for gray in sample_colors(chunk.bytes(), self.mix.sample_weight) {
            if cancel.is_cancelled() {
                break;
            }
            let color = blend_with_floor(gray, self.current, self.mix.gradient_weight, self.mix.floor);
            self.sink.write(color)?;
        }
        Ok(())
    }
}

impl<P, W: Write> std::fmt::Debug for Compositor<P, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("current", &self.current)
            .finish()
    }
}

/// Everything needed to drive the light from one audio input.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: VisualiserConfig,
    palette: Palette,
}

impl Pipeline {
    /// Creates a pipeline animating the rainbow palette.
    pub fn new(config: VisualiserConfig) -> Self {
        Self {
            config,
            palette: Palette::rainbow(),
        }
    }

    /// Returns the configuration the pipeline runs with.
    pub fn config(&self) -> &VisualiserConfig {
        &self.config
    }

    /// Leaves the light at the rest color and closes the sink.
    ///
    /// Meant to run once [`Pipeline::run`] has returned, so this is the only
    /// write after cancellation.
    pub fn shutdown<W: Write>(&self, sink: &LightSink<W>) -> Result<()> {
        let rest = self.config.mix.rest_color;
        tracing::info!(color = %rest, "restoring rest color");
        let written = sink.write(rest);
        sink.close();
        written
    }

    /// Spawns the gradient and audio producers and runs the compositor on the
    /// calling thread until `cancel` fires or something fails.
    ///
    /// End of input is an error like any other read failure. On return the
    /// token is cancelled so both producers wind down. The gradient thread is
    /// joined; the audio reader is left to finish on its own since it may be
    /// parked in a blocking read.
    pub fn run<R, P, W>(
        &self,
        input: R,
        playback: P,
        sink: Arc<LightSink<W>>,
        cancel: &CancellationToken,
    ) -> Result<P>
    where
        R: Read + Send + 'static,
        P: PlaybackSink,
        W: Write,
    {
        let audio = &self.config.audio;
        let pool = Arc::new(ChunkPool::new(audio.chunk_size, audio.pool_capacity));

        let animator = GradientAnimator::spawn(
            self.palette.clone(),
            &self.config.gradient,
            self.config.mix.floor,
            cancel.clone(),
        )?;
        let sampler = match AudioSampler::spawn(input, audio, Arc::clone(&pool), cancel.clone()) {
            Ok(sampler) => sampler,
            Err(e) => {
                cancel.cancel();
                animator.join();
                return Err(e);
            }
        };

        tracing::info!(
            chunk_size = audio.chunk_size,
            queue_depth = audio.queue_depth,
            "pipeline running"
        );
        let mut compositor = Compositor::new(sink, playback, pool, self.config.mix.clone());
        let result = compositor.run(cancel, animator.colors(), sampler.chunks());

        cancel.cancel();
        animator.join();
        sampler.detach();
        tracing::info!(ok = result.is_ok(), "pipeline stopped");

        result.map(|()| compositor.into_playback())
    }
}
