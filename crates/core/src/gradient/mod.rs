//! Idle animation: a slow walk around a [`Palette`].

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};

use crate::color::{blend_with_floor, FLOOR};
use crate::{CancellationToken, Color, GradientConfig, Palette, Result, VisualiserError};

/// Number of blend steps between two neighbouring palette entries.
pub const STEPS_PER_PAIR: u32 = 256;

/// Position of the animation inside the palette.
///
/// Owned by the animator thread only; consumers see nothing but the colors
/// it publishes.
#[derive(Debug, Clone)]
pub struct AnimationCursor {
    palette: Palette,
    c1: usize,
    c2: usize,
    t: u32,
    interpolated: Color,
    floor: i32,
}

impl AnimationCursor {
    /// Creates a cursor at the first palette entry using the default floor.
    pub fn new(palette: Palette) -> Self {
        Self::with_floor(palette, FLOOR)
    }

    /// Creates a cursor at the first palette entry with a custom floor.
    pub fn with_floor(palette: Palette, floor: i32) -> Self {
        let interpolated = palette.get(0);
        let c2 = 1 % palette.len();
        Self {
            palette,
            c1: 0,
            c2,
            t: 0,
            interpolated,
            floor,
        }
    }

    /// Indices of the palette pair currently being traversed.
    pub fn pair(&self) -> (usize, usize) {
        (self.c1, self.c2)
    }

    /// Returns the step within the current pair, `0..STEPS_PER_PAIR`.
    pub fn progress(&self) -> u32 {
        self.t
    }

    /// Computes the color for the current step.
    ///
    /// The fresh blend between the two palette entries is blended once more
    /// with the previous output, which smooths the hue changes.
    pub fn color(&mut self) -> Color {
        let t = self.t as i32;
        let step = blend_with_floor(
            self.palette.get(self.c1),
            self.palette.get(self.c2),
            t,
            self.floor,
        );
        self.interpolated = blend_with_floor(self.interpolated, step, t, self.floor);
        self.interpolated
    }

    /// Moves to the next step, rolling over to the next palette pair after
    /// [`STEPS_PER_PAIR`] steps.
    pub fn advance(&mut self) {
        self.t += 1;
        if self.t == STEPS_PER_PAIR {
            self.t = 0;
            self.c1 = (self.c1 + 1) % self.palette.len();
            self.c2 = (self.c2 + 1) % self.palette.len();
        }
    }
}

/// Producer thread publishing the idle animation.
///
/// Colors are handed over through a zero-capacity channel: a color is only
/// delivered when the consumer is actively waiting for one.
pub struct GradientAnimator {
    colors: Receiver<Color>,
    thread: Option<JoinHandle<()>>,
}

impl GradientAnimator {
    /// Starts the animator thread, publishing one color per `config.tick`
    /// until `cancel` fires.
    pub fn spawn(
        palette: Palette,
        config: &GradientConfig,
        floor: i32,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let (tx, colors) = bounded(0);
        let cursor = AnimationCursor::with_floor(palette, floor);
        let period = config.tick;

        let thread = thread::Builder::new()
            .name("gradient".to_string())
            .spawn(move || {
                tracing::info!(tick_ms = period.as_millis() as u64, "gradient animator started");
                animate(cursor, period, &tx, &cancel);
                tracing::info!("gradient animator stopped");
            })
            .map_err(|e| VisualiserError::msg(format!("failed to spawn gradient animator: {e}")))?;

        Ok(Self {
            colors,
            thread: Some(thread),
        })
    }

    /// Returns the channel the animated colors arrive on.
    pub fn colors(&self) -> &Receiver<Color> {
        &self.colors
    }

    /// Waits for the animator thread. It exits within one tick of
    /// cancellation.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for GradientAnimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradientAnimator").finish()
    }
}

fn animate(
    mut cursor: AnimationCursor,
    period: Duration,
    tx: &Sender<Color>,
    cancel: &CancellationToken,
) {
    let ticker = tick(period);
    loop {
        select! {
            recv(cancel.signal()) -> _ => return,
            recv(ticker) -> _ => {}
        }

        // The same color is offered until taken; every tick in between only
        // retries. Progress follows deliveries, not ticks.
        let color = cursor.color();
        loop {
            select! {
                recv(cancel.signal()) -> _ => return,
                recv(ticker) -> _ => continue,
                send(tx, color) -> sent => {
                    if sent.is_err() {
                        return;
                    }
                    cursor.advance();
                    break;
                }
            }
        }
    }
}
