use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::color::{Color, PixelPlan};
use crate::error::{Error, Result};
use crate::strip::StripDevice;

/// Frames per fade unless a caller says otherwise.
pub const DEFAULT_FADE_STEPS: usize = 50;

// Throttles visual speed and the SPI write rate, nothing more.
const FRAME_DELAY: Duration = Duration::from_millis(100);

struct EngineState<D> {
    dev: D,
    buffer: Vec<Color>,
    generation: u64,
}

/// Owns the strip buffer and the device handle. Every mutation of what the
/// hardware shows goes through here.
///
/// Fades are cooperatively cancelled: each `fade_to` call bumps a generation
/// counter, and an in-flight fade checks it is still the current generation
/// at every frame boundary before writing. A superseded fade exits silently,
/// so two frame sequences never interleave on the wire.
pub struct AnimationEngine<D> {
    state: Arc<Mutex<EngineState<D>>>,
    led_count: usize,
    frame_delay: Duration,
}

impl<D> Clone for AnimationEngine<D> {
    fn clone(&self) -> Self {
        AnimationEngine {
            state: Arc::clone(&self.state),
            led_count: self.led_count,
            frame_delay: self.frame_delay,
        }
    }
}

impl<D: StripDevice> AnimationEngine<D> {
    pub fn new(dev: D, led_count: usize) -> AnimationEngine<D> {
        AnimationEngine {
            state: Arc::new(Mutex::new(EngineState {
                dev,
                buffer: vec![Color::BLACK; led_count],
                generation: 0,
            })),
            led_count,
            frame_delay: FRAME_DELAY,
        }
    }

    #[cfg(test)]
    pub fn with_frame_delay(mut self, delay: Duration) -> AnimationEngine<D> {
        self.frame_delay = delay;
        self
    }

    pub fn led_count(&self) -> usize {
        self.led_count
    }

    /// Snapshot of what the hardware currently shows.
    pub async fn status(&self) -> Vec<Color> {
        self.state.lock().await.buffer.clone()
    }

    /// Writes `target` to the strip as a single frame, superseding any fade.
    pub async fn apply(&self, target: Vec<Color>) -> Result<()> {
        self.check_target(&target)?;

        let mut state = self.state.lock().await;
        state.generation += 1;
        for (i, &color) in target.iter().enumerate() {
            state.dev.set_pixel(i, color)?;
        }
        state.dev.commit_frame()?;
        state.buffer = target;
        Ok(())
    }

    /// Animates from the current buffer to `target` over `steps` frames,
    /// one frame every [`FRAME_DELAY`].
    ///
    /// On completion the buffer of record becomes `target` exactly, so
    /// rounding never drifts across repeated fades. If a hardware write
    /// fails the remaining steps are abandoned and the buffer stays at the
    /// last committed frame.
    pub async fn fade_to(&self, target: Vec<Color>, steps: usize) -> Result<()> {
        self.check_target(&target)?;

        // A zero-step fade has no frames of its own; write the target
        // directly so the buffer of record never parts ways with the
        // hardware.
        if steps == 0 {
            return self.apply(target).await;
        }

        // One interpolation plan per pixel, snapshotted under the same lock
        // that bumps the generation so a superseded fade cannot slip in a
        // frame afterwards.
        let (generation, plans) = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            let plans: Vec<PixelPlan> = state
                .buffer
                .iter()
                .zip(&target)
                .map(|(&from, &to)| PixelPlan::new(from, to, steps))
                .collect();
            (state.generation, plans)
        };

        for step in 0..steps {
            {
                let mut state = self.state.lock().await;
                if state.generation != generation {
                    // A newer fade took over at this frame boundary.
                    return Ok(());
                }

                let frame: Vec<Color> = plans.iter().map(|plan| plan.frame(step)).collect();
                for (i, &color) in frame.iter().enumerate() {
                    state.dev.set_pixel(i, color)?;
                }
                state.dev.commit_frame()?;
                state.buffer = frame;
            }

            tokio::time::sleep(self.frame_delay).await;
        }

        let mut state = self.state.lock().await;
        if state.generation == generation {
            state.buffer = target;
        }
        Ok(())
    }

    fn check_target(&self, target: &[Color]) -> Result<()> {
        if target.len() != self.led_count {
            return Err(Error::InvalidInput(format!(
                "target has {} colors but the strip has {} pixels",
                target.len(),
                self.led_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strip::testing::FakeStrip;

    const LEDS: usize = 32;

    fn engine() -> (AnimationEngine<FakeStrip>, std::sync::Arc<std::sync::Mutex<Vec<Vec<Color>>>>) {
        let dev = FakeStrip::new(LEDS);
        let frames = dev.frames();
        (AnimationEngine::new(dev, LEDS), frames)
    }

    #[tokio::test(start_paused = true)]
    async fn noop_fade_still_commits_every_frame() {
        let (engine, frames) = engine();

        engine.fade_to(vec![Color::BLACK; LEDS], 50).await.unwrap();

        assert_eq!(frames.lock().unwrap().len(), 50);
        assert_eq!(engine.status().await, vec![Color::BLACK; LEDS]);
    }

    #[tokio::test(start_paused = true)]
    async fn fade_starts_at_current_and_ends_at_target() {
        let (engine, frames) = engine();
        let target = Color::new(0, 100, 255);

        engine.fade_to(vec![target; LEDS], 50).await.unwrap();

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 50);
        assert_eq!(frames[0], vec![Color::BLACK; LEDS]);
        assert_eq!(frames[49], vec![target; LEDS]);
        drop(frames);
        assert_eq!(engine.status().await, vec![target; LEDS]);
    }

    #[tokio::test(start_paused = true)]
    async fn superseding_fade_wins_and_never_interleaves() {
        let (engine, frames) = engine();
        let first = Color::new(255, 0, 0);
        let second = Color::new(0, 0, 255);

        let racing = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.fade_to(vec![first; LEDS], 50).await })
        };

        // Let the first fade commit a few frames before taking over.
        tokio::time::sleep(Duration::from_millis(350)).await;
        engine.fade_to(vec![second; LEDS], 5).await.unwrap();

        // The superseded fade exits cleanly, without an error.
        racing.await.unwrap().unwrap();

        assert_eq!(engine.status().await, vec![second; LEDS]);
        let frames = frames.lock().unwrap();
        assert_eq!(frames.last().unwrap(), &vec![second; LEDS]);
        // Both fades target solid colors, so a mixed frame would mean two
        // sequences wrote into the same commit.
        for frame in frames.iter() {
            assert!(frame.iter().all(|c| c == &frame[0]), "interleaved frame {frame:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hardware_failure_aborts_and_keeps_last_good_frame() {
        let dev = FakeStrip::new(LEDS).fail_at_frame(3);
        let frames = dev.frames();
        let engine = AnimationEngine::new(dev, LEDS);

        let result = engine.fade_to(vec![Color::new(200, 200, 200); LEDS], 50).await;

        assert!(matches!(result, Err(Error::HardwareIo(_))));
        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 3);
        let last_good = frames.last().unwrap().clone();
        drop(frames);
        assert_eq!(engine.status().await, last_good);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_target_length_is_rejected_before_any_write() {
        let (engine, frames) = engine();

        let result = engine.fade_to(vec![Color::BLACK; LEDS + 1], 50).await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(frames.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_step_fade_lands_on_target_immediately() {
        let (engine, frames) = engine();
        let target = Color::new(161, 102, 171);

        engine.fade_to(vec![target; LEDS], 0).await.unwrap();

        // One frame, and the buffer of record matches the hardware.
        assert_eq!(frames.lock().unwrap().len(), 1);
        assert_eq!(engine.status().await, vec![target; LEDS]);
    }

    #[tokio::test(start_paused = true)]
    async fn apply_writes_exactly_one_frame() {
        let (engine, frames) = engine();
        let target = Color::new(10, 20, 30);

        engine.apply(vec![target; LEDS]).await.unwrap();

        assert_eq!(frames.lock().unwrap().len(), 1);
        assert_eq!(engine.status().await, vec![target; LEDS]);
    }
}
