//! Human-like input behavior
//!
//! The fallback execution path moves the mouse along a jittered multi-step
//! path, types with per-character cadence and occasional hesitations, and
//! scrolls in uneven increments. Plans are sampled up front so no RNG is
//! held across await points.

use rand::Rng;
use std::time::Duration;

use crate::core::Result;
use crate::tools::browser::driver::PageDriver;
use crate::tools::browser::observe::BoundingBox;

/// Action categories with distinct pre-action delay ranges
#[derive(Debug, Clone, Copy)]
pub enum ActionKind {
    Click,
    Type,
    Scroll,
    Navigate,
}

/// Tunables for the human-like fallback
#[derive(Debug, Clone)]
pub struct Humanize {
    /// Master switch; when off, all delays collapse to zero
    pub enabled: bool,
    /// Pre-action delay ranges in milliseconds, per action kind
    pub click_delay_ms: (u64, u64),
    pub type_delay_ms: (u64, u64),
    pub scroll_delay_ms: (u64, u64),
    pub navigate_delay_ms: (u64, u64),
    /// Base delay between typed characters, milliseconds
    pub keystroke_ms: (u64, u64),
    /// Chance of a longer pause while typing
    pub hesitation_probability: f64,
    pub hesitation_ms: (u64, u64),
    /// Mouse path segmentation
    pub mouse_steps: (usize, usize),
    pub mouse_jitter_px: f64,
    pub mouse_step_ms: (u64, u64),
    /// Scroll segmentation
    pub scroll_increments: (usize, usize),
    pub scroll_variation: f64,
    pub scroll_step_ms: (u64, u64),
}

impl Default for Humanize {
    fn default() -> Self {
        Self {
            enabled: true,
            click_delay_ms: (500, 2000),
            type_delay_ms: (1000, 3000),
            scroll_delay_ms: (300, 1500),
            navigate_delay_ms: (2000, 5000),
            keystroke_ms: (50, 150),
            hesitation_probability: 0.1,
            hesitation_ms: (200, 800),
            mouse_steps: (3, 7),
            mouse_jitter_px: 2.0,
            mouse_step_ms: (10, 30),
            scroll_increments: (3, 8),
            scroll_variation: 0.25,
            scroll_step_ms: (50, 150),
        }
    }
}

impl Humanize {
    /// A configuration with every delay zeroed (tests, headless CI)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    fn sample_ms(&self, range: (u64, u64)) -> Duration {
        if !self.enabled || range.1 == 0 {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(range.0..=range.1);
        Duration::from_millis(ms)
    }

    /// Pause before an action, scaled to its kind
    pub async fn delay_before(&self, kind: ActionKind) {
        let range = match kind {
            ActionKind::Click => self.click_delay_ms,
            ActionKind::Type => self.type_delay_ms,
            ActionKind::Scroll => self.scroll_delay_ms,
            ActionKind::Navigate => self.navigate_delay_ms,
        };
        tokio::time::sleep(self.sample_ms(range)).await;
    }

    /// Short pause drawn from an explicit range
    pub async fn pause(&self, min_ms: u64, max_ms: u64) {
        tokio::time::sleep(self.sample_ms((min_ms, max_ms))).await;
    }

    /// A click point inside the central region of a bounding box
    pub fn point_in_box(&self, bbox: &BoundingBox) -> (f64, f64) {
        let mut rng = rand::thread_rng();
        let margin_x = bbox.width * 0.25;
        let margin_y = bbox.height * 0.25;
        let x = bbox.x + margin_x + rng.gen::<f64>() * (bbox.width - 2.0 * margin_x).max(1.0);
        let y = bbox.y + margin_y + rng.gen::<f64>() * (bbox.height - 2.0 * margin_y).max(1.0);
        (x, y)
    }

    /// Move the mouse from `from` to `to` along a jittered segmented path
    pub async fn mouse_move(
        &self,
        page: &dyn PageDriver,
        from: (f64, f64),
        to: (f64, f64),
    ) -> Result<()> {
        let steps = {
            let mut rng = rand::thread_rng();
            let count = rng.gen_range(self.mouse_steps.0..=self.mouse_steps.1).max(1);
            (1..=count)
                .map(|i| {
                    let t = i as f64 / count as f64;
                    let jitter_x = rng.gen_range(-self.mouse_jitter_px..=self.mouse_jitter_px);
                    let jitter_y = rng.gen_range(-self.mouse_jitter_px..=self.mouse_jitter_px);
                    (
                        from.0 + (to.0 - from.0) * t + if i == count { 0.0 } else { jitter_x },
                        from.1 + (to.1 - from.1) * t + if i == count { 0.0 } else { jitter_y },
                    )
                })
                .collect::<Vec<_>>()
        };

        for (x, y) in steps {
            page.mouse_move(x, y).await?;
            tokio::time::sleep(self.sample_ms(self.mouse_step_ms)).await;
        }
        Ok(())
    }

    /// Type text one character at a time with human cadence
    pub async fn type_text(&self, page: &dyn PageDriver, text: &str) -> Result<()> {
        let cadence: Vec<(char, Duration)> = {
            let mut rng = rand::thread_rng();
            text.chars()
                .map(|ch| {
                    let mut delay = rng.gen_range(self.keystroke_ms.0..=self.keystroke_ms.1);
                    if !ch.is_alphanumeric() {
                        delay = delay * 3 / 2;
                    }
                    if rng.gen_bool(self.hesitation_probability) {
                        delay += rng.gen_range(self.hesitation_ms.0..=self.hesitation_ms.1);
                    }
                    (ch, Duration::from_millis(delay))
                })
                .collect()
        };

        for (ch, delay) in cadence {
            page.type_char(ch).await?;
            if self.enabled {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }

    /// Scroll by `amount` pixels in uneven increments (negative = up)
    pub async fn scroll(
        &self,
        page: &dyn PageDriver,
        origin: (f64, f64),
        amount: f64,
    ) -> Result<()> {
        let increments: Vec<f64> = {
            let mut rng = rand::thread_rng();
            let count = rng
                .gen_range(self.scroll_increments.0..=self.scroll_increments.1)
                .max(1);
            let base = amount / count as f64;
            (0..count)
                .map(|_| {
                    let variation =
                        rng.gen_range(-self.scroll_variation..=self.scroll_variation);
                    base * (1.0 + variation)
                })
                .collect()
        };

        for delta in increments {
            page.scroll_by(origin.0, origin.1, delta).await?;
            tokio::time::sleep(self.sample_ms(self.scroll_step_ms)).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_in_box_stays_inside() {
        let humanize = Humanize::default();
        let bbox = BoundingBox {
            x: 100.0,
            y: 50.0,
            width: 80.0,
            height: 40.0,
        };
        for _ in 0..100 {
            let (x, y) = humanize.point_in_box(&bbox);
            assert!(x >= bbox.x && x <= bbox.x + bbox.width);
            assert!(y >= bbox.y && y <= bbox.y + bbox.height);
        }
    }

    #[test]
    fn test_disabled_sampling_is_zero() {
        let humanize = Humanize::disabled();
        assert_eq!(humanize.sample_ms((500, 2000)), Duration::ZERO);
    }
}
