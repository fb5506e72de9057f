//! Countdown for the "item acquired" banner.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Frames of fade-in at the start of a notification.
pub const DEFAULT_FADE_IN: u32 = 15;
/// Frames of fade-out at the end of a notification.
pub const DEFAULT_FADE_OUT: u32 = 30;

/// A single banner that counts down one frame per [`tick`](Self::tick).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTimer {
    duration: u32,
    current: Option<String>,
    remaining: u32,
}

impl NotificationTimer {
    /// A zero duration is treated as one frame.
    pub fn new(duration: u32) -> Self {
        Self {
            duration: duration.max(1),
            current: None,
            remaining: 0,
        }
    }

    /// Show `item`, replacing any banner already up.
    pub fn show(&mut self, item: impl Into<String>) {
        let item = item.into();
        debug!(item = %item, frames = self.duration, "Notification shown");
        self.current = Some(item);
        self.remaining = self.duration;
    }

    pub fn tick(&mut self) {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.clear();
            }
        }
    }

    pub fn clear(&mut self) {
        if let Some(item) = self.current.take() {
            debug!(item = %item, "Notification cleared");
        }
        self.remaining = 0;
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn is_showing(&self) -> bool {
        self.current.is_some() && self.remaining > 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// 0.0 when just shown, approaching 1.0 at the end; 0.0 when idle.
    pub fn progress(&self) -> f32 {
        if !self.is_showing() {
            return 0.0;
        }
        1.0 - self.remaining as f32 / self.duration as f32
    }

    /// Opacity for a fade-in / fade-out envelope.
    pub fn alpha(&self, fade_in: u32, fade_out: u32) -> u8 {
        if !self.is_showing() {
            return 0;
        }
        if fade_in > 0 && self.remaining > self.duration.saturating_sub(fade_in) {
            let elapsed = self.duration - self.remaining;
            return (elapsed as f32 / fade_in as f32 * 255.0) as u8;
        }
        if self.remaining < fade_out {
            return (self.remaining as f32 / fade_out as f32 * 255.0) as u8;
        }
        255
    }
}

impl Default for NotificationTimer {
    fn default() -> Self {
        Self::new(180)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_and_expire() {
        let mut timer = NotificationTimer::new(3);
        timer.show("Lantern");
        assert!(timer.is_showing());

        timer.tick();
        timer.tick();
        assert_eq!(timer.current(), Some("Lantern"));

        timer.tick();
        assert!(!timer.is_showing());
        assert_eq!(timer.current(), None);

        timer.tick();
        assert_eq!(timer.remaining(), 0);
    }

    #[test]
    fn test_show_replaces_current() {
        let mut timer = NotificationTimer::new(10);
        timer.show("a");
        timer.tick();
        timer.show("b");
        assert_eq!(timer.current(), Some("b"));
        assert_eq!(timer.remaining(), 10);
    }

    #[test]
    fn test_progress() {
        let mut timer = NotificationTimer::new(4);
        assert_eq!(timer.progress(), 0.0);
        timer.show("x");
        assert_eq!(timer.progress(), 0.0);
        timer.tick();
        assert_eq!(timer.progress(), 0.25);
    }

    #[test]
    fn test_alpha_envelope() {
        let mut timer = NotificationTimer::new(180);
        assert_eq!(timer.alpha(DEFAULT_FADE_IN, DEFAULT_FADE_OUT), 0);

        timer.show("x");
        assert_eq!(timer.alpha(DEFAULT_FADE_IN, DEFAULT_FADE_OUT), 0);

        for _ in 0..15 {
            timer.tick();
        }
        assert_eq!(timer.alpha(DEFAULT_FADE_IN, DEFAULT_FADE_OUT), 255);

        while timer.remaining() > 15 {
            timer.tick();
        }
        assert_eq!(timer.alpha(DEFAULT_FADE_IN, DEFAULT_FADE_OUT), 127);
        assert_eq!(timer.alpha(0, 0), 255);
    }

    #[test]
    fn test_clear() {
        let mut timer = NotificationTimer::default();
        timer.show("x");
        timer.clear();
        assert!(!timer.is_showing());
        assert_eq!(timer.alpha(15, 30), 0);
    }
}
