//! Push-button debouncing and press classification.
//!
//! The classifier is fed raw pin levels together with their sample instants
//! and reports at most one [`ButtonEvent`] per press. Like the toggle
//! scheduler it never sleeps: callers wait until
//! [`PressClassifier::next_deadline`] or the next pin edge, whichever comes
//! first.

use core::ops::Add;
use core::time::Duration;

use crate::modes::Mode;
use crate::sequencer::Request;

/// Timing thresholds for the push button.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ButtonConfig {
    /// A level must be stable this long before it counts.
    pub debounce: Duration,
    /// Presses released after this are long presses.
    pub long_press: Duration,
    /// Presses still held after this report a long hold immediately.
    pub long_hold: Duration,
    /// A level that keeps changing this long without settling is an invalid press.
    pub chatter_limit: Duration,
}

impl ButtonConfig {
    pub const DEFAULT: Self = Self {
        debounce: Duration::from_millis(50),
        long_press: Duration::from_secs(1),
        long_hold: Duration::from_secs(3),
        chatter_limit: Duration::from_secs(1),
    };
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonEvent {
    ShortPress,
    LongPress,
    LongHold,
    /// The contact chattered without ever settling.
    Invalid,
}

impl ButtonEvent {
    /// Sequencer request bound to the event: a short press steps, anything
    /// else switches the fixture off.
    #[must_use]
    pub const fn request(self) -> Request {
        match self {
            ButtonEvent::ShortPress => Request::Step,
            ButtonEvent::LongPress | ButtonEvent::LongHold | ButtonEvent::Invalid => {
                Request::Mode(Mode::Off)
            }
        }
    }
}

/// Debouncer and short/long/hold classifier for an active button.
#[derive(Copy, Clone, Debug)]
pub struct PressClassifier<Instant> {
    config: ButtonConfig,
    raw: bool,
    stable: bool,
    pending_since: Option<Instant>,
    last_edge: Option<Instant>,
    unsettled_since: Option<Instant>,
    pressed_at: Option<Instant>,
    hold_reported: bool,
    /// Set after an invalid press; cleared once the button settles released.
    suppressed: bool,
}

impl<Instant> PressClassifier<Instant>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant>,
{
    #[must_use]
    pub const fn new(config: ButtonConfig) -> Self {
        Self {
            config,
            raw: false,
            stable: false,
            pending_since: None,
            last_edge: None,
            unsettled_since: None,
            pressed_at: None,
            hold_reported: false,
            suppressed: false,
        }
    }

    /// Debounced button level.
    #[must_use]
    pub fn is_pressed(&self) -> bool {
        self.stable
    }

    /// Feeds a raw level sample (`true` while the button is held).
    pub fn update(&mut self, pressed: bool, now: Instant) -> Option<ButtonEvent> {
        if pressed != self.raw {
            self.last_edge = Some(now);
            self.unsettled_since.get_or_insert(now);
        }
        self.raw = pressed;
        if pressed == self.stable {
            self.pending_since = None;
        } else if self.pending_since.is_none() {
            self.pending_since = Some(now);
        }
        self.poll(now)
    }

    /// Settles pending edges and reports long holds and chatter once their
    /// thresholds pass.
    pub fn poll(&mut self, now: Instant) -> Option<ButtonEvent> {
        if let Some(edge) = self.last_edge
            && now >= edge + self.config.debounce
        {
            self.last_edge = None;
            self.unsettled_since = None;
            if !self.raw {
                self.suppressed = false;
            }
        }

        if let Some(since) = self.pending_since
            && now >= since + self.config.debounce
        {
            self.pending_since = None;
            self.stable = self.raw;
            if let Some(event) = self.settle(since) {
                return Some(event);
            }
        }

        if !self.suppressed
            && let Some(since) = self.unsettled_since
            && now >= since + self.config.chatter_limit
        {
            self.suppressed = true;
            self.pressed_at = None;
            self.hold_reported = false;
            return Some(ButtonEvent::Invalid);
        }

        if self.stable
            && !self.hold_reported
            && let Some(pressed_at) = self.pressed_at
            && now >= pressed_at + self.config.long_hold
        {
            self.hold_reported = true;
            return Some(ButtonEvent::LongHold);
        }

        None
    }

    /// Next instant at which [`Self::poll`] could produce an event.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let settle = self.last_edge.map(|edge| edge + self.config.debounce);
        let chatter = self
            .unsettled_since
            .filter(|_| !self.suppressed)
            .map(|since| since + self.config.chatter_limit);
        let hold = match self.pressed_at {
            Some(pressed_at) if self.stable && !self.hold_reported => {
                Some(pressed_at + self.config.long_hold)
            }
            _ => None,
        };

        [settle, chatter, hold].into_iter().flatten().min()
    }

    fn settle(&mut self, edge: Instant) -> Option<ButtonEvent> {
        if self.stable {
            if !self.suppressed {
                self.pressed_at = Some(edge);
                self.hold_reported = false;
            }
            return None;
        }

        let pressed_at = self.pressed_at.take()?;
        if self.hold_reported {
            None
        } else if edge >= pressed_at + self.config.long_press {
            Some(ButtonEvent::LongPress)
        } else {
            Some(ButtonEvent::ShortPress)
        }
    }
}

impl<Instant> Default for PressClassifier<Instant>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant>,
{
    fn default() -> Self {
        Self::new(ButtonConfig::DEFAULT)
    }
}
