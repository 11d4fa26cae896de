//! Fixture modes and the toggle arithmetic that walks between them.
//!
//! The fixture advances one mode per power transition, so every request is
//! reduced to a count of relay toggles. Modes are described by a [`ModeRing`]:
//! `OFF` at ordinal 0 followed by a cyclic ring of named "on" variants at
//! ordinals `1..=N`.

use core::fmt;
use core::time::Duration;

/// Cadence between successive relay toggles of a sequence.
pub const TOGGLE_INTERVAL: Duration = Duration::from_millis(200);

/// Window during which requests are refused after a reset.
pub const RESET_COOLDOWN: Duration = Duration::from_secs(10);

/// Largest ring accepted by [`ModeRing`]; ordinals must fit in a `u8`.
pub const MAX_RING_LEN: usize = 64;

/// Reported name for the powered-down mode.
pub const OFF_NAME: &str = "off";

/// Reported name for ordinals that fall outside the configured ring.
pub const INVALID_NAME: &str = "invalid";

/// Mode the fixture is believed to be in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Off,
    /// Ring member identified by its 1-based ordinal.
    Ring(u8),
}

impl Mode {
    /// Returns the ordinal used by the toggle arithmetic (`OFF` is 0).
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Mode::Off => 0,
            Mode::Ring(ordinal) => ordinal,
        }
    }

    /// Maps an ordinal back onto a mode without validating it against a ring.
    #[must_use]
    pub const fn from_ordinal(ordinal: u8) -> Self {
        if ordinal == 0 {
            Mode::Off
        } else {
            Mode::Ring(ordinal)
        }
    }

    #[must_use]
    pub const fn is_off(self) -> bool {
        matches!(self, Mode::Off)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Off => f.write_str(OFF_NAME),
            Mode::Ring(ordinal) => write!(f, "ring#{ordinal}"),
        }
    }
}

/// Errors reported when a ring table cannot be used.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RingError {
    /// A ring needs at least one "on" variant.
    Empty,
    /// More members than [`MAX_RING_LEN`].
    TooLong { len: usize },
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::Empty => f.write_str("mode ring must contain at least one mode"),
            RingError::TooLong { len } => {
                write!(f, "mode ring holds {len} modes (max {MAX_RING_LEN})")
            }
        }
    }
}

/// Ordered table of the fixture's "on" variants.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModeRing {
    names: &'static [&'static str],
}

impl ModeRing {
    /// Builds a ring from a compile-time table.
    ///
    /// # Panics
    ///
    /// Panics (at compile time when used in a `const`) if the table is empty
    /// or longer than [`MAX_RING_LEN`].
    #[must_use]
    pub const fn new(names: &'static [&'static str]) -> Self {
        match Self::try_new(names) {
            Ok(ring) => ring,
            Err(RingError::Empty) => panic!("mode ring must contain at least one mode"),
            Err(RingError::TooLong { .. }) => panic!("mode ring exceeds MAX_RING_LEN"),
        }
    }

    /// Builds a ring, reporting malformed tables instead of panicking.
    pub const fn try_new(names: &'static [&'static str]) -> Result<Self, RingError> {
        if names.is_empty() {
            Err(RingError::Empty)
        } else if names.len() > MAX_RING_LEN {
            Err(RingError::TooLong { len: names.len() })
        } else {
            Ok(Self { names })
        }
    }

    /// Number of "on" variants (`N`).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn size(&self) -> u8 {
        // bounded by MAX_RING_LEN
        self.names.len() as u8
    }

    #[must_use]
    pub const fn names(&self) -> &'static [&'static str] {
        self.names
    }

    /// First member of the ring.
    #[must_use]
    pub const fn first(&self) -> Mode {
        Mode::Ring(1)
    }

    /// Returns `true` for `OFF` and for ordinals inside the ring.
    #[must_use]
    pub const fn contains(&self, mode: Mode) -> bool {
        match mode {
            Mode::Off => true,
            Mode::Ring(ordinal) => ordinal >= 1 && ordinal <= self.size(),
        }
    }

    /// Cyclic successor: `OFF -> first`, last member -> `OFF`.
    #[must_use]
    pub const fn next(&self, mode: Mode) -> Mode {
        match mode {
            Mode::Off => self.first(),
            Mode::Ring(ordinal) if ordinal >= self.size() => Mode::Off,
            Mode::Ring(ordinal) => Mode::Ring(ordinal + 1),
        }
    }

    /// Resolves an ordinal into a ring mode.
    #[must_use]
    pub const fn mode(&self, ordinal: u8) -> Option<Mode> {
        let mode = Mode::from_ordinal(ordinal);
        if self.contains(mode) { Some(mode) } else { None }
    }

    /// Reported name for a mode, [`INVALID_NAME`] if it is not part of the ring.
    #[must_use]
    pub fn name(&self, mode: Mode) -> &'static str {
        match mode {
            Mode::Off => OFF_NAME,
            Mode::Ring(ordinal) => usize::from(ordinal)
                .checked_sub(1)
                .and_then(|index| self.names.get(index))
                .copied()
                .unwrap_or(INVALID_NAME),
        }
    }

    /// Case-insensitive lookup of a mode by name, including `off`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Mode> {
        if name.eq_ignore_ascii_case(OFF_NAME) {
            return Some(Mode::Off);
        }

        self.names
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(name))
            .and_then(|index| u8::try_from(index + 1).ok())
            .map(Mode::Ring)
    }

    /// Iterates `OFF` followed by every ring member in order.
    pub fn modes(&self) -> impl Iterator<Item = Mode> + '_ {
        (0..=self.size()).map(Mode::from_ordinal)
    }
}

/// Ring shipped with the Leddy fixture.
pub const LEDDY_RING: ModeRing = ModeRing::new(&["sunny", "sunnyblue", "blue"]);

/// Work required to move the fixture between two modes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TogglePlan {
    /// Already there; nothing to do.
    Hold,
    /// Target is `OFF`; the relay is opened directly.
    ForceOff,
    /// Number of relay toggles to schedule.
    Toggles(u16),
}

impl TogglePlan {
    /// Toggles scheduled by this plan (zero for `Hold` and `ForceOff`).
    #[must_use]
    pub const fn toggles(self) -> u16 {
        match self {
            TogglePlan::Toggles(count) => count,
            TogglePlan::Hold | TogglePlan::ForceOff => 0,
        }
    }
}

/// Computes the relay work needed to walk from `from` to `to`.
///
/// From `OFF` the fixture needs one power-on plus a full off/on cycle for each
/// ordinal past the first: `2 * ord(to) - 1`. Between ring members it needs a
/// full cycle per forward step: `((ord(to) - ord(from) + N) mod N) * 2`.
///
/// Modes outside `ring` have no position to walk from or to, so either side
/// being unknown yields [`TogglePlan::Hold`].
#[must_use]
pub fn toggle_plan(ring: &ModeRing, from: Mode, to: Mode) -> TogglePlan {
    if from == to || !ring.contains(from) || !ring.contains(to) {
        return TogglePlan::Hold;
    }

    let target = u16::from(to.ordinal());
    match (from, to) {
        (_, Mode::Off) => TogglePlan::ForceOff,
        (Mode::Off, _) => TogglePlan::Toggles(target * 2 - 1),
        (Mode::Ring(current), _) => {
            let size = u16::from(ring.size());
            let steps = (target + size - u16::from(current)) % size;
            TogglePlan::Toggles(steps * 2)
        }
    }
}
