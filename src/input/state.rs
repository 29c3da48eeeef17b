//! # Input State Module
//!
//! The normalized snapshot handed to the flight-control pipeline after every
//! read, and the unprocessed values returned by the raw diagnostic mode.
//!
//! ## Keys
//!
//! | Key | Type | Range | Produced by the axis path |
//! |-----|------|-------|---------------------------|
//! | roll | f32 | -1.0..=1.0 | yes |
//! | pitch | f32 | -1.0..=1.0 | yes |
//! | yaw | f32 | -1.0..=1.0 | yes |
//! | thrust | f32 | -1.0..=1.0 | yes |
//! | pitchcal | f32 | one-shot | yes, reset every read |
//! | rollcal | f32 | one-shot | yes, reset every read |
//! | estop | bool | - | no |
//! | exit | bool | - | no |
//! | althold | bool | - | no |

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Semantic key of a value in [`InputState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKey {
    Roll,
    Pitch,
    Yaw,
    Thrust,
    PitchCal,
    RollCal,
    Estop,
    Exit,
    AltHold,
}

impl InputKey {
    /// All keys in schema order.
    pub const ALL: [InputKey; 9] = [
        InputKey::Roll,
        InputKey::Pitch,
        InputKey::Yaw,
        InputKey::Thrust,
        InputKey::PitchCal,
        InputKey::RollCal,
        InputKey::Estop,
        InputKey::Exit,
        InputKey::AltHold,
    ];

    /// Name of the key as used in axis maps and serialized snapshots.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            InputKey::Roll => "roll",
            InputKey::Pitch => "pitch",
            InputKey::Yaw => "yaw",
            InputKey::Thrust => "thrust",
            InputKey::PitchCal => "pitchcal",
            InputKey::RollCal => "rollcal",
            InputKey::Estop => "estop",
            InputKey::Exit => "exit",
            InputKey::AltHold => "althold",
        }
    }

    /// Returns `true` for the float-valued keys an axis entry may write.
    #[must_use]
    pub fn is_axis(self) -> bool {
        !matches!(self, InputKey::Estop | InputKey::Exit | InputKey::AltHold)
    }
}

impl fmt::Display for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InputKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown input key '{}'", s))
    }
}

/// Snapshot of the normalized control inputs.
///
/// `read()` hands out an owned copy, so a snapshot never changes under the
/// caller when the next report arrives.
///
/// # Examples
///
/// ```
/// use phoenix_usb_reader::input::state::{InputKey, InputState};
///
/// let mut state = InputState::default();
/// assert!(state.set_axis(InputKey::Roll, 0.5));
/// assert_eq!(state.axis(InputKey::Roll), Some(0.5));
/// assert!(!state.set_axis(InputKey::Estop, 1.0));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct InputState {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub thrust: f32,
    /// One-shot pitch trim, cleared at the start of every read.
    pub pitchcal: f32,
    /// One-shot roll trim, cleared at the start of every read.
    pub rollcal: f32,
    pub estop: bool,
    pub exit: bool,
    pub althold: bool,
}

impl InputState {
    /// Creates a state with every axis at 0.0 and every flag cleared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a float-valued key. Returns `None` for the boolean keys.
    #[must_use]
    pub fn axis(&self, key: InputKey) -> Option<f32> {
        match key {
            InputKey::Roll => Some(self.roll),
            InputKey::Pitch => Some(self.pitch),
            InputKey::Yaw => Some(self.yaw),
            InputKey::Thrust => Some(self.thrust),
            InputKey::PitchCal => Some(self.pitchcal),
            InputKey::RollCal => Some(self.rollcal),
            InputKey::Estop | InputKey::Exit | InputKey::AltHold => None,
        }
    }

    /// Reads a boolean key. Returns `None` for the float keys.
    #[must_use]
    pub fn flag(&self, key: InputKey) -> Option<bool> {
        match key {
            InputKey::Estop => Some(self.estop),
            InputKey::Exit => Some(self.exit),
            InputKey::AltHold => Some(self.althold),
            _ => None,
        }
    }

    /// Writes a float-valued key.
    ///
    /// Returns `false` and leaves the state untouched when `key` is boolean.
    pub fn set_axis(&mut self, key: InputKey, value: f32) -> bool {
        let slot = match key {
            InputKey::Roll => &mut self.roll,
            InputKey::Pitch => &mut self.pitch,
            InputKey::Yaw => &mut self.yaw,
            InputKey::Thrust => &mut self.thrust,
            InputKey::PitchCal => &mut self.pitchcal,
            InputKey::RollCal => &mut self.rollcal,
            InputKey::Estop | InputKey::Exit | InputKey::AltHold => return false,
        };
        *slot = value;
        true
    }

    /// Clears the one-shot calibration fields.
    pub fn reset_calibration(&mut self) {
        self.pitchcal = 0.0;
        self.rollcal = 0.0;
    }

    /// Zeroes the four flight axes, leaving calibration and flags alone.
    pub fn zero_flight_axes(&mut self) {
        self.roll = 0.0;
        self.pitch = 0.0;
        self.yaw = 0.0;
        self.thrust = 0.0;
    }
}

/// Unprocessed report contents from the raw diagnostic mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawValues {
    /// Byte value per report offset.
    pub axes: BTreeMap<usize, u8>,
    /// Always empty: the adapter report carries no separate button bits.
    pub buttons: BTreeMap<usize, bool>,
}

impl RawValues {
    /// Builds the raw mapping from one report.
    #[must_use]
    pub fn from_report(report: &[u8]) -> Self {
        Self {
            axes: report.iter().copied().enumerate().collect(),
            buttons: BTreeMap::new(),
        }
    }
}
