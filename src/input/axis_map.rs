//! # Axis Map Module
//!
//! Describes which byte of a raw adapter report drives which control axis.
//!
//! ## File Format
//!
//! The map is a flat JSON object keyed by `"Input.AXIS-<n>"`, where `n` is the
//! 0-based byte offset in the report:
//!
//! ```json
//! {
//!     "Input.AXIS-0": { "type": "Input.AXIS", "key": "roll",   "scale": 0.0078125 },
//!     "Input.AXIS-1": { "type": "Input.AXIS", "key": "pitch",  "scale": -0.0078125 },
//!     "Input.AXIS-2": { "type": "Input.AXIS", "key": "thrust", "scale": 0.0078125 }
//! }
//! ```
//!
//! Offsets without an entry are simply not mapped. Entries that cannot be
//! understood are dropped while loading and never cause an error, so a map
//! written for a different input device still loads.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::state::InputKey;
use crate::error::Result;

/// Key prefix used by the input-mapping configuration.
const AXIS_KEY_PREFIX: &str = "Input.AXIS-";

/// Key prefix accepted without the `Input.` namespace.
const SHORT_AXIS_KEY_PREFIX: &str = "AXIS-";

/// `type` value of an analog axis entry.
const TYPE_AXIS: &str = "Input.AXIS";

/// `type` value of a button entry.
const TYPE_BUTTON: &str = "Input.BUTTON";

/// What a mapped report byte represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Axis,
    Button,
}

/// One mapped report byte.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisMapEntry {
    pub kind: AxisKind,
    pub key: InputKey,
    pub scale: f32,
}

impl AxisMapEntry {
    /// Creates an analog axis entry.
    #[must_use]
    pub fn axis(key: InputKey, scale: f32) -> Self {
        Self {
            kind: AxisKind::Axis,
            key,
            scale,
        }
    }
}

/// Entry as it appears in the JSON document. Every field is optional so a
/// single bad entry can be dropped without failing the whole document.
#[derive(Debug, Deserialize)]
struct RawAxisMapEntry {
    #[serde(rename = "type")]
    kind: Option<String>,
    key: Option<String>,
    scale: Option<f32>,
}

/// Immutable lookup from report offset to [`AxisMapEntry`].
///
/// # Examples
///
/// ```
/// use phoenix_usb_reader::input::axis_map::AxisMap;
/// use phoenix_usb_reader::input::state::InputKey;
///
/// let map = AxisMap::from_json_str(
///     r#"{ "Input.AXIS-0": { "type": "Input.AXIS", "key": "roll", "scale": 0.0078125 } }"#,
/// )?;
///
/// assert_eq!(map.try_get(0).map(|entry| entry.key), Some(InputKey::Roll));
/// assert!(map.try_get(1).is_none());
/// # Ok::<(), phoenix_usb_reader::error::PhoenixError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisMap {
    entries: BTreeMap<usize, AxisMapEntry>,
}

impl AxisMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads an axis map from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - The document is not valid JSON or not a JSON object
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parses an axis map from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `AxisMap` error if the document is not a JSON object. Individual
    /// entries that cannot be understood are skipped.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut map = Self::new();

        for (name, value) in document {
            let Some(index) = parse_axis_index(&name) else {
                debug!("Skipping axis map entry '{}': not an axis key", name);
                continue;
            };

            let raw: RawAxisMapEntry = match serde_json::from_value(value) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!("Skipping axis map entry '{}': {}", name, e);
                    continue;
                }
            };

            match resolve_entry(raw) {
                Ok(entry) => {
                    map.insert(index, entry);
                }
                Err(reason) => debug!("Skipping axis map entry '{}': {}", name, reason),
            }
        }

        debug!("Loaded axis map with {} entries", map.len());
        Ok(map)
    }

    /// Adds or replaces the entry for a report offset.
    pub fn insert(&mut self, index: usize, entry: AxisMapEntry) -> Option<AxisMapEntry> {
        self.entries.insert(index, entry)
    }

    /// Looks up the entry for a report offset. `None` means the byte is unmapped.
    #[must_use]
    pub fn try_get(&self, index: usize) -> Option<&AxisMapEntry> {
        self.entries.get(&index)
    }

    /// Number of mapped offsets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &AxisMapEntry)> {
        self.entries.iter().map(|(index, entry)| (*index, entry))
    }
}

impl FromIterator<(usize, AxisMapEntry)> for AxisMap {
    fn from_iter<I: IntoIterator<Item = (usize, AxisMapEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Extracts `n` from `"Input.AXIS-n"` or `"AXIS-n"`.
///
/// Only the canonical decimal form is accepted: `"Input.AXIS-01"` or
/// `"Input.AXIS-+1"` would never be looked up for offset 1.
fn parse_axis_index(name: &str) -> Option<usize> {
    let digits = name
        .strip_prefix(AXIS_KEY_PREFIX)
        .or_else(|| name.strip_prefix(SHORT_AXIS_KEY_PREFIX))?;
    let index: usize = digits.parse().ok()?;
    (index.to_string() == digits).then_some(index)
}

fn resolve_entry(raw: RawAxisMapEntry) -> std::result::Result<AxisMapEntry, String> {
    let kind = match raw.kind.as_deref() {
        Some(TYPE_AXIS) => AxisKind::Axis,
        Some(TYPE_BUTTON) => AxisKind::Button,
        Some(other) => return Err(format!("unsupported type '{}'", other)),
        None => return Err("missing type".to_string()),
    };

    let key: InputKey = raw
        .key
        .as_deref()
        .ok_or_else(|| "missing key".to_string())?
        .parse()?;

    let scale = match (kind, raw.scale) {
        (AxisKind::Axis, None) => return Err("axis entry without scale".to_string()),
        (AxisKind::Axis, Some(_)) if !key.is_axis() => {
            return Err(format!("'{}' is not an axis key", key));
        }
        (_, Some(scale)) => scale,
        (AxisKind::Button, None) => 1.0,
    };

    Ok(AxisMapEntry { kind, key, scale })
}
