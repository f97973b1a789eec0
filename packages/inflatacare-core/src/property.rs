//! Monitored Properties
//!
//! The mattress controller publishes eight cloud variables: six force
//! resistive sensors (`fRS1`..`fRS6`), the longest time any zone has spent
//! under pressure (`highestAccTime`) and a bitmask of raised alerts
//! (`alertStatus`). The set is closed; anything else is rejected at the
//! parse boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Numeric value reported for a property.
pub type PropertyValue = f64;

// =============================================================================
// Property Names
// =============================================================================

/// One of the eight monitored cloud variables.
///
/// Serialized with the exact variable names used by the device sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropertyName {
    /// Force resistive sensor, zone 1.
    #[serde(rename = "fRS1")]
    Frs1,
    /// Force resistive sensor, zone 2.
    #[serde(rename = "fRS2")]
    Frs2,
    /// Force resistive sensor, zone 3.
    #[serde(rename = "fRS3")]
    Frs3,
    /// Force resistive sensor, zone 4.
    #[serde(rename = "fRS4")]
    Frs4,
    /// Force resistive sensor, zone 5.
    #[serde(rename = "fRS5")]
    Frs5,
    /// Force resistive sensor, zone 6.
    #[serde(rename = "fRS6")]
    Frs6,
    /// Highest accumulated time under pressure across all zones.
    #[serde(rename = "highestAccTime")]
    HighestAccTime,
    /// Bitmask of active alerts.
    #[serde(rename = "alertStatus")]
    AlertStatus,
}

impl PropertyName {
    /// Every monitored property, in device order.
    pub const ALL: [Self; 8] = [
        Self::Frs1,
        Self::Frs2,
        Self::Frs3,
        Self::Frs4,
        Self::Frs5,
        Self::Frs6,
        Self::HighestAccTime,
        Self::AlertStatus,
    ];

    /// Cloud variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Frs1 => "fRS1",
            Self::Frs2 => "fRS2",
            Self::Frs3 => "fRS3",
            Self::Frs4 => "fRS4",
            Self::Frs5 => "fRS5",
            Self::Frs6 => "fRS6",
            Self::HighestAccTime => "highestAccTime",
            Self::AlertStatus => "alertStatus",
        }
    }

    /// Whether this is one of the six raw pressure channels.
    #[must_use]
    pub const fn is_sensor(self) -> bool {
        !matches!(self, Self::HighestAccTime | Self::AlertStatus)
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyName {
    type Err = UnknownProperty;

    /// Parse a cloud variable name. Matching is case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownProperty(s.to_string()))
    }
}

/// A name outside the monitored set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown property: {0}")]
pub struct UnknownProperty(pub String);

// =============================================================================
// Snapshot
// =============================================================================

/// Last known value of every property seen so far.
///
/// Serializes as a flat JSON object keyed by variable name. Decoding is
/// lenient: unknown keys and non-numeric values are dropped rather than
/// failing the whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, serde_json::Value>")]
pub struct PropertySnapshot(BTreeMap<PropertyName, PropertyValue>);

impl PropertySnapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Value for a property, if one has been reported.
    #[must_use]
    pub fn get(&self, name: PropertyName) -> Option<PropertyValue> {
        self.0.get(&name).copied()
    }

    /// Record a value, returning the one it replaced.
    pub fn insert(&mut self, name: PropertyName, value: PropertyValue) -> Option<PropertyValue> {
        self.0.insert(name, value)
    }

    /// Whether a value has been reported for the property.
    #[must_use]
    pub fn contains(&self, name: PropertyName) -> bool {
        self.0.contains_key(&name)
    }

    /// Number of properties with a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no property has a value yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, value)` pairs in device order.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyName, PropertyValue)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

impl From<BTreeMap<String, serde_json::Value>> for PropertySnapshot {
    fn from(raw: BTreeMap<String, serde_json::Value>) -> Self {
        raw.into_iter()
            .filter_map(|(key, value)| {
                let name = key.parse::<PropertyName>().ok()?;
                Some((name, value.as_f64()?))
            })
            .collect()
    }
}

impl FromIterator<(PropertyName, PropertyValue)> for PropertySnapshot {
    fn from_iter<I: IntoIterator<Item = (PropertyName, PropertyValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PropertySnapshot {
    type Item = (PropertyName, PropertyValue);
    type IntoIter = std::collections::btree_map::IntoIter<PropertyName, PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
