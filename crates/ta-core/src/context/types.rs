//! Trip context types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Traveller counts by age band
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySize {
    #[serde(default)]
    pub adults: u32,
    #[serde(default)]
    pub children: u32,
    #[serde(default)]
    pub infants: u32,
}

impl PartySize {
    /// Total traveller count
    pub fn total(&self) -> u32 {
        self.adults + self.children + self.infants
    }

    /// Check whether no counts have been set
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Accumulated trip-planning facts for one session
///
/// Every field is optional; merging a delta overwrites individual fields and
/// never clears the others. Preference tags accumulate with deduplication,
/// preserving insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripContext {
    pub destination: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub party: PartySize,
    #[serde(default)]
    pub preferences: Vec<String>,
}

impl TripContext {
    /// Fold a delta into the context, field by field
    pub fn merge(&mut self, delta: ContextDelta) {
        if let Some(destination) = delta.destination {
            self.destination = Some(destination);
        }
        if let Some(start) = delta.start_date {
            self.start_date = Some(start);
        }
        if let Some(end) = delta.end_date {
            self.end_date = Some(end);
        }
        if let Some(adults) = delta.adults {
            self.party.adults = adults;
        }
        if let Some(children) = delta.children {
            self.party.children = children;
        }
        if let Some(infants) = delta.infants {
            self.party.infants = infants;
        }
        for tag in delta.preferences {
            if !self.preferences.contains(&tag) {
                self.preferences.push(tag);
            }
        }
    }

    /// Check whether both trip dates are known
    pub fn has_dates(&self) -> bool {
        self.start_date.is_some() && self.end_date.is_some()
    }

    /// Nights between start and end date, if both are known
    pub fn nights(&self) -> Option<i64> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => Some((end - start).num_days()),
            _ => None,
        }
    }
}

/// Additive output of one extraction pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextDelta {
    pub destination: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub adults: Option<u32>,
    pub children: Option<u32>,
    pub infants: Option<u32>,
    #[serde(default)]
    pub preferences: Vec<String>,
}

impl ContextDelta {
    /// True when no rule recognized anything (a normal outcome, not an error)
    pub fn is_empty(&self) -> bool {
        self.destination.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.adults.is_none()
            && self.children.is_none()
            && self.infants.is_none()
            && self.preferences.is_empty()
    }
}
