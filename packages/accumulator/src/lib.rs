#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The master incident collection.
//!
//! [`Accumulator`] owns every incident observed so far, admits new ones
//! at most once according to [`Incident::dedup_key`], and never removes
//! or rewrites an incident it already holds.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use traffic_incidents_incident_models::{Incident, format_timestamp};

/// Bucket used in statistics for incidents with no city.
pub const UNKNOWN_CITY: &str = "unknown";

/// Outcome of a single [`Accumulator::merge`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    /// Size of the master collection after the merge.
    pub total: usize,
    /// Number of candidates admitted.
    pub new: usize,
    /// Number of candidates rejected as duplicates.
    pub duplicates: usize,
}

impl std::fmt::Display for MergeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "New: {} | Duplicates: {} | Total: {}",
            self.new, self.duplicates, self.total
        )
    }
}

/// Earliest and latest publication times in the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// RFC 3339 timestamp of the oldest incident.
    pub earliest: String,
    /// RFC 3339 timestamp of the newest incident.
    pub latest: String,
}

/// Aggregate view over the master collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of incidents.
    pub total: usize,
    /// Incident counts keyed by type.
    pub by_type: BTreeMap<String, usize>,
    /// Incident counts keyed by city.
    pub by_city: BTreeMap<String, usize>,
    /// Publication time span, `None` when no incident carries a time.
    pub date_range: Option<DateRange>,
}

impl Stats {
    /// Returns `(type, count)` pairs, most frequent first. Ties are
    /// broken alphabetically.
    #[must_use]
    pub fn types_by_count(&self) -> Vec<(&str, usize)> {
        let mut types: Vec<_> = self
            .by_type
            .iter()
            .map(|(t, count)| (t.as_str(), *count))
            .collect();
        types.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        types
    }
}

/// Insertion-ordered, deduplicated collection of incidents.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    incidents: Vec<Incident>,
}

impl Accumulator {
    /// Wraps a previously persisted collection.
    ///
    /// The collection is taken as-is; duplicates already present in it
    /// are not collapsed.
    #[must_use]
    pub const fn new(incidents: Vec<Incident>) -> Self {
        Self { incidents }
    }

    /// Returns the master collection in insertion order.
    #[must_use]
    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    /// Number of incidents held.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.incidents.len()
    }

    /// Returns `true` if no incidents are held.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    /// Appends every candidate whose deduplication key is not already
    /// present.
    ///
    /// Keys for the existing collection are recomputed on every call.
    /// Within one batch the first occurrence of a key wins and later
    /// ones count as duplicates.
    pub fn merge<I>(&mut self, candidates: I) -> MergeResult
    where
        I: IntoIterator<Item = Incident>,
    {
        let mut candidates = candidates.into_iter().peekable();
        if candidates.peek().is_none() {
            return MergeResult {
                total: self.incidents.len(),
                ..MergeResult::default()
            };
        }

        let mut seen: HashSet<String> = self.incidents.iter().map(Incident::dedup_key).collect();
        let mut result = MergeResult::default();

        for incident in candidates {
            if seen.insert(incident.dedup_key()) {
                self.incidents.push(incident);
                result.new += 1;
            } else {
                result.duplicates += 1;
            }
        }

        result.total = self.incidents.len();
        result
    }

    /// Computes counts by type and city plus the publication time span.
    #[must_use]
    pub fn statistics(&self) -> Stats {
        let mut by_type = BTreeMap::new();
        let mut by_city = BTreeMap::new();

        for incident in &self.incidents {
            *by_type.entry(incident.incident_type.clone()).or_insert(0) += 1;

            let city = if incident.city.is_empty() {
                UNKNOWN_CITY
            } else {
                incident.city.as_str()
            };
            *by_city.entry(city.to_string()).or_insert(0) += 1;
        }

        let mut published = self.incidents.iter().filter_map(Incident::published_at);
        let date_range = published.next().map(|first| {
            let (earliest, latest) =
                published.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
            DateRange {
                earliest: format_timestamp(&earliest),
                latest: format_timestamp(&latest),
            }
        });

        Stats {
            total: self.incidents.len(),
            by_type,
            by_city,
            date_range,
        }
    }
}
