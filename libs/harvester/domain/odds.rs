//! Price observations for one match

use crate::domain::models::Match;
use crate::domain::status::ScrapError;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Source's textual timestamp format, e.g. `02 Apr, 11:47` (year implied)
const OBSERVATION_TIME_FORMAT: &str = "%d %b, %H:%M %Y";

/// Market tab and sub-tab, e.g. `AH` / `1st Half`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketSection {
    pub tab: String,
    pub subtab: String,
}

impl MarketSection {
    pub fn new(tab: impl Into<String>, subtab: impl Into<String>) -> Self {
        Self {
            tab: tab.into(),
            subtab: subtab.into(),
        }
    }
}

impl fmt::Display for MarketSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}>{}", self.tab, self.subtab)
    }
}

/// Identity of one price series
///
/// `row` is absent for simple markets (1X2) and carries the line for
/// handicap or totals markets (`+2.5`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OddKey {
    pub section: MarketSection,
    pub row: Option<String>,
    pub bookmaker: String,
    pub outcome: String,
}

impl OddKey {
    /// Build a key, stripping a leading copy of the section tab from `row`
    pub fn new(
        section: MarketSection,
        row: Option<String>,
        bookmaker: impl Into<String>,
        outcome: impl Into<String>,
    ) -> Self {
        let row = row.map(|row| normalize_row(&section.tab, row));
        Self {
            section,
            row,
            bookmaker: bookmaker.into(),
            outcome: outcome.into(),
        }
    }
}

impl fmt::Display for OddKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.row {
            Some(row) => write!(f, "OddKey[{},{},{},{}]", self.section, row, self.bookmaker, self.outcome),
            None => write!(f, "OddKey[{},{},{}]", self.section, self.bookmaker, self.outcome),
        }
    }
}

fn normalize_row(tab: &str, row: String) -> String {
    if tab.is_empty() {
        return row;
    }
    let mut current = row.as_str();
    while let Some(rest) = current.strip_prefix(tab) {
        current = rest.trim();
    }
    if current.len() == row.len() {
        row
    } else {
        current.to_string()
    }
}

/// When a price was observed
///
/// Times the source shows in an unexpected format are kept verbatim rather
/// than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObservationTime {
    At(DateTime<Utc>),
    Unparsed(String),
}

impl ObservationTime {
    /// Parse the source's `dd Mon, HH:MM` text using `year`
    pub fn parse(text: &str, year: i32) -> Self {
        let candidate = format!("{} {}", text.trim(), year);
        match NaiveDateTime::parse_from_str(&candidate, OBSERVATION_TIME_FORMAT) {
            Ok(naive) => ObservationTime::At(Utc.from_utc_datetime(&naive)),
            Err(_) => ObservationTime::Unparsed(text.trim().to_string()),
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ObservationTime::At(at) => Some(*at),
            ObservationTime::Unparsed(_) => None,
        }
    }

    /// Stable textual form used as part of the storage key
    pub fn as_text(&self) -> String {
        match self {
            ObservationTime::At(at) => at.to_rfc3339(),
            ObservationTime::Unparsed(text) => text.clone(),
        }
    }
}

impl From<DateTime<Utc>> for ObservationTime {
    fn from(at: DateTime<Utc>) -> Self {
        ObservationTime::At(at)
    }
}

/// Time-ordered prices of one series
pub type PriceSeries = BTreeMap<ObservationTime, f64>;

/// Every price observed for one match in one extraction attempt
#[derive(Debug, Clone)]
pub struct MatchObservationSet {
    pub fixture: Match,
    pub event_start: Option<DateTime<Utc>>,
    odds: BTreeMap<OddKey, PriceSeries>,
}

impl MatchObservationSet {
    pub fn new(fixture: Match, event_start: Option<DateTime<Utc>>) -> Self {
        Self {
            fixture,
            event_start,
            odds: BTreeMap::new(),
        }
    }

    /// Merge prices into the series for `key`
    ///
    /// Existing observations at other times are kept; an observation at an
    /// already-known time replaces the previous price.
    pub fn add_observations<I>(&mut self, key: OddKey, prices: I)
    where
        I: IntoIterator<Item = (ObservationTime, f64)>,
    {
        self.odds.entry(key).or_default().extend(prices);
    }

    pub fn add_observation(&mut self, key: OddKey, at: ObservationTime, price: f64) {
        self.add_observations(key, std::iter::once((at, price)));
    }

    pub fn odds(&self) -> &BTreeMap<OddKey, PriceSeries> {
        &self.odds
    }

    pub fn series(&self, key: &OddKey) -> Option<&PriceSeries> {
        self.odds.get(key)
    }

    /// Number of distinct series
    pub fn len(&self) -> usize {
        self.odds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.odds.is_empty()
    }

    /// Number of individual (time, price) observations
    pub fn observation_count(&self) -> usize {
        self.odds.values().map(|series| series.len()).sum()
    }
}

impl fmt::Display for MatchObservationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} -> {}>", self.fixture, self.odds.len())
    }
}

/// Parse a price cell
///
/// Empty cells carry no price and yield `Ok(None)`; anything else that is not
/// a number is an error.
pub fn parse_price(text: &str) -> Result<Option<f64>, ScrapError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|e| ScrapError::new(format!("price cell '{}' is not a number", trimmed)).with_cause(e))
}
