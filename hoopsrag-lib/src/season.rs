//! Season tags and corpus coverage bounds
//!
//! A season is identified by the calendar year it starts in and rendered the
//! way the league writes it: `2024-25`. The corpus covers a closed range of
//! seasons, [`SeasonBounds`], which doubles as the enumerated set of season
//! tags a document may carry.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Month in which a new season's tag takes over.
const SEASON_ROLLOVER_MONTH: u32 = 8;

static SEASON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:19|20)\d{2})\s*[-/–]\s*((?:19|20)?\d{2})\b").expect("valid season regex")
});

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("valid year regex"));

/// A basketball season, e.g. `2024-25`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Season {
    start_year: u16,
}

impl Season {
    #[must_use]
    pub const fn new(start_year: u16) -> Self {
        Self { start_year }
    }

    #[must_use]
    pub const fn start_year(self) -> u16 {
        self.start_year
    }

    #[must_use]
    pub const fn end_year(self) -> u16 {
        self.start_year + 1
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self::new(self.start_year + 1)
    }

    /// The season a calendar date belongs to.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        let year = date.year() as u16;
        if date.month() >= SEASON_ROLLOVER_MONTH {
            Self::new(year)
        } else {
            Self::new(year - 1)
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.start_year, self.end_year() % 100)
    }
}

impl FromStr for Season {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidConfig(format!("invalid season tag '{s}'"));
        let caps = SEASON_RE.captures(s.trim()).ok_or_else(invalid)?;
        if caps.get(0).map(|m| m.as_str().len()) != Some(s.trim().len()) {
            return Err(invalid());
        }
        let start: u16 = caps[1].parse().map_err(|_| invalid())?;
        let end: u16 = caps[2].parse().map_err(|_| invalid())?;
        parse_pair(start, end).ok_or_else(invalid)
    }
}

impl Serialize for Season {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Season {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Checks that `end` (two or four digits) is the year after `start`.
fn parse_pair(start: u16, end: u16) -> Option<Season> {
    let end = if end < 100 { start - start % 100 + end } else { end };
    // 1999-00 wraps the century
    let end = if end < start { end + 100 } else { end };
    (end == start + 1).then_some(Season::new(start))
}

/// Closed range of seasons covered by the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonBounds {
    pub lower: Season,
    pub upper: Season,
}

impl Default for SeasonBounds {
    fn default() -> Self {
        Self {
            lower: Season::new(2023),
            upper: Season::new(2025),
        }
    }
}

impl SeasonBounds {
    pub fn new(lower: Season, upper: Season) -> Result<Self> {
        if lower > upper {
            return Err(Error::InvalidConfig(format!(
                "season bounds are reversed: {lower} > {upper}"
            )));
        }
        Ok(Self { lower, upper })
    }

    #[must_use]
    pub fn contains(&self, season: Season) -> bool {
        self.lower <= season && season <= self.upper
    }

    /// Every supported season, oldest first.
    pub fn seasons(&self) -> impl Iterator<Item = Season> + '_ {
        (self.lower.start_year()..=self.upper.start_year()).map(Season::new)
    }

    /// True when the period lies strictly after the last covered season.
    #[must_use]
    pub fn is_after(&self, period: Period) -> bool {
        match period {
            Period::Season(season) => season > self.upper,
            Period::Year(year) => year > self.upper.end_year(),
        }
    }
}

/// A time period mentioned in free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Season(Season),
    Year(u16),
}

/// Extracts the season tags and bare years mentioned in `text`.
///
/// Years that are part of a season tag are not reported twice.
#[must_use]
pub fn referenced_periods(text: &str) -> Vec<Period> {
    let mut periods = Vec::new();
    let mut covered = Vec::new();

    for caps in SEASON_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let (Ok(start), Ok(end)) = (caps[1].parse::<u16>(), caps[2].parse::<u16>()) else {
            continue;
        };
        if let Some(season) = parse_pair(start, end) {
            periods.push(Period::Season(season));
            covered.push(whole.range());
        }
    }

    for m in YEAR_RE.find_iter(text) {
        if covered.iter().any(|r| r.contains(&m.start())) {
            continue;
        }
        if let Ok(year) = m.as_str().parse() {
            periods.push(Period::Year(year));
        }
    }

    periods
}
