//! Catalog entities: sport, country, league, match

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Separator between home and away team in a match name
const TEAM_SEPARATOR: &str = " - ";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Sport {
    pub name: String,
}

impl Sport {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sport[{}]", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
}

impl Country {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct League {
    pub sport: Sport,
    pub country: Country,
    pub name: String,
    /// Path relative to the source's base URL
    pub relative_url: String,
}

impl League {
    pub fn new(
        sport: Sport,
        country: Country,
        name: impl Into<String>,
        relative_url: impl Into<String>,
    ) -> Self {
        Self {
            sport,
            country,
            name: name.into(),
            relative_url: relative_url.into(),
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "League[{}, {}, {}]",
            self.sport.name, self.country.name, self.name
        )
    }
}

/// A single fixture discovered in a league listing
///
/// `web_key` is the source's stable identifier and the natural key for
/// storage and retry bookkeeping. `is_live` is fixed at discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Match {
    pub league: Arc<League>,
    pub name: String,
    pub url: String,
    pub is_live: bool,
    pub web_key: String,
}

impl Match {
    /// Build a match whose key is derived from its URL
    pub fn new(league: Arc<League>, name: impl Into<String>, url: impl Into<String>, is_live: bool) -> Self {
        let url = url.into();
        let web_key = web_key_from_url(&url);
        Self {
            league,
            name: name.into(),
            url,
            is_live,
            web_key,
        }
    }

    /// Build a match with a key supplied by the source
    pub fn with_key(
        league: Arc<League>,
        name: impl Into<String>,
        url: impl Into<String>,
        is_live: bool,
        web_key: impl Into<String>,
    ) -> Self {
        Self {
            league,
            name: name.into(),
            url: url.into(),
            is_live,
            web_key: web_key.into(),
        }
    }

    /// Home team, the part of the name before `" - "`
    pub fn local_team(&self) -> &str {
        match self.name.split_once(TEAM_SEPARATOR) {
            Some((local, _)) => local.trim(),
            None => self.name.trim(),
        }
    }

    /// Away team, absent when the name has no separator
    pub fn visitor_team(&self) -> Option<&str> {
        self.name
            .split_once(TEAM_SEPARATOR)
            .map(|(_, visitor)| visitor.trim())
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Match[{}{}, {}]",
            if self.is_live { "LIVE " } else { "" },
            self.name,
            self.web_key
        )
    }
}

/// Derive the stable key from a match URL
///
/// The key is the text between the last `-` and the last `/`, or up to the
/// end of the string when the URL has no trailing slash after the last `-`.
/// `.../real-madrid-barcelona-AbCd1234/` gives `AbCd1234`.
pub fn web_key_from_url(url: &str) -> String {
    let Some(dash) = url.rfind('-') else {
        return String::new();
    };
    let start = dash + 1;
    let end = match url.rfind('/') {
        Some(slash) if slash > dash => slash,
        _ => url.len(),
    };
    url[start..end].to_string()
}
