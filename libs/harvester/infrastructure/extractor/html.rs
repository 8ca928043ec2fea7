//! Selectors and parsing rules for the odds site's markup

use crate::application::ports::{PageExtractor, PageSource};
use crate::domain::{
    parse_price, Country, League, MarketSection, Match, MatchObservationSet, ObservationTime,
    OddKey, RequestStatus, ScrapError, Sport,
};
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use workpool::RenderedPage;

const SPORT_ONCLICK_PATTERN: &str = r"tab_sport_main.select\( '(.*)'\);this.blur\(\);return false;";
const START_TIME_PATTERN: &str = r"(?:^|\s)t(\d+)-";

const DEFAULT_TAB: &str = "1X2";
const DEFAULT_SUBTAB: &str = "Full Time";

/// Upper bound on pages read for one match, every tab and sub-tab included
const MAX_SECTION_PAGES: usize = 48;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

struct Selectors {
    sport_tabs: Selector,
    link: Selector,
    catalog_rows: Selector,
    country_link: Selector,
    cell: Selector,
    match_link: Selector,
    live_marker: Selector,
    odds_container: Selector,
    odds_table_check: Selector,
    table_title: Selector,
    header_row: Selector,
    body_rows: Selector,
    odds_cell: Selector,
    start_time: Selector,
    active_tab: Selector,
    active_subtab: Selector,
    section_links: Selector,
}

fn selector(css: &str) -> Result<Selector, ExtractorError> {
    Selector::parse(css).map_err(|e| ExtractorError::InvalidSelector {
        selector: css.to_string(),
        reason: format!("{:?}", e),
    })
}

impl Selectors {
    fn new() -> Result<Self, ExtractorError> {
        Ok(Self {
            sport_tabs: selector("div#tabdiv_sport_main li.tab")?,
            link: selector("a")?,
            catalog_rows: selector("table[style] tbody > tr")?,
            country_link: selector("a.bfl")?,
            cell: selector("td")?,
            match_link: selector("td.name a")?,
            live_marker: selector("td.live-score, span.live-odds-ico-prev")?,
            odds_container: selector("div#odds-data-table div.table-container")?,
            odds_table_check: selector("div#odds-data-table")?,
            table_title: selector("strong")?,
            header_row: selector("thead > tr")?,
            body_rows: selector("table > tbody > tr")?,
            odds_cell: selector("td.odds")?,
            start_time: selector("p.date")?,
            active_tab: selector("ul#bettype-tabs li.active span")?,
            active_subtab: selector("ul#bettype-tabs-scope li.active span")?,
            section_links: selector(
                "ul#bettype-tabs li:not(.active) a[href], ul#bettype-tabs-scope li:not(.active) a[href]",
            )?,
        })
    }
}

/// [`PageExtractor`] for the odds site's server-rendered HTML
pub struct HtmlPageExtractor {
    base_url: String,
    selectors: Selectors,
    sport_onclick: Regex,
    start_time: Regex,
}

impl HtmlPageExtractor {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ExtractorError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            selectors: Selectors::new()?,
            sport_onclick: Regex::new(SPORT_ONCLICK_PATTERN)?,
            start_time: Regex::new(START_TIME_PATTERN)?,
        })
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }

    fn has_odds_table(&self, page: &RenderedPage) -> bool {
        let document = Html::parse_document(&page.html);
        let found = document.select(&self.selectors.odds_table_check).next().is_some();
        found
    }

    fn event_start(&self, document: &Html) -> Option<DateTime<Utc>> {
        let element = document.select(&self.selectors.start_time).next()?;
        let class = element.value().attr("class")?;
        let seconds: i64 = self.start_time.captures(class)?.get(1)?.as_str().parse().ok()?;
        Utc.timestamp_opt(seconds, 0).single()
    }

    fn market_section(&self, document: &Html) -> MarketSection {
        let tab = document
            .select(&self.selectors.active_tab)
            .next()
            .map(text_of)
            .filter(|t| !t.is_empty());
        let subtab = document
            .select(&self.selectors.active_subtab)
            .next()
            .map(text_of)
            .filter(|t| !t.is_empty());
        MarketSection::new(
            tab.unwrap_or_else(|| DEFAULT_TAB.to_string()),
            subtab.unwrap_or_else(|| DEFAULT_SUBTAB.to_string()),
        )
    }

    /// Prices of one odds table; returns the number of observations added
    fn parse_odds_table(
        &self,
        table: ElementRef<'_>,
        title: Option<String>,
        section: &MarketSection,
        page: &RenderedPage,
        set: &mut MatchObservationSet,
        status: &mut RequestStatus,
    ) -> usize {
        let Some(header) = table.select(&self.selectors.header_row).next() else {
            status.record(
                ScrapError::new(format!("no header row in {} of {}", section, set.fixture))
                    .on_page(page)
                    .at_element(&table.html()),
            );
            return 0;
        };
        let outcomes: Vec<String> = header.select(&self.selectors.link).map(text_of).collect();
        let observed_at = ObservationTime::At(page.fetched_at);
        let mut added = 0;

        for row in table.select(&self.selectors.body_rows) {
            let cells: Vec<ElementRef<'_>> = row.select(&self.selectors.odds_cell).collect();
            if cells.is_empty() {
                continue;
            }

            // First column names the bookmaker
            let bookmaker: String = row
                .children()
                .filter_map(ElementRef::wrap)
                .next()
                .map(|first| first.select(&self.selectors.link).map(text_of).collect())
                .unwrap_or_default();
            if bookmaker.is_empty() {
                debug!("Skipping odds row without bookmaker in {}", set.fixture);
                continue;
            }

            for (index, cell) in cells.iter().enumerate() {
                match parse_price(&text_of(*cell)) {
                    Ok(Some(price)) => {
                        let outcome = outcomes
                            .get(index)
                            .cloned()
                            .unwrap_or_else(|| (index + 1).to_string());
                        let key = OddKey::new(section.clone(), title.clone(), bookmaker.clone(), outcome);
                        set.add_observation(key, observed_at.clone(), price);
                        added += 1;
                    }
                    Ok(None) => {}
                    Err(e) => status.record(
                        ScrapError::new(format!(
                            "{}, {} odd cell does not hold an odd",
                            set.fixture, section
                        ))
                        .with_cause(e)
                        .on_page(page)
                        .at_element(&row.html()),
                    ),
                }
            }
        }
        added
    }

    /// Navigate to one section of a match, re-reading once if its odds are not rendered yet
    fn load_section(
        &self,
        pages: &mut dyn PageSource,
        url: &str,
        fixture: &Match,
        status: &mut RequestStatus,
    ) -> Option<RenderedPage> {
        let page = match pages.fetch(url) {
            Ok(page) => page,
            Err(e) => {
                status.record(ScrapError::new(format!("could not load {} ({})", fixture, url)).with_cause(e));
                return None;
            }
        };
        if self.has_odds_table(&page) {
            return Some(page);
        }

        // Odds are filled in after the first render; read the page once more
        match pages.current() {
            Ok(reread) => Some(reread),
            Err(e) => {
                status.record(
                    ScrapError::new(format!("could not re-read {}", fixture))
                        .with_cause(e)
                        .on_page(&page),
                );
                None
            }
        }
    }

    /// Add every price of one section to `set`; false when the section has no odds table
    fn parse_section(
        &self,
        document: &Html,
        section: &MarketSection,
        page: &RenderedPage,
        fixture: &Match,
        set: &mut MatchObservationSet,
        status: &mut RequestStatus,
    ) -> bool {
        let tables: Vec<ElementRef<'_>> = document
            .select(&self.selectors.odds_container)
            .filter(|table| {
                !table
                    .value()
                    .attr("class")
                    .is_some_and(|c| c.contains("exchangeContainer"))
            })
            .collect();
        if tables.is_empty() {
            status.record(
                ScrapError::new(format!("could not locate any odds table for {} in {}", fixture, section))
                    .on_page(page),
            );
            return false;
        }

        let titled = tables.len() > 1;
        for table in tables {
            let title = if titled {
                table.select(&self.selectors.table_title).next().map(text_of)
            } else {
                None
            };
            self.parse_odds_table(table, title, section, page, set, status);
        }
        true
    }
}

/// Element text with whitespace collapsed
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element
        .value()
        .attr("class")
        .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
}

impl PageExtractor for HtmlPageExtractor {
    fn catalog_url(&self) -> String {
        format!("{}/events/", self.base_url)
    }

    fn sport_url(&self, sport: &Sport) -> String {
        format!("{}/events/#sport/{}/all", self.base_url, sport.name)
    }

    fn league_url(&self, league: &League) -> String {
        self.absolute(&league.relative_url)
    }

    fn discover_sports(&self, page: &RenderedPage, status: &mut RequestStatus) -> Vec<Sport> {
        let document = Html::parse_document(&page.html);
        let mut sports = Vec::new();

        for tab in document.select(&self.selectors.sport_tabs) {
            let onclick = tab
                .select(&self.selectors.link)
                .next()
                .and_then(|link| link.value().attr("onclick"))
                .unwrap_or("");
            match self.sport_onclick.captures(onclick).and_then(|c| c.get(1)) {
                Some(name) => sports.push(Sport::new(name.as_str())),
                None => status.record(
                    ScrapError::new(format!(
                        "sport tab 'onclick' attribute did not match: {}",
                        onclick
                    ))
                    .on_page(page)
                    .at_element(&tab.html()),
                ),
            }
        }

        if sports.is_empty() && status.ok() {
            status.record(ScrapError::new("catalog page listed no sports").on_page(page));
        }
        sports
    }

    fn discover_leagues(
        &self,
        page: &RenderedPage,
        sport: &Sport,
        status: &mut RequestStatus,
    ) -> Vec<League> {
        let document = Html::parse_document(&page.html);
        let rows: Vec<ElementRef<'_>> = document.select(&self.selectors.catalog_rows).collect();
        if rows.is_empty() {
            status.record(ScrapError::new(format!("{} contained no rows", sport)).on_page(page));
            return Vec::new();
        }

        let mut leagues = Vec::new();
        let mut country = String::new();
        for row in rows {
            let classes = row.value().attr("class").unwrap_or("");
            if classes.contains("center") && !classes.contains("dark") {
                // The 'popular' block repeats leagues listed under their country
                if row.value().attr("xcid").is_some_and(|x| x.contains("popular")) {
                    country.clear();
                    continue;
                }
                match row.select(&self.selectors.country_link).next() {
                    Some(link) => country = text_of(link),
                    None => {
                        country.clear();
                        status.record(
                            ScrapError::new("country row has no 'bfl' link")
                                .on_page(page)
                                .at_element(&row.html()),
                        );
                    }
                }
                continue;
            }

            if country.is_empty() {
                continue;
            }

            for cell in row.select(&self.selectors.cell) {
                let Some(link) = cell.select(&self.selectors.link).next() else {
                    continue;
                };
                let name = text_of(link);
                let href = link.value().attr("href").unwrap_or("").trim();
                if name.is_empty() {
                    continue;
                }
                if href.is_empty() {
                    status.record(
                        ScrapError::new(format!("league {} has an empty link", name))
                            .on_page(page)
                            .at_element(&cell.html()),
                    );
                    continue;
                }
                leagues.push(League::new(sport.clone(), Country::new(country.clone()), name, href));
            }
        }
        leagues
    }

    fn discover_matches(
        &self,
        page: &RenderedPage,
        league: &Arc<League>,
        status: &mut RequestStatus,
    ) -> Vec<Match> {
        let document = Html::parse_document(&page.html);
        let rows: Vec<ElementRef<'_>> = document.select(&self.selectors.catalog_rows).collect();
        if rows.is_empty() {
            status.record(ScrapError::new(format!("{} contained no rows", league)).on_page(page));
            return Vec::new();
        }

        let mut matches = Vec::new();
        for row in rows {
            if has_class(row, "center") || has_class(row, "table-dummyrow") {
                continue;
            }
            let Some(link) = row
                .select(&self.selectors.match_link)
                .find(|a| a.value().id().map_or(true, str::is_empty))
            else {
                continue;
            };

            let name = text_of(link);
            let href = link.value().attr("href").unwrap_or("");
            let is_live = has_class(row, "live") || row.select(&self.selectors.live_marker).next().is_some();
            let fixture = Match::new(Arc::clone(league), name, self.absolute(href), is_live);

            if fixture.web_key.is_empty() {
                status.record(
                    ScrapError::new(format!("match link '{}' carries no key", href))
                        .on_page(page)
                        .at_element(&row.html()),
                );
                continue;
            }
            matches.push(fixture);
        }
        matches
    }

    fn extract_observations(
        &self,
        pages: &mut dyn PageSource,
        fixture: &Match,
        status: &mut RequestStatus,
    ) -> Option<MatchObservationSet> {
        let base = fixture.url.split('#').next().unwrap_or(&fixture.url).to_string();
        let mut queue = VecDeque::from([fixture.url.clone()]);
        let mut seen_urls = HashSet::from([fixture.url.clone()]);
        let mut seen_sections = HashSet::new();
        let mut set: Option<MatchObservationSet> = None;
        let mut read = 0;

        while let Some(url) = queue.pop_front() {
            if read == MAX_SECTION_PAGES {
                debug!("{}: stopping after {} section pages", fixture, read);
                break;
            }
            read += 1;
            let page = self.load_section(pages, &url, fixture, status)?;
            let document = Html::parse_document(&page.html);

            for href in document
                .select(&self.selectors.section_links)
                .filter_map(|a| a.value().attr("href"))
            {
                if let Some(next) = section_url(&base, href) {
                    if seen_urls.insert(next.clone()) {
                        queue.push_back(next);
                    }
                }
            }

            let section = self.market_section(&document);
            if !seen_sections.insert(section.clone()) {
                continue;
            }
            let collected = set.get_or_insert_with(|| {
                MatchObservationSet::new(fixture.clone(), self.event_start(&document))
            });
            if !self.parse_section(&document, &section, &page, fixture, collected, status) {
                return None;
            }
        }

        let set = set.filter(|set| !set.is_empty());
        match set {
            Some(set) => {
                debug!(
                    "{}: {} series in {} sections",
                    fixture,
                    set.len(),
                    seen_sections.len()
                );
                Some(set)
            }
            None => {
                if status.ok() {
                    status.record(ScrapError::new(format!("no odds found for {}", fixture)));
                }
                None
            }
        }
    }
}

/// Match URL for a section link; only in-page fragments select sections
fn section_url(base: &str, href: &str) -> Option<String> {
    let fragment = href.trim().strip_prefix('#')?;
    if fragment.is_empty() {
        return None;
    }
    Some(format!("{}#{}", base, fragment))
}
