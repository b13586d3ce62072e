//! Index constituents scraped from Wikipedia.

use crate::domain::error::ScanError;
use crate::domain::universe::{normalize_symbols, IndexList};
use crate::ports::universe_port::UniversePort;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::info;

const AGENT: &str = "spxscan/0.1 (constituent list fetch)";

fn selector(css: &str) -> Result<Selector, ScanError> {
    Selector::parse(css).map_err(|e| ScanError::UniverseFetch {
        reason: format!("bad selector '{}': {}", css, e),
    })
}

/// Tickers from the first cell of every row in the first table matching
/// `table_selector`. Header rows have no `td` and are skipped.
pub fn parse_constituents(html: &str, table_selector: &str) -> Result<Vec<String>, ScanError> {
    let document = Html::parse_document(html);
    let table = document
        .select(&selector(table_selector)?)
        .next()
        .ok_or_else(|| ScanError::UniverseFetch {
            reason: format!("no table matching '{}'", table_selector),
        })?;

    let rows = selector("tr")?;
    let cell = selector("td")?;
    let raw: Vec<String> = table
        .select(&rows)
        .filter_map(|row| row.select(&cell).next())
        .map(|td| td.text().collect::<String>())
        .collect();
    normalize_symbols(raw).map_err(|e| ScanError::UniverseFetch {
        reason: format!("'{}': {}", table_selector, e),
    })
}

pub struct WikipediaUniverse {
    client: Client,
    index: IndexList,
    url: String,
}

impl WikipediaUniverse {
    pub fn new(index: IndexList) -> Result<Self, ScanError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(AGENT));
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .default_headers(headers)
            .build()
            .map_err(|e| ScanError::UniverseFetch {
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            index,
            url: index.url().to_string(),
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn download(&self) -> Result<String, String> {
        let response = self.client.get(&self.url).send().map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        response.text().map_err(|e| e.to_string())
    }
}

impl UniversePort for WikipediaUniverse {
    fn fetch_symbols(&self) -> Result<Vec<String>, ScanError> {
        let html = self.download().map_err(|reason| ScanError::UniverseFetch {
            reason: format!("{}: {}", self.url, reason),
        })?;
        let symbols = parse_constituents(&html, self.index.table_selector())?;
        info!(index = %self.index, symbols = symbols.len(), "constituents loaded");
        Ok(symbols)
    }
}
