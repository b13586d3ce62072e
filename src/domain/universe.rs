//! Symbol universe parsing.
//!
//! Parses inline symbol lists from configuration. Lists read from files or
//! scraped from index constituent pages end up normalised the same way.

use crate::domain::error::ScanError;
use crate::ports::universe_port::UniversePort;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("symbol list is empty")]
    Empty,
}

/// Parses a comma-separated symbol list, upper-casing each entry and keeping
/// the given order.
pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

/// Upper-cases, trims and de-duplicates symbols read from a list file. Blank
/// entries are dropped; the first occurrence of a repeat wins.
pub fn normalize_symbols<I, S>(raw: I) -> Result<Vec<String>, UniverseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let symbols: Vec<String> = raw
        .into_iter()
        .map(|s| s.as_ref().trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect();
    if symbols.is_empty() {
        return Err(UniverseError::Empty);
    }
    Ok(symbols)
}

/// Universe fixed in configuration.
#[derive(Debug, Clone)]
pub struct StaticUniverse {
    symbols: Vec<String>,
}

impl StaticUniverse {
    pub fn new(symbols: Vec<String>) -> Self {
        Self { symbols }
    }
}

impl UniversePort for StaticUniverse {
    fn fetch_symbols(&self) -> Result<Vec<String>, ScanError> {
        Ok(self.symbols.clone())
    }
}

/// Published index whose constituents are scraped from Wikipedia.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexList {
    Sp500,
    Russell2000,
}

impl IndexList {
    pub fn url(&self) -> &'static str {
        match self {
            IndexList::Sp500 => "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies",
            IndexList::Russell2000 => {
                "https://en.wikipedia.org/wiki/List_of_Russell_2000_companies"
            }
        }
    }

    /// CSS selector of the constituents table. The ticker is the first cell
    /// of each row.
    pub fn table_selector(&self) -> &'static str {
        match self {
            IndexList::Sp500 => "table#constituents",
            IndexList::Russell2000 => "table.wikitable.sortable",
        }
    }
}

impl fmt::Display for IndexList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexList::Sp500 => f.write_str("sp500"),
            IndexList::Russell2000 => f.write_str("russell2000"),
        }
    }
}

impl FromStr for IndexList {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sp500" => Ok(IndexList::Sp500),
            "russell2000" => Ok(IndexList::Russell2000),
            other => Err(format!("unknown index '{}'", other)),
        }
    }
}
