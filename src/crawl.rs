// src/crawl.rs

use std::{cmp::Ordering, collections::HashSet};
use tracing::{info, instrument, warn};

use crate::{
    extract::{extract, ExtractError, ListingRecord},
    fetch::{Pause, TableFetcher, Transport},
};

/// The three market segments published by the ISIN portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    Listed,
    Otc,
    Emerging,
}

impl Market {
    /// Crawl order; also the precedence order when codes collide.
    pub const ALL: [Market; 3] = [Market::Listed, Market::Otc, Market::Emerging];

    /// `strMode` query value.
    pub fn mode(self) -> u8 {
        match self {
            Market::Listed => 2,
            Market::Otc => 4,
            Market::Emerging => 5,
        }
    }

    /// Category marker that opens the ordinary-stock section.
    pub fn start_mark(self) -> Option<&'static str> {
        match self {
            Market::Listed | Market::Otc => Some("股票"),
            Market::Emerging => None,
        }
    }

    /// Category marker that ends it.
    pub fn end_mark(self) -> Option<&'static str> {
        match self {
            Market::Listed => Some("上市認購"),
            Market::Otc => Some("特別股"),
            Market::Emerging => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Market::Listed => "listed",
            Market::Otc => "otc",
            Market::Emerging => "emerging",
        }
    }
}

/// Fetch and extract one segment. A segment that cannot be fetched is empty.
#[instrument(level = "info", skip(fetcher, market), fields(market = market.label()))]
pub async fn crawl_market<T: Transport, P: Pause>(
    fetcher: &TableFetcher<T, P>,
    market: Market,
) -> Result<Vec<ListingRecord>, ExtractError> {
    let Some(table) = fetcher.fetch(market.mode()).await else {
        return Ok(Vec::new());
    };
    let records = extract(&table, market.start_mark(), market.end_mark())?;
    info!(records = records.len(), "segment extracted");
    Ok(records)
}

/// Crawl listed, OTC and emerging segments in turn and merge them.
pub async fn crawl_all<T: Transport, P: Pause>(
    fetcher: &TableFetcher<T, P>,
) -> Result<Vec<ListingRecord>, ExtractError> {
    let mut tables = Vec::with_capacity(Market::ALL.len());
    for market in Market::ALL {
        let records = crawl_market(fetcher, market).await?;
        if market == Market::Emerging && records.is_empty() {
            warn!("emerging market table empty; skipped");
        }
        tables.push(records);
    }
    let merged = merge(tables);
    info!(total = merged.len(), "merged listing");
    Ok(merged)
}

/// Concatenate in order, keep the first record per code, sort by code.
///
/// Records whose code did not parse share the `None` key, so at most one of
/// them survives, and it sorts last.
pub fn merge(tables: Vec<Vec<ListingRecord>>) -> Vec<ListingRecord> {
    let mut seen: HashSet<Option<String>> = HashSet::new();
    let mut merged: Vec<ListingRecord> = tables
        .into_iter()
        .flatten()
        .filter(|r| seen.insert(r.code.clone()))
        .collect();
    merged.sort_by(|a, b| cmp_code(&a.code, &b.code));
    merged
}

fn cmp_code(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
