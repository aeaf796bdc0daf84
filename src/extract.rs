// src/extract.rs

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::table::RawTable;

/// Prefix of the first header cell; identifies the header row.
pub const HEADER_MARK: &str = "有價證券代號";
pub const CODE_NAME_COLUMN: &str = "有價證券代號及名稱";
pub const MARKET_COLUMN: &str = "市場別";
pub const INDUSTRY_COLUMN: &str = "產業別";

static CODE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\s+(.*)$").expect("code/name pattern should compile"));

/// One security from an ISIN listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRecord {
    /// `None` when the combined code/name cell did not split.
    pub code: Option<String>,
    pub name: Option<String>,
    pub market_segment: String,
    pub industry: String,
}

impl ListingRecord {
    /// Cells in output column order; missing values become empty strings.
    pub fn to_row(&self) -> [&str; 4] {
        [
            self.code.as_deref().unwrap_or_default(),
            self.name.as_deref().unwrap_or_default(),
            &self.market_segment,
            &self.industry,
        ]
    }
}

/// The table was fetched but does not have the expected shape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no header row starting with 有價證券代號")]
    HeaderNotFound,
    #[error("header row has no {0:?} column")]
    MissingColumn(&'static str),
}

/// Pull listing records out of a parsed ISIN table.
///
/// Rows after the header are collected only inside the category window opened
/// by a marker starting with `start_mark` (always open when `None`) and closed
/// by a marker starting with `end_mark`.
pub fn extract(
    table: &RawTable,
    start_mark: Option<&str>,
    end_mark: Option<&str>,
) -> Result<Vec<ListingRecord>, ExtractError> {
    let rows = table.rows();
    let head_idx = rows
        .iter()
        .position(|r| r.first().map_or(false, |c| c.trim().starts_with(HEADER_MARK)))
        .ok_or(ExtractError::HeaderNotFound)?;
    let headers = &rows[head_idx];

    let data = collect_rows(&rows[head_idx + 1..], headers.len(), start_mark, end_mark);
    debug!(header_cols = headers.len(), rows = data.len(), "rows collected");
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let columns: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();
    let col = |label: &'static str| {
        columns
            .get(label)
            .copied()
            .ok_or(ExtractError::MissingColumn(label))
    };
    let code_name = col(CODE_NAME_COLUMN)?;
    let market = col(MARKET_COLUMN)?;
    let industry = col(INDUSTRY_COLUMN)?;

    Ok(data
        .into_iter()
        .map(|row| {
            let (code, name) = split_code_name(&row[code_name]);
            ListingRecord {
                code,
                name,
                market_segment: row[market].clone(),
                industry: row[industry].clone(),
            }
        })
        .collect())
}

/// Walk the rows after the header, honouring category markers.
fn collect_rows<'a>(
    rows: &'a [Vec<String>],
    width: usize,
    start_mark: Option<&str>,
    end_mark: Option<&str>,
) -> Vec<&'a [String]> {
    let mut collect = start_mark.is_none();
    let mut out = Vec::new();

    for row in rows {
        if let Some(mark) = category_marker(row) {
            if start_mark.map_or(false, |m| mark.starts_with(m)) {
                collect = true;
            } else if end_mark.map_or(false, |m| mark.starts_with(m)) {
                debug!(mark, "end marker reached");
                break;
            }
            continue;
        }
        if collect && row.len() == width {
            out.push(row.as_slice());
        }
    }
    out
}

/// A row with exactly one non-empty cell names a category.
fn category_marker(row: &[String]) -> Option<&str> {
    let mut filled = row.iter().filter(|c| !c.is_empty());
    match (filled.next(), filled.next()) {
        (Some(only), None) => Some(only.as_str()),
        _ => None,
    }
}

/// Split `"1101　台泥"` into `("1101", "台泥")`; full-width spaces count as spaces.
pub fn split_code_name(field: &str) -> (Option<String>, Option<String>) {
    let normalized = field.replace('\u{3000}', " ");
    match CODE_NAME.captures(&normalized) {
        Some(caps) => (Some(caps[1].to_string()), Some(caps[2].to_string())),
        None => (None, None),
    }
}
