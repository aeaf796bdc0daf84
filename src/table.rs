// src/table.rs

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

static TARGET_TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table.h4").expect("table selector should parse"));
static ANY_TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("table selector should parse"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("row selector should parse"));

/// One HTML table reduced to rows of trimmed cell text.
///
/// Both the `table.h4` lookup and the generic first-table fallback land here,
/// so the row extractor never sees where a table came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find the listing table (`<table class="h4">`) in a decoded page.
    pub fn parse_listing(html: &str) -> Option<Self> {
        let doc = Html::parse_document(html);
        let table = doc.select(&TARGET_TABLE).next()?;
        Some(Self::from_element(table))
    }

    /// Generic fallback: the first `<table>` in the page that has at least one row.
    pub fn parse_first(html: &str) -> Option<Self> {
        let doc = Html::parse_document(html);
        let found = doc
            .select(&ANY_TABLE)
            .map(Self::from_element)
            .find(|t| !t.is_empty());
        if let Some(t) = &found {
            debug!(rows = t.rows.len(), "generic table detected");
        }
        found
    }

    fn from_element(table: ElementRef<'_>) -> Self {
        let table_id = table.id();
        let rows = table
            .select(&ROW)
            // rows of nested tables belong to those tables
            .filter(|tr| {
                tr.ancestors()
                    .find(|n| n.value().as_element().map_or(false, |e| e.name() == "table"))
                    .map(|n| n.id())
                    == Some(table_id)
            })
            .map(|tr| {
                tr.children()
                    .filter_map(ElementRef::wrap)
                    .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                    .map(cell_text)
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { rows }
    }
}

/// Each text node trimmed, then concatenated.
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().map(str::trim).collect()
}
