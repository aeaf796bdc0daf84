// src/lib.rs

pub mod crawl;
pub mod extract;
pub mod fetch;
pub mod output;
pub mod sheets;
pub mod table;

pub use crawl::{crawl_all, crawl_market, merge, Market};
pub use extract::{extract, ExtractError, ListingRecord};
pub use fetch::{FetchConfig, TableFetcher};
pub use table::RawTable;
