// src/output.rs

use anyhow::{Context, Result};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::extract::ListingRecord;

/// Output columns: code, short name, market segment, industry.
pub const CSV_HEADER: [&str; 4] = ["代號", "簡稱", "市場別", "產業別"];

pub const DEFAULT_OUT_PATH: &str = "data/stock_list.csv";

/// UTF-8 byte-order mark, so spreadsheet apps pick the right encoding.
const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Write the merged listing as a BOM-prefixed UTF-8 CSV.
///
/// Parent directories are created as needed. The file is written to a
/// temporary sibling first and renamed over `path`.
pub fn write_csv<P: AsRef<Path>>(path: P, records: &[ListingRecord]) -> Result<()> {
    let path = path.as_ref();
    // 1) make sure the directory exists
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    // 2) write header + rows to the temp file
    let tmp_path = tmp_sibling(path);
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("creating {}", tmp_path.display()))?;
    file.write_all(BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(CSV_HEADER)?;
    for record in records {
        writer.write_record(record.to_row())?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", tmp_path.display()))?;
    drop(writer);

    // 3) swap into place
    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;

    info!(path = %path.display(), rows = records.len(), "CSV saved");
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out.csv".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Vec<ListingRecord> {
        vec![
            ListingRecord {
                code: Some("1101".into()),
                name: Some("台泥".into()),
                market_segment: "上市".into(),
                industry: "水泥工業".into(),
            },
            ListingRecord {
                code: None,
                name: None,
                market_segment: "上櫃".into(),
                industry: "".into(),
            },
        ]
    }

    #[test]
    fn writes_bom_header_and_rows() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("data").join("stock_list.csv");
        write_csv(&path, &sample())?;

        let bytes = fs::read(&path)?;
        assert!(bytes.starts_with(BOM));
        let text = String::from_utf8(bytes[BOM.len()..].to_vec())?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["代號,簡稱,市場別,產業別", "1101,台泥,上市,水泥工業", ",,上櫃,"]);
        Ok(())
    }

    #[test]
    fn empty_listing_still_has_header() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("stock_list.csv");
        write_csv(&path, &[])?;
        let text = fs::read_to_string(&path)?;
        assert_eq!(text.trim_start_matches('\u{feff}').trim_end(), "代號,簡稱,市場別,產業別");
        Ok(())
    }

    #[test]
    fn overwrites_and_leaves_no_temp_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("stock_list.csv");
        fs::write(&path, "stale")?;
        write_csv(&path, &sample())?;
        assert!(!fs::read_to_string(&path)?.contains("stale"));
        assert!(!tmp_sibling(&path).exists());
        Ok(())
    }
}
