//! Row decoding: one input file becomes a lazy stream of typed rows.
//!
//! The first non-empty row establishes the normalized header; every later
//! row is zipped against it (missing trailing cells become null, extra
//! trailing cells are discarded). Fully empty rows are skipped. The stream
//! is single-pass and non-restartable.
//!
//! CSV files are read record-by-record without buffering the file. Excel
//! worksheets are materialized by the reader, so their row count is known
//! up front and reported through [`RowDecoder::total_rows`].

use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use quotaboard_protocol::CellValue;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Date formats tried on text cells, most common first.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
];

/// Decode faults surfaced through the row stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The file cannot be opened or parsed as a table; aborts the run.
    #[error("{0}")]
    Unreadable(String),

    /// One row could not be read (e.g. invalid encoding); the run skips it.
    #[error("row {position}: {reason}")]
    Row { position: u64, reason: String },
}

/// One decoded input row: normalized header + positionally zipped cells.
#[derive(Debug, Clone)]
pub struct RawRow {
    /// 0-based physical row index in the source file (header included).
    pub index: usize,
    columns: Arc<[String]>,
    cells: Vec<CellValue>,
}

impl RawRow {
    pub fn new(index: usize, columns: Arc<[String]>, mut cells: Vec<CellValue>) -> Self {
        // Zip against the header: pad missing trailing cells, drop extras.
        cells.resize(columns.len(), CellValue::Null);
        Self {
            index,
            columns,
            cells,
        }
    }

    /// Cell under a normalized column name; `Null` when the column is absent.
    pub fn get(&self, name: &str) -> &CellValue {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| &self.cells[i])
            .unwrap_or(&CellValue::Null)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// 1-based position as an operator sees it in a spreadsheet.
    pub fn position(&self) -> u64 {
        self.index as u64 + 1
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(CellValue::is_null)
    }
}

enum RowSource {
    Csv(csv::StringRecordsIntoIter<File>),
    Sheet(std::vec::IntoIter<(usize, Vec<CellValue>)>),
}

/// Lazy, finite, single-pass row stream over one tabular file.
pub struct RowDecoder {
    header: Arc<[String]>,
    source: RowSource,
    /// Physical index of the next CSV row to be read.
    next_index: usize,
    total_rows: Option<u64>,
}

impl std::fmt::Debug for RowDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowDecoder")
            .field("header", &self.header)
            .field(
                "source",
                match &self.source {
                    RowSource::Csv(_) => &"Csv",
                    RowSource::Sheet(_) => &"Sheet",
                },
            )
            .field("next_index", &self.next_index)
            .field("total_rows", &self.total_rows)
            .finish()
    }
}

impl RowDecoder {
    /// Open a file and read up to its header row.
    ///
    /// Fails with [`DecodeError::Unreadable`] if the file cannot be opened,
    /// is not a table, or contains no non-empty row to use as a header.
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let decoder = match ext.as_str() {
            "csv" => Self::open_csv(path)?,
            "xlsx" | "xls" => Self::open_sheet(path)?,
            other => {
                return Err(DecodeError::Unreadable(format!(
                    "unsupported extension '{}'",
                    other
                )))
            }
        };

        debug!(
            path = %path.display(),
            columns = decoder.header.len(),
            total = ?decoder.total_rows,
            "Decoder opened"
        );
        Ok(decoder)
    }

    fn open_csv(path: &Path) -> Result<Self, DecodeError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| DecodeError::Unreadable(format!("cannot open csv: {}", e)))?;

        let mut records = reader.into_records();
        let mut index = 0usize;

        // First non-empty row is the header. The csv reader skips fully
        // blank lines itself, so physical positions come from the record's
        // own line number rather than a record count.
        let header = loop {
            match records.next() {
                Some(Ok(record)) => {
                    if let Some(pos) = record.position() {
                        index = pos.line().saturating_sub(1) as usize;
                    }
                    if record.iter().any(|c| !c.trim().is_empty()) {
                        break normalize_header(record.iter());
                    }
                    index += 1;
                }
                Some(Err(e)) => {
                    return Err(DecodeError::Unreadable(format!("cannot parse csv: {}", e)))
                }
                None => {
                    return Err(DecodeError::Unreadable(
                        "file contains no header row".to_string(),
                    ))
                }
            }
        };

        Ok(Self {
            header: header.into(),
            source: RowSource::Csv(records),
            next_index: index + 1,
            total_rows: None,
        })
    }

    fn open_sheet(path: &Path) -> Result<Self, DecodeError> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| DecodeError::Unreadable(format!("cannot open workbook: {}", e)))?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| DecodeError::Unreadable("workbook has no sheets".to_string()))?;
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| DecodeError::Unreadable(format!("cannot read worksheet: {}", e)))?;

        let base_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
        let mut header: Option<Arc<[String]>> = None;
        let mut rows: Vec<(usize, Vec<CellValue>)> = Vec::new();

        for (offset, cells) in range.rows().enumerate() {
            let index = base_row + offset;
            if header.is_none() {
                if cells.iter().any(|c| !matches!(c, Data::Empty)) {
                    header = Some(
                        normalize_header(cells.iter().map(|c| c.to_string()).collect::<Vec<_>>())
                            .into(),
                    );
                }
                continue;
            }
            let values: Vec<CellValue> = cells.iter().map(sheet_cell).collect();
            if values.iter().all(CellValue::is_null) {
                continue;
            }
            rows.push((index, values));
        }

        let header = header
            .ok_or_else(|| DecodeError::Unreadable("worksheet contains no header row".to_string()))?;
        let total = rows.len() as u64;

        Ok(Self {
            header,
            source: RowSource::Sheet(rows.into_iter()),
            next_index: 0,
            total_rows: Some(total),
        })
    }

    /// Normalized column names established by the header row.
    pub fn header(&self) -> &Arc<[String]> {
        &self.header
    }

    /// Data row count, when the backing format knows it up front.
    pub fn total_rows(&self) -> Option<u64> {
        self.total_rows
    }
}

impl Iterator for RowDecoder {
    type Item = Result<RawRow, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            RowSource::Csv(records) => loop {
                match records.next()? {
                    Ok(record) => {
                        let index = record
                            .position()
                            .map(|p| p.line().saturating_sub(1) as usize)
                            .unwrap_or(self.next_index);
                        self.next_index = index + 1;
                        let cells: Vec<CellValue> =
                            record.iter().map(parse_text_cell).collect();
                        let row = RawRow::new(index, Arc::clone(&self.header), cells);
                        if row.is_empty() {
                            continue;
                        }
                        return Some(Ok(row));
                    }
                    Err(e) => {
                        let position = e
                            .position()
                            .map(|p| p.line())
                            .unwrap_or(self.next_index as u64 + 1);
                        self.next_index = position as usize;
                        return Some(Err(DecodeError::Row {
                            position,
                            reason: format!("unreadable row: {}", e),
                        }));
                    }
                }
            },
            RowSource::Sheet(rows) => {
                let (index, cells) = rows.next()?;
                Some(Ok(RawRow::new(index, Arc::clone(&self.header), cells)))
            }
        }
    }
}

/// Normalize a header cell: trim, strip BOM, lowercase, collapse every
/// non-alphanumeric run into a single underscore.
pub fn normalize_column(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut gap = false;
    for ch in name.trim_start_matches('\u{feff}').trim().chars() {
        if ch.is_alphanumeric() {
            if gap && !out.is_empty() {
                out.push('_');
            }
            gap = false;
            for low in ch.to_lowercase() {
                out.push(low);
            }
        } else {
            gap = true;
        }
    }
    out
}

fn normalize_header<I, S>(cells: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    cells
        .into_iter()
        .map(|c| normalize_column(c.as_ref()))
        .collect()
}

/// Best-effort typing for a text cell: number, then date, else text.
pub fn parse_text_cell(raw: &str) -> CellValue {
    let s = raw.trim();
    if s.is_empty() {
        return CellValue::Null;
    }

    if let Ok(n) = s.parse::<f64>() {
        if n.is_finite() {
            return CellValue::Number(n);
        }
    }
    // European decimal comma ("12,50") when no dot is present.
    if s.contains(',') && !s.contains('.') {
        if let Ok(n) = s.replace(',', ".").parse::<f64>() {
            if n.is_finite() {
                return CellValue::Number(n);
            }
        }
    }

    if let Some(date) = parse_date_text(s) {
        return CellValue::Date(date);
    }

    CellValue::Text(s.to_string())
}

/// Try the fixed date-format list against a text value.
pub fn parse_date_text(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn sheet_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Null,
        Data::String(s) => parse_text_cell(s),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => CellValue::Date(ndt.date()),
            None => CellValue::Null,
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => parse_text_cell(s),
        Data::Error(_) => CellValue::Null,
    }
}
