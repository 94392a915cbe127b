//! Tabular extractor: one candidate per row, plus secondary candidates for
//! account ids mentioned inside any cell.

use std::collections::{BTreeMap, BTreeSet};

use crate::account_id::{find_bare, AccountId};
use crate::error::ExtractError;
use crate::models::{Candidate, DescriptionEntry};

/// Column notes attached to secondary matches.
pub const FOUND_IN_COLUMN: &str = "found_in_column";
pub const MATCHED_TEXT: &str = "text";

/// Header row plus data rows. Header names are trimmed on construction,
/// and a repeated name gets a `_2`, `_3`, ... suffix so no cell is shadowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut seen = BTreeSet::new();
        let headers = headers
            .into_iter()
            .enumerate()
            .map(|(i, h)| {
                let h = h.trim().trim_start_matches('\u{feff}').trim();
                let base = if h.is_empty() {
                    format!("column_{}", i + 1)
                } else {
                    h.to_string()
                };
                let mut name = base.clone();
                let mut n = 2;
                while !seen.insert(name.clone()) {
                    name = format!("{}_{}", base, n);
                    n += 1;
                }
                name
            })
            .collect();
        Self { headers, rows }
    }

    /// Parse CSV with a header row. Rows may be ragged.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, ExtractError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .from_reader(bytes);
        let headers = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }
        Ok(Self::new(headers, rows))
    }

    /// Index of `name`: exact match on the trimmed header first, then
    /// case-insensitive.
    pub fn column(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.headers
            .iter()
            .position(|h| h == name)
            .or_else(|| self.headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
    }

    fn header(&self, idx: usize) -> String {
        self.headers
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("column_{}", idx + 1))
    }
}

/// Extract candidates from every row of `table`.
///
/// The `id_column` cell, when present and well formed, is the row's primary
/// candidate and carries every non-empty cell as its description. Every
/// cell is also scanned for embedded 12-digit ids; matches equal to the
/// primary are skipped, others become candidates noting their column.
pub fn extract_table(table: &Table, id_column: &str, provenance: &str) -> Vec<Candidate> {
    let id_idx = table.column(id_column);
    let mut out = Vec::new();

    for (row_no, row) in table.rows.iter().enumerate() {
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let row_tag = format!("{}#row={}", provenance, row_no + 1);

        let fields: BTreeMap<String, String> = row
            .iter()
            .enumerate()
            .filter(|(_, cell)| !cell.trim().is_empty())
            .map(|(i, cell)| (table.header(i), cell.clone()))
            .collect();

        let primary_raw = id_idx
            .and_then(|i| row.get(i))
            .filter(|c| !c.trim().is_empty());
        let primary = primary_raw.and_then(|raw| AccountId::normalize(raw));
        if let (Some(raw), Some(_)) = (primary_raw, primary.as_ref()) {
            out.push(Candidate::new(
                raw.trim(),
                DescriptionEntry::Fields(fields),
                row_tag.clone(),
            ));
        }

        for (col, cell) in row.iter().enumerate() {
            let mut seen_in_cell: Vec<String> = Vec::new();
            for raw in find_bare(cell) {
                if primary.as_ref().map(|p| p.as_str()) == Some(raw.as_str())
                    || seen_in_cell.contains(&raw)
                {
                    continue;
                }
                seen_in_cell.push(raw.clone());

                let mut note = BTreeMap::new();
                note.insert(FOUND_IN_COLUMN.to_string(), table.header(col));
                note.insert(MATCHED_TEXT.to_string(), cell.clone());
                out.push(Candidate::new(
                    raw,
                    DescriptionEntry::Fields(note),
                    format!("{}#col={}", row_tag, table.header(col)),
                ));
            }
        }
    }

    out
}
