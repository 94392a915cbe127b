//! Decoding of binary source files (PDF, DOCX, XLSX, CSV).
//!
//! Connectors supply bytes plus a content-type; this module returns either
//! plain UTF-8 text (for the document extractor) or a [`Table`] (for the
//! tabular extractor). Failures are returned as [`ExtractError`]; the caller
//! skips the item.

use std::io::Read;

use quick_xml::events::Event;

use crate::error::ExtractError;
use crate::extractors::tabular::Table;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_CSV: &str = "text/csv";

/// Maximum rows read from a worksheet.
const XLSX_MAX_ROWS: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Map a file name or object key to a MIME type by extension.
pub fn detect_content_type(key: &str) -> &'static str {
    let ext = key
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "xlsx" => MIME_XLSX,
        "csv" => MIME_CSV,
        "md" => "text/markdown",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        _ => "text/plain",
    }
}

/// True for content types that decode into a [`Table`].
pub fn is_tabular(content_type: &str) -> bool {
    content_type == MIME_CSV || content_type == MIME_XLSX
}

/// Extract plain text from a document payload. Text content types are
/// decoded lossily as UTF-8.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_XLSX | MIME_CSV => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
        ct if ct.starts_with("text/") || ct == "application/json" => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

/// Decode a tabular payload (CSV or XLSX) into a header row plus data rows.
pub fn extract_table(bytes: &[u8], content_type: &str) -> Result<Table, ExtractError> {
    match content_type {
        MIME_CSV => Table::from_csv(bytes),
        MIME_XLSX => extract_xlsx_table(bytes),
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    extract_paragraphs(&doc_xml)
}

/// Collect `<w:t>` text, one output line per `<w:p>` paragraph. Line
/// structure matters: the document extractor builds context windows from it.
fn extract_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Text(te)) if in_t => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_xlsx_table(bytes: &[u8]) -> Result<Table, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet = first_worksheet_name(&archive)
        .ok_or_else(|| ExtractError::Ooxml("workbook has no worksheets".to_string()))?;
    let sheet_xml = read_zip_entry_bounded(&mut archive, &sheet, MAX_XML_ENTRY_BYTES)?;
    let mut rows = read_sheet_rows(&sheet_xml, &shared_strings)?;

    // First row with any content is the header.
    let header_pos = rows
        .iter()
        .position(|r| r.iter().any(|c| !c.trim().is_empty()))
        .ok_or_else(|| ExtractError::Ooxml(format!("{} is empty", sheet)))?;
    let data = rows.split_off(header_pos + 1);
    let headers = rows.pop().unwrap_or_default();
    Ok(Table::new(headers, data))
}

/// Shared string table. Rich-text entries (several `<t>` runs inside one
/// `<si>`) are concatenated. A workbook without the part has no shared strings.
fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn first_worksheet_name(archive: &Archive<'_>) -> Option<String> {
    archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .min_by_key(|name| {
            name.trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        })
        .map(|s| s.to_string())
}

/// How a cell's `<v>` value is to be read, from its `t` attribute.
#[derive(Clone, Copy, PartialEq)]
enum CellType {
    SharedString,
    Inline,
    Other,
}

fn read_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut col = 0usize;
    let mut cell_type = CellType::Other;
    let mut value = String::new();
    let mut in_value = false;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        if rows.len() >= XLSX_MAX_ROWS {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    cell_type = CellType::Other;
                    value.clear();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"r" => {
                                if let Some(idx) = column_index(&attr.value)? {
                                    col = idx;
                                }
                            }
                            b"t" => {
                                cell_type = match attr.value.as_ref() {
                                    b"s" => CellType::SharedString,
                                    b"inlineStr" | b"str" => CellType::Inline,
                                    _ => CellType::Other,
                                }
                            }
                            _ => {}
                        }
                    }
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                value.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if col >= MAX_COLUMNS {
                        return Err(ExtractError::Ooxml(format!(
                            "row has more than {} columns",
                            MAX_COLUMNS
                        )));
                    }
                    let cell = resolve_cell(&value, cell_type, shared_strings);
                    if row.len() <= col {
                        row.resize(col + 1, String::new());
                    }
                    row[col] = cell;
                    col += 1;
                }
                b"row" => {
                    rows.push(std::mem::take(&mut row));
                    col = 0;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn resolve_cell(raw: &str, cell_type: CellType, shared_strings: &[String]) -> String {
    let raw = raw.trim();
    match cell_type {
        CellType::SharedString => raw
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i).cloned())
            .unwrap_or_default(),
        CellType::Inline => raw.to_string(),
        CellType::Other => format_numeric(raw),
    }
}

/// Excel stores large integers such as account numbers in scientific
/// notation (`1.23456789012E+11`); expand those back to plain digits.
fn format_numeric(raw: &str) -> String {
    if raw.contains(['E', 'e']) {
        if let Ok(n) = raw.parse::<f64>() {
            if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                return format!("{:.0}", n);
            }
        }
    }
    raw.to_string()
}

/// Columns in a worksheet (`A` through `XFD`).
const MAX_COLUMNS: usize = 16_384;

/// Zero-based column index from a cell reference such as `AB12`.
///
/// `Ok(None)` when the reference has no column letters. References past
/// `XFD` are rejected.
fn column_index(reference: &[u8]) -> Result<Option<usize>, ExtractError> {
    let out_of_range = || {
        ExtractError::Ooxml(format!(
            "cell reference out of range: {}",
            String::from_utf8_lossy(reference)
        ))
    };
    let mut idx = 0usize;
    let mut seen = false;
    for &b in reference {
        if !b.is_ascii_alphabetic() {
            break;
        }
        let digit = (b.to_ascii_uppercase() - b'A' + 1) as usize;
        idx = idx
            .checked_mul(26)
            .and_then(|i| i.checked_add(digit))
            .filter(|&i| i <= MAX_COLUMNS)
            .ok_or_else(out_of_range)?;
        seen = true;
    }
    Ok(seen.then(|| idx - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            for (name, body) in entries {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn content_type_by_extension() {
        assert_eq!(detect_content_type("reports/q1.PDF"), MIME_PDF);
        assert_eq!(detect_content_type("accounts.xlsx"), MIME_XLSX);
        assert_eq!(detect_content_type("accounts.csv"), MIME_CSV);
        assert_eq!(detect_content_type("notes"), "text/plain");
        assert!(is_tabular(MIME_CSV));
        assert!(!is_tabular(MIME_PDF));
    }

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = r#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Owner: Platform</w:t></w:r></w:p><w:p><w:r><w:t>Account ID: </w:t></w:r><w:r><w:t>123456789012</w:t></w:r></w:p></w:body></w:document>"#;
        let bytes = zip_with(&[("word/document.xml", xml)]);
        let text = extract_text(&bytes, MIME_DOCX).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["Owner: Platform", "Account ID: 123456789012"]);
    }

    #[test]
    fn xlsx_rows_with_shared_inline_and_numeric_cells() {
        let shared = r#"<sst><si><t>AWS Account Number</t></si><si><t>AWS account Name</t></si><si><r><t>pay</t></r><r><t>ments</t></r></si></sst>"#;
        let sheet = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
            <row r="2"><c r="A2"><v>1.23456789012E+11</v></c><c r="B2" t="s"><v>2</v></c></row>
            <row r="3"><c r="B3" t="inlineStr"><is><t>orphan</t></is></c></row>
        </sheetData></worksheet>"#;
        let bytes = zip_with(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        let table = extract_table(&bytes, MIME_XLSX).unwrap();
        assert_eq!(table.headers, vec!["AWS Account Number", "AWS account Name"]);
        assert_eq!(table.rows[0], vec!["123456789012", "payments"]);
        assert_eq!(table.rows[1], vec!["", "orphan"]);
    }

    #[test]
    fn column_index_from_reference() {
        assert_eq!(column_index(b"A1").unwrap(), Some(0));
        assert_eq!(column_index(b"Z9").unwrap(), Some(25));
        assert_eq!(column_index(b"AB12").unwrap(), Some(27));
        assert_eq!(column_index(b"XFD1").unwrap(), Some(MAX_COLUMNS - 1));
        assert_eq!(column_index(b"12").unwrap(), None);
        assert!(column_index(b"XFE1").is_err());
    }

    fn sheet_with_reference(reference: &str) -> Vec<u8> {
        let sheet = format!(
            r#"<worksheet><sheetData><row r="1"><c r="{}" t="inlineStr"><is><t>x</t></is></c></row></sheetData></worksheet>"#,
            reference
        );
        zip_with(&[("xl/worksheets/sheet1.xml", sheet.as_str())])
    }

    #[test]
    fn overlong_cell_reference_is_an_error() {
        let bytes = sheet_with_reference("ZZZZZZZZZZZZZZ1");
        let err = extract_table(&bytes, MIME_XLSX).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn cell_reference_past_last_column_is_an_error() {
        let bytes = sheet_with_reference("ZZZZZZ1");
        let err = extract_table(&bytes, MIME_XLSX).unwrap_err();
        assert!(err.to_string().contains("out of range"), "got: {}", err);
    }
}
