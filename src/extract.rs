//! Text extraction for course material files (PDF, XLSX).
//!
//! PDFs become page-delimited plain text. Spreadsheets are flattened into a
//! newline-delimited representation — each row becomes one line with cells
//! joined by tabs — rather than treating tabular structure specially. The
//! structured row form is also exposed for the course-catalog loader.

use std::io::Read;

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction error. Never panics; the ingestor logs and skips the file.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedExtension(String),
    Pdf(String),
    Xlsx(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedExtension(ext) => {
                write!(f, "unsupported file extension: {}", ext)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Xlsx(e) => write!(f, "XLSX extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// One extracted segment of a PDF. Page numbers are 1-based and present only
/// when the extractor emits form-feed page breaks.
#[derive(Debug)]
pub struct PdfPage {
    pub page: Option<u32>,
    pub text: String,
}

/// Extract PDF text, split into pages when page breaks are detectable.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<PdfPage>, ExtractError> {
    let text =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let segments: Vec<&str> = text.split('\u{0C}').collect();
    if segments.len() <= 1 {
        return Ok(vec![PdfPage { page: None, text }]);
    }

    Ok(segments
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.trim().is_empty())
        .map(|(i, s)| PdfPage {
            page: Some(i as u32 + 1),
            text: s.to_string(),
        })
        .collect())
}

/// Flatten a spreadsheet to text: one line per row, cells tab-separated,
/// sheets separated by blank lines.
pub fn extract_xlsx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let sheets = extract_xlsx_rows(bytes)?;
    let mut out = String::new();
    for (i, rows) in sheets.iter().enumerate() {
        if i > 0 && !out.is_empty() {
            out.push_str("\n\n");
        }
        let lines: Vec<String> = rows
            .iter()
            .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
            .map(|r| r.join("\t"))
            .collect();
        out.push_str(&lines.join("\n"));
    }
    Ok(out)
}

/// Extract every sheet's rows as cell strings, preserving row structure.
/// Both shared-string and literal cell values are captured.
pub fn extract_xlsx_rows(bytes: &[u8]) -> Result<Vec<Vec<Vec<String>>>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Xlsx(e.to_string()))?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet_names = list_worksheet_names(&mut archive)?;

    let mut sheets = Vec::new();
    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        sheets.push(parse_sheet_rows(&sheet_xml, &shared_strings)?);
    }
    Ok(sheets)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Xlsx(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Xlsx(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Xlsx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    // A workbook without shared strings is valid (all-numeric sheets).
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                    current.clear();
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        current.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = false;
                    strings.push(std::mem::take(&mut current));
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Xlsx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    Ok(names)
}

fn parse_sheet_rows(
    xml: &[u8],
    shared_strings: &[String],
) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut current_row: Vec<String> = Vec::new();
    let mut in_row = false;
    let mut in_v = false;
    let mut cell_is_shared_str = false;
    let mut cell_count = 0usize;

    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = true;
                    current_row.clear();
                }
                b"c" => {
                    cell_is_shared_str = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                }
                b"v" => in_v = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_v => {
                let v = te.unescape().unwrap_or_default();
                let s = v.trim();
                if !s.is_empty() {
                    let value = if cell_is_shared_str {
                        s.parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i).cloned())
                            .unwrap_or_default()
                    } else {
                        s.to_string()
                    };
                    if in_row {
                        current_row.push(value);
                        cell_count += 1;
                    }
                }
                in_v = false;
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = false;
                    rows.push(std::mem::take(&mut current_row));
                }
                b"v" => in_v = false,
                b"c" => cell_is_shared_str = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Xlsx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}
