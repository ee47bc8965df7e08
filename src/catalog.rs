//! Course catalog loaded from the structure spreadsheet.
//!
//! The catalog spreadsheet (filename stem starting with the configured
//! prefix, e.g. `estrutura_curso.xlsx`) maps lesson codes to module/lesson
//! numbers, lesson names, and summaries. Documents whose filename starts
//! with a known code are enriched with that row's metadata; unmatched
//! documents keep bare metadata and are still indexed.

use anyhow::{bail, Result};
use std::collections::HashMap;

use crate::extract::extract_xlsx_rows;
use crate::models::Document;

/// One row of the course structure sheet.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub code: String,
    pub module: Option<u32>,
    pub lesson: Option<u32>,
    pub lesson_name: Option<String>,
    pub summary: Option<String>,
}

/// Lesson-code → metadata lookup built from the catalog spreadsheet.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

const REQUIRED_COLUMNS: [&str; 2] = ["codigo", "modulo"];

impl Catalog {
    /// Parse the catalog from xlsx bytes. The first sheet's first non-empty
    /// row is the header; columns are matched by name (case-insensitive,
    /// accent-insensitive for the common Portuguese headings).
    pub fn from_xlsx(bytes: &[u8]) -> Result<Self> {
        let sheets = extract_xlsx_rows(bytes)?;
        let rows = sheets
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or_default();

        let mut rows = rows.into_iter().filter(|r| r.iter().any(|c| !c.is_empty()));
        let header = match rows.next() {
            Some(h) => h,
            None => bail!("Catalog spreadsheet has no header row"),
        };

        let columns = ColumnMap::from_header(&header)?;

        let mut entries = HashMap::new();
        for row in rows {
            let code = match columns.get(&row, Column::Code) {
                Some(c) if !c.is_empty() => c.to_lowercase(),
                _ => continue,
            };
            let entry = CatalogEntry {
                code: code.clone(),
                module: columns.get(&row, Column::Module).and_then(parse_number),
                lesson: columns.get(&row, Column::Lesson).and_then(parse_number),
                lesson_name: columns
                    .get(&row, Column::LessonName)
                    .filter(|s| !s.is_empty()),
                summary: columns.get(&row, Column::Summary).filter(|s| !s.is_empty()),
            };
            entries.insert(code, entry);
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, code: &str) -> Option<&CatalogEntry> {
        self.entries.get(&code.to_lowercase())
    }

    /// Enrich a document whose filename carries a known lesson code. The
    /// code is the first `_`/`-`/space-separated token of the file stem.
    pub fn enrich(&self, doc: &mut Document) {
        let code = match lesson_code(&doc.meta.source_path) {
            Some(c) => c,
            None => return,
        };
        let entry = match self.lookup(&code) {
            Some(e) => e,
            None => return,
        };

        doc.meta.course_code = Some(entry.code.clone());
        doc.meta.module = entry.module;
        doc.meta.lesson = entry.lesson;
        doc.meta.lesson_name = entry.lesson_name.clone();
        doc.meta.summary = entry.summary.clone();
    }
}

/// First token of the file stem, e.g. `materials/m2/af03_hipertrofia.pdf`
/// → `af03`.
pub fn lesson_code(source_path: &str) -> Option<String> {
    let stem = std::path::Path::new(source_path).file_stem()?.to_str()?;
    let token = stem
        .split(['_', '-', ' '])
        .next()
        .filter(|t| !t.is_empty())?;
    Some(token.to_lowercase())
}

#[derive(Clone, Copy)]
enum Column {
    Code,
    Module,
    Lesson,
    LessonName,
    Summary,
}

struct ColumnMap {
    code: usize,
    module: usize,
    lesson: Option<usize>,
    lesson_name: Option<usize>,
    summary: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &[String]) -> Result<Self> {
        let normalized: Vec<String> = header.iter().map(|h| normalize_header(h)).collect();
        let find = |names: &[&str]| {
            normalized
                .iter()
                .position(|h| names.iter().any(|n| h.contains(n)))
        };

        let code = find(&["codigo", "code"]);
        let module = find(&["modulo", "module"]);
        let lesson_name = find(&["nome da aula", "nome aula", "titulo"]);
        // "aula" alone also matches "nome da aula", so exclude that column.
        let lesson = normalized.iter().position(|h| {
            (h.contains("aula") || h.contains("lesson")) && !h.contains("nome") && !h.contains("titulo")
        });
        let summary = find(&["resumo", "ementa", "descricao", "summary"]);

        match (code, module) {
            (Some(code), Some(module)) => Ok(Self {
                code,
                module,
                lesson,
                lesson_name,
                summary,
            }),
            _ => bail!(
                "Catalog header is missing required columns ({}); found: {}",
                REQUIRED_COLUMNS.join(", "),
                header.join(", ")
            ),
        }
    }

    fn get(&self, row: &[String], column: Column) -> Option<String> {
        let index = match column {
            Column::Code => Some(self.code),
            Column::Module => Some(self.module),
            Column::Lesson => self.lesson,
            Column::LessonName => self.lesson_name,
            Column::Summary => self.summary,
        }?;
        row.get(index).map(|s| s.trim().to_string())
    }
}

/// Lowercase and strip the accents that appear in Portuguese headings.
fn normalize_header(h: &str) -> String {
    h.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' => 'u',
            'ç' => 'c',
            _ => c,
        })
        .collect()
}

fn parse_number(s: String) -> Option<u32> {
    // Spreadsheet numerics often come through as "2.0".
    let trimmed = s.trim();
    if let Ok(n) = trimmed.parse::<u32>() {
        return Some(n);
    }
    trimmed.parse::<f64>().ok().map(|f| f as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, DocMeta, Document};

    fn header_and_rows(rows: &[&[&str]]) -> Vec<u8> {
        // Minimal xlsx with literal (inline-typed) cells only.
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut cursor = std::io::Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();

        let mut sheet = String::from(
            r#"<?xml version="1.0"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for row in rows {
            sheet.push_str("<row>");
            for cell in *row {
                sheet.push_str(&format!("<c t=\"str\"><v>{}</v></c>", cell));
            }
            sheet.push_str("</row>");
        }
        sheet.push_str("</sheetData></worksheet>");

        zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        zip.write_all(sheet.as_bytes()).unwrap();
        zip.finish().unwrap();
        cursor.into_inner()
    }

    const HEADER: &[&str] = &["Código", "Módulo", "Aula", "Nome da Aula", "Resumo"];

    #[test]
    fn test_catalog_parses_rows() {
        let bytes = header_and_rows(&[
            HEADER,
            &["AF03", "2", "5", "Hipertrofia", "Bases da hipertrofia muscular"],
            &["AF04", "2", "6", "Periodização", ""],
        ]);
        let catalog = Catalog::from_xlsx(&bytes).unwrap();
        assert_eq!(catalog.len(), 2);

        let entry = catalog.lookup("af03").unwrap();
        assert_eq!(entry.module, Some(2));
        assert_eq!(entry.lesson, Some(5));
        assert_eq!(entry.lesson_name.as_deref(), Some("Hipertrofia"));
        assert!(entry.summary.is_some());
        assert_eq!(catalog.lookup("af04").unwrap().summary, None);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let bytes = header_and_rows(&[HEADER, &["AF03", "2", "5", "Hipertrofia", ""]]);
        let catalog = Catalog::from_xlsx(&bytes).unwrap();
        assert!(catalog.lookup("AF03").is_some());
        assert!(catalog.lookup("af03").is_some());
        assert!(catalog.lookup("zz99").is_none());
    }

    #[test]
    fn test_float_module_number() {
        let bytes = header_and_rows(&[HEADER, &["AF03", "2.0", "5.0", "X", ""]]);
        let catalog = Catalog::from_xlsx(&bytes).unwrap();
        let entry = catalog.lookup("af03").unwrap();
        assert_eq!(entry.module, Some(2));
        assert_eq!(entry.lesson, Some(5));
    }

    #[test]
    fn test_missing_required_columns_fails() {
        let bytes = header_and_rows(&[&["Nome", "Coisa"], &["a", "b"]]);
        assert!(Catalog::from_xlsx(&bytes).is_err());
    }

    #[test]
    fn test_enrich_matches_filename_code() {
        let bytes = header_and_rows(&[HEADER, &["AF03", "2", "5", "Hipertrofia", "Resumo X"]]);
        let catalog = Catalog::from_xlsx(&bytes).unwrap();

        let mut doc = Document {
            body: "corpo".to_string(),
            meta: DocMeta::new("materials/AF03_hipertrofia.pdf", ContentType::Pdf, "kb"),
        };
        catalog.enrich(&mut doc);
        assert_eq!(doc.meta.course_code.as_deref(), Some("af03"));
        assert_eq!(doc.meta.module, Some(2));
        assert_eq!(doc.meta.lesson_name.as_deref(), Some("Hipertrofia"));

        let mut unmatched = Document {
            body: "corpo".to_string(),
            meta: DocMeta::new("materials/ZZ99_outro.pdf", ContentType::Pdf, "kb"),
        };
        catalog.enrich(&mut unmatched);
        assert_eq!(unmatched.meta.course_code, None);
        assert_eq!(unmatched.meta.module, None);
    }

    #[test]
    fn test_lesson_code_extraction() {
        assert_eq!(lesson_code("a/b/AF03_x.pdf").as_deref(), Some("af03"));
        assert_eq!(lesson_code("AF03-x.pdf").as_deref(), Some("af03"));
        assert_eq!(lesson_code("af03 treino.pdf").as_deref(), Some("af03"));
        assert_eq!(lesson_code("semcodigo.pdf").as_deref(), Some("semcodigo"));
    }
}
