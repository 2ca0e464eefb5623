//! Multi-format text extraction.
//!
//! Turns one file into a sequence of [`SourceUnit`]s, dispatching on the
//! lowercase file extension via [`FileKind`]. Each unit carries the source
//! path plus structural metadata (page, slide, sheet, `type = "table"`).
//!
//! | Kind | Units |
//! |------|-------|
//! | PDF | one per page |
//! | DOCX | one per non-empty body paragraph, one per table |
//! | PPTX | one per text-bearing shape per slide, one per table |
//! | JPG/PNG | OCR output from `tesseract` |
//! | SVG | `<text>` content |
//! | TXT/MD | the whole file |
//! | CSV | every row as a `" | "`-joined line, tagged table |
//! | XLSX | one per sheet, tagged table (`spreadsheets` feature) |
//!
//! Extraction never panics; failures come back as [`ExtractError`] and the
//! caller decides whether to skip the file.

use std::borrow::Cow;
use std::io::Read;
use std::path::Path;
use std::process::Command;

use tracing::warn;

use crate::config::OcrConfig;
use crate::error::ExtractError;
use crate::models::{ChunkMetadata, SourceUnit};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Bytes of a CSV file inspected when guessing the delimiter.
const CSV_SNIFF_BYTES: usize = 4096;
const CSV_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];
/// Separator between table cells in rendered rows.
pub const CELL_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Pptx,
    Image,
    Svg,
    Text,
    Csv,
    Xlsx,
    Unsupported,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => FileKind::Pdf,
            "docx" => FileKind::Docx,
            "pptx" => FileKind::Pptx,
            "jpg" | "jpeg" | "png" => FileKind::Image,
            "svg" => FileKind::Svg,
            "txt" | "md" | "markdown" => FileKind::Text,
            "csv" => FileKind::Csv,
            "xlsx" => FileKind::Xlsx,
            _ => FileKind::Unsupported,
        }
    }

    /// Whether this build can extract the kind. Spreadsheets depend on the
    /// `spreadsheets` feature.
    pub fn is_supported(self) -> bool {
        match self {
            FileKind::Unsupported => false,
            FileKind::Xlsx => cfg!(feature = "spreadsheets"),
            _ => true,
        }
    }
}

/// Extract text units from the file at `path`, labelling them with `source`.
pub fn extract_file(
    path: &Path,
    source: &str,
    ocr: &OcrConfig,
) -> Result<Vec<SourceUnit>, ExtractError> {
    match FileKind::from_path(path) {
        FileKind::Pdf => extract_pdf(&read_bytes(path)?, source),
        FileKind::Docx => extract_docx(&read_bytes(path)?, source),
        FileKind::Pptx => extract_pptx(&read_bytes(path)?, source),
        FileKind::Image => extract_image(path, source, ocr),
        FileKind::Svg => extract_svg(&read_bytes(path)?, source),
        FileKind::Text => Ok(extract_plain(&read_bytes(path)?, source)),
        FileKind::Csv => Ok(extract_csv(path, source)),
        FileKind::Xlsx => extract_xlsx(path, source),
        FileKind::Unsupported => Ok(Vec::new()),
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ExtractError> {
    std::fs::read(path).map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub fn extract_plain(bytes: &[u8], source: &str) -> Vec<SourceUnit> {
    vec![SourceUnit::new(
        String::from_utf8_lossy(bytes).into_owned(),
        ChunkMetadata::new(source),
    )]
}

fn extract_pdf(bytes: &[u8], source: &str) -> Result<Vec<SourceUnit>, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let mut meta = ChunkMetadata::new(source);
            meta.page = Some(i + 1);
            SourceUnit::new(text, meta)
        })
        .collect())
}

// ============ XML walking ============

/// Simplified XML event keyed by local (namespace-free) element name.
enum Tag<'a> {
    Open(&'a [u8]),
    Close(&'a [u8]),
    Empty(&'a [u8]),
    Text(Cow<'a, str>),
}

fn walk_xml(xml: &[u8], mut visit: impl FnMut(Tag<'_>)) -> Result<(), String> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                visit(Tag::Open(name.as_ref()));
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                visit(Tag::Close(name.as_ref()));
            }
            Ok(Event::Empty(e)) => {
                let name = e.local_name();
                visit(Tag::Empty(name.as_ref()));
            }
            Ok(Event::Text(te)) => {
                let text = te.unescape().map_err(|e| e.to_string())?;
                visit(Tag::Text(text));
            }
            Ok(Event::CData(cd)) => {
                visit(Tag::Text(String::from_utf8_lossy(&cd)));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

/// Accumulates the text runs (`<w:t>` / `<a:t>`) of the paragraph being read.
#[derive(Default)]
struct ParagraphText {
    text: String,
    in_run_text: bool,
}

impl ParagraphText {
    /// Returns true when the tag was consumed.
    fn handle(&mut self, tag: &Tag<'_>) -> bool {
        match tag {
            Tag::Open(b"t") => self.in_run_text = true,
            Tag::Close(b"t") => self.in_run_text = false,
            Tag::Empty(b"tab") => self.text.push('\t'),
            Tag::Empty(b"br") | Tag::Empty(b"cr") => self.text.push('\n'),
            Tag::Text(t) if self.in_run_text => self.text.push_str(t),
            _ => return false,
        }
        true
    }

    fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}

/// Collects `tbl/tr/tc` structure shared by WordprocessingML and DrawingML.
/// Nested tables are folded into the enclosing cell's text.
#[derive(Default)]
struct TableText {
    depth: usize,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: Vec<String>,
}

impl TableText {
    fn in_table(&self) -> bool {
        self.depth > 0
    }

    fn open(&mut self, name: &[u8]) {
        match name {
            b"tbl" => {
                self.depth += 1;
                if self.depth == 1 {
                    self.rows.clear();
                }
            }
            b"tr" if self.depth == 1 => self.row.clear(),
            b"tc" if self.depth == 1 => self.cell.clear(),
            _ => {}
        }
    }

    /// Returns the rendered table when the outermost table closes.
    fn close(&mut self, name: &[u8]) -> Option<String> {
        match name {
            b"tbl" if self.depth > 0 => {
                self.depth -= 1;
                if self.depth == 0 {
                    let rows = std::mem::take(&mut self.rows);
                    return Some(render_rows(&rows));
                }
            }
            b"tr" if self.depth == 1 => {
                let row = std::mem::take(&mut self.row);
                self.rows.push(row);
            }
            b"tc" if self.depth == 1 => {
                let cell = std::mem::take(&mut self.cell);
                self.row.push(cell.join("\n"));
            }
            _ => {}
        }
        None
    }

    fn push_paragraph(&mut self, text: String) {
        self.cell.push(text);
    }
}

fn render_rows(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| row.join(CELL_SEPARATOR))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============ OOXML ============

type ZipCursor<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_zip(bytes: &[u8]) -> Result<ZipCursor<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut ZipCursor<'_>,
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

fn extract_docx(bytes: &[u8], source: &str) -> Result<Vec<SourceUnit>, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    docx_units(&xml, source)
}

fn docx_units(xml: &[u8], source: &str) -> Result<Vec<SourceUnit>, ExtractError> {
    let mut units = Vec::new();
    let mut para = ParagraphText::default();
    let mut table = TableText::default();

    walk_xml(xml, |tag| {
        if para.handle(&tag) {
            return;
        }
        match tag {
            Tag::Open(b"p") => {
                para.take();
            }
            Tag::Close(b"p") => {
                let text = para.take();
                if table.in_table() {
                    table.push_paragraph(text);
                } else if !text.trim().is_empty() {
                    units.push(SourceUnit::new(text, ChunkMetadata::new(source)));
                }
            }
            Tag::Open(name) => table.open(name),
            Tag::Close(name) => {
                if let Some(rendered) = table.close(name) {
                    if !rendered.trim().is_empty() {
                        units.push(SourceUnit::new(rendered, ChunkMetadata::new(source).table()));
                    }
                }
            }
            _ => {}
        }
    })
    .map_err(ExtractError::Ooxml)?;

    Ok(units)
}

fn extract_pptx(bytes: &[u8], source: &str) -> Result<Vec<SourceUnit>, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut units = Vec::new();
    for (idx, name) in slide_names.iter().enumerate() {
        let xml = read_zip_entry_bounded(&mut archive, name, MAX_XML_ENTRY_BYTES)?;
        units.extend(slide_units(&xml, source, idx + 1)?);
    }
    Ok(units)
}

fn slide_units(xml: &[u8], source: &str, slide: usize) -> Result<Vec<SourceUnit>, ExtractError> {
    let slide_meta = || {
        let mut meta = ChunkMetadata::new(source);
        meta.slide = Some(slide);
        meta
    };

    let mut units = Vec::new();
    let mut para = ParagraphText::default();
    let mut table = TableText::default();
    let mut shape_depth = 0usize;
    let mut shape_paras: Vec<String> = Vec::new();

    walk_xml(xml, |tag| {
        if para.handle(&tag) {
            return;
        }
        match tag {
            Tag::Open(b"sp") => {
                shape_depth += 1;
                if shape_depth == 1 {
                    shape_paras.clear();
                }
            }
            Tag::Close(b"sp") if shape_depth > 0 => {
                shape_depth -= 1;
                if shape_depth == 0 {
                    let text = std::mem::take(&mut shape_paras).join("\n");
                    if !text.trim().is_empty() {
                        units.push(SourceUnit::new(text, slide_meta()));
                    }
                }
            }
            Tag::Open(b"p") => {
                para.take();
            }
            Tag::Close(b"p") => {
                let text = para.take();
                if table.in_table() {
                    table.push_paragraph(text);
                } else if shape_depth > 0 {
                    shape_paras.push(text);
                }
            }
            Tag::Open(name) => table.open(name),
            Tag::Close(name) => {
                if let Some(rendered) = table.close(name) {
                    if !rendered.trim().is_empty() {
                        units.push(SourceUnit::new(rendered, slide_meta().table()));
                    }
                }
            }
            _ => {}
        }
    })
    .map_err(ExtractError::Ooxml)?;

    Ok(units)
}

// ============ Images ============

fn extract_svg(bytes: &[u8], source: &str) -> Result<Vec<SourceUnit>, ExtractError> {
    let mut segments: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    walk_xml(bytes, |tag| match tag {
        Tag::Open(b"text") => depth += 1,
        Tag::Close(b"text") if depth > 0 => {
            depth -= 1;
            if depth == 0 {
                let text = std::mem::take(&mut current);
                let text = text.trim();
                if !text.is_empty() {
                    segments.push(text.to_string());
                }
            }
        }
        Tag::Text(t) if depth > 0 => current.push_str(&t),
        _ => {}
    })
    .map_err(ExtractError::Svg)?;

    Ok(vec![SourceUnit::new(
        segments.join("\n"),
        ChunkMetadata::new(source),
    )])
}

/// Run OCR by shelling out to `tesseract <image> stdout`.
fn extract_image(
    path: &Path,
    source: &str,
    ocr: &OcrConfig,
) -> Result<Vec<SourceUnit>, ExtractError> {
    let mut cmd = Command::new(&ocr.tesseract_cmd);
    cmd.arg(path).arg("stdout").arg("-l").arg(&ocr.lang);
    if let Some(ref tessdata) = ocr.tessdata_dir {
        cmd.env("TESSDATA_PREFIX", tessdata);
    }

    let output = cmd.output().map_err(|e| {
        ExtractError::Ocr(format!(
            "failed to run {}: {}",
            ocr.tesseract_cmd.display(),
            e
        ))
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractError::Ocr(format!(
            "tesseract exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(vec![SourceUnit::new(
        String::from_utf8_lossy(&output.stdout).into_owned(),
        ChunkMetadata::new(source),
    )])
}

// ============ Tabular ============

/// Guess the delimiter of a CSV sample. Prefers a candidate that appears the
/// same non-zero number of times on every sampled line, then the most
/// frequent one; falls back to a comma.
pub fn sniff_delimiter(sample: &str) -> u8 {
    let lines: Vec<&str> = sample
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(10)
        .collect();
    if lines.is_empty() {
        return b',';
    }

    let mut best: Option<(bool, usize, u8)> = None;
    for &delim in &CSV_DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|l| l.bytes().filter(|&b| b == delim).count())
            .collect();
        let first = counts[0];
        if first == 0 && counts.iter().all(|&c| c == 0) {
            continue;
        }
        let consistent = first > 0 && counts.iter().all(|&c| c == first);
        let total: usize = counts.iter().sum();
        let candidate = (consistent, total, delim);
        match best {
            Some((bc, bt, _)) if (bc, bt) >= (consistent, total) => {}
            _ => best = Some(candidate),
        }
    }

    best.map(|(_, _, d)| d).unwrap_or(b',')
}

fn extract_csv(path: &Path, source: &str) -> Vec<SourceUnit> {
    let text = match read_csv_rows(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "could not read CSV, emitting empty unit");
            String::new()
        }
    };
    vec![SourceUnit::new(text, ChunkMetadata::new(source).table())]
}

fn read_csv_rows(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let sample_len = bytes.len().min(CSV_SNIFF_BYTES);
    let delimiter = sniff_delimiter(&String::from_utf8_lossy(&bytes[..sample_len]));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let mut lines = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        let cells: Vec<Cow<'_, str>> = record.iter().map(String::from_utf8_lossy).collect();
        lines.push(cells.join(CELL_SEPARATOR));
    }
    Ok(lines.join("\n"))
}

#[cfg(feature = "spreadsheets")]
fn extract_xlsx(path: &Path, source: &str) -> Result<Vec<SourceUnit>, ExtractError> {
    use calamine::Reader;

    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| ExtractError::Spreadsheet(e.to_string()))?;

    let mut units = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExtractError::Spreadsheet(format!("sheet '{}': {}", name, e)))?;
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();

        let mut meta = ChunkMetadata::new(source).table();
        meta.sheet = Some(name.clone());
        units.push(SourceUnit::new(render_rows(&rows), meta));
    }
    Ok(units)
}

#[cfg(not(feature = "spreadsheets"))]
fn extract_xlsx(_path: &Path, _source: &str) -> Result<Vec<SourceUnit>, ExtractError> {
    Err(ExtractError::Spreadsheet(
        "spreadsheet support not compiled in (enable the `spreadsheets` feature)".to_string(),
    ))
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::models::ChunkKind;
    use tempfile::TempDir;

    #[test]
    fn kinds_follow_extension() {
        assert_eq!(FileKind::from_path(Path::new("a/B.PDF")), FileKind::Pdf);
        assert_eq!(FileKind::from_path(Path::new("x.jpeg")), FileKind::Image);
        assert_eq!(FileKind::from_path(Path::new("notes.md")), FileKind::Text);
        assert_eq!(FileKind::from_path(Path::new("tool.exe")), FileKind::Unsupported);
        assert_eq!(FileKind::from_path(Path::new("Makefile")), FileKind::Unsupported);
        assert!(!FileKind::Unsupported.is_supported());
        assert!(FileKind::Csv.is_supported());
    }

    #[test]
    fn docx_paragraphs_and_tables() {
        let table = "<w:tbl>\
            <w:tr><w:tc>{a}</w:tc><w:tc>{b}</w:tc></w:tr>\
            <w:tr><w:tc>{c}</w:tc><w:tc>{d}</w:tc></w:tr>\
            </w:tbl>"
            .replace("{a}", &w_para("Name"))
            .replace("{b}", &w_para("Qty"))
            .replace("{c}", &w_para("Bolts"))
            .replace("{d}", &w_para("12"));
        let body = format!(
            "{}{}{}{}",
            w_para("First paragraph."),
            w_para("   "),
            table,
            w_para("After &amp; table.")
        );
        let units = extract_docx(&docx(&body), "report.docx").unwrap();

        assert_eq!(units.len(), 3);
        assert_eq!(units[0].text, "First paragraph.");
        assert_eq!(units[0].metadata.kind, None);
        assert_eq!(units[1].text, "Name | Qty\nBolts | 12");
        assert_eq!(units[1].metadata.kind, Some(ChunkKind::Table));
        assert_eq!(units[2].text, "After & table.");
        assert!(units.iter().all(|u| u.metadata.source == "report.docx"));
    }

    #[test]
    fn docx_keeps_run_spacing() {
        let body = "<w:p><w:r><w:t xml:space=\"preserve\">Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p>";
        let units = extract_docx(&docx(body), "d.docx").unwrap();
        assert_eq!(units[0].text, "Hello world");
    }

    #[test]
    fn pptx_shapes_and_tables_per_slide() {
        let s1 = slide(&format!(
            "{}{}",
            text_shape(&["Quarterly review", "Agenda"]),
            text_shape(&[""])
        ));
        let table = "<p:graphicFrame><a:graphic><a:graphicData><a:tbl>\
            <a:tr><a:tc><a:txBody><a:p><a:r><a:t>Region</a:t></a:r></a:p></a:txBody></a:tc>\
            <a:tc><a:txBody><a:p><a:r><a:t>Sales</a:t></a:r></a:p></a:txBody></a:tc></a:tr>\
            </a:tbl></a:graphicData></a:graphic></p:graphicFrame>";
        let s2 = slide(&format!("{}{}", text_shape(&["Results"]), table));
        let bytes = zip_with(&[
            ("ppt/slides/slide2.xml", s2),
            ("ppt/slides/slide1.xml", s1),
        ]);

        let units = extract_pptx(&bytes, "deck.pptx").unwrap();
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].text, "Quarterly review\nAgenda");
        assert_eq!(units[0].metadata.slide, Some(1));
        assert_eq!(units[1].text, "Results");
        assert_eq!(units[1].metadata.slide, Some(2));
        assert_eq!(units[2].text, "Region | Sales");
        assert_eq!(units[2].metadata.kind, Some(ChunkKind::Table));
        assert_eq!(units[2].metadata.slide, Some(2));
    }

    #[test]
    fn invalid_zip_is_an_ooxml_error() {
        let err = extract_docx(b"not a zip", "x.docx").unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn invalid_pdf_is_a_pdf_error() {
        let err = extract_pdf(b"not a pdf", "x.pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn svg_text_elements() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg"><rect/><text x="1">Org <tspan>chart</tspan></text><text>CEO</text></svg>"#;
        let units = extract_svg(svg, "chart.svg").unwrap();
        assert_eq!(units[0].text, "Org chart\nCEO");
    }

    #[test]
    fn sniffs_common_delimiters() {
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3\n"), b',');
        assert_eq!(sniff_delimiter("a;b;c\n1;2,5;3\n"), b';');
        assert_eq!(sniff_delimiter("a\tb\n1\t2\n"), b'\t');
        assert_eq!(sniff_delimiter("single column\n"), b',');
    }

    #[test]
    fn csv_rows_are_pipe_joined() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("parts.csv");
        std::fs::write(&path, "part;qty\nbolt;12\nnut;\n").unwrap();

        let units = extract_file(&path, "parts.csv", &OcrConfig::default()).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "part | qty\nbolt | 12\nnut | ");
        assert_eq!(units[0].metadata.kind, Some(ChunkKind::Table));
    }

    #[cfg(feature = "spreadsheets")]
    #[test]
    fn xlsx_sheets_become_table_units() {
        let prices = format!(
            "<row r=\"1\">{}{}{}</row><row r=\"2\">{}<c r=\"C2\"><v>12</v></c></row>",
            inline_cell("A1", "Item"),
            inline_cell("B1", "Note"),
            inline_cell("C1", "Qty"),
            inline_cell("A2", "Bolt"),
        );
        let notes = format!("<row r=\"1\">{}</row>", inline_cell("A1", "Checked"));

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stock.xlsx");
        std::fs::write(&path, xlsx(&[("Prices", prices.as_str()), ("Notes", notes.as_str())])).unwrap();

        let units = extract_file(&path, "stock.xlsx", &OcrConfig::default()).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "Item | Note | Qty\nBolt |  | 12");
        assert_eq!(units[0].metadata.sheet.as_deref(), Some("Prices"));
        assert_eq!(units[0].metadata.kind, Some(ChunkKind::Table));
        assert_eq!(units[1].text, "Checked");
        assert_eq!(units[1].metadata.sheet.as_deref(), Some("Notes"));
        assert!(units.iter().all(|u| u.metadata.source == "stock.xlsx"));
    }

    #[test]
    fn unreadable_csv_yields_empty_unit() {
        let tmp = TempDir::new().unwrap();
        let units = extract_csv(&tmp.path().join("missing.csv"), "missing.csv");
        assert_eq!(units.len(), 1);
        assert!(units[0].text.is_empty());
    }

    #[test]
    fn plain_text_is_one_unit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.md");
        std::fs::write(&path, "# Notes\n\nBody").unwrap();
        let units = extract_file(&path, "notes.md", &OcrConfig::default()).unwrap();
        assert_eq!(units, vec![SourceUnit::new("# Notes\n\nBody", ChunkMetadata::new("notes.md"))]);
    }

    #[test]
    fn missing_ocr_binary_is_an_ocr_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("scan.png");
        std::fs::write(&path, b"\x89PNG").unwrap();
        let ocr = OcrConfig {
            tesseract_cmd: tmp.path().join("no-such-tesseract"),
            ..OcrConfig::default()
        };
        let err = extract_file(&path, "scan.png", &ocr).unwrap_err();
        assert!(matches!(err, ExtractError::Ocr(_)));
    }
}
