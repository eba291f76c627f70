//! Text extraction from uploaded documents.

use std::io::{Cursor, Read};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unsupported file type: {0}")]
    Unsupported(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("DOCX error: {0}")]
    Docx(String),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Text is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("No extractable text in {0}")]
    NoText(String),

    #[error("Invalid chunking configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Txt,
}

impl DocumentFormat {
    /// Resolve the format from a filename extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Result<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            "txt" => Ok(DocumentFormat::Txt),
            _ => Err(ExtractionError::Unsupported(filename.to_string())),
        }
    }
}

/// Raw text pulled out of a document, before chunking.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedText {
    /// One entry per page, in page order
    Paged(Vec<String>),
    /// Flowing text with no page structure
    Flat(String),
}

/// Extract the text of a document according to its format.
pub fn extract_text(format: DocumentFormat, bytes: &[u8]) -> Result<ExtractedText> {
    match format {
        DocumentFormat::Pdf => extract_pdf_pages(bytes).map(ExtractedText::Paged),
        DocumentFormat::Docx => extract_docx_text(bytes).map(ExtractedText::Flat),
        DocumentFormat::Txt => Ok(ExtractedText::Flat(String::from_utf8(bytes.to_vec())?)),
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>> {
    // pdf-extract panics on some malformed inputs
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));

    match outcome {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractionError::Pdf(e.to_string())),
        Err(_) => Err(ExtractionError::Pdf("PDF parser aborted".to_string())),
    }
}

fn extract_docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")?
        .read_to_string(&mut xml)?;

    let paragraphs = parse_document_xml(&xml)?;
    Ok(paragraphs.join("\n"))
}

/// Collect body paragraph text from WordprocessingML, one string per
/// top-level `<w:p>`.
///
/// Paragraphs nested in a paragraph (text boxes) are folded into their host
/// paragraph. Table contents are skipped.
fn parse_document_xml(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut paragraph_depth = 0usize;
    let mut table_depth = 0usize;
    let mut in_text = false;
    let mut pending_break = false;
    let mut buf = Vec::new();

    loop {
        let in_body_paragraph = paragraph_depth > 0 && table_depth == 0;
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:tbl" if paragraph_depth == 0 => table_depth += 1,
                b"w:p" if table_depth == 0 => {
                    if paragraph_depth == 0 {
                        current.clear();
                        pending_break = false;
                    } else {
                        pending_break = true;
                    }
                    paragraph_depth += 1;
                }
                b"w:t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:p" if table_depth == 0 && paragraph_depth == 0 => paragraphs.push(String::new()),
                b"w:tab" if in_body_paragraph => {
                    break_if_pending(&mut current, &mut pending_break);
                    current.push('\t');
                }
                b"w:br" | b"w:cr" if in_body_paragraph => {
                    break_if_pending(&mut current, &mut pending_break);
                    current.push('\n');
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:tbl" if paragraph_depth == 0 => table_depth = table_depth.saturating_sub(1),
                b"w:p" if table_depth == 0 && paragraph_depth > 0 => {
                    paragraph_depth -= 1;
                    if paragraph_depth == 0 {
                        paragraphs.push(std::mem::take(&mut current));
                    } else {
                        pending_break = true;
                    }
                }
                b"w:t" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_text && in_body_paragraph => {
                let text = e
                    .unescape()
                    .map_err(|e| ExtractionError::Docx(e.to_string()))?;
                if !text.is_empty() {
                    break_if_pending(&mut current, &mut pending_break);
                    current.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::Docx(format!("XML parse error: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

/// Separate folded-in paragraph text from what precedes it.
fn break_if_pending(current: &mut String, pending: &mut bool) {
    if std::mem::take(pending) && !current.is_empty() && !current.ends_with('\n') {
        current.push('\n');
    }
}
