//! Content chunking for RAG indexing.
//!
//! Documents are cut into fixed-size character windows that overlap by a
//! configurable amount. PDF pages are windowed independently so every chunk
//! can cite the page it came from; other formats are windowed as one stream.

use super::extract::{extract_text, DocumentFormat, ExtractedText, ExtractionError, Result};
use super::models::{Chunk, ChunkingConfig, PageRef};

/// Chunk an uploaded document into embedding-ready chunks.
pub fn chunk_document(bytes: &[u8], filename: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let format = DocumentFormat::from_filename(filename)?;
    let text = extract_text(format, bytes)?;
    chunk_extracted(&text, filename, config)
}

/// Chunk already-extracted text.
///
/// Returns [`ExtractionError::NoText`] instead of an empty list.
pub fn chunk_extracted(text: &ExtractedText, source: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let chunks = match text {
        ExtractedText::Paged(pages) => chunk_pages(pages, source, config)?,
        ExtractedText::Flat(text) => chunk_flat(text, source, config)?,
    };

    if chunks.is_empty() {
        return Err(ExtractionError::NoText(source.to_string()));
    }

    log::debug!("Chunked {} into {} chunks", source, chunks.len());
    Ok(chunks)
}

fn chunk_pages(pages: &[String], source: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();

    for (index, page_text) in pages.iter().enumerate() {
        if page_text.trim().is_empty() {
            continue;
        }

        let page = PageRef::page(index as u32 + 1);
        let windows = sliding_window(page_text, config.chunk_size, config.page_overlap)?;
        chunks.extend(
            windows
                .into_iter()
                .filter_map(|window| Chunk::new(window.content, source, page)),
        );
    }

    Ok(chunks)
}

fn chunk_flat(text: &str, source: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let windows = sliding_window(text, config.chunk_size, config.text_overlap)?;
    Ok(windows
        .into_iter()
        .filter_map(|window| Chunk::new(window.content, source, PageRef::NotApplicable))
        .collect())
}

/// One window of text with its character offsets in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub content: String,
    pub start: usize,
    pub end: usize,
}

/// Split text into overlapping windows of `size` characters.
///
/// Each window starts `size - overlap` characters after the previous one; the
/// first window that reaches the end of the text is the last. Offsets count
/// characters, not bytes.
pub fn sliding_window(text: &str, size: usize, overlap: usize) -> Result<Vec<Window>> {
    if size == 0 {
        return Err(ExtractionError::InvalidConfig(
            "chunk size must be greater than zero".to_string(),
        ));
    }
    if overlap >= size {
        return Err(ExtractionError::InvalidConfig(format!(
            "overlap ({}) must be smaller than chunk size ({})",
            overlap, size
        )));
    }

    // Byte offset of every char boundary, plus the end of the string
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;

    let step = size - overlap;
    let mut windows = Vec::new();
    let mut start = 0;

    while start < char_len {
        let end = (start + size).min(char_len);
        let content = &text[boundaries[start]..boundaries[end]];
        if !content.is_empty() {
            windows.push(Window {
                content: content.to_string(),
                start,
                end,
            });
        }

        if end >= char_len {
            break;
        }
        start += step;
    }

    Ok(windows)
}

/// Rebuild the original text from consecutive windows by dropping the overlap.
pub fn join_windows(windows: &[Window]) -> String {
    let mut text = String::new();
    let mut covered: usize = 0;

    for window in windows {
        let skip = covered.saturating_sub(window.start);
        text.extend(window.content.chars().skip(skip));
        covered = window.end;
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(texts: &[&str]) -> ExtractedText {
        ExtractedText::Paged(texts.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn test_sliding_window_small_text() {
        let windows = sliding_window("Hello world", 1000, 100).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].content, "Hello world");
    }

    #[test]
    fn test_sliding_window_offsets() {
        let text = "a".repeat(1800);
        let windows = sliding_window(&text, 600, 50).unwrap();
        let starts: Vec<usize> = windows.iter().map(|w| w.start).collect();
        assert_eq!(starts, vec![0, 550, 1100, 1650]);
        assert_eq!(windows[3].content.len(), 150);
    }

    #[test]
    fn test_sliding_window_shares_overlap() {
        let text: String = (0..2000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let windows = sliding_window(&text, 600, 60).unwrap();

        for pair in windows.windows(2) {
            let prev: Vec<char> = pair[0].content.chars().collect();
            let next: String = pair[1].content.chars().take(60).collect();
            let tail: String = prev[prev.len() - 60..].iter().collect();
            assert_eq!(tail, next);
        }
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        // 1100 = 2 * (600 - 50): boundary math lands exactly on the end
        let text = "x".repeat(1100);
        let windows = sliding_window(&text, 600, 50).unwrap();
        assert_eq!(windows.len(), 2);
        assert!(windows.iter().all(|w| !w.content.is_empty()));

        let text = "y".repeat(600);
        let windows = sliding_window(&text, 600, 60).unwrap();
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn test_windows_rebuild_original_text() {
        let text = "Der schnelle braune Fuchs springt über den faulen Hund. ".repeat(73);
        for (size, overlap) in [(600, 50), (600, 60), (97, 13), (10, 9)] {
            let windows = sliding_window(&text, size, overlap).unwrap();
            assert_eq!(join_windows(&windows), text, "size={} overlap={}", size, overlap);
        }
    }

    #[test]
    fn test_window_counts_characters_not_bytes() {
        let text = "你好".repeat(400);
        let windows = sliding_window(&text, 600, 50).unwrap();
        assert_eq!(windows[0].content.chars().count(), 600);
        assert_eq!(windows.len(), 2);
    }

    #[test]
    fn test_invalid_window_config() {
        assert!(sliding_window("abc", 0, 0).is_err());
        assert!(sliding_window("abc", 10, 10).is_err());
    }

    #[test]
    fn test_three_page_pdf_scenario() {
        let page1 = "p".repeat(1800);
        let page3 = "q".repeat(200);
        let text = pages(&[&page1, "   \n\t ", &page3]);

        let chunks = chunk_extracted(&text, "paper.pdf", &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks.len(), 5);

        let page_numbers: Vec<Option<u32>> = chunks.iter().map(|c| c.page().number()).collect();
        assert_eq!(
            page_numbers,
            vec![Some(1), Some(1), Some(1), Some(1), Some(3)]
        );
        assert_eq!(chunks[4].content(), page3);
        assert!(chunks.iter().all(|c| c.source() == "paper.pdf"));
    }

    #[test]
    fn test_flat_text_uses_text_overlap_and_sentinel_page() {
        let text = ExtractedText::Flat("z".repeat(1200));
        let chunks = chunk_extracted(&text, "notes.txt", &ChunkingConfig::default()).unwrap();

        // starts at 0, 540, 1080
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].content().len(), 120);
        assert!(chunks.iter().all(|c| c.page() == PageRef::NotApplicable));
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let err = chunk_extracted(&ExtractedText::Flat("  \n".into()), "e.txt", &ChunkingConfig::default())
            .unwrap_err();
        assert!(matches!(err, ExtractionError::NoText(_)));

        let err = chunk_extracted(&pages(&["", " "]), "e.pdf", &ChunkingConfig::default()).unwrap_err();
        assert!(matches!(err, ExtractionError::NoText(_)));
    }

    #[test]
    fn test_chunk_document_dispatches_on_extension() {
        let chunks = chunk_document(b"plain words", "Notes.TXT", &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content(), "plain words");

        let err = chunk_document(b"plain words", "notes.md", &ChunkingConfig::default()).unwrap_err();
        assert!(matches!(err, ExtractionError::Unsupported(_)));
    }
}
