//! PDF page text extraction
//!
//! Uses lopdf's own text extraction per page, falling back to a minimal
//! content-stream scan when that yields nothing.

use crate::errors::IngestionError;
use reportqa_common::models::Page;
use std::path::Path;
use tracing::{debug, warn};

/// Extract the text of every page, in page order
pub fn extract_pages(path: &Path) -> Result<Vec<Page>, IngestionError> {
    let doc = lopdf::Document::load(path).map_err(|e| IngestionError::PdfParseError {
        path: path.display().to_string(),
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), path = %path.display(), "Extracting text from PDF");

    let mut result = Vec::with_capacity(pages.len());
    // `get_pages` is keyed by 1-based page number in ascending order
    for (index, (&page_num, &page_id)) in pages.iter().enumerate() {
        let text = match doc.extract_text(&[page_num]) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) | Err(_) => match doc.get_page_content(page_id) {
                Ok(content) => extract_text_from_content(&content),
                Err(e) => {
                    warn!(page = page_num, error = %e, "Failed to extract text from page, keeping it blank");
                    String::new()
                }
            },
        };
        result.push(Page::new(index, clean_text(&text)));
    }

    Ok(result)
}

/// Extract text from a raw PDF content stream
fn extract_text_from_content(content: &[u8]) -> String {
    // Only looks at text between BT and ET operators
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;
    let mut current_text = String::new();

    for line in content_str.lines() {
        let trimmed = line.trim();

        match trimmed {
            "BT" => in_text_block = true,
            "ET" => {
                in_text_block = false;
                if !current_text.is_empty() {
                    text.push_str(&current_text);
                    text.push(' ');
                    current_text.clear();
                }
            }
            _ if in_text_block => {
                if let Some(shown) = extract_text_from_operator(trimmed) {
                    current_text.push_str(&shown);
                }
            }
            _ => {}
        }
    }

    text
}

/// Text shown by a `Tj`, `'`, `"` or `TJ` operator line
fn extract_text_from_operator(line: &str) -> Option<String> {
    if line.ends_with("Tj") || line.ends_with('\'') || line.ends_with('"') {
        let start = line.find('(')?;
        let end = line.rfind(')')?;
        return (start < end).then(|| decode_pdf_string(&line[start + 1..end]));
    }

    if line.ends_with("TJ") {
        let mut result = String::new();
        let mut in_paren = false;
        let mut current = String::new();

        for ch in line.chars() {
            match ch {
                '(' => in_paren = true,
                ')' => {
                    in_paren = false;
                    result.push_str(&decode_pdf_string(&current));
                    current.clear();
                }
                _ if in_paren => current.push(ch),
                _ => {}
            }
        }

        if !result.is_empty() {
            return Some(result);
        }
    }

    None
}

/// Decode PDF string escapes
fn decode_pdf_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some(c) => result.push(c),
            None => {}
        }
    }

    result
}

/// Normalise extracted page text: strip BOMs and collapse whitespace runs
pub fn clean_text(text: &str) -> String {
    text.replace('\u{FEFF}', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
