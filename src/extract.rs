//! Text extraction for uploaded files.
//!
//! Uploads are dispatched on their file extension to a [`TextExtractable`]
//! variant. Call sites only ever use [`TextExtractable::for_file_name`] and
//! [`TextExtractable::extract_text`], so new formats are new variants.
//!
//! | Variant | Extensions | Extraction |
//! |---------|------------|------------|
//! | `PlainText` | `.txt`, `.md` | UTF-8 decode (lossy) |
//! | `PagedDocument` | `.pdf`, `.pptx` | Per page / slide, concatenated |
//! | `Unsupported` | anything else | [`ExtractError::Unsupported`] |

use std::io::Read;
use std::path::Path;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Secondary text recorded for files whose type cannot be extracted.
pub const UNSUPPORTED_MARKER: &str = "Unsupported file type.";

#[derive(Debug)]
pub enum ExtractError {
    Unsupported(String),
    Pdf(String),
    Ooxml(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Unsupported(name) => write!(f, "unsupported file type: {}", name),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "slide deck extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFormat {
    Pdf,
    Pptx,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextExtractable {
    PlainText,
    PagedDocument(PageFormat),
    Unsupported(String),
}

impl TextExtractable {
    pub fn for_file_name(file_name: &str) -> Self {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "txt" | "md" => TextExtractable::PlainText,
            "pdf" => TextExtractable::PagedDocument(PageFormat::Pdf),
            "pptx" => TextExtractable::PagedDocument(PageFormat::Pptx),
            _ => TextExtractable::Unsupported(file_name.to_string()),
        }
    }

    /// Extract the text of a whole file.
    ///
    /// A page without extractable text contributes nothing; it is not an
    /// error. Non-empty pages are joined with a newline.
    pub fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        match self {
            TextExtractable::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
            TextExtractable::PagedDocument(format) => {
                let pages = match format {
                    PageFormat::Pdf => pdf_pages(bytes)?,
                    PageFormat::Pptx => pptx_slides(bytes)?,
                };
                Ok(join_pages(pages))
            }
            TextExtractable::Unsupported(name) => Err(ExtractError::Unsupported(name.clone())),
        }
    }
}

/// Pages are concatenated as extracted; a page without text adds nothing.
fn join_pages(pages: Vec<String>) -> String {
    pages.concat()
}

fn pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
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

fn pptx_slides(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;

    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    // slide10 sorts after slide9, not after slide1.
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut slides = Vec::with_capacity(slide_names.len());
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        slides.push(slide_text(&xml)?);
    }
    Ok(slides)
}

/// Every `<a:t>` run on a slide, space separated and ending in a newline.
/// A slide without text yields an empty string.
fn slide_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut runs: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        runs.push(te.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if runs.is_empty() {
        return Ok(String::new());
    }
    let mut text = runs.join(" ");
    text.push('\n');
    Ok(text)
}
