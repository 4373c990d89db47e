//! Page and comment extraction for `.docx` drafts.
//!
//! A draft document stores every revision of a report in one file, separated
//! by hard page breaks (`<w:br w:type="page"/>`). The first page holds the
//! final accepted text and the last page the first draft. Reviewer comments
//! live in `word/comments.xml` and are anchored in the body by
//! `<w:commentRangeStart w:id="…"/>`.
//!
//! A paragraph containing a page break starts a new page, unless the current
//! page is still empty. Blank paragraphs are dropped and page text is the
//! trimmed paragraphs joined by `\n`.

use draftdesk_core::models::{Page, PageComment};
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::io::Read;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCUMENT_XML: &str = "word/document.xml";
const COMMENTS_XML: &str = "word/comments.xml";

/// Author recorded for comments without a `w:author` attribute.
pub const UNKNOWN_AUTHOR: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("not a docx archive: {0}")]
    Archive(String),
    #[error("{0} not found")]
    MissingEntry(&'static str),
    #[error("malformed XML in {entry}: {message}")]
    Xml {
        entry: &'static str,
        message: String,
    },
}

/// Split a `.docx` file into pages, final revision first.
///
/// A document without any text yields a single empty page.
pub fn docx_pages(bytes: &[u8]) -> Result<Vec<Page>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Archive(e.to_string()))?;

    let document = read_zip_entry_bounded(&mut archive, DOCUMENT_XML)?
        .ok_or(ExtractError::MissingEntry(DOCUMENT_XML))?;
    let body = parse_body(&document)?;

    let comments = match read_zip_entry_bounded(&mut archive, COMMENTS_XML)? {
        Some(xml) => parse_comments(&xml)?,
        None => Vec::new(),
    };

    let mut texts = body.pages;
    if texts.is_empty() {
        texts.push(String::new());
    }
    let last = texts.len() - 1;

    let mut pages: Vec<Page> = texts
        .into_iter()
        .enumerate()
        .map(|(i, content)| Page {
            page_number: i + 1,
            content,
            comments: Vec::new(),
            is_final: i == 0,
            is_first_draft: i == last,
        })
        .collect();

    for (id, comment) in comments {
        let index = body
            .anchors
            .get(&id)
            .copied()
            .unwrap_or(0)
            .min(last);
        pages[index].comments.push(comment);
    }

    Ok(pages)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &'static str,
) -> Result<Option<Vec<u8>>, ExtractError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ExtractError::Archive(e.to_string())),
    };
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Archive(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Archive(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(Some(out))
}

fn attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

struct Body {
    pages: Vec<String>,
    /// Comment id → page index of its `commentRangeStart`.
    anchors: HashMap<String, usize>,
}

#[derive(Default)]
struct BodyBuilder {
    pages: Vec<String>,
    lines: Vec<String>,
    anchors: HashMap<String, usize>,
    paragraph: String,
    paragraph_break: bool,
    paragraph_anchors: Vec<String>,
}

impl BodyBuilder {
    fn element(&mut self, e: &BytesStart) {
        match e.local_name().as_ref() {
            b"p" => {
                self.paragraph.clear();
                self.paragraph_break = false;
                self.paragraph_anchors.clear();
            }
            b"br" => {
                if attr(e, b"type").as_deref() == Some("page") {
                    self.paragraph_break = true;
                }
            }
            b"tab" => self.paragraph.push('\t'),
            b"commentRangeStart" => {
                if let Some(id) = attr(e, b"id") {
                    self.paragraph_anchors.push(id);
                }
            }
            _ => {}
        }
    }

    fn end_paragraph(&mut self) {
        if self.paragraph_break && !self.lines.is_empty() {
            self.pages.push(self.lines.join("\n"));
            self.lines.clear();
        }
        let page = self.pages.len();
        for id in self.paragraph_anchors.drain(..) {
            self.anchors.entry(id).or_insert(page);
        }
        let text = self.paragraph.trim();
        if !text.is_empty() {
            self.lines.push(text.to_string());
        }
        self.paragraph.clear();
        self.paragraph_break = false;
    }

    fn finish(mut self) -> Body {
        if !self.lines.is_empty() {
            self.pages.push(self.lines.join("\n"));
        }
        Body {
            pages: self.pages,
            anchors: self.anchors,
        }
    }
}

fn parse_body(xml: &[u8]) -> Result<Body, ExtractError> {
    let xml_error = |message: String| ExtractError::Xml {
        entry: DOCUMENT_XML,
        message,
    };

    let mut builder = BodyBuilder::default();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = true;
                } else {
                    builder.element(&e);
                }
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"p" {
                    builder.element(&e);
                    builder.end_paragraph();
                } else {
                    builder.element(&e);
                }
            }
            Ok(Event::Text(te)) if in_t => {
                let text = te.unescape().map_err(|e| xml_error(e.to_string()))?;
                builder.paragraph.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => builder.end_paragraph(),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(builder.finish())
}

/// Comments in document order, keyed by their `w:id`.
fn parse_comments(xml: &[u8]) -> Result<Vec<(String, PageComment)>, ExtractError> {
    let xml_error = |message: String| ExtractError::Xml {
        entry: COMMENTS_XML,
        message,
    };

    let mut comments = Vec::new();
    let mut current: Option<(String, PageComment)> = None;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"comment" => {
                    let id = attr(&e, b"id").unwrap_or_default();
                    let author = attr(&e, b"author").unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
                    current = Some((
                        id,
                        PageComment {
                            author,
                            text: String::new(),
                        },
                    ));
                }
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some((_, comment)) = current.as_mut() {
                    let text = te.unescape().map_err(|e| xml_error(e.to_string()))?;
                    comment.text.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"comment" => {
                    if let Some(done) = current.take() {
                        comments.push(done);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(comments)
}
