//! Slide text extraction from `.pptx` documents.
//!
//! A `.pptx` file is a ZIP package. Slide order comes from the `sldIdLst` in
//! `ppt/presentation.xml`, resolved through its relationship part; every
//! slide part is then scanned for shapes carrying a text body.
//!
//! Per shape:
//! - paragraphs are joined with `\n` and the frame is trimmed
//! - frames with no text are ignored
//! - the first title placeholder (placeholder index 0) becomes the slide title
//! - every other frame becomes a body line

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS_PART: &str = "ppt/_rels/presentation.xml.rels";
const SLIDE_REL_TYPE_SUFFIX: &str = "/slide";

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Expected a .pptx file, got: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed presentation: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Text of one slide, 1-based.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlideRecord {
    pub index: usize,
    pub text: String,
}

impl SlideRecord {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Title first, then every non-blank body line, joined with `". "`.
    pub fn from_parts(index: usize, title: &str, body: &[String]) -> Self {
        let mut parts: Vec<&str> = Vec::with_capacity(body.len() + 1);
        let title = title.trim();
        if !title.is_empty() {
            parts.push(title);
        }
        parts.extend(body.iter().map(|l| l.trim()).filter(|l| !l.is_empty()));
        Self::new(index, parts.join(". "))
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Turns a presentation file into its ordered slide records.
///
/// Implementations never return a partial deck: any failure yields an error.
pub trait SlideSource: Send + Sync {
    fn parse(&self, path: &Path) -> Result<Vec<SlideRecord>, ParseError>;
}

#[derive(Clone, Debug, Default)]
pub struct PptxSlideSource;

impl PptxSlideSource {
    pub fn new() -> Self {
        Self
    }

    /// Extract slides from an already opened package.
    pub fn parse_archive<R: Read + Seek>(reader: R) -> Result<Vec<SlideRecord>, ParseError> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| ParseError::Malformed(e.to_string()))?;

        let parts = slide_parts(&mut archive)?;
        let mut slides = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let xml = read_part(&mut archive, part)?;
            let content = parse_slide_xml(&xml)
                .map_err(|e| ParseError::Malformed(format!("{}: {}", part, e)))?;
            slides.push(SlideRecord::from_parts(i + 1, &content.title, &content.body));
        }
        Ok(slides)
    }
}

impl SlideSource for PptxSlideSource {
    fn parse(&self, path: &Path) -> Result<Vec<SlideRecord>, ParseError> {
        if !path.exists() {
            return Err(ParseError::NotFound(path.to_path_buf()));
        }
        if !has_pptx_extension(path) {
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            return Err(ParseError::UnsupportedFormat(ext));
        }

        let file = File::open(path)?;
        let slides = Self::parse_archive(file)?;
        debug!(target = "slides", path = %path.display(), count = slides.len(), "Extracted slides");
        Ok(slides)
    }
}

/// True when the path ends in `.pptx`, case-insensitive.
pub fn has_pptx_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pptx"))
        .unwrap_or(false)
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String, ParseError> {
    let mut entry = archive.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => ParseError::Malformed(format!("missing part {}", name)),
        other => ParseError::Malformed(format!("{}: {}", name, other)),
    })?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Ordered ZIP entry names of the slide parts.
fn slide_parts<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>, ParseError> {
    let presentation = read_part(archive, PRESENTATION_PART)?;
    let rel_ids = slide_rel_ids(&presentation).map_err(ParseError::Malformed)?;

    if rel_ids.is_empty() {
        return Ok(numbered_slide_parts(archive.file_names()));
    }

    let rels = read_part(archive, PRESENTATION_RELS_PART)?;
    let targets = slide_relationship_targets(&rels).map_err(ParseError::Malformed)?;
    rel_ids
        .iter()
        .map(|id| {
            targets
                .get(id)
                .map(|t| resolve_target(t))
                .ok_or_else(|| ParseError::Malformed(format!("dangling slide relationship {}", id)))
        })
        .collect()
}

/// `ppt/slides/slideN.xml` entries sorted by N.
fn numbered_slide_parts<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut numbered: Vec<(u32, String)> = names
        .filter_map(|name| {
            let n = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    numbered.sort_by_key(|(n, _)| *n);
    numbered.into_iter().map(|(_, name)| name).collect()
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("ppt/{}", target.trim_start_matches("./")),
    }
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Relationship ids listed in `p:sldIdLst`, in presentation order.
fn slide_rel_ids(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut ids = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sldId" => {
                // `id` is the numeric slide id, `r:id` the relationship
                let rel = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id")
                    .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
                if let Some(rel) = rel {
                    ids.push(rel);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("{} at {}", e, reader.buffer_position())),
            _ => {}
        }
    }
    Ok(ids)
}

/// Map relationship id to target for every slide relationship.
fn slide_relationship_targets(xml: &str) -> Result<HashMap<String, String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut targets = HashMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let is_slide = attr_value(&e, b"Type")
                    .map(|t| t.ends_with(SLIDE_REL_TYPE_SUFFIX))
                    .unwrap_or(false);
                if let (true, Some(id), Some(target)) =
                    (is_slide, attr_value(&e, b"Id"), attr_value(&e, b"Target"))
                {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("{} at {}", e, reader.buffer_position())),
            _ => {}
        }
    }
    Ok(targets)
}

#[derive(Debug, Default, PartialEq)]
struct SlideContent {
    title: String,
    body: Vec<String>,
}

#[derive(Default)]
struct ShapeText {
    is_title: bool,
    paragraphs: Vec<String>,
    current: Option<String>,
}

fn is_title_placeholder(e: &BytesStart<'_>) -> bool {
    // A missing idx means index 0, which is the title slot
    match attr_value(e, b"idx") {
        None => true,
        Some(idx) => idx.trim() == "0",
    }
}

fn parse_slide_xml(xml: &str) -> Result<SlideContent, String> {
    let mut reader = Reader::from_str(xml);
    let mut content = SlideContent::default();
    let mut shape: Option<ShapeText> = None;
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"sp" => shape = Some(ShapeText::default()),
                b"ph" => {
                    if let Some(s) = shape.as_mut() {
                        s.is_title = is_title_placeholder(&e);
                    }
                }
                b"p" => {
                    if let Some(s) = shape.as_mut() {
                        s.current = Some(String::new());
                    }
                }
                b"t" => in_text_run = shape.is_some(),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"ph" => {
                    if let Some(s) = shape.as_mut() {
                        s.is_title = is_title_placeholder(&e);
                    }
                }
                b"p" => {
                    if let Some(s) = shape.as_mut() {
                        s.paragraphs.push(String::new());
                    }
                }
                b"br" => {
                    if let Some(current) = shape.as_mut().and_then(|s| s.current.as_mut()) {
                        current.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                if let Some(current) = shape.as_mut().and_then(|s| s.current.as_mut()) {
                    current.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    if let Some(s) = shape.as_mut() {
                        if let Some(p) = s.current.take() {
                            s.paragraphs.push(p);
                        }
                    }
                }
                b"sp" => {
                    if let Some(s) = shape.take() {
                        let text = s.paragraphs.join("\n").trim().to_string();
                        if text.is_empty() {
                            continue;
                        }
                        if s.is_title && content.title.is_empty() {
                            content.title = text;
                        } else {
                            content.body.push(text);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("{} at {}", e, reader.buffer_position())),
            _ => {}
        }
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;

    fn title_shape(text: &str) -> String {
        format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:txBody><a:bodyPr/><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>"#,
            text
        )
    }

    fn body_shape(paragraphs: &[&str]) -> String {
        let paras: String = paragraphs
            .iter()
            .map(|p| format!("<a:p><a:r><a:t>{}</a:t></a:r></a:p>", p))
            .collect();
        format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="3" name="Content 2"/><p:cNvSpPr/><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr><p:txBody><a:bodyPr/>{}</p:txBody></p:sp>"#,
            paras
        )
    }

    fn slide(shapes: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld {}><p:cSld><p:spTree>{}</p:spTree></p:cSld></p:sld>"#,
            NS,
            shapes.concat()
        )
    }

    /// Package `slides` in presentation order, stored under reversed file numbers
    /// so ordering must come from the relationship list.
    fn package(slides: &[String]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default();
        let n = slides.len();

        let ids: String = (0..n)
            .map(|i| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, i + 2))
            .collect();
        zip.start_file(PRESENTATION_PART, opts).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0"?><p:presentation {}><p:sldIdLst>{}</p:sldIdLst></p:presentation>"#,
            NS, ids
        )
        .unwrap();

        let rels: String = (0..n)
            .map(|i| {
                format!(
                    r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide{}.xml"/>"#,
                    i + 2,
                    n - i
                )
            })
            .collect();
        zip.start_file(PRESENTATION_RELS_PART, opts).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="slideMasters/slideMaster1.xml"/>{}</Relationships>"#,
            rels
        )
        .unwrap();

        for (i, xml) in slides.iter().enumerate() {
            zip.start_file(format!("ppt/slides/slide{}.xml", n - i), opts)
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_full_text_title_and_body() {
        let rec = SlideRecord::from_parts(1, "Title", &["Line 1".into(), "Line 2".into()]);
        assert_eq!(rec.text, "Title. Line 1. Line 2");
    }

    #[test]
    fn test_full_text_without_title_or_body() {
        assert_eq!(SlideRecord::from_parts(1, "", &["Only body".into()]).text, "Only body");
        let empty = SlideRecord::from_parts(2, "", &["  ".into()]);
        assert_eq!(empty.text, "");
        assert!(empty.is_empty());
    }

    #[test]
    fn test_slides_follow_presentation_order() {
        let bytes = package(&[
            slide(&[title_shape("Slide 1"), body_shape(&["Body 1"])]),
            slide(&[title_shape("Slide 2"), body_shape(&["Body 2"])]),
            slide(&[title_shape("Slide 3"), body_shape(&["Body 3"])]),
        ]);
        let slides = PptxSlideSource::parse_archive(Cursor::new(bytes)).unwrap();

        assert_eq!(slides.len(), 3);
        assert_eq!(
            slides.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(slides[0].text, "Slide 1. Body 1");
        assert_eq!(slides[2].text, "Slide 3. Body 3");
    }

    #[test]
    fn test_multi_paragraph_frame_and_entities() {
        let bytes = package(&[slide(&[
            title_shape("Q&amp;A"),
            body_shape(&["first", "second"]),
        ])]);
        let slides = PptxSlideSource::parse_archive(Cursor::new(bytes)).unwrap();
        assert_eq!(slides[0].text, "Q&A. first\nsecond");
    }

    #[test]
    fn test_empty_slide_is_kept() {
        let bytes = package(&[
            slide(&[title_shape("Intro")]),
            slide(&[]),
            slide(&[body_shape(&["Outro"])]),
        ]);
        let slides = PptxSlideSource::parse_archive(Cursor::new(bytes)).unwrap();
        assert_eq!(slides.len(), 3);
        assert!(slides[1].is_empty());
        assert_eq!(slides[1].index, 2);
        assert_eq!(slides[2].text, "Outro");
    }

    #[test]
    fn test_empty_presentation() {
        let bytes = package(&[]);
        let slides = PptxSlideSource::parse_archive(Cursor::new(bytes)).unwrap();
        assert!(slides.is_empty());
    }

    #[test]
    fn test_file_not_found() {
        let err = PptxSlideSource::new()
            .parse(Path::new("/nonexistent/file.pptx"))
            .unwrap_err();
        assert!(matches!(err, ParseError::NotFound(_)));
    }

    #[test]
    fn test_wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("file.txt");
        std::fs::write(&bad, "not a pptx").unwrap();
        let err = PptxSlideSource::new().parse(&bad).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(ref ext) if ext == ".txt"));
        assert!(err.to_string().contains(".pptx"));
    }

    #[test]
    fn test_not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("broken.PPTX");
        std::fs::write(&bad, "definitely not a zip").unwrap();
        let err = PptxSlideSource::new().parse(&bad).unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn test_parse_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        std::fs::write(
            &path,
            package(&[slide(&[title_shape("Hello"), body_shape(&["World"])])]),
        )
        .unwrap();
        let slides = PptxSlideSource::new().parse(&path).unwrap();
        assert_eq!(slides, vec![SlideRecord::new(1, "Hello. World")]);
    }

    #[test]
    fn test_numbered_fallback_order() {
        let names = ["ppt/slides/slide10.xml", "ppt/slides/slide2.xml", "ppt/media/x.png"];
        assert_eq!(
            numbered_slide_parts(names.into_iter()),
            vec!["ppt/slides/slide2.xml", "ppt/slides/slide10.xml"]
        );
    }
}
