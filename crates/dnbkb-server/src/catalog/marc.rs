//! MARC21 slim (MARCXML) record parser
//!
//! Decodes one `<record>` into a [`ParsedRecord`]. Only elements in the MARC21
//! slim namespace are considered; the record may be wrapped in a collection or
//! any other envelope.
//!
//! Fields read:
//!
//! | Field | Use |
//! |-------|-----|
//! | `001` | identifier (required) |
//! | `245 $a $b` | title |
//! | `264 $c`, then `260 $c` | publication year |
//! | `100 $a`, then `700 $a` | creators |
//! | `856 $u $y $3` | links with label and description |

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use thiserror::Error;

use crate::models::LinkKind;

pub const MARC_NAMESPACE: &str = "http://www.loc.gov/MARC21/slim";

/// Host of the catalog's persistent identifiers
pub const CATALOG_PID_HOST: &str = "d-nb.info";

const TOC_MARKER: &str = "inhaltsverzeichnis";

#[allow(clippy::unwrap_used)]
static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(1[5-9]\d{2}|20\d{2})").unwrap());

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("MARCXML record missing controlfield 001")]
    MissingIdentifier,

    #[error("Malformed MARCXML: {0}")]
    Xml(String),
}

impl ParseError {
    fn xml(err: impl std::fmt::Display) -> Self {
        Self::Xml(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedLink {
    pub url: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub kind: LinkKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedRecord {
    pub idn: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub creators: Vec<String>,
    pub links: Vec<ParsedLink>,
    #[serde(skip)]
    pub raw_marcxml: String,
}

#[derive(Debug, Default)]
struct DataField {
    tag: String,
    subfields: Vec<(String, String)>,
}

impl DataField {
    fn values<'a, 'b>(&'a self, code: &'b str) -> impl Iterator<Item = &'a str> + 'b
    where
        'a: 'b,
    {
        self.subfields
            .iter()
            .filter(move |(c, _)| c == code)
            .map(|(_, v)| v.as_str())
    }

    fn first(&self, code: &str) -> Option<&str> {
        self.values(code).next()
    }
}

/// Flattened view of the MARC elements of one document
#[derive(Debug, Default)]
struct MarcDocument {
    controlfields: Vec<(String, String)>,
    datafields: Vec<DataField>,
}

impl MarcDocument {
    fn control(&self, tag: &str) -> Option<&str> {
        self.controlfields
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }

    fn fields<'a, 'b>(&'a self, tag: &'b str) -> impl Iterator<Item = &'a DataField> + 'b
    where
        'a: 'b,
    {
        self.datafields.iter().filter(move |f| f.tag == tag)
    }

    /// First `$code` of any `tag` field, in document order
    fn first_subfield(&self, tag: &str, code: &str) -> Option<&str> {
        self.fields(tag).find_map(|f| f.first(code))
    }
}

enum Capture {
    Nothing,
    Control(String),
    Subfield(String),
}

fn is_marc(ns: &ResolveResult<'_>) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(uri)) if *uri == MARC_NAMESPACE.as_bytes())
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<String, ParseError> {
    match element.try_get_attribute(name).map_err(ParseError::xml)? {
        Some(attr) => Ok(attr.unescape_value().map_err(ParseError::xml)?.into_owned()),
        None => Ok(String::new()),
    }
}

fn read_document(raw: &str) -> Result<MarcDocument, ParseError> {
    let mut reader = NsReader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut doc = MarcDocument::default();
    let mut capture = Capture::Nothing;
    let mut text = String::new();
    let mut field: Option<DataField> = None;
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        let (ns, event) = reader.read_resolved_event().map_err(ParseError::xml)?;
        match event {
            Event::Start(e) => {
                depth += 1;
                saw_root = true;
                if !is_marc(&ns) {
                    continue;
                }
                match e.local_name().as_ref() {
                    b"controlfield" => {
                        capture = Capture::Control(attribute(&e, "tag")?);
                        text.clear();
                    },
                    b"datafield" => {
                        field = Some(DataField {
                            tag: attribute(&e, "tag")?,
                            subfields: Vec::new(),
                        });
                    },
                    b"subfield" if field.is_some() => {
                        capture = Capture::Subfield(attribute(&e, "code")?);
                        text.clear();
                    },
                    _ => {},
                }
            },
            Event::Empty(e) => {
                saw_root = true;
                if !is_marc(&ns) {
                    continue;
                }
                match e.local_name().as_ref() {
                    b"controlfield" => {
                        doc.controlfields.push((attribute(&e, "tag")?, String::new()));
                    },
                    b"datafield" => doc.datafields.push(DataField {
                        tag: attribute(&e, "tag")?,
                        subfields: Vec::new(),
                    }),
                    b"subfield" => {
                        if let Some(f) = field.as_mut() {
                            f.subfields.push((attribute(&e, "code")?, String::new()));
                        }
                    },
                    _ => {},
                }
            },
            Event::Text(t) => {
                if !matches!(capture, Capture::Nothing) {
                    text.push_str(&t.unescape().map_err(ParseError::xml)?);
                }
            },
            Event::CData(c) => {
                if !matches!(capture, Capture::Nothing) {
                    text.push_str(&String::from_utf8_lossy(c.as_ref()));
                }
            },
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if !is_marc(&ns) {
                    continue;
                }
                match e.local_name().as_ref() {
                    b"controlfield" => {
                        if let Capture::Control(tag) =
                            std::mem::replace(&mut capture, Capture::Nothing)
                        {
                            doc.controlfields.push((tag, std::mem::take(&mut text)));
                        }
                    },
                    b"subfield" => {
                        if let Capture::Subfield(code) =
                            std::mem::replace(&mut capture, Capture::Nothing)
                        {
                            if let Some(f) = field.as_mut() {
                                f.subfields.push((code, std::mem::take(&mut text)));
                            }
                        }
                    },
                    b"datafield" => {
                        if let Some(f) = field.take() {
                            doc.datafields.push(f);
                        }
                    },
                    _ => {},
                }
            },
            Event::Eof => break,
            _ => {},
        }
    }

    if !saw_root {
        return Err(ParseError::Xml("document has no root element".to_string()));
    }
    if depth != 0 {
        return Err(ParseError::Xml("unexpected end of document".to_string()));
    }

    Ok(doc)
}

fn clean(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Strip surrounding whitespace and the ` / :` punctuation MARC uses between title parts
fn title_part(value: &str) -> &str {
    value.trim_matches(|c: char| c.is_whitespace() || c == '/' || c == ':')
}

fn extract_title(doc: &MarcDocument) -> Option<String> {
    let parts: Vec<&str> = [doc.first_subfield("245", "a"), doc.first_subfield("245", "b")]
        .into_iter()
        .flatten()
        .map(title_part)
        .filter(|p| !p.is_empty())
        .collect();

    let title = parts.join(" ");
    (!title.is_empty()).then_some(title)
}

fn extract_year(doc: &MarcDocument) -> Option<i32> {
    ["264", "260"]
        .into_iter()
        .filter_map(|tag| doc.first_subfield(tag, "c"))
        .find_map(|candidate| {
            YEAR_PATTERN
                .find(candidate)
                .and_then(|m| m.as_str().parse().ok())
        })
}

fn extract_creators(doc: &MarcDocument) -> Vec<String> {
    let mut creators: Vec<String> = Vec::new();
    for tag in ["100", "700"] {
        for name in doc.fields(tag).flat_map(|f| f.values("a")).filter_map(clean) {
            if !creators.contains(&name) {
                creators.push(name);
            }
        }
    }
    creators
}

/// Classify a link; a table-of-contents marker wins over the catalog host
pub fn classify_link(url: &str, label: Option<&str>, description: Option<&str>) -> LinkKind {
    let marker = format!("{} {}", description.unwrap_or(""), label.unwrap_or("")).to_lowercase();
    if marker.contains(TOC_MARKER) {
        return LinkKind::Toc;
    }

    let on_catalog_host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .map(|host| host == CATALOG_PID_HOST || host.ends_with(".d-nb.info"))
        .unwrap_or(false);

    if on_catalog_host {
        LinkKind::Dnb
    } else {
        LinkKind::External
    }
}

fn extract_links(doc: &MarcDocument) -> Vec<ParsedLink> {
    let mut links = Vec::new();
    for field in doc.fields("856") {
        let description = field.first("3").and_then(clean);
        let label = field.first("y").and_then(clean);

        for url in field.values("u").filter_map(clean) {
            let kind = classify_link(&url, label.as_deref(), description.as_deref());
            links.push(ParsedLink {
                url,
                label: label.clone(),
                description: description.clone(),
                kind,
            });
        }
    }
    links
}

/// Parse one MARCXML record
pub fn parse_marcxml_record(raw: &str) -> Result<ParsedRecord, ParseError> {
    let doc = read_document(raw)?;

    let idn = doc
        .control("001")
        .and_then(clean)
        .ok_or(ParseError::MissingIdentifier)?;

    Ok(ParsedRecord {
        idn,
        title: extract_title(&doc),
        year: extract_year(&doc),
        creators: extract_creators(&doc),
        links: extract_links(&doc),
        raw_marcxml: raw.to_string(),
    })
}
