//! SRU 1.1 `searchRetrieve` client
//!
//! One GET per call, no retries. Each matched record is returned as a
//! standalone MARCXML string: the first element child of `srw:recordData`,
//! re-serialized with every namespace binding it inherits from the envelope so
//! it parses on its own.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Writer};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::CatalogConfig;

pub const SRW_NAMESPACE: &str = "http://www.loc.gov/zing/srw/";
pub const SRW_DIAGNOSTIC_NAMESPACE: &str = "http://www.loc.gov/zing/srw/diagnostic/";
pub const DEFAULT_RECORD_SCHEMA: &str = "MARC21-xml";

/// Protocol-level failure talking to the catalog
#[derive(Debug, Error)]
pub enum SruError {
    #[error("SRU request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("SRU endpoint returned HTTP {status}")]
    Status { status: u16 },

    #[error("Malformed SRU response: {0}")]
    Malformed(String),

    #[error("SRU diagnostic: {0}")]
    Diagnostic(String),
}

impl SruError {
    fn malformed(err: impl std::fmt::Display) -> Self {
        Self::Malformed(err.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SruSearchResult {
    /// Total matches reported by the server, independent of the page size
    pub number_of_records: u64,
    pub records: Vec<String>,
}

#[derive(Clone)]
pub struct SruClient {
    http: reqwest::Client,
    base_url: String,
    record_schema: String,
}

impl SruClient {
    pub fn new(config: &CatalogConfig) -> Result<Self, SruError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(concat!("dnbkb/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(http, config.sru_base_url.clone()))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            record_schema: DEFAULT_RECORD_SCHEMA.to_string(),
        }
    }

    pub fn with_record_schema(mut self, schema: impl Into<String>) -> Self {
        self.record_schema = schema.into();
        self
    }

    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn search(
        &self,
        query: &str,
        start_record: u32,
        maximum_records: u32,
    ) -> Result<SruSearchResult, SruError> {
        let start = start_record.to_string();
        let maximum = maximum_records.to_string();
        let params = [
            ("version", "1.1"),
            ("operation", "searchRetrieve"),
            ("query", query),
            ("startRecord", start.as_str()),
            ("maximumRecords", maximum.as_str()),
            ("recordSchema", self.record_schema.as_str()),
        ];

        let response = self.http.get(&self.base_url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SruError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let result = parse_search_response(&body)?;

        debug!(
            number_of_records = result.number_of_records,
            returned = result.records.len(),
            "SRU search completed"
        );

        Ok(result)
    }
}

type NamespaceScope = Vec<(String, String)>;

fn in_namespace(ns: &ResolveResult<'_>, uri: &str) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(bound)) if *bound == uri.as_bytes())
}

fn namespace_declarations(element: &BytesStart<'_>) -> Result<NamespaceScope, SruError> {
    let mut declarations = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(SruError::malformed)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == "xmlns" || key.starts_with("xmlns:") {
            let value = attr.unescape_value().map_err(SruError::malformed)?;
            declarations.push((key, value.into_owned()));
        }
    }
    Ok(declarations)
}

/// Copy of `element` that also declares every binding inherited from `ancestors`
fn self_contained(
    element: &BytesStart<'_>,
    own: &NamespaceScope,
    ancestors: &[NamespaceScope],
) -> BytesStart<'static> {
    let mut inherited: NamespaceScope = Vec::new();
    for (key, value) in ancestors.iter().flatten() {
        match inherited.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.clone(),
            None => inherited.push((key.clone(), value.clone())),
        }
    }

    let mut owned = element.to_owned();
    for (key, value) in inherited
        .iter()
        .filter(|(key, _)| !own.iter().any(|(k, _)| k == key))
    {
        owned.push_attribute((key.as_str(), value.as_str()));
    }
    owned
}

struct RecordCapture {
    writer: Writer<Vec<u8>>,
    depth: usize,
}

impl RecordCapture {
    fn finish(self) -> Result<String, SruError> {
        String::from_utf8(self.writer.into_inner()).map_err(SruError::malformed)
    }
}

/// Decode a `searchRetrieveResponse` document
pub fn parse_search_response(body: &str) -> Result<SruSearchResult, SruError> {
    let mut reader = NsReader::from_str(body);

    let mut scopes: Vec<NamespaceScope> = Vec::new();
    let mut saw_root = false;
    let mut number_of_records: Option<String> = None;
    let mut in_number = false;
    let mut number_text = String::new();
    let mut in_message = false;
    let mut message_text = String::new();
    let mut diagnostics: Vec<String> = Vec::new();
    let mut record_data_depth: Option<usize> = None;
    let mut record_taken = false;
    let mut capture: Option<RecordCapture> = None;
    let mut records = Vec::new();

    loop {
        let (ns, event) = reader.read_resolved_event().map_err(SruError::malformed)?;

        if let Some(active) = capture.as_mut() {
            match &event {
                Event::Start(_) => active.depth += 1,
                Event::End(_) => active.depth -= 1,
                Event::Eof => return Err(SruError::malformed("unexpected end of document")),
                _ => {},
            }
            active.writer.write_event(event).map_err(SruError::malformed)?;
            if active.depth == 0 {
                if let Some(done) = capture.take() {
                    records.push(done.finish()?);
                }
            }
            continue;
        }

        match event {
            Event::Start(e) => {
                let own = namespace_declarations(&e)?;
                if !saw_root {
                    check_root(&ns, &e)?;
                    saw_root = true;
                }

                if record_data_depth == Some(scopes.len()) && !record_taken {
                    let start = self_contained(&e, &own, &scopes);
                    let mut writer = Writer::new(Vec::new());
                    writer
                        .write_event(Event::Start(start))
                        .map_err(SruError::malformed)?;
                    capture = Some(RecordCapture { writer, depth: 1 });
                    record_taken = true;
                    continue;
                }

                scopes.push(own);
                if in_namespace(&ns, SRW_NAMESPACE) {
                    match e.local_name().as_ref() {
                        b"recordData" => {
                            record_data_depth = Some(scopes.len());
                            record_taken = false;
                        },
                        b"numberOfRecords" => {
                            in_number = true;
                            number_text.clear();
                        },
                        _ => {},
                    }
                } else if in_namespace(&ns, SRW_DIAGNOSTIC_NAMESPACE)
                    && e.local_name().as_ref() == b"message"
                {
                    in_message = true;
                    message_text.clear();
                }
            },
            Event::Empty(e) => {
                if !saw_root {
                    check_root(&ns, &e)?;
                    saw_root = true;
                }
                if record_data_depth == Some(scopes.len()) && !record_taken {
                    let own = namespace_declarations(&e)?;
                    let mut writer = Writer::new(Vec::new());
                    writer
                        .write_event(Event::Empty(self_contained(&e, &own, &scopes)))
                        .map_err(SruError::malformed)?;
                    records.push(RecordCapture { writer, depth: 0 }.finish()?);
                    record_taken = true;
                }
            },
            Event::Text(t) => {
                if in_number || in_message {
                    let text = t.unescape().map_err(SruError::malformed)?;
                    if in_number {
                        number_text.push_str(&text);
                    } else {
                        message_text.push_str(&text);
                    }
                }
            },
            Event::End(_) => {
                if in_number {
                    in_number = false;
                    number_of_records.get_or_insert_with(|| number_text.clone());
                }
                if in_message {
                    in_message = false;
                    let message = message_text.trim();
                    if !message.is_empty() {
                        diagnostics.push(message.to_string());
                    }
                }
                if record_data_depth == Some(scopes.len()) {
                    record_data_depth = None;
                }
                scopes.pop();
            },
            Event::Eof => break,
            _ => {},
        }
    }

    if !saw_root {
        return Err(SruError::malformed("empty response body"));
    }
    if !scopes.is_empty() {
        return Err(SruError::malformed("unexpected end of document"));
    }
    if !diagnostics.is_empty() {
        return Err(SruError::Diagnostic(diagnostics.join("; ")));
    }

    let number_of_records = number_of_records
        .and_then(|n| n.trim().parse().ok())
        .unwrap_or(0);

    Ok(SruSearchResult {
        number_of_records,
        records,
    })
}

fn check_root(ns: &ResolveResult<'_>, element: &BytesStart<'_>) -> Result<(), SruError> {
    if in_namespace(ns, SRW_NAMESPACE) && element.local_name().as_ref() == b"searchRetrieveResponse"
    {
        Ok(())
    } else {
        Err(SruError::Malformed(format!(
            "unexpected root element <{}>",
            String::from_utf8_lossy(element.name().as_ref())
        )))
    }
}
