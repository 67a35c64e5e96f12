//! Shared fixtures for unit tests

use async_trait::async_trait;
use dnbkb_common::checksum::sha256_hex;
use quick_xml::escape::escape;
use std::sync::Mutex;

use crate::catalog::{ParsedLink, ParsedRecord};
use crate::db::{CatalogStore, MemoryStore};
use crate::ingest::{AssetDispatcher, DispatchError, DownloadError, IngestAssetTask, Materializer};
use crate::models::{DownloadResult, Link, LinkKind};

/// Builds MARC21 slim records the way the DNB SRU service returns them
pub struct MarcRecordBuilder {
    idn: Option<String>,
    datafields: Vec<(String, Vec<(String, String)>)>,
}

impl MarcRecordBuilder {
    pub fn new(idn: &str) -> Self {
        Self {
            idn: Some(idn.to_string()),
            datafields: Vec::new(),
        }
    }

    pub fn without_identifier() -> Self {
        Self {
            idn: None,
            datafields: Vec::new(),
        }
    }

    pub fn datafield(mut self, tag: &str, subfields: &[(&str, &str)]) -> Self {
        self.datafields.push((
            tag.to_string(),
            subfields
                .iter()
                .map(|(code, value)| (code.to_string(), value.to_string()))
                .collect(),
        ));
        self
    }

    pub fn build(self) -> String {
        let mut xml = String::from(
            r#"<record xmlns="http://www.loc.gov/MARC21/slim" type="Bibliographic"><leader>00000nam a2200000 c 4500</leader>"#,
        );
        if let Some(idn) = &self.idn {
            xml.push_str(&format!(r#"<controlfield tag="001">{}</controlfield>"#, escape(idn.as_str())));
        }
        for (tag, subfields) in &self.datafields {
            xml.push_str(&format!(r#"<datafield tag="{}" ind1=" " ind2=" ">"#, tag));
            for (code, value) in subfields {
                xml.push_str(&format!(
                    r#"<subfield code="{}">{}</subfield>"#,
                    code,
                    escape(value.as_str())
                ));
            }
            xml.push_str("</datafield>");
        }
        xml.push_str("</record>");
        xml
    }
}

/// A `searchRetrieveResponse` envelope around `records`
pub fn sru_response(number_of_records: u64, records: &[String]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><searchRetrieveResponse xmlns="http://www.loc.gov/zing/srw/"><version>1.1</version>"#,
    );
    xml.push_str(&format!("<numberOfRecords>{}</numberOfRecords>", number_of_records));
    if !records.is_empty() {
        xml.push_str("<records>");
        for (position, record) in records.iter().enumerate() {
            xml.push_str(&format!(
                "<record><recordSchema>MARC21-xml</recordSchema><recordPacking>xml</recordPacking>\
                 <recordData>{}</recordData><recordPosition>{}</recordPosition></record>",
                record,
                position + 1
            ));
        }
        xml.push_str("</records>");
    }
    xml.push_str("</searchRetrieveResponse>");
    xml
}

/// Store a record with `link_count` external links and return them in creation order
pub async fn seed_record(store: &MemoryStore, idn: &str, link_count: usize) -> Vec<Link> {
    let parsed = ParsedRecord {
        idn: idn.to_string(),
        title: Some(format!("Record {idn}")),
        year: Some(2020),
        creators: Vec::new(),
        links: (0..link_count)
            .map(|i| ParsedLink {
                url: format!("https://example.org/{idn}/{i}.pdf"),
                label: None,
                description: None,
                kind: LinkKind::External,
            })
            .collect(),
        raw_marcxml: MarcRecordBuilder::new(idn).build(),
    };

    store.reconcile(&[parsed]).await.unwrap();
    store.list_links(idn).await.unwrap()
}

/// Materializer that records its calls and returns a canned answer
pub struct StubMaterializer {
    fail: bool,
    calls: Mutex<Vec<(String, String)>>,
}

impl StubMaterializer {
    pub fn succeeding() -> Self {
        Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Materializer for StubMaterializer {
    async fn materialize(&self, url: &str, key: &str) -> Result<DownloadResult, DownloadError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((url.to_string(), key.to_string()));
        }

        if self.fail {
            return Err(DownloadError::Exhausted {
                attempts: 5,
                last: Box::new(DownloadError::Status {
                    status: 500,
                    url: url.to_string(),
                }),
            });
        }

        Ok(DownloadResult {
            storage_key: key.to_string(),
            sha256: sha256_hex(url.as_bytes()),
            mime_type: Some("application/pdf".to_string()),
            size_bytes: url.len() as i64,
        })
    }
}

/// Dispatcher that keeps tasks instead of running them
#[derive(Default)]
pub struct RecordingDispatcher {
    fail: bool,
    tasks: Mutex<Vec<IngestAssetTask>>,
}

impl RecordingDispatcher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn tasks(&self) -> Vec<IngestAssetTask> {
        self.tasks.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AssetDispatcher for RecordingDispatcher {
    async fn dispatch(&self, task: IngestAssetTask) -> Result<(), DispatchError> {
        if self.fail {
            return Err(DispatchError::Backend("queue unavailable".to_string()));
        }
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
        Ok(())
    }
}
