//! Shared helpers for integration tests

#![allow(dead_code, clippy::unwrap_used)]

use dnbkb_server::catalog::{ParsedLink, ParsedRecord};
use dnbkb_server::models::LinkKind;
use sqlx::PgPool;
use uuid::Uuid;

/// Connect to `DATABASE_URL` and apply migrations, or `None` when no database is configured
pub async fn setup_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;

    match PgPool::connect(&url).await {
        Ok(pool) => {
            dnbkb_server::db::run_migrations(&pool).await.unwrap();
            Some(pool)
        },
        Err(e) => {
            eprintln!("Skipping database test, cannot connect: {}", e);
            None
        },
    }
}

/// A record identifier no other test run will use
pub fn unique_idn() -> String {
    format!("test-{}", Uuid::new_v4().simple())
}

pub fn parsed_record(idn: &str, title: &str, urls: &[&str]) -> ParsedRecord {
    ParsedRecord {
        idn: idn.to_string(),
        title: Some(title.to_string()),
        year: Some(1999),
        creators: vec!["Muster, Erika".to_string()],
        links: urls
            .iter()
            .map(|url| ParsedLink {
                url: url.to_string(),
                label: None,
                description: None,
                kind: LinkKind::External,
            })
            .collect(),
        raw_marcxml: format!(r#"<record><controlfield tag="001">{idn}</controlfield></record>"#),
    }
}

/// One MARC21-xml record with a title and 856 links
pub fn marc_record(idn: &str, title: &str, urls: &[String]) -> String {
    let mut xml = format!(
        r#"<record xmlns="http://www.loc.gov/MARC21/slim"><controlfield tag="001">{idn}</controlfield><datafield tag="245" ind1="1" ind2="0"><subfield code="a">{title}</subfield></datafield>"#
    );
    for url in urls {
        xml.push_str(&format!(
            r#"<datafield tag="856" ind1="4" ind2="2"><subfield code="u">{url}</subfield></datafield>"#
        ));
    }
    xml.push_str("</record>");
    xml
}

pub fn sru_response(records: &[String]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><searchRetrieveResponse xmlns="http://www.loc.gov/zing/srw/"><version>1.1</version><numberOfRecords>{}</numberOfRecords><records>"#,
        records.len()
    );
    for (i, record) in records.iter().enumerate() {
        xml.push_str(&format!(
            "<record><recordSchema>MARC21-xml</recordSchema><recordPacking>xml</recordPacking><recordData>{}</recordData><recordPosition>{}</recordPosition></record>",
            record,
            i + 1
        ));
    }
    xml.push_str("</records></searchRetrieveResponse>");
    xml
}
