//! Per-invoice JSON and XML export files.
//!
//! Every create and edit rewrites `<invoice_number>.json` and
//! `<invoice_number>.xml` under the configured export directories, so the
//! files always mirror the latest persisted record.

use crate::config::StorageConfig;
use crate::extraction::InvoiceRecord;
use anyhow::{Context, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Clone)]
pub struct ExportWriter {
    json_dir: PathBuf,
    xml_dir: PathBuf,
}

impl ExportWriter {
    #[must_use]
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            json_dir: PathBuf::from(&storage.export_json_path),
            xml_dir: PathBuf::from(&storage.export_xml_path),
        }
    }

    /// Writes both export files for the record, overwriting previous versions.
    pub async fn write(&self, invoice_number: &str, record: &InvoiceRecord) -> Result<()> {
        let file_stem = sanitize_file_stem(invoice_number);

        tokio::fs::create_dir_all(&self.json_dir)
            .await
            .context("Failed to create JSON export directory")?;
        tokio::fs::create_dir_all(&self.xml_dir)
            .await
            .context("Failed to create XML export directory")?;

        let json_path = self.json_dir.join(format!("{file_stem}.json"));
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&json_path, json)
            .await
            .with_context(|| format!("Failed to write {}", json_path.display()))?;

        let xml_path = self.xml_dir.join(format!("{file_stem}.xml"));
        let xml = render_xml(record)?;
        tokio::fs::write(&xml_path, xml)
            .await
            .with_context(|| format!("Failed to write {}", xml_path.display()))?;

        debug!("Wrote exports for invoice {invoice_number}");
        Ok(())
    }

    #[must_use]
    pub fn json_path(&self, invoice_number: &str) -> PathBuf {
        self.json_dir
            .join(format!("{}.json", sanitize_file_stem(invoice_number)))
    }

    #[must_use]
    pub fn xml_path(&self, invoice_number: &str) -> PathBuf {
        self.xml_dir
            .join(format!("{}.xml", sanitize_file_stem(invoice_number)))
    }
}

/// Invoice numbers come from model output; keep them from escaping the
/// export directory or producing invalid file names.
fn sanitize_file_stem(invoice_number: &str) -> String {
    // Drop any directory components before mapping characters, so traversal
    // input reduces to its final path segment.
    let base = Path::new(invoice_number)
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "_".to_owned()
    } else {
        cleaned
    }
}

/// Pretty-printed XML document with a fixed element order matching the JSON
/// export.
fn render_xml(record: &InvoiceRecord) -> Result<String> {
    let fields: [(&str, &str); 12] = [
        ("e_tax_status", &record.e_tax_status),
        ("invoice_number", &record.invoice_number),
        ("cust_code", &record.cust_code),
        ("pages", &record.pages),
        ("currency", &record.currency),
        ("payment_method", &record.payment_method),
        ("net_total", &record.net_total),
        ("delivery_instructions", &record.delivery_instructions),
        ("payment_received_by", &record.payment_received_by),
        ("received_by_signature", &record.received_by_signature),
        ("delivered_by_signature", &record.delivered_by_signature),
        ("has_signatures", &record.has_signatures),
    ];

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("invoice")))?;

    for (name, value) in fields {
        if value.is_empty() {
            writer.write_event(Event::Empty(BytesStart::new(name)))?;
        } else {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            writer.write_event(Event::Text(BytesText::new(value)))?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("invoice")))?;

    let bytes = writer.into_inner();
    Ok(String::from_utf8(bytes)?)
}
