//! Rendering records as table rows or JSON lines

use crate::Result;
use clap::ValueEnum;
use kgadget_agent::records::{AuditRecord, DnsRecord, Record, RecordKind};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned columns with a header
    Text,
    /// One JSON object per line
    Json,
}

/// Column header for `kind`, if the format has one
pub fn header(kind: RecordKind, format: OutputFormat) -> Option<String> {
    if format == OutputFormat::Json {
        return None;
    }
    let header = match kind {
        RecordKind::AuditSeccomp => format!(
            "{:<8} {:<12} {:<16} {:<8} {:<12} {}",
            "PID", "MNTNS", "COMM", "SYSCALL", "ACTION", "CONTAINER"
        ),
        RecordKind::Dns => format!("{:<10} {:<6} {}", "PKT_TYPE", "QTYPE", "NAME"),
    };
    Some(header)
}

pub fn render(record: &Record, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(record)?),
        OutputFormat::Text => Ok(match record {
            Record::AuditSeccomp(audit) => audit_row(audit),
            Record::Dns(dns) => dns_row(dns),
        }),
    }
}

fn audit_row(audit: &AuditRecord) -> String {
    let container = match &audit.container {
        Some(c) => format!("{}/{}/{}", c.namespace, c.pod, c.name),
        None => "-".to_string(),
    };
    format!(
        "{:<8} {:<12} {:<16} {:<8} {:<12} {}",
        audit.pid, audit.mntns_id, audit.comm, audit.syscall, audit.action, container
    )
}

fn dns_row(dns: &DnsRecord) -> String {
    let qtype = match dns.qtype_name {
        Some(name) => name.to_string(),
        None => dns.qtype.to_string(),
    };
    format!("{:<10} {:<6} {}", dns.pkt_type, qtype, dns.name)
}

/// Writes records to `out`, one per line
pub struct RecordWriter<W> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn write_header(&mut self, kind: RecordKind) -> Result<()> {
        if let Some(header) = header(kind, self.format) {
            writeln!(self.out, "{}", header)?;
        }
        Ok(())
    }

    pub fn write(&mut self, record: &Record) -> Result<()> {
        let line = render(record, self.format)?;
        writeln!(self.out, "{}", line)?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgadget_agent::containers::ContainerInfo;

    fn audit(container: Option<ContainerInfo>) -> Record {
        Record::AuditSeccomp(AuditRecord {
            pid: 4242,
            mntns_id: 4026532300,
            syscall: 59,
            code: 0x0005_0001,
            action: "errno",
            comm: "bash".to_string(),
            container,
        })
    }

    #[test]
    fn test_audit_text_row() {
        let row = render(&audit(None), OutputFormat::Text).unwrap();
        assert!(row.starts_with("4242 "));
        assert!(row.contains("bash"));
        assert!(row.contains("errno"));
        assert!(row.ends_with(" -"));

        let container = ContainerInfo {
            id: "c0ffee".to_string(),
            namespace: "default".to_string(),
            pod: "web-0".to_string(),
            name: "nginx".to_string(),
        };
        let row = render(&audit(Some(container)), OutputFormat::Text).unwrap();
        assert!(row.ends_with("default/web-0/nginx"));
    }

    #[test]
    fn test_dns_text_row_with_unknown_qtype() {
        let record = Record::Dns(DnsRecord {
            name: "example.com".to_string(),
            qtype: 999,
            qtype_name: None,
            pkt_type: "OUTGOING",
        });
        let row = render(&record, OutputFormat::Text).unwrap();
        assert_eq!(row, "OUTGOING   999    example.com");
    }

    #[test]
    fn test_json_line() {
        let line = render(&audit(None), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["gadget"], "audit_seccomp");
        assert_eq!(value["pid"], 4242);
        assert_eq!(value["action"], "errno");
        assert!(value.get("container").is_none());
    }

    #[test]
    fn test_writer_emits_header_only_for_text() {
        let mut writer = RecordWriter::new(Vec::new(), OutputFormat::Text);
        writer.write_header(RecordKind::Dns).unwrap();
        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert!(out.starts_with("PKT_TYPE"));

        let mut writer = RecordWriter::new(Vec::new(), OutputFormat::Json);
        writer.write_header(RecordKind::Dns).unwrap();
        writer.write(&audit(None)).unwrap();
        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 1);
    }
}
