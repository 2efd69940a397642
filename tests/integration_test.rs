use clap::Parser;
use kgadget::cli::{Cli, Commands, TraceType};
use kgadget::error::KgadgetError;
use kgadget::output::{OutputFormat, RecordWriter};
use kgadget_agent::channel::record_channel;
use kgadget_agent::records::{decode, Record, RecordKind};
use kgadget_common::{AuditEvent, Container, DnsEvent};
use std::mem;

fn as_bytes<T>(value: &T) -> Vec<u8> {
    unsafe { std::slice::from_raw_parts(value as *const T as *const u8, mem::size_of::<T>()) }
        .to_vec()
}

#[test]
fn test_error_types() {
    let err = KgadgetError::ConfigError("channel_capacity must be greater than 0".to_string());
    assert!(err.to_string().contains("channel_capacity"));

    let err = KgadgetError::from(anyhow::anyhow!("inner").context("outer"));
    assert_eq!(err.to_string(), "Agent error: outer: inner");
}

#[test]
fn test_version_const() {
    assert!(!kgadget::VERSION.is_empty());
}

#[test]
fn test_parse_audit_seccomp_flags() {
    let cli = Cli::try_parse_from([
        "kgadget",
        "--config",
        "/etc/kgadget.yaml",
        "trace",
        "audit-seccomp",
        "--mntns",
        "4026532300",
        "--mntns",
        "4026532301",
        "-p",
        "1",
        "--task-nsproxy-offset",
        "2992",
        "-o",
        "json",
        "--metrics",
    ])
    .unwrap();

    assert_eq!(
        cli.config.as_deref(),
        Some(std::path::Path::new("/etc/kgadget.yaml"))
    );
    let Some(Commands::Trace {
        trace_type:
            TraceType::AuditSeccomp {
                mntns,
                pid,
                task_nsproxy_offset,
                output,
            },
    }) = cli.command
    else {
        panic!("Expected audit-seccomp command");
    };
    assert_eq!(mntns, vec![4026532300, 4026532301]);
    assert_eq!(pid, vec![1]);
    assert_eq!(task_nsproxy_offset, Some(2992));
    assert_eq!(output.output, OutputFormat::Json);
    assert!(output.metrics);
}

#[test]
fn test_parse_dns_defaults() {
    let cli = Cli::try_parse_from(["kgadget", "-v", "trace", "dns"]).unwrap();
    assert!(cli.verbose);

    let Some(Commands::Trace {
        trace_type: TraceType::Dns { output },
    }) = cli.command
    else {
        panic!("Expected dns command");
    };
    assert_eq!(output.output, OutputFormat::Text);
    assert!(!output.metrics);
}

#[test]
fn test_rejects_unknown_output_format() {
    assert!(Cli::try_parse_from(["kgadget", "trace", "dns", "-o", "xml"]).is_err());
}

/// Raw samples through decoding, the lossy channel and the text writer
#[tokio::test]
async fn test_samples_to_text_output() {
    let mut audit = AuditEvent::zeroed();
    audit.pid = 77;
    audit.code = 0x7ffc_0000u32 as i32;
    audit.mntns_id = 4026532400;
    audit.syscall = 101;
    audit.comm[..6].copy_from_slice(b"ptrace");
    audit.container = Container::from_parts("abc", "prod", "api-1", "api");

    let mut dns = DnsEvent::zeroed();
    let name = b"\x03www\x07example\x03org";
    dns.name[..name.len()].copy_from_slice(name);
    dns.name_len = name.len() as u16;
    dns.qtype = 1;

    let (sender, mut rx) = record_channel(8);
    let mut audit_sample = as_bytes(&audit);
    audit_sample.extend_from_slice(&[0; 4]);
    assert!(sender.send(decode(RecordKind::AuditSeccomp, &audit_sample).unwrap()));
    assert!(sender.send(decode(RecordKind::Dns, &as_bytes(&dns)).unwrap()));
    drop(sender);

    let mut writer = RecordWriter::new(Vec::new(), OutputFormat::Text);
    while let Some(record) = rx.recv().await {
        writer.write(&record).unwrap();
    }
    let out = String::from_utf8(writer.into_inner()).unwrap();
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("77 "));
    assert!(lines[0].contains("ptrace"));
    assert!(lines[0].contains(" log "));
    assert!(lines[0].ends_with("prod/api-1/api"));
    assert!(lines[1].ends_with("www.example.org"));
    assert!(lines[1].starts_with("HOST "));
}

#[test]
fn test_json_output_keeps_gadget_tag() {
    let record = decode(RecordKind::Dns, &as_bytes(&DnsEvent::zeroed())).unwrap();
    assert!(matches!(record, Record::Dns(_)));

    let mut writer = RecordWriter::new(Vec::new(), OutputFormat::Json);
    writer.write(&record).unwrap();
    let out = String::from_utf8(writer.into_inner()).unwrap();

    let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
    assert_eq!(value["gadget"], "dns");
    assert_eq!(value["name"], ".");
}
