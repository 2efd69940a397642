use crate::Result;
use kgadget_agent::channel::ChannelStats;
use kgadget_agent::records::{Record, RecordKind};
use prometheus::{IntCounterVec, Opts, Registry};

/// Counters of one gadget run
pub struct MetricsCollector {
    registry: Registry,
    records: IntCounterVec,
    samples: IntCounterVec,
    seccomp_actions: IntCounterVec,
    dns_queries: IntCounterVec,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let records = IntCounterVec::new(
            Opts::new("kgadget_records_total", "Records written to the output"),
            &["gadget"],
        )?;
        registry.register(Box::new(records.clone()))?;

        let samples = IntCounterVec::new(
            Opts::new(
                "kgadget_perf_samples_total",
                "Perf samples by outcome between kernel and output",
            ),
            &["gadget", "outcome"],
        )?;
        registry.register(Box::new(samples.clone()))?;

        let seccomp_actions = IntCounterVec::new(
            Opts::new(
                "kgadget_seccomp_audit_events_total",
                "Seccomp audit events by action",
            ),
            &["action"],
        )?;
        registry.register(Box::new(seccomp_actions.clone()))?;

        let dns_queries = IntCounterVec::new(
            Opts::new("kgadget_dns_queries_total", "DNS queries by type"),
            &["qtype"],
        )?;
        registry.register(Box::new(dns_queries.clone()))?;

        Ok(Self {
            registry,
            records,
            samples,
            seccomp_actions,
            dns_queries,
        })
    }

    pub fn observe(&self, record: &Record) {
        self.records
            .with_label_values(&[record.kind().as_str()])
            .inc();

        match record {
            Record::AuditSeccomp(audit) => {
                self.seccomp_actions
                    .with_label_values(&[audit.action])
                    .inc();
            }
            Record::Dns(dns) => {
                let qtype = match dns.qtype_name {
                    Some(name) => name.to_string(),
                    None => dns.qtype.to_string(),
                };
                self.dns_queries.with_label_values(&[qtype.as_str()]).inc();
            }
        }
    }

    /// Fold the final channel counters of a finished run
    pub fn record_channel(&self, kind: RecordKind, stats: &ChannelStats) {
        let gadget = kind.as_str();
        for (outcome, value) in [
            ("received", stats.received()),
            ("lost", stats.lost()),
            ("dropped", stats.dropped()),
            ("malformed", stats.malformed()),
        ] {
            self.samples
                .with_label_values(&[gadget, outcome])
                .inc_by(value);
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
