pub mod commands;

use crate::output::OutputFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kgadget")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "eBPF gadgets for containers: seccomp audit events and DNS queries", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to the YAML configuration file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Start tracing operations")]
    Trace {
        #[command(subcommand)]
        trace_type: TraceType,
    },
    #[command(about = "Print the effective configuration as YAML")]
    Config,
}

#[derive(Subcommand, Debug)]
pub enum TraceType {
    #[command(about = "Trace seccomp audit events, enriched with container identity")]
    AuditSeccomp {
        #[arg(
            long = "mntns",
            help = "Only report tasks in this mount namespace (repeatable)"
        )]
        mntns: Vec<u64>,

        #[arg(
            short,
            long = "pid",
            help = "Only report tasks sharing the mount namespace of this pid (repeatable)"
        )]
        pid: Vec<u32>,

        #[arg(long, help = "Offset of task_struct.nsproxy on the running kernel")]
        task_nsproxy_offset: Option<u32>,

        #[command(flatten)]
        output: OutputArgs,
    },
    #[command(about = "Trace DNS queries seen on any interface")]
    Dns {
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug, Clone, Copy)]
pub struct OutputArgs {
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, help = "Output format")]
    pub output: OutputFormat,

    #[arg(long, help = "Print Prometheus metrics to stderr on exit")]
    pub metrics: bool,
}
