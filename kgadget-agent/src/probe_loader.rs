//! eBPF probe loader and lifecycle management

use crate::config::AgentConfig;
use crate::raw_socket::open_packet_socket;
use crate::records::RecordKind;
use anyhow::{anyhow, Context, Result};
use aya::{
    maps::{perf::AsyncPerfEventArray, HashMap as BpfHashMap, Map, MapData},
    programs::{KProbe, SocketFilter},
    Ebpf, EbpfLoader,
};
use kgadget_common::{names, Container, TaskOffsets};
use log::{info, warn};
use std::fs::DirBuilder;
use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

/// Which probe object to load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Seccomp audit kprobe. `filtered` selects the object with the mount
    /// namespace allow-list compiled in.
    AuditSeccomp { filtered: bool },
    /// DNS query socket filter
    Dns,
}

impl Probe {
    pub fn kind(self) -> RecordKind {
        match self {
            Probe::AuditSeccomp { .. } => RecordKind::AuditSeccomp,
            Probe::Dns => RecordKind::Dns,
        }
    }

    fn object(self) -> &'static [u8] {
        match self {
            Probe::AuditSeccomp { filtered: false } => {
                aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/audit_seccomp"))
            }
            Probe::AuditSeccomp { filtered: true } => {
                aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/audit_seccomp_filter"))
            }
            Probe::Dns => aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/dns")),
        }
    }
}

/// Manages eBPF probe lifecycle
pub struct ProbeManager {
    bpf: Ebpf,
    probe: Probe,
    pin_path: Option<PathBuf>,
    socket: Option<OwnedFd>,
}

impl ProbeManager {
    /// Run the pre-flight checks and load `probe` without attaching it
    pub fn new(probe: Probe, config: &AgentConfig) -> Result<Self> {
        if probe.object().is_empty() {
            return Err(anyhow!(
                "{} probe was not compiled into this build (bpf-linker missing?)",
                probe.kind().as_str()
            ));
        }

        run_preflight_checks()?;

        info!("Loading {} probe...", probe.kind().as_str());
        let (bpf, pin_path) = match probe {
            Probe::AuditSeccomp { .. } => {
                let bpf = load_audit_probe(probe, config)?;
                (bpf, Some(config.pin_path.clone()))
            }
            Probe::Dns => {
                let bpf = Ebpf::load(probe.object()).context("Failed to load eBPF program")?;
                (bpf, None)
            }
        };

        Ok(Self {
            bpf,
            probe,
            pin_path,
            socket: None,
        })
    }

    /// Attach the loaded probe to its hook
    pub fn attach(&mut self) -> Result<()> {
        match self.probe {
            Probe::AuditSeccomp { .. } => self.attach_kprobe(),
            Probe::Dns => self.attach_socket_filter(),
        }
    }

    fn attach_kprobe(&mut self) -> Result<()> {
        info!("Attaching kprobe to {}...", names::AUDIT_KERNEL_FUNCTION);

        let program: &mut KProbe = self
            .bpf
            .program_mut(names::AUDIT_PROGRAM)
            .ok_or_else(|| anyhow!("{} program not found in eBPF object", names::AUDIT_PROGRAM))?
            .try_into()?;

        program.load()?;
        program
            .attach(names::AUDIT_KERNEL_FUNCTION, 0)
            .with_context(|| format!("Failed to attach to {}", names::AUDIT_KERNEL_FUNCTION))?;

        info!("Seccomp audit probe attached");
        Ok(())
    }

    fn attach_socket_filter(&mut self) -> Result<()> {
        info!("Attaching socket filter to a raw packet socket...");

        let socket = open_packet_socket()?;
        let program: &mut SocketFilter = self
            .bpf
            .program_mut(names::DNS_PROGRAM)
            .ok_or_else(|| anyhow!("{} program not found in eBPF object", names::DNS_PROGRAM))?
            .try_into()?;

        program.load()?;
        program
            .attach(socket.as_fd())
            .context("Failed to attach socket filter")?;

        // Detaching happens when the socket closes
        self.socket = Some(socket);

        info!("DNS probe attached");
        Ok(())
    }

    /// Get mutable reference to the Ebpf object for initializing the EbpfLogger.
    pub fn bpf_mut(&mut self) -> &mut Ebpf {
        &mut self.bpf
    }

    /// Take the pinned containers map
    pub fn containers_map(&mut self) -> Result<BpfHashMap<MapData, u64, Container>> {
        let map = self.take_map(names::CONTAINERS_MAP)?;
        BpfHashMap::try_from(map).context("Failed to open containers map")
    }

    /// Take the mount namespace filter map of the filtered audit object
    pub fn filter_map(&mut self) -> Result<BpfHashMap<MapData, u64, u32>> {
        let map = self.take_map(names::FILTER_MAP)?;
        BpfHashMap::try_from(map).context("Failed to open filter map")
    }

    /// Take the perf event array the probe emits into
    pub fn events(&mut self) -> Result<AsyncPerfEventArray<MapData>> {
        let map = self.take_map(names::EVENTS_MAP)?;
        AsyncPerfEventArray::try_from(map).context("Failed to open EVENTS perf array")
    }

    fn take_map(&mut self, name: &str) -> Result<Map> {
        // Collect map names first to avoid borrow conflict in error path
        let available_maps: Vec<_> = self.bpf.maps().map(|(name, _)| name.to_string()).collect();
        self.bpf.take_map(name).ok_or_else(|| {
            anyhow!(
                "{} map not found in eBPF object. Available maps: {:?}",
                name,
                available_maps
            )
        })
    }

    /// Detach and unload the probe, removing its pinned map
    pub fn unload(self) {
        info!("Unloading {} probe...", self.probe.kind().as_str());
        drop(self.socket);
        drop(self.bpf);

        if let Some(pin_path) = self.pin_path {
            remove_pin(&pin_path.join(names::CONTAINERS_MAP));
        }
        info!("Probe unloaded");
    }
}

fn load_audit_probe(probe: Probe, config: &AgentConfig) -> Result<Ebpf> {
    prepare_pin_dir(&config.pin_path)?;

    let offsets = TaskOffsets::from(config.task_offsets);
    if !offsets.is_configured() {
        warn!("task_struct.nsproxy offset is not configured; no mount namespace can be resolved and no audit event will be emitted");
    }

    let bpf = EbpfLoader::new()
        .map_pin_path(&config.pin_path)
        .set_global(names::TASK_OFFSETS_GLOBAL, &offsets, true)
        .load(probe.object())
        .context("Failed to load eBPF program")?;

    Ok(bpf)
}

/// Make sure the loader creates a fresh `containers` map under `path`.
///
/// A pin left by a run that did not unload would be reopened with its
/// entries still in it.
fn prepare_pin_dir(path: &Path) -> Result<()> {
    ensure_pin_dir(path)?;
    remove_pin(&path.join(names::CONTAINERS_MAP));
    Ok(())
}

/// Create the bpffs pin directory, owner-only, if it does not exist
fn ensure_pin_dir(path: &Path) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
        .with_context(|| format!("Failed to create pin directory {}", path.display()))
}

fn remove_pin(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => info!("Removed pinned map {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove pinned map {}: {}", path.display(), e),
    }
}

/// Run pre-flight checks to validate the system can run eBPF programs
fn run_preflight_checks() -> Result<()> {
    info!("Running pre-flight checks...");

    check_kernel_version()?;
    check_btf();
    check_capabilities();

    info!("Pre-flight checks passed");
    Ok(())
}

/// Check if kernel version is >= 5.8
fn check_kernel_version() -> Result<()> {
    let release = std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .context("Failed to get kernel version")?;

    let (major, minor) = parse_kernel_version(&release)?;
    if (major, minor) < (5, 8) {
        return Err(anyhow!(
            "Kernel {} is too old. eBPF requires kernel 5.8+ (5.15+ recommended)",
            release.trim()
        ));
    }

    info!("Kernel version: {} (supported)", release.trim());
    Ok(())
}

fn parse_kernel_version(release: &str) -> Result<(u32, u32)> {
    let mut parts = release.trim().split('.');

    let major: u32 = parts
        .next()
        .unwrap_or_default()
        .parse()
        .context("Invalid kernel major version")?;

    let minor_str = parts
        .next()
        .ok_or_else(|| anyhow!("Could not parse kernel version: {}", release.trim()))?;
    let minor: u32 = minor_str
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or_default()
        .parse()
        .context("Invalid kernel minor version")?;

    Ok((major, minor))
}

/// Check if BTF (BPF Type Format) is available
fn check_btf() {
    if !Path::new("/sys/kernel/btf/vmlinux").exists() {
        warn!("BTF not found at /sys/kernel/btf/vmlinux");
        warn!("Use task_offsets in the configuration to describe task_struct for this kernel");
        return;
    }

    info!("BTF available");
}

/// Check if process has necessary capabilities to load eBPF programs
fn check_capabilities() {
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        warn!("Not running as root (euid={}). Ensure CAP_BPF, CAP_PERFMON, and CAP_NET_RAW capabilities are granted.", euid);
    } else {
        info!("Running with root privileges");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kernel_version() {
        assert_eq!(parse_kernel_version("6.18.44-fc-v130\n").unwrap(), (6, 18));
        assert_eq!(parse_kernel_version("5.8.0").unwrap(), (5, 8));
        assert_eq!(parse_kernel_version("5.15-rc1").unwrap(), (5, 15));
        assert!(parse_kernel_version("garbage").is_err());
    }

    #[test]
    fn test_ensure_pin_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let pin = root.path().join("bpf").join("kgadget");

        ensure_pin_dir(&pin).unwrap();
        ensure_pin_dir(&pin).unwrap();

        let mode = std::fs::metadata(&pin).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_prepare_pin_dir_removes_stale_containers_pin() {
        let root = tempfile::tempdir().unwrap();
        let pin = root.path().join("kgadget");
        std::fs::create_dir(&pin).unwrap();
        std::fs::write(pin.join(names::CONTAINERS_MAP), b"stale").unwrap();
        std::fs::write(pin.join("other"), b"kept").unwrap();

        prepare_pin_dir(&pin).unwrap();
        assert!(!pin.join(names::CONTAINERS_MAP).exists());
        assert!(pin.join("other").exists());

        prepare_pin_dir(&pin).unwrap();
    }
}
