//! QEMU actions: disk images, VM launch and the running-VM table.

use crate::args::Args;
use crate::exec::{run, stderr_or_status, succeeded, ExecError};
use crate::outcome::{fail, into_envelope, ActionError, ActionResult};
use engine::traits::CommandSpec;
use engine::AppContext;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use sysinfo::{Pid, Signal, System};

const DEFAULT_BINARY: &str = "qemu-system-x86_64";
const DETECT_TIMEOUT: Duration = Duration::from_secs(2);
const STOP_GRACE: Duration = Duration::from_secs(5);
const STOP_POLL: Duration = Duration::from_millis(100);

const DISK_EXTENSIONS: &[&str] = &["qcow2", "raw", "img", "vmdk", "vhdx", "vdi"];
const DEFAULT_DISK_NAME: &str = "vm_disk.qcow2";
/// Below this a non-qcow2 image cannot hold a bootable system.
const MIN_BOOTABLE_BYTES: u64 = 100 * 1024;

const QEMU_NAME_PATTERNS: &[&str] = &["qemu-system-", "qemu-kvm", "qemu.exe"];

pub async fn dispatch(ctx: &AppContext, action: &str, args: &Args) -> ActionResult {
    match action {
        "start_virtual_machine" => start_virtual_machine(ctx, &VmRequest::from_args(args)).await,
        "create_vm_from_config" => create_vm_from_config(ctx, &args.text("config_file_path")).await,
        "delete_vm" => delete_vm(&args.text("disk_path")).await,
        "list_running_vms" => Ok(list_running_vms()),
        "stop_vm" => stop_vm(ctx, args.uint("pid")).await,
        "create_disk_image" => create_disk_image(ctx, &args.text("path"), &args.text("size")).await,
        other => Err(ActionError::UnknownAction(other.to_string())),
    }
}

// ===========================================================================
// Starting VMs
// ===========================================================================

#[derive(Debug, Clone)]
pub struct VmRequest {
    pub cpu_cores: String,
    pub ram_size: String,
    pub disk_path: String,
    pub iso_path: Option<String>,
}

impl VmRequest {
    pub fn from_args(args: &Args) -> Self {
        Self {
            cpu_cores: args.text("cpu_cores"),
            ram_size: args.text("ram_size"),
            disk_path: args.text("disk_path"),
            iso_path: args.opt_text("iso_path"),
        }
    }
}

/// Resolved disk and install media for one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmPlan {
    pub disk: PathBuf,
    pub format: &'static str,
    pub iso: Option<PathBuf>,
}

fn missing(value: &str) -> bool {
    value.is_empty() || value == "0"
}

pub fn disk_format(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "qcow2" => "qcow2",
        "vmdk" => "vmdk",
        "vhdx" => "vhdx",
        "vdi" => "vdi",
        _ => "raw",
    }
}

fn is_disk_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| DISK_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

/// First disk image in `dir`, by file name.
fn find_disk_in(dir: &Path) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| is_disk_image(p))
        .collect();
    entries.sort();
    entries.into_iter().next()
}

/// Validate the request against the filesystem and decide what to boot.
pub fn plan_vm(req: &VmRequest) -> Result<VmPlan, ActionError> {
    if missing(&req.cpu_cores) {
        return Err(fail("No CPU Cores given."));
    }
    if missing(&req.ram_size) {
        return Err(fail("No RAM Size given."));
    }
    if req.disk_path.is_empty() {
        return Err(fail("No Disk Path given."));
    }

    let mut disk = PathBuf::from(&req.disk_path);
    if disk.is_dir() {
        disk = match find_disk_in(&disk) {
            Some(found) => found,
            None if req.iso_path.is_some() => disk.join(DEFAULT_DISK_NAME),
            None => {
                let wanted: Vec<String> = DISK_EXTENSIONS.iter().map(|e| format!(".{}", e)).collect();
                return Err(fail(format!(
                    "Directory selected but no disk image found (looking for: {}). Please create a disk image first, select an existing disk file, or provide an ISO image to create a new VM.",
                    wanted.join(", ")
                )));
            }
        };
    }

    if !disk.exists() {
        if let Some(parent) = disk.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                return Err(fail(format!("Parent directory does not exist: {}", parent.display())));
            }
        }
    }

    let iso = req.iso_path.as_ref().map(PathBuf::from);
    if let Some(ref iso) = iso {
        if !iso.exists() {
            return Err(fail(format!("ISO does not exist: {}", iso.display())));
        }
    }

    let format = disk_format(&disk);
    if !disk.exists() {
        if iso.is_none() {
            return Err(fail(format!(
                "Disk image does not exist: {}. Please create a disk image first or provide an ISO image to create a new VM.",
                disk.display()
            )));
        }
    } else if let Ok(meta) = std::fs::metadata(&disk) {
        // qcow2 files are sparse, so their size says nothing.
        if format != "qcow2" && meta.len() < MIN_BOOTABLE_BYTES && iso.is_none() {
            return Err(fail(
                "Disk image appears to be empty or very small. Please provide an ISO image to install an operating system, or use an existing bootable disk image.",
            ));
        }
    }

    Ok(VmPlan { disk, format, iso })
}

fn qemu_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

pub fn vm_command(binary: &str, req: &VmRequest, plan: &VmPlan) -> CommandSpec {
    let mut args = vec![
        "-smp".to_string(),
        req.cpu_cores.clone(),
        "-m".to_string(),
        req.ram_size.clone(),
        "-drive".to_string(),
        format!(
            "file={},format={},if=ide,index=0,media=disk",
            qemu_path(&plan.disk),
            plan.format
        ),
    ];
    match plan.iso {
        Some(ref iso) => args.extend([
            "-cdrom".to_string(),
            qemu_path(iso),
            "-boot".to_string(),
            "order=dc".to_string(),
        ]),
        None => args.extend(["-boot".to_string(), "order=c".to_string()]),
    }
    args.extend(
        ["-netdev", "user,id=net0", "-device", "virtio-net,netdev=net0"].map(String::from),
    );
    CommandSpec::new(binary, args)
}

async fn detect_binary(ctx: &AppContext) -> String {
    let candidates: &[&str] = if cfg!(windows) {
        &["qemu-system-x86_64.exe", DEFAULT_BINARY]
    } else {
        &[DEFAULT_BINARY]
    };
    for candidate in candidates {
        let probe = CommandSpec::new(*candidate, ["--version"]);
        if let Ok(true) = ctx.process().run_status(&probe, Some(DETECT_TIMEOUT)).await {
            return candidate.to_string();
        }
    }
    DEFAULT_BINARY.to_string()
}

/// Start the VM in its own process group so it outlives the worker.
fn launch(cmd: &CommandSpec) -> Result<u32, ActionError> {
    let mut command = std::process::Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    match command.spawn() {
        Ok(child) => Ok(child.id()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(fail("QEMU not found. Is Qemu installed and in PATH?"))
        }
        Err(e) => Err(fail(e.to_string())),
    }
}

async fn start_virtual_machine(ctx: &AppContext, req: &VmRequest) -> ActionResult {
    let plan = plan_vm(req)?;
    let binary = detect_binary(ctx).await;
    let cmd = vm_command(&binary, req, &plan);
    let pid = launch(&cmd)?;
    tracing::info!(pid, command = %cmd.display(), "vm started");
    Ok(json!({
        "message": "VM started",
        "pid": pid,
        "command": cmd.display(),
    }))
}

async fn create_vm_from_config(ctx: &AppContext, path: &str) -> ActionResult {
    if path.is_empty() || !Path::new(path).exists() {
        return Err(fail(format!("Configuration file not found: {}", path)));
    }
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| fail(e.to_string()))?;
    let doc: Value = serde_json::from_str(&text)
        .map_err(|_| fail("The configuration file is not in JSON format."))?;

    let configs = match doc {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        _ => return Err(fail("The configuration file must hold a VM object or a list of them.")),
    };

    let mut results = Vec::with_capacity(configs.len());
    for config in configs {
        let req = VmRequest::from_args(&Args::from_value(config));
        let outcome = start_virtual_machine(ctx, &req).await;
        results.push(serde_json::to_value(into_envelope(outcome)).unwrap_or(Value::Null));
    }
    Ok(json!({ "results": results }))
}

async fn delete_vm(disk_path: &str) -> ActionResult {
    if disk_path.is_empty() {
        return Err(fail("No Disk Path given."));
    }
    if !Path::new(disk_path).exists() {
        return Err(fail("VM not found."));
    }
    tokio::fs::remove_file(disk_path)
        .await
        .map_err(|e| fail(e.to_string()))?;
    Ok(json!({ "message": "VM deleted successfully." }))
}

// ===========================================================================
// Running VMs
// ===========================================================================

/// QEMU system emulators by process name; interpreters that merely mention
/// qemu in their name are not VMs.
pub fn is_qemu_process(name: &str) -> bool {
    let name = name.to_lowercase();
    !name.contains("python")
        && QEMU_NAME_PATTERNS
            .iter()
            .any(|p| name.contains(p))
}

fn list_running_vms() -> Value {
    let mut sys = System::new();
    sys.refresh_processes();
    let mut vms: Vec<Value> = sys
        .processes()
        .iter()
        .filter(|(_, p)| is_qemu_process(p.name()))
        .map(|(pid, p)| {
            json!({
                "pid": pid.as_u32(),
                "name": p.name(),
                "cmdline": p.cmd(),
                "create_time": p.start_time(),
            })
        })
        .collect();
    vms.sort_by_key(|v| v["pid"].as_u64());
    Value::Array(vms)
}

async fn stop_vm(ctx: &AppContext, pid: Option<u64>) -> ActionResult {
    let Some(raw) = pid else {
        return Err(fail("No PID given."));
    };
    let Ok(raw) = u32::try_from(raw) else {
        return Err(fail(format!("Process with PID {} not found", raw)));
    };
    let pid = Pid::from_u32(raw);

    let mut sys = System::new();
    if !sys.refresh_process(pid) {
        return Err(fail(format!("Process with PID {} not found", raw)));
    }
    let Some(process) = sys.process(pid) else {
        return Err(fail(format!("Process with PID {} not found", raw)));
    };
    let sent = process.kill_with(Signal::Term).unwrap_or_else(|| process.kill());
    if !sent {
        return Err(fail(format!("Access denied to process {}", raw)));
    }

    let deadline = ctx.clock().now() + STOP_GRACE;
    while ctx.clock().now() < deadline {
        if !sys.refresh_process(pid) {
            return Ok(json!({ "message": format!("VM with PID {} stopped", raw) }));
        }
        ctx.clock().sleep(STOP_POLL).await;
    }

    tracing::warn!(pid = raw, "vm ignored SIGTERM, killing");
    if let Some(process) = sys.process(pid) {
        process.kill();
    }
    Ok(json!({ "message": format!("VM with PID {} stopped", raw) }))
}

// ===========================================================================
// Disk images
// ===========================================================================

async fn create_disk_image(ctx: &AppContext, path: &str, size: &str) -> ActionResult {
    if path.is_empty() {
        return Err(fail("No Disk Path given."));
    }
    if size.is_empty() {
        return Err(fail("No disk size given."));
    }

    let mut target = PathBuf::from(path);
    if target.is_dir() {
        target = target.join(DEFAULT_DISK_NAME);
    } else if target.exists() && !target.is_file() {
        return Err(fail(format!("Path exists but is not a file: {}", target.display())));
    }

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| fail(e.to_string()))?;
    }
    if target.exists() {
        return Err(fail(format!(
            "Disk image already exists at {}. Please choose a different path or delete the existing file.",
            target.display()
        )));
    }

    let shown = target.display().to_string();
    let cmd = CommandSpec::new("qemu-img", ["create", "-f", "qcow2", shown.as_str(), size]);
    let out = match run(ctx, &cmd, None).await {
        Ok(out) => out,
        Err(ExecError::NotFound(_)) => return Err(fail("qemu-img not found. Is QEMU installed?")),
        Err(e) => return Err(fail(e.to_string())),
    };
    if !succeeded(&out) {
        return Err(fail(format!("Error creating disk image: {}", stderr_or_status(&out))));
    }
    Ok(json!({
        "message": format!("Disk image created at {}", shown),
        "output": out.stdout,
    }))
}
