// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! Nothing here touches the real system: commands go to a scripted
//! executor, checkpoints to an in-memory backend and geolocation to a fixed
//! answer.

#![allow(dead_code)]

use async_trait::async_trait;
use blackarch_aio::config::AioConfig;
use blackarch_aio::exec::{CommandExecutor, CommandOutput, CommandSpec};
use blackarch_aio::mirror::{GeoLocation, GeoLocator};
use blackarch_aio::snapshot::{CheckpointBackend, SnapshotGuard};
use blackarch_aio::{Error, Orchestrator, Result};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

struct Rule {
    needle: String,
    responses: VecDeque<CommandOutput>,
    delay: Option<Duration>,
}

/// Executor that answers from scripted rules and records every command
///
/// The first rule whose needle is a substring of the command line answers.
/// Queued responses are consumed in order; the last one repeats. Commands
/// that match no rule succeed with empty output. A successful `install`
/// copies its source over its destination so file edits can be inspected.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
    tools: Mutex<HashSet<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    /// pacman is always installed
    pub fn new() -> Self {
        Self::with_tools(&[])
    }

    pub fn with_tools(tools: &[&str]) -> Self {
        let executor = Self::default();
        executor.add_tool("pacman");
        for tool in tools {
            executor.add_tool(tool);
        }
        executor
    }

    pub fn add_tool(&self, tool: &str) {
        self.tools.lock().unwrap().insert(tool.to_string());
    }

    pub fn respond(&self, needle: &str, output: CommandOutput) {
        self.respond_seq(needle, vec![output]);
    }

    pub fn respond_seq(&self, needle: &str, outputs: Vec<CommandOutput>) {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            responses: outputs.into(),
            delay: None,
        });
    }

    /// Answer after `delay`, to observe overlapping commands
    pub fn respond_slow(&self, needle: &str, output: CommandOutput, delay: Duration) {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            responses: vec![output].into(),
            delay: Some(delay),
        });
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.command_line()).collect()
    }

    /// Command lines containing `needle`
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.command_lines()
            .into_iter()
            .filter(|line| line.contains(needle))
            .collect()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.matching(needle).len()
    }

    /// Index of the first command line containing `needle`
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.command_lines().iter().position(|line| line.contains(needle))
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn answer(&self, line: &str) -> (CommandOutput, Option<Duration>) {
        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules.iter_mut().find(|r| line.contains(r.needle.as_str())) else {
            return (CommandOutput::ok(""), None);
        };

        let output = if rule.responses.len() > 1 {
            rule.responses.pop_front().unwrap_or_default()
        } else {
            rule.responses.front().cloned().unwrap_or_else(|| CommandOutput::ok(""))
        };
        (output, rule.delay)
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        let (output, delay) = self.answer(&spec.command_line());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if output.success() && spec.program() == "install" {
            apply_install(&spec.argv);
        }
        Ok(output)
    }

    fn tool_available(&self, tool: &str) -> bool {
        self.tools.lock().unwrap().contains(tool)
    }
}

/// `install [-D] -m <mode> <src> <dst>` without the mode
fn apply_install(argv: &[String]) {
    let [.., src, dst] = argv else {
        return;
    };
    if argv.iter().any(|arg| arg == "-D")
        && let Some(parent) = Path::new(dst).parent()
    {
        fs::create_dir_all(parent).unwrap();
    }
    fs::copy(src, dst).unwrap();
}

/// In-memory checkpoint backend recording every tag it was asked for
#[derive(Default)]
pub struct RecordingBackend {
    events: Mutex<Vec<(u32, Option<u32>, String)>>,
    next_id: AtomicUsize,
    failing: bool,
    pre_delay: Option<Duration>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose every call fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// A backend whose pre checkpoints take `delay` to create
    pub fn slow_pre(delay: Duration) -> Self {
        Self {
            pre_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Tags in creation order
    pub fn tags(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, tag)| tag.clone())
            .collect()
    }

    /// Pre id a post checkpoint was paired with
    pub fn paired_with(&self, tag: &str) -> Option<u32> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|(_, _, t)| t == tag)
            .and_then(|(_, pre, _)| *pre)
    }

    /// Id given to a checkpoint
    pub fn id_of(&self, tag: &str) -> Option<u32> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|(_, _, t)| t == tag)
            .map(|(id, _, _)| *id)
    }

    fn create(&self, pre_id: Option<u32>, tag: &str) -> Result<u32> {
        if self.failing {
            return Err(Error::Checkpoint("snapper is broken".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as u32 + 1;
        self.events.lock().unwrap().push((id, pre_id, tag.to_string()));
        Ok(id)
    }
}

impl CheckpointBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn create_pre(&self, description: &str) -> Result<u32> {
        if let Some(delay) = self.pre_delay {
            std::thread::sleep(delay);
        }
        self.create(None, description)
    }

    fn create_post(&self, pre_id: Option<u32>, description: &str) -> Result<u32> {
        self.create(pre_id, description)
    }
}

/// Geolocator with a fixed answer
#[derive(Default)]
pub struct StaticLocator {
    location: Option<GeoLocation>,
    lookups: AtomicUsize,
}

impl StaticLocator {
    pub fn country(code: &str) -> Self {
        Self {
            location: Some(GeoLocation::country(code)),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoLocator for StaticLocator {
    async fn locate(&self) -> Option<GeoLocation> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.location.clone()
    }
}

/// Configuration whose every path lives under `root`
///
/// The pacman.conf already carries the BlackArch repository and both system
/// config files exist, so a clean run issues no repair commands.
pub fn test_config(root: &Path) -> AioConfig {
    let mut config = AioConfig::default();
    config.privilege.use_sudo = false;

    let paths = &mut config.paths;
    paths.pacman_conf = root.join("etc/pacman.conf");
    paths.mirrorlist = root.join("etc/pacman.d/mirrorlist");
    paths.mirrorlist_staging = root.join("etc/pacman.d/mirrorlist.staging");
    paths.db_lock = root.join("var/lib/pacman/db.lck");
    paths.run_lock = root.join("run/aio.lock");
    paths.completion_marker = root.join(".update_done");
    paths.modules_dir = root.join("usr/lib/modules");
    paths.lib_dir = root.join("usr/lib");
    paths.dracut_conf = root.join("etc/dracut.conf.d/99-fix-boot.conf");
    paths.kernel_install_conf = root.join("etc/kernel/install.conf");

    for dir in [
        root.join("etc/pacman.d"),
        root.join("etc/dracut.conf.d"),
        root.join("etc/kernel"),
        root.join("usr/lib/modules"),
    ] {
        fs::create_dir_all(dir).unwrap();
    }
    fs::write(
        &paths.pacman_conf,
        "[options]\nArchitecture = auto\n\n[core]\nInclude = /etc/pacman.d/mirrorlist\n\n[blackarch]\nInclude = /etc/pacman.d/blackarch-mirrorlist\n",
    )
    .unwrap();
    fs::write(&paths.dracut_conf, "hostonly=\"no\"\n").unwrap();
    fs::write(&paths.kernel_install_conf, "layout=bls\n").unwrap();

    config
}

/// Add a kernel with a `vmlinuz` under the modules dir
pub fn install_kernel(config: &AioConfig, kver: &str) {
    let dir = config.paths.modules_dir.join(kver);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("vmlinuz"), b"").unwrap();
}

/// An orchestrator wired to fakes
pub struct Harness {
    pub dir: TempDir,
    pub executor: Arc<ScriptedExecutor>,
    pub backend: Arc<RecordingBackend>,
    pub locator: Arc<StaticLocator>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(executor: ScriptedExecutor) -> Self {
        Self::build(executor, StaticLocator::country("DE"), |_| {})
    }

    pub fn build(
        executor: ScriptedExecutor,
        locator: StaticLocator,
        customize: impl FnOnce(&mut AioConfig),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        customize(&mut config);

        let executor = Arc::new(executor);
        let backend = Arc::new(RecordingBackend::new());
        let locator = Arc::new(locator);
        let snapshots = SnapshotGuard::new(Some(backend.clone() as Arc<dyn CheckpointBackend>));

        let orchestrator =
            Orchestrator::new(config, executor.clone(), locator.clone(), snapshots).unwrap();

        Self {
            dir,
            executor,
            backend,
            locator,
            orchestrator,
        }
    }
}
