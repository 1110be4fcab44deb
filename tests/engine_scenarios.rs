use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use stevedore::config::{DevConfig, ProjectConfig};
use stevedore::context::ExecutionContext;
use stevedore::defaults::Defaults;
use stevedore::dev::DevSessionManager;
use stevedore::download::{Downloader, ToolCommand, ToolInstaller};
use stevedore::engine::context_builder;
use stevedore::engine::fallback::{Fallback, FallbackProvider};
use stevedore::engine::{
    CommandTable, DependencyRunner, Deployer, DevManager, Engine, ExecHandler, ExitStatus,
    HandlerContext, ImageBuilder, PipelineRunner, ResolutionOutcome, Subsystems,
};
use stevedore::log::{LogLevel, Logger, SharedBuffer};
use stevedore::{script, Error, ErrorCode, Result};

const GATED: [&str; 6] = [
    "run_pipelines",
    "build_images",
    "create_deployments",
    "start_dev",
    "stop_dev",
    "run_dependencies_pipeline",
];

/// Subsystems that record every call instead of doing work.
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    fail_with: Option<String>,
}

impl Recorder {
    fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Default::default()
        }
    }

    fn record(&self, subsystem: &str, args: &[String]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((subsystem.to_string(), args.to_vec()));
        match &self.fail_with {
            Some(message) => Err(Error::internal_unexpected(format!("{}: {}", subsystem, message))),
            None => Ok(()),
        }
    }

    fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl PipelineRunner for Recorder {
    fn run_pipelines(&self, _: &ExecutionContext, _: &Subsystems, args: &[String]) -> Result<()> {
        self.record("pipelines", args)
    }
}

impl ImageBuilder for Recorder {
    fn build_images(&self, _: &ExecutionContext, args: &[String]) -> Result<()> {
        self.record("images", args)
    }
}

impl Deployer for Recorder {
    fn create_deployments(&self, _: &ExecutionContext, args: &[String]) -> Result<()> {
        self.record("deployments", args)
    }
}

impl DevManager for Recorder {
    fn start_dev(&self, _: &ExecutionContext, args: &[String]) -> Result<()> {
        self.record("start_dev", args)
    }

    fn stop_dev(&self, _: &ExecutionContext, args: &[String]) -> Result<()> {
        self.record("stop_dev", args)
    }

    fn wait_all(&self) {}

    fn stop_all(&self) {}
}

impl DependencyRunner for Recorder {
    fn run_dependencies_pipeline(
        &self,
        _: &ExecutionContext,
        _: &Subsystems,
        args: &[String],
    ) -> Result<()> {
        self.record("dependencies", args)
    }
}

fn subsystems(recorder: &Arc<Recorder>) -> Subsystems {
    Subsystems {
        pipelines: recorder.clone(),
        images: recorder.clone(),
        deployments: recorder.clone(),
        dev: recorder.clone(),
        dependencies: recorder.clone(),
    }
}

/// Installer that counts installs and answers `<bin_dir>/<tool>`, with
/// `/cache` as the default directory.
#[derive(Clone, Default)]
struct CountingInstaller {
    installs: Arc<AtomicUsize>,
    fail: bool,
    bin_dir: Option<PathBuf>,
}

impl ToolInstaller for CountingInstaller {
    fn install(&self, tool: ToolCommand) -> Result<PathBuf> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::download_failed(tool.name(), "connection refused"));
        }
        let dir = self.bin_dir.clone().unwrap_or_else(|| PathBuf::from("/cache"));
        Ok(dir.join(tool.name()))
    }
}

struct Fixture {
    ctx: ExecutionContext,
    out: SharedBuffer,
    err: SharedBuffer,
    installs: Arc<AtomicUsize>,
}

impl Fixture {
    fn new(dir: &Path) -> Self {
        Self::with_installer(dir, CountingInstaller::default(), ProjectConfig::default())
    }

    fn with_installer(dir: &Path, installer: CountingInstaller, config: ProjectConfig) -> Self {
        let installs = Arc::clone(&installer.installs);
        let tools = Arc::new(Downloader::new(Box::new(installer), Logger::discard()));
        let ambient = SharedBuffer::new();
        let ctx = ExecutionContext::new(
            config,
            Defaults::default(),
            tools,
            dir.to_path_buf(),
            Logger::stream(ambient.writer(), LogLevel::Info),
        );
        Self {
            ctx,
            out: SharedBuffer::new(),
            err: SharedBuffer::new(),
            installs,
        }
    }

    fn hc(&self) -> HandlerContext {
        HandlerContext::from_context(&self.ctx).with_streams(self.out.writer(), self.err.writer())
    }

    /// Handler context whose PATH contains only an empty directory.
    fn hc_without_path(&self, empty_dir: &Path) -> HandlerContext {
        let mut hc = self.hc();
        Arc::make_mut(&mut hc.env).insert("PATH".to_string(), empty_dir.display().to_string());
        hc
    }
}

fn args(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn exec(engine: &Engine, hc: &HandlerContext, words: &[&str]) -> ExitStatus {
    engine.exec(hc, &args(words)).unwrap()
}

#[test]
fn gated_commands_are_rejected_outside_pipeline_mode() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let recorder = Arc::new(Recorder::default());
    let engine = Engine::ad_hoc(fixture.ctx.clone(), subsystems(&recorder));

    for name in GATED {
        let status = exec(&engine, &fixture.hc(), &[name, "--all"]);
        assert_eq!(status, ExitStatus::FAILURE, "{}", name);
    }

    assert!(recorder.calls().is_empty());
    let stderr = fixture.err.contents();
    assert!(stderr.contains(
        "build_images: cannot execute the command because it can only be executed within a pipeline step"
    ));
    assert_eq!(stderr.lines().count(), GATED.len());
}

#[test]
fn pipeline_mode_calls_each_subsystem_once_with_exact_args() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let recorder = Arc::new(Recorder::default());
    let engine = Engine::pipeline(fixture.ctx.clone(), subsystems(&recorder));

    let expected = [
        ("run_pipelines", "pipelines"),
        ("build_images", "images"),
        ("create_deployments", "deployments"),
        ("start_dev", "start_dev"),
        ("stop_dev", "stop_dev"),
        ("run_dependencies_pipeline", "dependencies"),
    ];
    for (name, _) in expected {
        let status = exec(&engine, &fixture.hc(), &[name, "api", "--flag=a b"]);
        assert_eq!(status, ExitStatus::SUCCESS, "{}", name);
    }

    let calls = recorder.calls();
    assert_eq!(calls.len(), expected.len());
    for ((_, subsystem), (called, call_args)) in expected.iter().zip(&calls) {
        assert_eq!(called, subsystem);
        assert_eq!(call_args, &args(&["api", "--flag=a b"]));
    }
    assert_eq!(fixture.err.contents(), "");
}

#[test]
fn subsystem_errors_become_exit_status_one_with_prefixed_message() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let recorder = Arc::new(Recorder::failing("registry unreachable"));
    let engine = Engine::pipeline(fixture.ctx.clone(), subsystems(&recorder));

    let status = exec(&engine, &fixture.hc(), &["build_images", "api"]);
    assert_eq!(status, ExitStatus::FAILURE);
    assert_eq!(recorder.calls().len(), 1);

    let stderr = fixture.err.contents();
    assert!(stderr.starts_with("build_images: "));
    assert!(stderr.contains("registry unreachable"));
}

#[test]
fn reduced_table_is_ungated() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let recorder = Arc::new(Recorder::default());
    let engine = Engine::new(
        fixture.ctx.clone(),
        subsystems(&recorder),
        CommandTable::reduced(),
        false,
    );

    assert_eq!(exec(&engine, &fixture.hc(), &["deploy", "myapp"]), ExitStatus::SUCCESS);
    assert_eq!(exec(&engine, &fixture.hc(), &["dev", "web"]), ExitStatus::SUCCESS);
    assert_eq!(
        recorder.calls(),
        vec![
            ("deployments".to_string(), args(&["myapp"])),
            ("start_dev".to_string(), args(&["web"])),
        ]
    );
    assert_eq!(fixture.err.contents(), "");
}

#[test]
fn reserved_names_never_reach_process_execution() {
    let dir = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let recorder = Arc::new(Recorder::default());
    let engine = Engine::pipeline(fixture.ctx.clone(), subsystems(&recorder));

    // An executable shadowing a reserved name on PATH is ignored.
    let shadow = bin.path().join("build_images");
    std::fs::write(&shadow, "#!/bin/sh\necho shadow\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&shadow, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let hc = fixture.hc_without_path(bin.path());
    assert_eq!(
        engine.resolve(&hc, "build_images", &[]),
        ResolutionOutcome::Handled(ExitStatus::SUCCESS)
    );
    assert_eq!(fixture.out.contents(), "");
    assert_eq!(recorder.calls().len(), 1);
}

struct CountingFallback(AtomicUsize);

impl FallbackProvider for CountingFallback {
    fn provide(&self, _: &HandlerContext, _: &str, _: &[String]) -> Fallback {
        self.0.fetch_add(1, Ordering::SeqCst);
        Fallback::Declined
    }
}

#[test]
fn locally_resolvable_names_skip_the_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let fallback = Arc::new(CountingFallback(AtomicUsize::new(0)));
    let engine = Engine::pipeline(fixture.ctx.clone(), subsystems(&Arc::new(Recorder::default())))
        .with_fallback(fallback.clone());

    assert_eq!(
        engine.resolve(&fixture.hc(), "sh", &args(&["-c", "true"])),
        ResolutionOutcome::NotReserved {
            program: "sh".to_string()
        }
    );
    assert_eq!(exec(&engine, &fixture.hc(), &["sh", "-c", "echo local"]), ExitStatus::SUCCESS);
    assert_eq!(fixture.out.contents(), "local\n");
    assert_eq!(fallback.0.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_kubectl_is_substituted_with_cached_download() {
    let dir = tempfile::tempdir().unwrap();
    let empty = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let engine = Engine::pipeline(fixture.ctx.clone(), subsystems(&Arc::new(Recorder::default())));
    let hc = fixture.hc_without_path(empty.path());

    let get_pods = args(&["get", "pods", "-n", "shop"]);
    for _ in 0..3 {
        assert_eq!(
            engine.resolve(&hc, "kubectl", &get_pods),
            ResolutionOutcome::NotReserved {
                program: "/cache/kubectl".to_string()
            }
        );
    }
    assert_eq!(fixture.installs.load(Ordering::SeqCst), 1);
}

#[cfg(unix)]
#[test]
fn substituted_kubectl_receives_the_original_arguments() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let empty = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    let kubectl = bin.path().join("kubectl");
    std::fs::write(&kubectl, "#!/bin/sh\nprintf '%s\\n' \"$0\" \"$@\"\n").unwrap();
    std::fs::set_permissions(&kubectl, std::fs::Permissions::from_mode(0o755)).unwrap();

    let installer = CountingInstaller {
        bin_dir: Some(bin.path().to_path_buf()),
        ..Default::default()
    };
    let fixture = Fixture::with_installer(dir.path(), installer, ProjectConfig::default());
    let engine = Engine::pipeline(fixture.ctx.clone(), subsystems(&Arc::new(Recorder::default())));
    let hc = fixture.hc_without_path(empty.path());

    let status = exec(
        &engine,
        &hc,
        &["kubectl", "get", "pods", "-n", "shop", "-l", "app=api tier"],
    );

    assert_eq!(status, ExitStatus::SUCCESS);
    assert_eq!(
        fixture.out.contents(),
        format!("{}\nget\npods\n-n\nshop\n-l\napp=api tier\n", kubectl.display())
    );
    assert_eq!(fixture.installs.load(Ordering::SeqCst), 1);
}

#[test]
fn self_reference_runs_the_current_executable() {
    let dir = tempfile::tempdir().unwrap();
    let empty = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let engine = Engine::pipeline(fixture.ctx.clone(), subsystems(&Arc::new(Recorder::default())));
    let hc = fixture.hc_without_path(empty.path());
    let current = std::env::current_exe().unwrap();

    assert_eq!(
        engine.resolve(&hc, "stevedore", &[]),
        ResolutionOutcome::NotReserved {
            program: current.display().to_string()
        }
    );

    // This binary is the test harness, so listing one test by name shows
    // the arguments arrived intact.
    let status = exec(
        &engine,
        &hc,
        &["stevedore", "--list", "--exact", "empty_command_succeeds"],
    );
    assert_eq!(status, ExitStatus::SUCCESS);
    assert!(fixture
        .out
        .contents()
        .contains("empty_command_succeeds: test"));
    assert_eq!(fixture.installs.load(Ordering::SeqCst), 0);
}

#[test]
fn failed_download_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let empty = tempfile::tempdir().unwrap();
    let installer = CountingInstaller {
        fail: true,
        ..Default::default()
    };
    let fixture = Fixture::with_installer(dir.path(), installer, ProjectConfig::default());
    let engine = Engine::pipeline(fixture.ctx.clone(), subsystems(&Arc::new(Recorder::default())));
    let hc = fixture.hc_without_path(empty.path());

    assert_eq!(exec(&engine, &hc, &["helm", "version"]), ExitStatus::NOT_FOUND);
    assert!(fixture.err.contents().starts_with("helm: "));
}

#[test]
fn unknown_tool_falls_through_to_command_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let empty = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let engine = Engine::pipeline(fixture.ctx.clone(), subsystems(&Arc::new(Recorder::default())));
    let hc = fixture.hc_without_path(empty.path());

    assert_eq!(
        engine.resolve(&hc, "totally-unknown-tool", &[]),
        ResolutionOutcome::NotReserved {
            program: "totally-unknown-tool".to_string()
        }
    );
    assert_eq!(
        exec(&engine, &hc, &["totally-unknown-tool", "--help"]),
        ExitStatus::NOT_FOUND
    );
    assert!(fixture.err.contents().contains("totally-unknown-tool"));
    assert_eq!(fixture.installs.load(Ordering::SeqCst), 0);
}

#[test]
fn cat_is_served_natively_without_path() {
    let dir = tempfile::tempdir().unwrap();
    let empty = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("values.yaml"), "replicas: 2\n").unwrap();
    let fixture = Fixture::new(dir.path());
    let engine = Engine::pipeline(fixture.ctx.clone(), subsystems(&Arc::new(Recorder::default())));
    let hc = fixture.hc_without_path(empty.path());

    assert_eq!(exec(&engine, &hc, &["cat", "values.yaml"]), ExitStatus::SUCCESS);
    assert_eq!(fixture.out.contents(), "replicas: 2\n");

    assert_eq!(exec(&engine, &hc, &["cat", "missing.yaml"]), ExitStatus::FAILURE);
    assert!(fixture.err.contents().contains("missing.yaml"));
}

#[test]
fn empty_command_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let engine = Engine::pipeline(fixture.ctx.clone(), subsystems(&Arc::new(Recorder::default())));
    assert_eq!(engine.exec(&fixture.hc(), &[]).unwrap(), ExitStatus::SUCCESS);
}

#[test]
fn derived_logger_reuses_ambient_stream_or_wraps_redirects() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let ctx = fixture.ctx.with_logger(fixture.ctx.log().with_level(LogLevel::Debug));

    let same = HandlerContext::from_context(&ctx);
    let derived = context_builder::derive(&ctx, &same);
    assert!(derived.log().writes_to(ctx.log().writer()));

    let redirected = same.clone().with_streams(fixture.out.writer(), fixture.err.writer());
    let mut redirected = redirected;
    redirected.dir = dir.path().join("sub");
    let derived = context_builder::derive(&ctx, &redirected);
    assert!(derived.log().writes_to(&redirected.stdout));
    assert_eq!(derived.log().level(), LogLevel::Debug);
    assert_eq!(derived.working_dir(), dir.path().join("sub"));
    assert!(Arc::ptr_eq(derived.config_arc(), ctx.config_arc()));
}

#[test]
fn cancelling_the_invocation_cancels_the_native_call() {
    struct WaitForCancel;

    impl ImageBuilder for WaitForCancel {
        fn build_images(&self, ctx: &ExecutionContext, _: &[String]) -> Result<()> {
            while !ctx.cancel().is_cancelled() {
                thread::sleep(std::time::Duration::from_millis(10));
            }
            ctx.check_cancelled()
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let mut subs = subsystems(&Arc::new(Recorder::default()));
    subs.images = Arc::new(WaitForCancel);
    let engine = Engine::pipeline(fixture.ctx.clone(), subs);

    let hc = fixture.hc();
    let cancel = hc.cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(50));
        cancel.cancel();
    });

    assert_eq!(exec(&engine, &hc, &["build_images"]), ExitStatus::FAILURE);
    canceller.join().unwrap();
    assert!(fixture.err.contents().starts_with("build_images: "));
}

#[test]
fn concurrent_dev_sessions_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ProjectConfig::default();
    config.name = "shop".to_string();
    for name in ["svc-a", "svc-b"] {
        config.dev.insert(
            name.to_string(),
            DevConfig {
                command: "sleep 30".to_string(),
                ..Default::default()
            },
        );
    }
    let fixture = Fixture::with_installer(dir.path(), CountingInstaller::default(), config);
    let manager = Arc::new(DevSessionManager::new().with_logger(Logger::discard()));

    let handles: Vec<_> = ["svc-a", "svc-b"]
        .into_iter()
        .map(|name| {
            let manager = Arc::clone(&manager);
            let ctx = fixture.ctx.clone();
            thread::spawn(move || manager.start_dev(&ctx, &[name.to_string()]))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(manager.running(), vec!["svc-a", "svc-b"]);

    let err = manager
        .start_dev(&fixture.ctx, &["svc-a".to_string()])
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DevAlreadyRunning);
    assert_eq!(manager.running(), vec!["svc-a", "svc-b"]);

    manager.stop_all();
    assert!(manager.running().is_empty());
}

#[test]
fn pipeline_script_drives_reserved_and_external_commands() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let recorder = Arc::new(Recorder::default());
    let engine = Engine::pipeline(fixture.ctx.clone(), subsystems(&recorder));

    let source = "\
# build then deploy
build_images api --skip-push
echo built
create_deployments api &
wait
";
    let status = script::run(&engine, source, fixture.hc()).unwrap();
    assert_eq!(status, ExitStatus::SUCCESS);
    assert_eq!(fixture.out.contents(), "built\n");
    assert_eq!(
        recorder.calls(),
        vec![
            ("images".to_string(), args(&["api", "--skip-push"])),
            ("deployments".to_string(), args(&["api"])),
        ]
    );
}
