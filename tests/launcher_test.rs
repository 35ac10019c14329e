//! Launcher and teardown against real child processes.

use run_local::service::{is_pid_alive, pidfile, LifecycleState, Launcher, ServiceDescriptor};
use run_local::supervisor::{Coordinator, StepOutcome};
use run_local::Error;
use std::collections::BTreeMap;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const GRACE: Duration = Duration::from_millis(300);

fn descriptor(dir: &Path, name: &str, command: &str, port: Option<u16>) -> ServiceDescriptor {
    let logs = dir.join("logs");
    ServiceDescriptor {
        name: name.to_string(),
        launch_command: command.to_string(),
        port,
        log_path: logs.join(format!("{}.log", name)),
        pid_path: logs.join(format!("{}.pid", name)),
        work_dir: dir.to_path_buf(),
        environment: BTreeMap::new(),
    }
}

fn free_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn started_service_is_recorded_and_torn_down() {
    let dir = TempDir::new().unwrap();
    let desc = descriptor(dir.path(), "api", "sleep 30", Some(free_port()));

    let handle = Launcher::new(GRACE).start(&desc).await.unwrap();
    assert_eq!(handle.state, LifecycleState::Running);
    assert!(is_pid_alive(handle.pid));
    assert_eq!(pidfile::read_pid(&desc.pid_path).unwrap(), Some(handle.pid));
    assert!(desc.log_path.exists());

    let pid = handle.pid;
    let coordinator = Coordinator::new(None, Duration::from_secs(2));
    coordinator.track_process(handle);
    let report = coordinator.shutdown().await;

    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].outcome, StepOutcome::Stopped);
    assert!(!desc.pid_path.exists());
    assert!(!is_pid_alive(pid));
}

#[tokio::test]
async fn bound_port_spawns_nothing() {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    let desc = descriptor(dir.path(), "api", "sleep 30", Some(port));

    let err = Launcher::new(GRACE).start(&desc).await.unwrap_err();
    match err {
        Error::PortInUse {
            service, port: p, ..
        } => {
            assert_eq!(service, "api");
            assert_eq!(p, port);
        }
        other => panic!("expected PortInUse, got {:?}", other),
    }
    assert!(!desc.pid_path.exists());
}

#[tokio::test]
async fn early_exit_is_startup_failure_with_log_tail() {
    let dir = TempDir::new().unwrap();
    let desc = descriptor(
        dir.path(),
        "dashboard",
        "sh -c 'echo boom-from-dashboard; exit 3'",
        None,
    );

    let err = Launcher::new(GRACE).start(&desc).await.unwrap_err();
    match err {
        Error::StartupFailed {
            service,
            log_path,
            detail,
        } => {
            assert_eq!(service, "dashboard");
            assert_eq!(log_path, desc.log_path);
            assert!(detail.contains("boom-from-dashboard"), "detail: {}", detail);
        }
        other => panic!("expected StartupFailed, got {:?}", other),
    }
    assert!(!desc.pid_path.exists());
    let log = std::fs::read_to_string(&desc.log_path).unwrap();
    assert!(log.contains("boom-from-dashboard"));
}

#[tokio::test]
async fn environment_and_work_dir_reach_the_process() {
    let dir = TempDir::new().unwrap();
    let mut desc = descriptor(
        dir.path(),
        "agents",
        "sh -c 'echo \"greeting=$GREETING\"; pwd; sleep 30'",
        None,
    );
    desc.environment
        .insert("GREETING".to_string(), "hello".to_string());

    let handle = Launcher::new(GRACE).start(&desc).await.unwrap();
    let log = std::fs::read_to_string(&desc.log_path).unwrap();
    assert!(log.contains("greeting=hello"), "log: {}", log);
    let canonical = dir.path().canonicalize().unwrap();
    assert!(
        log.contains(dir.path().to_str().unwrap()) || log.contains(canonical.to_str().unwrap()),
        "log: {}",
        log
    );

    let coordinator = Coordinator::new(None, Duration::from_secs(2));
    coordinator.track_process(handle);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn logs_are_appended_across_runs() {
    let dir = TempDir::new().unwrap();
    let desc = descriptor(dir.path(), "agents", "sh -c 'echo run; sleep 30'", None);

    for _ in 0..2 {
        let handle = Launcher::new(GRACE).start(&desc).await.unwrap();
        let coordinator = Coordinator::new(None, Duration::from_secs(2));
        coordinator.track_process(handle);
        coordinator.shutdown().await;
    }
    let log = std::fs::read_to_string(&desc.log_path).unwrap();
    assert_eq!(log.matches("run").count(), 2);
}

#[tokio::test]
async fn stale_pid_file_is_replaced() {
    let dir = TempDir::new().unwrap();
    let desc = descriptor(dir.path(), "api", "sleep 30", None);
    pidfile::write_pid(&desc.pid_path, 4_194_303).unwrap();

    let handle = Launcher::new(GRACE).start(&desc).await.unwrap();
    assert_eq!(pidfile::read_pid(&desc.pid_path).unwrap(), Some(handle.pid));

    let coordinator = Coordinator::new(None, Duration::from_secs(2));
    coordinator.track_process(handle);
    coordinator.shutdown().await;
    assert!(!desc.pid_path.exists());
}

#[tokio::test]
async fn live_pid_file_refuses_launch() {
    let dir = TempDir::new().unwrap();
    let desc = descriptor(dir.path(), "api", "sleep 30", None);
    pidfile::write_pid(&desc.pid_path, std::process::id()).unwrap();

    let err = Launcher::new(GRACE).start(&desc).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning { .. }));
    assert_eq!(
        pidfile::read_pid(&desc.pid_path).unwrap(),
        Some(std::process::id())
    );
    assert!(!desc.log_path.exists());
}

#[tokio::test]
async fn teardown_kills_whole_process_group() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("grandchild.pid");
    let command = format!(
        "sh -c 'sleep 30 & echo $! > {}; wait'",
        marker.display()
    );
    let desc = descriptor(dir.path(), "agents", &command, None);

    let handle = Launcher::new(GRACE).start(&desc).await.unwrap();
    let grandchild: u32 = std::fs::read_to_string(&marker)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(is_pid_alive(grandchild));

    let coordinator = Coordinator::new(None, Duration::from_secs(2));
    coordinator.track_process(handle);
    coordinator.shutdown().await;

    // The grandchild is reparented to init, which reaps it shortly after
    let mut alive = true;
    for _ in 0..50 {
        if !is_pid_alive(grandchild) {
            alive = false;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(!alive, "grandchild {} survived teardown", grandchild);
}

#[tokio::test]
async fn teardown_kills_member_that_ignores_sigterm_after_leader_exits() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("worker.pid");
    let command = format!(
        "sh -c '(trap \"\" TERM; exec sleep 30) & echo $! > {}; wait'",
        marker.display()
    );
    let desc = descriptor(dir.path(), "api", &command, None);

    let handle = Launcher::new(GRACE).start(&desc).await.unwrap();
    let worker: u32 = std::fs::read_to_string(&marker)
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    let coordinator = Coordinator::new(None, Duration::from_secs(1));
    coordinator.track_process(handle);
    let report = coordinator.shutdown().await;

    assert_eq!(report.steps[0].outcome, StepOutcome::Killed);
    assert!(!desc.pid_path.exists());
    let mut alive = true;
    for _ in 0..50 {
        if !is_pid_alive(worker) {
            alive = false;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(!alive, "worker {} survived teardown", worker);
}

#[tokio::test]
async fn compound_command_runs_every_part() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("api")).unwrap();
    let desc = descriptor(
        dir.path(),
        "api",
        "cd api && echo \"in=$(basename \"$PWD\")\" && sleep 30",
        None,
    );

    let handle = Launcher::new(GRACE).start(&desc).await.unwrap();
    let log = std::fs::read_to_string(&desc.log_path).unwrap();
    assert!(log.contains("in=api"), "log: {}", log);

    let pid = handle.pid;
    let coordinator = Coordinator::new(None, Duration::from_secs(2));
    coordinator.track_process(handle);
    coordinator.shutdown().await;
    assert!(!is_pid_alive(pid));
}
