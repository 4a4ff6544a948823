mod common;

use std::time::Duration;

use common::{secrets, snapshot, RepoEntry};
use deployer_daemon::{AgentState, ModeController, ModeError, ModeSpec, ModeState};
use tempfile::TempDir;

fn controller(dir: &TempDir) -> (AgentState, ModeController) {
    let settings = snapshot(
        None,
        &[RepoEntry::new(
            "svc-a",
            &dir.path().join("upstream"),
            &dir.path().join("svc-a"),
        )],
    );
    let agent = AgentState::new(settings, secrets(0, "info", None));
    let mode = ModeController::new(agent.clone(), Duration::from_millis(500));
    (agent, mode)
}

#[tokio::test]
async fn bind_error_leaves_controller_stopped() {
    let dir = TempDir::new().expect("tempdir");
    let (_agent, mode) = controller(&dir);
    mode.apply(ModeSpec::Listener { port: 0 })
        .await
        .expect("first listener");

    let occupied = std::net::TcpListener::bind("0.0.0.0:0").expect("occupy port");
    let port = occupied.local_addr().expect("addr").port();

    let err = mode
        .apply(ModeSpec::Listener { port })
        .await
        .expect_err("bind should fail");
    assert!(matches!(err, ModeError::Bind { port: p, .. } if p == port), "got {err}");
    assert_eq!(mode.state(), ModeState::Stopped);
}

#[tokio::test]
async fn schedule_error_leaves_controller_stopped() {
    let dir = TempDir::new().expect("tempdir");
    let (_agent, mode) = controller(&dir);
    mode.apply(ModeSpec::Listener { port: 0 })
        .await
        .expect("listener");

    let err = mode
        .apply(ModeSpec::Scheduler {
            expression: "every tuesday".to_string(),
        })
        .await
        .expect_err("bad expression accepted");
    assert!(matches!(err, ModeError::Schedule { .. }), "got {err}");
    assert_eq!(mode.state(), ModeState::Stopped);
}

#[tokio::test]
async fn stop_waits_for_accepted_work_up_to_grace() {
    let dir = TempDir::new().expect("tempdir");
    let (agent, mode) = controller(&dir);
    mode.apply(ModeSpec::Listener { port: 0 })
        .await
        .expect("listener");

    // Work accepted by the listener and still running.
    let token = agent.barrier.acquire().await;
    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(token);
    });

    let started = tokio::time::Instant::now();
    mode.stop().await;
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(90), "stop returned after {waited:?}");
    assert!(waited < Duration::from_millis(450), "stop ignored the release: {waited:?}");
    assert_eq!(agent.barrier.state().active, 0);
    release.await.expect("release task");
}

#[tokio::test]
async fn stop_gives_up_after_grace() {
    let dir = TempDir::new().expect("tempdir");
    let (agent, mode) = controller(&dir);
    mode.apply(ModeSpec::Scheduler {
        expression: "0 0 0 1 1 *".to_string(),
    })
    .await
    .expect("scheduler");

    let stuck = agent.barrier.acquire().await;
    let started = tokio::time::Instant::now();
    mode.stop().await;
    assert!(started.elapsed() >= Duration::from_millis(450));
    assert_eq!(mode.state(), ModeState::Stopped);
    assert_eq!(agent.barrier.state().active, 1);
    drop(stuck);
}

#[tokio::test]
async fn scheduler_tick_syncs_every_repository() {
    let dir = TempDir::new().expect("tempdir");
    let (agent, mode) = controller(&dir);
    mode.apply(ModeSpec::Scheduler {
        expression: "* * * * * *".to_string(),
    })
    .await
    .expect("scheduler");

    let deployer = agent.deployer.clone();
    let ticked = common::eventually(Duration::from_secs(5), || deployer.attempts() >= 1).await;
    assert!(ticked, "no scheduled tick within five seconds");
    mode.stop().await;
}

#[tokio::test]
async fn scheduler_tick_waits_while_draining() {
    let dir = TempDir::new().expect("tempdir");
    let (agent, mode) = controller(&dir);
    let guard = agent.barrier.drain().await;
    mode.apply(ModeSpec::Scheduler {
        expression: "* * * * * *".to_string(),
    })
    .await
    .expect("scheduler");

    tokio::time::sleep(Duration::from_millis(2200)).await;
    assert_eq!(agent.deployer.attempts(), 0, "tick ran during a drain");

    // Stopping must not hang on the blocked acquire.
    let stopped = tokio::time::timeout(Duration::from_millis(400), mode.stop()).await;
    assert!(stopped.is_ok());
    drop(guard);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopped_scheduler_keeps_running_tick_on_the_barrier() {
    let dir = TempDir::new().expect("tempdir");
    common::upstream(&dir.path().join("upstream"));
    let checkout = dir.path().join("svc-a");
    let settings = snapshot(
        None,
        &[RepoEntry::new("svc-a", &dir.path().join("upstream"), &checkout)
            .commands(&["sleep 3", "touch done"])],
    );
    let agent = AgentState::new(settings, secrets(0, "info", None));
    let mode = ModeController::new(agent.clone(), Duration::from_millis(300));
    mode.apply(ModeSpec::Scheduler {
        expression: "* * * * * *".to_string(),
    })
    .await
    .expect("scheduler");

    let cloned = checkout.join("README.md");
    assert!(
        common::eventually(Duration::from_secs(5), || cloned.exists()).await,
        "no scheduled tick within five seconds"
    );

    mode.stop().await;
    assert_eq!(mode.state(), ModeState::Stopped);
    let done = checkout.join("done");
    assert!(!done.exists(), "commands finished before the grace period");
    assert_eq!(agent.barrier.state().active, 1, "token released while commands run");

    let barrier = agent.barrier.clone();
    assert!(common::eventually(Duration::from_secs(10), || barrier.state().active == 0).await);
    assert!(done.exists(), "token released before the last command");
}
