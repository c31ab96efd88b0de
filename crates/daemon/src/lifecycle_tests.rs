// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn workspace_with_graphs() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let graphs = dir.path().join("_AiDevLog").join("graphs");
    std::fs::create_dir_all(&graphs).unwrap();
    for name in ["planning", "revision", "execute", "single_task"] {
        std::fs::write(
            graphs.join(format!("{name}.hcl")),
            format!(
                r#"
graph "{name}" {{
  node "entry" {{ type = "start" }}
  node "finish" {{ type = "end" }}
  connect "c1" {{ from = "entry.out", to = "finish.in" }}
}}
"#
            ),
        )
        .unwrap();
    }
    dir
}

#[tokio::test]
async fn startup_writes_port_file_and_shutdown_removes_it() {
    let dir = workspace_with_graphs();
    let daemon = Daemon::start(dir.path()).await.unwrap();

    let port_file = dir.path().join("_AiDevLog").join(".cache").join("daemon.port");
    let advertised: u16 =
        std::fs::read_to_string(&port_file).unwrap().trim().parse().unwrap();
    assert_eq!(advertised, daemon.port);

    daemon.stop().await;
    assert!(!port_file.exists());
}

#[tokio::test]
async fn second_daemon_in_the_same_workspace_is_refused() {
    let dir = workspace_with_graphs();
    let first = Daemon::start(dir.path()).await.unwrap();

    let err = match Daemon::start(dir.path()).await {
        Err(err) => err,
        Ok(_) => panic!("second daemon must not start"),
    };
    assert!(matches!(err, LifecycleError::LockHeld(_)));
    assert_eq!(err.exit_code(), 69);

    first.stop().await;
}

#[tokio::test]
async fn invalid_config_is_exit_code_64() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("gaffer.toml"), "agent_pool_size = 0\n").unwrap();

    let err = match Daemon::start(dir.path()).await {
        Err(err) => err,
        Ok(_) => panic!("invalid config must not start"),
    };
    assert!(matches!(err, LifecycleError::Config(_)));
    assert_eq!(err.exit_code(), 64);
}

#[tokio::test]
async fn daemon_recovers_sessions_on_startup() {
    let dir = workspace_with_graphs();

    // Seed a stranded planning session as a dead daemon would leave it.
    {
        let layout = gaffer_storage::Layout::new(dir.path().join("_AiDevLog"));
        let store = gaffer_storage::StateStore::new(layout);
        store.load().unwrap();
        let session = gaffer_core::Session::new(
            gaffer_core::SessionId::new(),
            "stranded".into(),
            vec![],
            0,
        );
        store.save_session(&session).unwrap();
    }

    let daemon = Daemon::start(dir.path()).await.unwrap();
    let sessions = daemon.sessions.sessions();
    assert_eq!(sessions.len(), 1);

    // The minimal planning graph completes immediately; the session lands
    // in reviewing (no plan output means no version is recorded).
    let manager = daemon.sessions.clone();
    let id = sessions[0].id;
    gaffer_engine::test_support::wait_until("stranded session recovered", move || {
        manager
            .get_session(id.as_str())
            .map(|s| s.status == gaffer_core::SessionStatus::Reviewing)
            .unwrap_or(false)
    })
    .await;

    daemon.stop().await;
}

#[tokio::test]
async fn pool_size_comes_from_config() {
    let dir = workspace_with_graphs();
    std::fs::write(dir.path().join("gaffer.toml"), "agent_pool_size = 3\n").unwrap();

    let daemon = Daemon::start(dir.path()).await.unwrap();
    assert_eq!(daemon.deps.pool.status().total, 3);
    daemon.stop().await;
}
