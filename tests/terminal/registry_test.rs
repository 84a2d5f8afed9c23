//! Integration tests for the session registry.

use agent_terminal::terminal::{
    CreateRequest, SessionCommand, SessionId, SurfaceId, TerminalError, TerminalSize,
};

use agent_terminal::config::TerminalConfig;

use super::{collect_until_exit, minimal_host, registry_with, sh_config, sh_registry, wait_until};

fn sh_command(script: &str) -> SessionCommand {
    SessionCommand::new("/bin/sh").args(["-c", script])
}

#[tokio::test]
async fn ids_are_sequential_from_one() {
    let (registry, _router) = sh_registry(minimal_host());

    let first = registry.create(CreateRequest::new("win1")).await.unwrap();
    let second = registry.create(CreateRequest::new("win1")).await.unwrap();

    assert_eq!(first.as_str(), "terminal-1");
    assert_eq!(second.as_str(), "terminal-2");

    let listed: Vec<SessionId> = registry.list().into_iter().map(|s| s.id).collect();
    assert_eq!(listed, vec![first, second]);
    assert_eq!(registry.stop_all(), 2);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn zero_size_falls_back_to_default() {
    let (registry, _router) = sh_registry(minimal_host());

    let id = registry
        .create(CreateRequest::new("win1").size(0, 40))
        .await
        .unwrap();

    let info = registry.list().pop().unwrap();
    assert_eq!(info.id, id);
    assert_eq!((info.cols, info.rows), (80, 40));
    registry.stop(&id);
}

#[tokio::test]
async fn resize_to_zero_is_ignored() {
    let (registry, _router) = sh_registry(minimal_host());
    let id = registry
        .create(CreateRequest::new("win1").size(100, 30))
        .await
        .unwrap();

    registry.resize(&id, 0, 0);
    let info = registry.list().pop().unwrap();
    assert_eq!((info.cols, info.rows), (100, 30));
    assert!(registry.contains(&id));

    registry.resize(&id, 120, 40);
    let info = registry.list().pop().unwrap();
    assert_eq!(
        TerminalSize {
            cols: info.cols,
            rows: info.rows
        },
        TerminalSize {
            cols: 120,
            rows: 40
        }
    );

    registry.stop(&id);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let (registry, _router) = sh_registry(minimal_host());
    let id = registry.create(CreateRequest::new("win1")).await.unwrap();

    assert!(registry.stop(&id));
    assert!(!registry.stop(&id));
    assert!(!registry.contains(&id));
}

#[tokio::test]
async fn unknown_session_operations_are_noops() {
    let (registry, _router) = sh_registry(minimal_host());
    let ghost = SessionId::from("terminal-99");

    registry.write(&ghost, b"echo hi\r");
    registry.send_line(&ghost, "echo hi");
    registry.resize(&ghost, 100, 30);
    assert_eq!(registry.read_buffer(&ghost, None), "");
    assert!(!registry.stop(&ghost));
    assert!(registry.provider_of(&ghost).is_none());
}

#[tokio::test]
async fn output_reaches_owner_and_exit_removes_session() {
    let (registry, router) = sh_registry(minimal_host());
    let mut events = router.register(SurfaceId::from("win1"));

    let id = registry
        .create(CreateRequest::new("win1").command(sh_command("printf hello")))
        .await
        .unwrap();

    let (output, exit_code) = collect_until_exit(&mut events, &id).await;
    assert!(output.contains("hello"), "output was {output:?}");
    assert_eq!(exit_code, 0);
    assert!(wait_until(|| !registry.contains(&id)).await);
}

#[tokio::test]
async fn exit_code_is_reported() {
    let (registry, router) = sh_registry(minimal_host());
    let mut events = router.register(SurfaceId::from("win1"));

    let id = registry
        .create(CreateRequest::new("win1").command(sh_command("exit 3")))
        .await
        .unwrap();

    let (_, exit_code) = collect_until_exit(&mut events, &id).await;
    assert_eq!(exit_code, 3);
}

#[tokio::test]
async fn written_input_is_executed_and_buffered() {
    let (registry, _router) = sh_registry(minimal_host());
    let id = registry.create(CreateRequest::new("win1")).await.unwrap();

    registry.send_line(&id, "echo round-trip-$((40+2))");

    assert!(
        wait_until(|| registry.read_buffer(&id, None).contains("round-trip-42")).await,
        "buffer was {:?}",
        registry.read_buffer(&id, None)
    );
    assert!(registry.read_buffer(&id, Some(1)).lines().count() <= 1);

    let whole = registry.read_buffer(&id, Some(0));
    assert!(whole.contains("round-trip-42"), "buffer was {whole:?}");
    assert!(whole.lines().count() > 1, "buffer was {whole:?}");
    registry.stop(&id);
}

#[tokio::test]
async fn chunked_output_keeps_its_order() {
    let (registry, router) = sh_registry(minimal_host());
    let mut events = router.register(SurfaceId::from("win1"));

    let id = registry
        .create(CreateRequest::new("win1").command(sh_command(
            "i=1; while [ $i -le 500 ]; do echo line-$i; i=$((i+1)); done",
        )))
        .await
        .unwrap();

    let (output, exit_code) = collect_until_exit(&mut events, &id).await;
    assert_eq!(exit_code, 0);

    let numbers: Vec<u32> = output
        .lines()
        .filter_map(|l| l.trim().strip_prefix("line-"))
        .filter_map(|n| n.parse().ok())
        .collect();
    assert_eq!(numbers, (1..=500).collect::<Vec<u32>>());
}

#[tokio::test]
async fn buffer_capacity_bounds_read_buffer() {
    let config = TerminalConfig {
        buffer_capacity: 64,
        ..sh_config()
    };
    let (registry, _router) = registry_with(config, minimal_host());
    let id = registry.create(CreateRequest::new("win1")).await.unwrap();

    registry.send_line(
        &id,
        "i=0; while [ $i -lt 50 ]; do printf abcdefghij; i=$((i+1)); done; echo; echo end-$((6*7))",
    );

    assert!(
        wait_until(|| registry.read_buffer(&id, None).contains("end-42")).await,
        "buffer was {:?}",
        registry.read_buffer(&id, None)
    );
    assert_eq!(registry.read_buffer(&id, None).len(), 64);
    registry.stop(&id);
}

#[tokio::test]
async fn marker_variables_are_stripped_and_term_is_forced() {
    let mut host = minimal_host();
    host.set_var("CLAUDECODE", "1");
    host.set_var("TERM", "dumb");
    let (registry, router) = sh_registry(host);
    let mut events = router.register(SurfaceId::from("win1"));

    let id = registry
        .create(
            CreateRequest::new("win1")
                .command(sh_command("echo marker=${CLAUDECODE:-unset} term=$TERM")),
        )
        .await
        .unwrap();

    let (output, _) = collect_until_exit(&mut events, &id).await;
    assert!(output.contains("marker=unset"), "output was {output:?}");
    assert!(output.contains("term=xterm-256color"), "output was {output:?}");
}

#[tokio::test]
async fn overlay_does_not_replace_host_values() {
    let mut host = minimal_host();
    host.set_var("AGENT_TEST_KEY", "from-host");
    let (registry, router) = sh_registry(host);
    let mut events = router.register(SurfaceId::from("win1"));

    let overlay = [
        ("AGENT_TEST_KEY", "from-overlay"),
        ("AGENT_TEST_EXTRA", "added"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let id = registry
        .create(
            CreateRequest::new("win1")
                .env(overlay)
                .command(sh_command("echo key=$AGENT_TEST_KEY extra=$AGENT_TEST_EXTRA")),
        )
        .await
        .unwrap();

    let (output, _) = collect_until_exit(&mut events, &id).await;
    assert!(output.contains("key=from-host"), "output was {output:?}");
    assert!(output.contains("extra=added"), "output was {output:?}");
}

#[tokio::test]
async fn failed_spawn_registers_nothing() {
    let (registry, _router) = sh_registry(minimal_host());

    let err = registry
        .create(CreateRequest::new("win1").command(SessionCommand::new("/nonexistent/agent-cli")))
        .await
        .unwrap_err();
    assert!(matches!(err, TerminalError::SpawnFailed { .. }));
    assert!(registry.is_empty());

    let id = registry.create(CreateRequest::new("win1")).await.unwrap();
    assert_eq!(id.as_str(), "terminal-1");
    registry.stop(&id);
}

#[tokio::test]
async fn events_only_reach_the_owning_surface() {
    let (registry, router) = sh_registry(minimal_host());
    let mut mine = router.register(SurfaceId::from("win1"));
    let mut other = router.register(SurfaceId::from("win2"));

    let id = registry
        .create(CreateRequest::new("win1").command(sh_command("printf routed")))
        .await
        .unwrap();

    let (output, _) = collect_until_exit(&mut mine, &id).await;
    assert!(output.contains("routed"));
    assert!(other.try_recv().is_err());
}
