//! Integration tests for lifecycle-driven teardown.

use std::time::Duration;

use agent_terminal::terminal::{
    CreateRequest, LifecycleEvent, LifecycleSupervisor, SessionCommand, SessionEvent, SurfaceId,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{minimal_host, sh_registry, wait_until, WAIT};

#[tokio::test]
async fn destroyed_surface_disposes_only_its_sessions() {
    let (registry, router) = sh_registry(minimal_host());
    let _rx = router.register(SurfaceId::from("win1"));

    let a = registry.create(CreateRequest::new("win1")).await.unwrap();
    let b = registry.create(CreateRequest::new("win1")).await.unwrap();
    let c = registry.create(CreateRequest::new("win2")).await.unwrap();

    let supervisor = LifecycleSupervisor::new(registry.clone());
    let stopped = supervisor.handle(&LifecycleEvent::SurfaceDestroyed(SurfaceId::from("win1")));

    assert_eq!(stopped, 2);
    assert!(!registry.contains(&a));
    assert!(!registry.contains(&b));
    assert!(registry.contains(&c));
    assert!(!router.is_registered(&SurfaceId::from("win1")));

    registry.stop(&c);
}

#[tokio::test]
async fn repeated_teardown_is_harmless() {
    let (registry, _router) = sh_registry(minimal_host());
    let id = registry.create(CreateRequest::new("win1")).await.unwrap();

    let supervisor = LifecycleSupervisor::new(registry.clone());
    let event = LifecycleEvent::SurfaceDestroyed(SurfaceId::from("win1"));
    assert_eq!(supervisor.handle(&event), 1);
    assert_eq!(supervisor.handle(&event), 0);
    assert_eq!(supervisor.handle(&LifecycleEvent::AppQuitting), 0);
    assert!(!registry.stop(&id));
}

#[tokio::test]
async fn app_quitting_stops_everything() {
    let (registry, _router) = sh_registry(minimal_host());
    registry.create(CreateRequest::new("win1")).await.unwrap();
    registry.create(CreateRequest::new("win2")).await.unwrap();

    let (tx, rx) = mpsc::channel(4);
    let handle = LifecycleSupervisor::new(registry.clone()).spawn(rx, CancellationToken::new());

    tx.send(LifecycleEvent::AppQuitting).await.unwrap();
    tokio::time::timeout(WAIT, handle)
        .await
        .expect("supervisor should stop after quitting")
        .expect("supervisor task panicked");

    assert!(registry.is_empty());
}

#[tokio::test]
async fn cancelled_supervisor_cleans_up() {
    let (registry, _router) = sh_registry(minimal_host());
    registry.create(CreateRequest::new("win1")).await.unwrap();

    let (_tx, rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let handle = LifecycleSupervisor::new(registry.clone()).spawn(rx, cancel.clone());

    cancel.cancel();
    tokio::time::timeout(WAIT, handle)
        .await
        .expect("supervisor should stop on cancel")
        .expect("supervisor task panicked");

    assert!(registry.is_empty());
}

#[tokio::test]
async fn exit_racing_teardown_reports_at_most_one_exit() {
    let (registry, router) = sh_registry(minimal_host());
    let mut events = router.register(SurfaceId::from("win1"));

    let id = registry
        .create(
            CreateRequest::new("win1")
                .command(SessionCommand::new("/bin/sh").args(["-c", "exit 0"])),
        )
        .await
        .unwrap();

    let supervisor = LifecycleSupervisor::new(registry.clone());
    let stopped = supervisor.handle(&LifecycleEvent::SurfaceDestroyed(SurfaceId::from("win1")));
    assert!(stopped <= 1);

    let mut exits = 0;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(500), events.recv()).await
    {
        if matches!(event, SessionEvent::Exit { ref session_id, .. } if session_id == &id) {
            exits += 1;
        }
    }
    assert!(exits <= 1, "saw {exits} exit events");
    assert!(wait_until(|| registry.list().is_empty()).await);
    assert!(!registry.stop(&id));
}
