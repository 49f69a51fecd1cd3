//! Integration tests for `DeviceLifecycle` state transitions and the close
//! handle handshake.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use line_device::lifecycle::{DeviceLifecycle, DeviceState};
use line_device::read_loop::{close_handle, CloseSignal};
use line_device::AppError;

use super::test_helpers::{scripted, WAIT};

#[tokio::test]
async fn new_lifecycle_is_closed() {
    let (transport, _script) = scripted();
    let lifecycle = DeviceLifecycle::new(Box::new(transport));

    assert_eq!(lifecycle.state(), DeviceState::Closed);
    assert!(!lifecycle.is_open());
    assert!(lifecycle.session_id().is_none());
    assert!(lifecycle.stream().is_none());
}

#[tokio::test]
async fn close_waits_for_loop_completion_before_closing_stream() {
    let (transport, script) = scripted();
    let lifecycle = Arc::new(DeviceLifecycle::new(Box::new(transport)));
    let signal_slot: Arc<Mutex<Option<CloseSignal>>> = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&signal_slot);
    lifecycle
        .open(move |_, _, _| {
            let (signal, handle) = close_handle();
            *slot.lock().expect("slot") = Some(signal);
            handle
        })
        .await
        .expect("open");
    assert!(lifecycle.is_open());
    assert!(lifecycle.stream().is_some());

    let closing = tokio::spawn({
        let lifecycle = Arc::clone(&lifecycle);
        async move { lifecycle.close().await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(lifecycle.state(), DeviceState::Closing);
    assert_eq!(script.closes(), 0, "stream closed before the loop completed");
    assert!(lifecycle.stream().is_none(), "no stream outside Open");

    let signal = signal_slot.lock().expect("slot").take().expect("signal stored");
    signal.complete();

    tokio::time::timeout(WAIT, closing)
        .await
        .expect("close finishes once signalled")
        .expect("close task")
        .expect("close succeeds");
    assert_eq!(lifecycle.state(), DeviceState::Closed);
    assert_eq!(script.closes(), 1);
}

#[tokio::test]
async fn dropped_signal_still_releases_close() {
    let (transport, script) = scripted();
    let lifecycle = DeviceLifecycle::new(Box::new(transport));

    lifecycle
        .open(|_, _, _| {
            let (signal, handle) = close_handle();
            drop(signal);
            handle
        })
        .await
        .expect("open");

    tokio::time::timeout(WAIT, lifecycle.close())
        .await
        .expect("close must not hang")
        .expect("close succeeds");
    assert_eq!(lifecycle.state(), DeviceState::Closed);
    assert_eq!(script.closes(), 1);
}

#[tokio::test]
async fn second_open_is_noop() {
    let (transport, script) = scripted();
    let lifecycle = DeviceLifecycle::new(Box::new(transport));
    let starts = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let starts = Arc::clone(&starts);
        lifecycle
            .open(move |_, _, _| {
                starts.fetch_add(1, Ordering::SeqCst);
                close_handle().1
            })
            .await
            .expect("open");
    }

    assert_eq!(script.opens(), 1, "transport opened exactly once");
    assert_eq!(starts.load(Ordering::SeqCst), 1, "read loop started exactly once");
}

#[tokio::test]
async fn close_when_never_opened_is_noop() {
    let (transport, script) = scripted();
    let lifecycle = DeviceLifecycle::new(Box::new(transport));

    tokio::time::timeout(WAIT, lifecycle.close())
        .await
        .expect("close must not block")
        .expect("close succeeds");
    tokio::time::timeout(WAIT, lifecycle.close())
        .await
        .expect("close must not block")
        .expect("close succeeds");

    assert_eq!(lifecycle.state(), DeviceState::Closed);
    assert_eq!(script.closes(), 0);
}

#[tokio::test]
async fn each_session_gets_fresh_id_and_token() {
    let (transport, _script) = scripted();
    let lifecycle = DeviceLifecycle::new(Box::new(transport));
    let tokens = Arc::new(Mutex::new(Vec::new()));

    let mut ids = Vec::new();
    for _ in 0..2 {
        let tokens = Arc::clone(&tokens);
        lifecycle
            .open(move |_, _, cancel| {
                let (signal, handle) = close_handle();
                tokens.lock().expect("tokens").push(cancel.clone());
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    signal.complete();
                });
                handle
            })
            .await
            .expect("open");
        ids.push(lifecycle.session_id().expect("session id while open"));
        lifecycle.close().await.expect("close");
    }

    assert_ne!(ids[0], ids[1]);
    let tokens = tokens.lock().expect("tokens");
    assert_eq!(tokens.len(), 2);
    assert!(tokens.iter().all(tokio_util::sync::CancellationToken::is_cancelled));
}

#[tokio::test]
async fn open_while_closing_is_invalid_state() {
    let (transport, _script) = scripted();
    let lifecycle = Arc::new(DeviceLifecycle::new(Box::new(transport)));
    let signal_slot: Arc<Mutex<Option<CloseSignal>>> = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&signal_slot);
    lifecycle
        .open(move |_, _, _| {
            let (signal, handle) = close_handle();
            *slot.lock().expect("slot") = Some(signal);
            handle
        })
        .await
        .expect("open");

    let closing = tokio::spawn({
        let lifecycle = Arc::clone(&lifecycle);
        async move { lifecycle.close().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = lifecycle
        .open(|_, _, _| close_handle().1)
        .await
        .expect_err("open during close");
    assert!(matches!(err, AppError::InvalidState(_)), "got {err:?}");

    if let Some(signal) = signal_slot.lock().expect("slot").take() {
        signal.complete();
    }
    closing.await.expect("close task").expect("close succeeds");
}

#[tokio::test]
async fn dispose_cancels_session_without_waiting() {
    let (transport, script) = scripted();
    let lifecycle = DeviceLifecycle::new(Box::new(transport));
    let token_slot = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&token_slot);
    lifecycle
        .open(move |_, _, cancel| {
            // The signal is kept alive but never completed.
            let (signal, handle) = close_handle();
            *slot.lock().expect("slot") = Some((cancel, signal));
            handle
        })
        .await
        .expect("open");

    lifecycle.dispose();
    lifecycle.dispose();

    assert_eq!(lifecycle.state(), DeviceState::Closed);
    assert_eq!(script.disposes(), 1, "stream released exactly once");
    let (token, _signal) = token_slot.lock().expect("slot").take().expect("token");
    assert!(token.is_cancelled());
}
