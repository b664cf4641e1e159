// crates/sqlgate-core/tests/source_handle.rs
// ============================================================================
// Module: Source Handle Tests
// Description: Hot-swap, pending update, and close semantics.
// Purpose: Validate that swaps never disturb in-flight queries.
// Dependencies: sqlgate-core
// ============================================================================

//! ## Overview
//! Exercises [`SourceHandle`] against gated in-memory connections:
//! - Swap under load stages an update and leaves the running query alone
//! - The newest pending update wins and losers are closed
//! - Close is idempotent and poisons later queries and swaps

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use common::MemoryQueryable;
use common::query_id;
use sqlgate_core::QueryContext;
use sqlgate_core::QueryError;
use sqlgate_core::SourceHandle;
use sqlgate_core::SourceOptions;
use sqlgate_core::SwapOutcome;

#[test]
fn swap_under_load_keeps_running_query_on_old_connection() {
    let (old_db, old_closed, control) = MemoryQueryable::gated(1);
    let handle = Arc::new(SourceHandle::new("main", SourceOptions::new("Main"), old_db));

    let worker = {
        let handle = Arc::clone(&handle);
        thread::spawn(move || query_id(&handle))
    };
    control.started.recv_timeout(Duration::from_secs(5)).unwrap();

    let (new_db, new_closed) = MemoryQueryable::new(2);
    let outcome = handle.swap(new_db, SourceOptions::new("Main v2")).unwrap();
    assert_eq!(outcome, SwapOutcome::Staged);
    assert!(handle.has_pending_update());
    assert!(!handle.try_apply_pending_update());

    control.release.send(()).unwrap();
    assert_eq!(worker.join().unwrap().unwrap(), 1);

    assert!(handle.try_apply_pending_update());
    assert!(old_closed.load(Ordering::Acquire));
    assert!(!new_closed.load(Ordering::Acquire));
    assert_eq!(query_id(&handle).unwrap(), 2);
    assert_eq!(handle.label(), "Main v2");
}

#[test]
fn idle_swap_applies_immediately() {
    let (old_db, old_closed) = MemoryQueryable::new(1);
    let handle = SourceHandle::new("main", SourceOptions::default(), old_db);
    let (new_db, _) = MemoryQueryable::new(2);
    let options = SourceOptions::new("Rotated").with_named("total", "select count(*) n from t");

    assert_eq!(handle.swap(new_db, options).unwrap(), SwapOutcome::Applied);
    assert!(old_closed.load(Ordering::Acquire));
    assert_eq!(query_id(&handle).unwrap(), 2);
    assert_eq!(handle.label(), "Rotated");
    assert_eq!(
        handle.named_queries().get("total").map(String::as_str),
        Some("select count(*) n from t")
    );
}

#[test]
fn newer_pending_update_supersedes_older() {
    let (old_db, _, control) = MemoryQueryable::gated(1);
    let handle = Arc::new(SourceHandle::new("main", SourceOptions::default(), old_db));
    let worker = {
        let handle = Arc::clone(&handle);
        thread::spawn(move || query_id(&handle))
    };
    control.started.recv_timeout(Duration::from_secs(5)).unwrap();

    let (second, second_closed) = MemoryQueryable::new(2);
    let (third, third_closed) = MemoryQueryable::new(3);
    assert_eq!(handle.swap(second, SourceOptions::default()).unwrap(), SwapOutcome::Staged);
    assert_eq!(handle.swap(third, SourceOptions::default()).unwrap(), SwapOutcome::Staged);
    assert!(second_closed.load(Ordering::Acquire));
    assert!(!third_closed.load(Ordering::Acquire));

    control.release.send(()).unwrap();
    worker.join().unwrap().unwrap();
    assert!(handle.try_apply_pending_update());
    assert_eq!(query_id(&handle).unwrap(), 3);
}

#[test]
fn direct_swap_discards_stale_pending_update() {
    let (old_db, _, control) = MemoryQueryable::gated(1);
    let handle = Arc::new(SourceHandle::new("main", SourceOptions::default(), old_db));
    let worker = {
        let handle = Arc::clone(&handle);
        thread::spawn(move || query_id(&handle))
    };
    control.started.recv_timeout(Duration::from_secs(5)).unwrap();
    let (staged, staged_closed) = MemoryQueryable::new(2);
    handle.swap(staged, SourceOptions::default()).unwrap();
    control.release.send(()).unwrap();
    worker.join().unwrap().unwrap();

    let (direct, _) = MemoryQueryable::new(3);
    assert_eq!(handle.swap(direct, SourceOptions::default()).unwrap(), SwapOutcome::Applied);
    assert!(staged_closed.load(Ordering::Acquire));
    assert!(!handle.try_apply_pending_update());
    assert_eq!(query_id(&handle).unwrap(), 3);
}

#[test]
fn close_is_idempotent() {
    let (db, closed) = MemoryQueryable::new(1);
    let handle = SourceHandle::new("main", SourceOptions::default(), db);
    handle.close().unwrap();
    handle.close().unwrap();
    assert!(closed.load(Ordering::Acquire));
    assert!(handle.is_closed());
    assert_eq!(query_id(&handle).unwrap_err(), QueryError::Closed);
}

#[test]
fn swap_on_closed_handle_fails_and_closes_replacement() {
    let (db, _) = MemoryQueryable::new(1);
    let handle = SourceHandle::new("main", SourceOptions::default(), db);
    handle.close().unwrap();
    let (replacement, replacement_closed) = MemoryQueryable::new(2);
    let err = handle.swap(replacement, SourceOptions::default()).unwrap_err();
    assert_eq!(err, QueryError::Closed);
    assert!(replacement_closed.load(Ordering::Acquire));
}

#[test]
fn close_discards_pending_update() {
    let (old_db, _, control) = MemoryQueryable::gated(1);
    let handle = Arc::new(SourceHandle::new("main", SourceOptions::default(), old_db));
    let worker = {
        let handle = Arc::clone(&handle);
        thread::spawn(move || query_id(&handle))
    };
    control.started.recv_timeout(Duration::from_secs(5)).unwrap();
    let (staged, staged_closed) = MemoryQueryable::new(2);
    handle.swap(staged, SourceOptions::default()).unwrap();
    control.release.send(()).unwrap();
    worker.join().unwrap().unwrap();

    handle.close().unwrap();
    assert!(staged_closed.load(Ordering::Acquire));
    assert!(!handle.has_pending_update());
}

#[test]
fn cancelled_context_aborts_query() {
    let (db, _) = MemoryQueryable::new(1);
    let handle = SourceHandle::new("main", SourceOptions::default(), db);
    let ctx = QueryContext::new();
    drop(ctx.cancel_on_drop());
    let err = handle.query(&ctx, "select 1", &[], &mut |_| Ok(())).unwrap_err();
    assert_eq!(err, QueryError::Cancelled);
}

#[test]
fn disarmed_guard_leaves_context_live() {
    let ctx = QueryContext::with_timeout(Some(Duration::from_secs(60)));
    ctx.cancel_on_drop().disarm();
    assert!(!ctx.is_done());
    assert!(ctx.deadline().is_some());
    assert!(QueryContext::with_timeout(Some(Duration::ZERO)).deadline().is_none());
}

#[test]
fn elapsed_deadline_reports_deadline_exceeded() {
    let ctx = QueryContext::with_timeout(Some(Duration::from_millis(1)));
    thread::sleep(Duration::from_millis(10));
    assert_eq!(ctx.check().unwrap_err(), QueryError::DeadlineExceeded);
}
