//! End-to-end request scenarios against the dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use pagewire::app::AppManager;
use pagewire::error::{DispatchError, RequestError};
use pagewire::menu::{NavigationEntry, NavigationMenu};
use pagewire::protocol::{Action, ActionPayload, Operation};
use pagewire::request::OperationsContext;
use pagewire::widget::{Widget, WidgetHandle};

mod common;

use common::{
    ScriptedApp, SharedApp, dispatcher_for, hello_app, nav_request, ops_request, ops_request_with,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn text(body: &str) -> Operation {
    Operation::Text {
        container: "root".to_string(),
        body: body.to_string(),
        help: None,
    }
}

/// Sets its flag when dropped, e.g. when the task owning it is aborted.
struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn sidebar_menu() -> NavigationMenu {
    NavigationMenu::sidebar(vec![
        NavigationEntry::new("home", "Home").unwrap().as_default(),
        NavigationEntry::new("about", "About").unwrap(),
    ])
    .unwrap()
}

// ============================================================================
// Operations
// ============================================================================

#[tokio::test]
async fn test_render_title_and_text() {
    let dispatcher = dispatcher_for(hello_app());

    let ops = dispatcher.run_operations(ops_request("s1", 1)).await.unwrap();

    assert_eq!(
        ops,
        vec![
            Operation::Title {
                container: "root".to_string(),
                body: "Hello".to_string(),
                anchor: None,
                help: None,
            },
            text("World"),
            Operation::end(false, false),
        ]
    );
    let session = dispatcher.registry().get("s1").unwrap();
    assert_eq!(session.current_seq(), 1);
    assert!(session.current_operations().is_none());
}

#[tokio::test]
async fn test_supersession_cancels_previous_request() {
    // seq 1 renders one line and then hangs until cancelled.
    let dispatcher = dispatcher_for(ScriptedApp::new(|ctx| async move {
        if ctx.seq() == 1 {
            ctx.root().text("first")?;
            std::future::pending::<()>().await;
        }
        ctx.root().text("second")?;
        Ok(())
    }));

    let mut first = dispatcher.submit_operations(ops_request("s1", 1)).await.unwrap();
    assert_eq!(first.next().await, Some(text("first")));

    let second = tokio::time::timeout(TIMEOUT, dispatcher.run_operations(ops_request("s1", 2)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second, vec![text("second"), Operation::end(false, false)]);

    let rest: Vec<Operation> = tokio::time::timeout(TIMEOUT, first.collect())
        .await
        .unwrap();
    assert_eq!(rest, vec![Operation::end(false, true)]);
}

#[tokio::test]
async fn test_supersession_interrupts_background_tasks() {
    let task_dropped = Arc::new(AtomicBool::new(false));
    let first_ctx: Arc<Mutex<Option<Arc<OperationsContext>>>> = Arc::default();

    let dropped = task_dropped.clone();
    let slot = first_ctx.clone();
    let dispatcher = dispatcher_for(ScriptedApp::new(move |ctx| {
        let dropped = dropped.clone();
        let slot = slot.clone();
        async move {
            if ctx.seq() == 1 {
                *slot.lock().unwrap() = Some(ctx.clone());
                let guard = SetOnDrop(dropped);
                let late = ctx.clone();
                // A long-running task that would write after supersession.
                ctx.execute(async move {
                    let _guard = guard;
                    std::future::pending::<()>().await;
                    late.root().text("late")?;
                    Ok(())
                })?;
                ctx.root().text("first")?;
                return Ok(());
            }
            ctx.root().text("second")?;
            Ok(())
        }
    }));

    let mut first = dispatcher.submit_operations(ops_request("s1", 1)).await.unwrap();
    assert_eq!(first.next().await, Some(text("first")));

    let second = tokio::time::timeout(TIMEOUT, dispatcher.run_operations(ops_request("s1", 2)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second, vec![text("second"), Operation::end(false, false)]);

    tokio::time::timeout(TIMEOUT, async {
        while !task_dropped.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("background task should be interrupted");

    // Writes through the superseded context are refused.
    let old = first_ctx.lock().unwrap().clone().unwrap();
    assert!(matches!(
        old.root().text("late"),
        Err(RequestError::Cancelled)
    ));

    let rest: Vec<Operation> = tokio::time::timeout(TIMEOUT, first.collect())
        .await
        .unwrap();
    assert_eq!(rest, vec![Operation::end(false, true)]);
}

#[tokio::test]
async fn test_operations_accept_equal_seq_and_reject_older() {
    let dispatcher = dispatcher_for(hello_app());

    dispatcher.run_operations(ops_request("s1", 5)).await.unwrap();
    // Same seq is a re-render of the same state.
    dispatcher.run_operations(ops_request("s1", 5)).await.unwrap();

    let err = dispatcher
        .submit_operations(ops_request("s1", 4))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, DispatchError::Stale { seq: 4, current: 5, .. }));
    assert_eq!(dispatcher.registry().get("s1").unwrap().current_seq(), 5);
}

#[tokio::test]
async fn test_render_failure_is_published_and_stream_cancelled() {
    let dispatcher = dispatcher_for(ScriptedApp::new(|ctx| async move {
        ctx.root().text("partial")?;
        Err(RequestError::app("boom"))
    }));
    let mut failures = dispatcher.subscribe_failures();

    let ops = dispatcher.run_operations(ops_request("s1", 1)).await.unwrap();
    assert_eq!(ops.last(), Some(&Operation::end(false, true)));
    assert_eq!(ops.iter().filter(|op| op.is_end()).count(), 1);

    let failure = tokio::time::timeout(TIMEOUT, failures.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failure.session_id, "s1");
    assert_eq!(failure.seq, 1);
    assert!(failure.message.contains("boom"));

    // The session survives a failed request.
    let session = dispatcher.registry().get("s1").unwrap();
    assert!(!session.is_closed());
}

#[tokio::test]
async fn test_failing_background_task_cancels_request() {
    let dispatcher = dispatcher_for(ScriptedApp::new(|ctx| async move {
        ctx.execute(async { Err(RequestError::app("task failed")) })?;
        Ok(())
    }));
    let mut failures = dispatcher.subscribe_failures();

    let ops = dispatcher.run_operations(ops_request("s1", 1)).await.unwrap();
    assert_eq!(ops, vec![Operation::end(false, true)]);

    let failure = failures.recv().await.unwrap();
    assert!(failure.message.contains("task failed"));
}

#[tokio::test]
async fn test_write_stream_completes_before_end() {
    let dispatcher = dispatcher_for(ScriptedApp::new(|ctx| async move {
        let chunks = futures::stream::iter(["a", "b", "c"].map(str::to_string));
        ctx.root().write_stream(chunks)?;
        Ok(())
    }));

    let ops = dispatcher.run_operations(ops_request("s1", 1)).await.unwrap();
    assert_eq!(ops.len(), 4);

    let Operation::WriteStreamChunk {
        container, key, ..
    } = &ops[0]
    else {
        panic!("expected a stream chunk, got {:?}", ops[0]);
    };
    assert_eq!(container.as_deref(), Some("root"));
    assert!(key.starts_with("root(stream_"));
    assert!(matches!(&ops[2], Operation::WriteStreamChunk { is_last: true, container: None, .. }));
    assert_eq!(ops[3], Operation::end(false, false));
}

// ============================================================================
// Widgets & Actions
// ============================================================================

#[tokio::test]
async fn test_changed_flag_visible_during_render_and_reset_after_end() {
    let checkbox: WidgetHandle = Widget::checkbox("Agree").into();
    let seen_changed = Arc::new(AtomicBool::new(false));

    let widget = checkbox.clone();
    let seen = seen_changed.clone();
    let dispatcher = dispatcher_for(ScriptedApp::new(move |ctx| {
        let widget = widget.clone();
        let seen = seen.clone();
        async move {
            ctx.root().widget(&widget)?;
            seen.store(widget.changed(), Ordering::SeqCst);
            Ok(())
        }
    }));

    // First render registers the widget.
    dispatcher.run_operations(ops_request("s1", 1)).await.unwrap();
    assert!(!seen_changed.load(Ordering::SeqCst));

    let click = Action::new(checkbox.key(), ActionPayload::Checkbox { value: true });
    dispatcher
        .run_operations(ops_request_with("s1", 2, vec![click]))
        .await
        .unwrap();

    assert!(seen_changed.load(Ordering::SeqCst));
    assert_eq!(checkbox.value().as_bool(), Some(true));
    // End has been drained, so the change is consumed.
    assert!(!checkbox.changed());
}

#[tokio::test]
async fn test_changed_flag_visible_from_background_task() {
    let checkbox: WidgetHandle = Widget::checkbox("Agree").into();
    let seen_changed = Arc::new(AtomicBool::new(false));

    let widget = checkbox.clone();
    let seen = seen_changed.clone();
    let dispatcher = dispatcher_for(ScriptedApp::new(move |ctx| {
        let widget = widget.clone();
        let seen = seen.clone();
        async move {
            ctx.root().widget(&widget)?;
            let task_widget = widget.clone();
            ctx.execute(async move {
                // Read after render has returned.
                tokio::time::sleep(Duration::from_millis(20)).await;
                seen.store(task_widget.changed(), Ordering::SeqCst);
                Ok(())
            })?;
            Ok(())
        }
    }));

    dispatcher.run_operations(ops_request("s1", 1)).await.unwrap();
    assert!(!seen_changed.load(Ordering::SeqCst));

    let click = Action::new(checkbox.key(), ActionPayload::Checkbox { value: true });
    dispatcher
        .run_operations(ops_request_with("s1", 2, vec![click]))
        .await
        .unwrap();

    assert!(seen_changed.load(Ordering::SeqCst));
    assert!(!checkbox.changed());
}

#[tokio::test]
async fn test_action_for_unknown_widget_is_ignored() {
    let dispatcher = dispatcher_for(hello_app());
    let action = Action::new("widget_missing", ActionPayload::Button);

    let ops = dispatcher
        .run_operations(ops_request_with("s1", 1, vec![action]))
        .await
        .unwrap();
    assert_eq!(ops.last(), Some(&Operation::end(false, false)));
}

// ============================================================================
// Navigation
// ============================================================================

#[tokio::test]
async fn test_navigation_returns_menu() {
    let dispatcher = dispatcher_for(hello_app().with_menu(sidebar_menu()));

    let response = dispatcher.submit_navigation(nav_request("s1", 1)).await.unwrap();
    assert!(!response.cancelled);

    let navigation = response.navigation.unwrap();
    assert_eq!(navigation.items[0].entries.len(), 2);
    assert!(navigation.items[0].entries[0].is_default);
}

#[tokio::test]
async fn test_navigation_without_menu() {
    let dispatcher = dispatcher_for(hello_app());
    let response = dispatcher.submit_navigation(nav_request("s1", 1)).await.unwrap();
    assert!(response.navigation.is_none());
    assert!(!response.cancelled);
}

#[tokio::test]
async fn test_duplicate_navigation_seq_is_stale() {
    let dispatcher = dispatcher_for(hello_app().with_menu(sidebar_menu()));

    dispatcher.submit_navigation(nav_request("s1", 3)).await.unwrap();
    let err = dispatcher
        .submit_navigation(nav_request("s1", 3))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Stale { seq: 3, current: 3, .. }));
    assert_eq!(dispatcher.registry().get("s1").unwrap().current_seq(), 3);
}

#[tokio::test]
async fn test_navigation_and_operations_share_sequence() {
    let dispatcher = dispatcher_for(hello_app());

    dispatcher.run_operations(ops_request("s1", 2)).await.unwrap();
    // Navigation needs a strictly newer seq than the last operations request.
    assert!(dispatcher.submit_navigation(nav_request("s1", 2)).await.is_err());
    dispatcher.submit_navigation(nav_request("s1", 3)).await.unwrap();
    // Operations may reuse the seq navigation advanced to.
    dispatcher.run_operations(ops_request("s1", 3)).await.unwrap();
}

// ============================================================================
// Eviction
// ============================================================================

#[tokio::test]
async fn test_evicted_session_is_recreated_fresh() {
    let apps: Arc<dyn AppManager> = Arc::new(SharedApp(Arc::new(hello_app())));
    let dispatcher = pagewire::dispatcher::Dispatcher::new(
        pagewire::session::SessionRegistry::new(),
        apps.clone(),
    );

    dispatcher.run_operations(ops_request("s1", 7)).await.unwrap();
    let old = dispatcher.registry().get("s1").unwrap();

    let evicted = dispatcher
        .registry()
        .evict_idle(chrono::Duration::zero(), apps.as_ref())
        .await;
    assert_eq!(evicted, 1);
    assert!(old.is_closed());

    // A low seq is fine again: the new session starts from zero.
    let ops = dispatcher.run_operations(ops_request("s1", 1)).await.unwrap();
    assert_eq!(ops.last(), Some(&Operation::end(false, false)));

    let fresh = dispatcher.registry().get("s1").unwrap();
    assert!(!Arc::ptr_eq(&old, &fresh));
    assert_eq!(fresh.current_seq(), 1);
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_render() {
    let dispatcher = dispatcher_for(ScriptedApp::new(|_ctx| async move {
        std::future::pending::<()>().await;
        Ok(())
    }));

    let stream = dispatcher.submit_operations(ops_request("s1", 1)).await.unwrap();
    tokio::time::timeout(TIMEOUT, dispatcher.shutdown())
        .await
        .unwrap();

    let ops: Vec<Operation> = stream.collect().await;
    assert_eq!(ops, vec![Operation::end(false, true)]);
    assert!(dispatcher.registry().is_empty());
    assert_eq!(dispatcher.pending_tasks(), 0);
}
