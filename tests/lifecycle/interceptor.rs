use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use channel_refresh::{
    CallContext, ConnectionManager, ConnectionManagerBuilder, ContextError, LifecycleEvent, Logger,
    MIN_CONNECTION_AGE, RetryEvent,
};

use super::support::{unavailable, MockDialer, RecordingSink};

fn manager(max_retries: u32, dialer: MockDialer) -> ConnectionManager<MockDialer> {
    ConnectionManager::new("svc", Duration::from_secs(60), max_retries, false, dialer)
}

#[tokio::test(start_paused = true)]
async fn always_transient_call_is_invoked_exactly_max_retries_times() {
    for max_retries in 1..=5u32 {
        let manager = manager(max_retries, MockDialer::new());
        let channel = manager.get_connection().unwrap();
        let calls = AtomicUsize::new(0);

        let result = channel
            .call(&CallContext::new(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(unavailable(&format!("attempt {n}"))) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), max_retries as usize);
        let err = result.unwrap_err().into_call().unwrap();
        assert_eq!(err.to_string(), format!("attempt {}", max_retries - 1));
    }
}

#[tokio::test(start_paused = true)]
async fn zero_budget_still_invokes_once() {
    let manager = manager(0, MockDialer::new());
    let channel = manager.get_connection().unwrap();
    let calls = AtomicUsize::new(0);

    let result = channel
        .call(&CallContext::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(unavailable("down")) }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn non_transient_error_short_circuits() {
    for max_retries in [1u32, 3, 10] {
        let manager = manager(max_retries, MockDialer::new());
        let channel = manager.get_connection().unwrap();
        let calls = AtomicUsize::new(0);

        let result = channel
            .call(&CallContext::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(io::Error::new(io::ErrorKind::InvalidInput, "bad request")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            result.unwrap_err().into_call().unwrap().kind(),
            io::ErrorKind::InvalidInput
        );
    }
}

#[tokio::test(start_paused = true)]
async fn recovers_after_transient_failures() {
    let manager = manager(3, MockDialer::new());
    let channel = manager.get_connection().unwrap();
    let calls = AtomicUsize::new(0);

    let result = channel
        .call(&CallContext::new(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "deadline"))
                } else {
                    Ok("served")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "served");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_between_attempts() {
    let manager = manager(4, MockDialer::new());
    let channel = manager.get_connection().unwrap();
    let started = tokio::time::Instant::now();
    let seen = Mutex::new(Vec::new());

    let _ = channel
        .call(&CallContext::new(), |_| {
            seen.lock().unwrap().push(started.elapsed());
            async { Err::<(), _>(unavailable("down")) }
        })
        .await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Duration::ZERO,
            Duration::from_millis(100),
            Duration::from_millis(300),
            Duration::from_millis(700),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_wins_over_transient_error() {
    let manager = ConnectionManagerBuilder::new("svc")
        .max_retries(5)
        .fixed_backoff(Duration::from_secs(10))
        .build(MockDialer::new());
    let channel = manager.get_connection().unwrap();
    let ctx = CallContext::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let canceller = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            ctx.cancel();
        })
    };

    let result = channel
        .call(&ctx, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(unavailable("down")) }
        })
        .await;
    canceller.await.unwrap();

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_interrupts_slow_call() {
    let manager = manager(3, MockDialer::new());
    let channel = manager.get_connection().unwrap();
    let ctx = CallContext::with_timeout(Duration::from_millis(500));

    let result = channel
        .call(&ctx, |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, io::Error>(())
        })
        .await;

    assert!(matches!(
        result,
        Err(channel_refresh::CallError::Context(ContextError::DeadlineExceeded))
    ));
}

#[tokio::test(start_paused = true)]
async fn retries_move_to_reconnected_channel() {
    let dialer = MockDialer::new();
    let manager = ConnectionManagerBuilder::new("svc")
        .max_connection_age(Duration::from_secs(60))
        .max_retries(3)
        .fixed_backoff(Duration::from_secs(16))
        .build(dialer.clone());
    let channel = manager.get_connection().unwrap();
    let used = Mutex::new(Vec::new());

    let result = channel
        .call(&CallContext::new(), |handle| {
            used.lock().unwrap().push(handle.id);
            let id = handle.id;
            async move {
                if id == 0 {
                    Err(unavailable("stale backend"))
                } else {
                    Ok(id)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(*used.lock().unwrap(), vec![0, 1]);
    assert_eq!(dialer.dials(), 2);
    assert_eq!(manager.current().unwrap().id, 1);
}

#[tokio::test(start_paused = true)]
async fn throttled_reconnect_keeps_current_channel() {
    let dialer = MockDialer::new();
    let manager = manager(3, dialer.clone());
    let channel = manager.get_connection().unwrap();
    let used = Mutex::new(Vec::new());

    let _ = channel
        .call(&CallContext::new(), |handle| {
            used.lock().unwrap().push(handle.id);
            async { Err::<(), _>(unavailable("down")) }
        })
        .await;

    assert_eq!(*used.lock().unwrap(), vec![0, 0, 0]);
    assert_eq!(dialer.dials(), 1);
}

#[tokio::test(start_paused = true)]
async fn final_transient_failure_still_forces_reconnect() {
    let dialer = MockDialer::new();
    let manager = manager(1, dialer.clone());
    let channel = manager.get_connection().unwrap();
    tokio::time::advance(MIN_CONNECTION_AGE + Duration::from_secs(1)).await;
    let calls = AtomicUsize::new(0);

    let result = channel
        .call(&CallContext::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(unavailable("down")) }
        })
        .await;

    assert_eq!(result.unwrap_err().into_call().unwrap().to_string(), "down");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.generation(), 2);
    assert_eq!(dialer.dials(), 2);
    assert_eq!(manager.current().unwrap().id, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_reconnect_keeps_retrying_on_old_channel() {
    let dialer = MockDialer::new();
    let manager = ConnectionManagerBuilder::new("svc")
        .max_retries(3)
        .fixed_backoff(Duration::from_secs(20))
        .build(dialer.clone());
    let channel = manager.get_connection().unwrap();
    dialer.set_failing(true);
    let used = Mutex::new(Vec::new());

    let result = channel
        .call(&CallContext::new(), |handle| {
            used.lock().unwrap().push(handle.id);
            async { Err::<(), _>(unavailable("down")) }
        })
        .await;

    assert_eq!(result.unwrap_err().into_call().unwrap().to_string(), "down");
    assert_eq!(*used.lock().unwrap(), vec![0, 0, 0]);
    assert_eq!(dialer.dials(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_events_and_log_lines() {
    let sink = RecordingSink::default();
    let retries = Arc::new(Mutex::new(Vec::new()));
    let exhausted = Arc::new(AtomicUsize::new(0));
    let all = Arc::new(Mutex::new(Vec::new()));

    let manager = ConnectionManagerBuilder::new("svc")
        .max_retries(3)
        .logger(Logger::new(sink.clone()))
        .enable_logging(true)
        .on_retry({
            let retries = Arc::clone(&retries);
            move |attempt, delay| retries.lock().unwrap().push((attempt, delay))
        })
        .on_retries_exhausted({
            let exhausted = Arc::clone(&exhausted);
            move |attempts| exhausted.store(attempts, Ordering::SeqCst)
        })
        .retry_listener({
            let all = Arc::clone(&all);
            move |event: &RetryEvent| all.lock().unwrap().push(event.event_type())
        })
        .build(MockDialer::new());
    let channel = manager.get_connection().unwrap();

    let _ = channel
        .call(&CallContext::new(), |_| async {
            Err::<(), _>(unavailable("connection refused"))
        })
        .await;

    assert_eq!(
        *retries.lock().unwrap(),
        vec![
            (0, Duration::from_millis(100)),
            (1, Duration::from_millis(200)),
        ]
    );
    assert_eq!(exhausted.load(Ordering::SeqCst), 3);
    assert_eq!(*all.lock().unwrap(), vec!["Retry", "Retry", "Exhausted"]);

    let retry_lines: Vec<_> = sink
        .lines()
        .into_iter()
        .filter(|line| line.starts_with("Retrying"))
        .collect();
    assert_eq!(
        retry_lines,
        vec![
            "Retrying request (attempt 1/3) due to error: connection refused".to_string(),
            "Retrying request (attempt 2/3) due to error: connection refused".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn calls_after_manager_drop_are_not_retried() {
    let manager = manager(3, MockDialer::new());
    let channel = manager.get_connection().unwrap();
    drop(manager);

    let calls = AtomicUsize::new(0);
    let result = channel
        .call(&CallContext::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(unavailable("down")) }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
