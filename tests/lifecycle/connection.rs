use std::sync::Arc;
use std::time::Duration;

use channel_refresh::{ChannelHandle, Connection, ConnectivityState, Logger, GRACE_PERIOD};

use super::support::{MockChannel, RecordingSink};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_swaps_leave_one_active_handle() {
    let connection = Arc::new(Connection::new("svc").with_grace_period(Duration::from_millis(20)));

    let mut tasks = Vec::new();
    for id in 0..32 {
        let connection = Arc::clone(&connection);
        tasks.push(tokio::spawn(async move {
            connection.swap(MockChannel::new(id), Duration::from_secs(60))
        }));
    }

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }

    tokio::time::sleep(Duration::from_millis(250)).await;

    let current = connection.current().unwrap();
    assert_eq!(connection.generation(), 32);
    assert!(handles.iter().any(|h| Arc::ptr_eq(h, &current)));

    for handle in &handles {
        if Arc::ptr_eq(handle, &current) {
            assert_eq!(handle.close_count(), 0, "active handle must stay open");
        } else {
            assert_eq!(
                handle.close_count(),
                1,
                "handle {} must be closed exactly once",
                handle.id
            );
        }
    }
}

#[tokio::test(start_paused = true)]
async fn superseded_handle_outlives_grace_period() {
    let connection = Connection::new("svc");
    let h1 = connection.swap(MockChannel::new(1), Duration::from_secs(60));
    let h2 = connection.swap(MockChannel::new(2), Duration::from_secs(60));

    assert_eq!(connection.current().unwrap().id, 2);

    tokio::time::sleep(GRACE_PERIOD - Duration::from_millis(1)).await;
    assert_eq!(h1.state(), ConnectivityState::Ready);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(h1.state(), ConnectivityState::Shutdown);
    assert_eq!(h1.close_count(), 1);
    assert_eq!(h2.state(), ConnectivityState::Ready);
}

#[tokio::test(start_paused = true)]
async fn grace_period_is_configurable() {
    let connection = Connection::new("svc").with_grace_period(Duration::from_secs(2));
    let h1 = connection.swap(MockChannel::new(1), Duration::from_secs(60));
    connection.swap(MockChannel::new(2), Duration::from_secs(60));

    tokio::time::sleep(Duration::from_millis(1999)).await;
    assert_eq!(h1.close_count(), 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(h1.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn expiry_is_monotonic() {
    let connection = Connection::new("svc");
    assert!(connection.is_expired());

    connection.swap(MockChannel::new(1), Duration::from_secs(15));
    assert!(!connection.is_expired());

    for _ in 0..14 {
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!connection.is_expired());
    }

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(connection.is_expired());
    assert_eq!(connection.age(), Some(Duration::from_secs(15)));

    tokio::time::advance(Duration::from_secs(100)).await;
    assert!(connection.is_expired());
}

#[tokio::test(start_paused = true)]
async fn swap_resets_expiry() {
    let connection = Connection::new("svc");
    connection.swap(MockChannel::new(1), Duration::from_secs(15));

    tokio::time::advance(Duration::from_secs(20)).await;
    assert!(connection.is_expired());

    connection.swap(MockChannel::new(2), Duration::from_secs(15));
    assert!(!connection.is_expired());
    assert_eq!(connection.age(), Some(Duration::ZERO));
}

#[tokio::test(start_paused = true)]
async fn close_leaves_pending_graceful_close_alone() {
    let connection = Connection::new("svc");
    let h1 = connection.swap(MockChannel::new(1), Duration::from_secs(60));
    let h2 = connection.swap(MockChannel::new(2), Duration::from_secs(60));

    connection.close();
    assert_eq!(h2.close_count(), 1);
    assert_eq!(h1.close_count(), 0);
    assert!(connection.current().is_none());

    tokio::time::sleep(GRACE_PERIOD + Duration::from_millis(1)).await;
    assert_eq!(h1.close_count(), 1);
    assert_eq!(h2.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn logs_swaps_and_closes() {
    let sink = RecordingSink::default();
    let logger = Logger::new(sink.clone());
    logger.enable();

    let connection = Connection::new("orders:50051").with_logger(logger);
    connection.swap(MockChannel::new(1), Duration::from_secs(60));
    connection.swap(MockChannel::new(2), Duration::from_secs(60));
    tokio::time::sleep(GRACE_PERIOD + Duration::from_millis(1)).await;
    connection.close();

    assert_eq!(
        sink.lines(),
        vec![
            "Setting new connection (ID: orders:50051)".to_string(),
            "Setting new connection (ID: orders:50051)".to_string(),
            "Old gRPC connection (ID: orders:50051) closed after grace period.".to_string(),
            "gRPC close connection Id: orders:50051".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn disabled_logger_writes_nothing() {
    let sink = RecordingSink::default();
    let connection = Connection::new("svc").with_logger(Logger::new(sink.clone()));

    connection.swap(MockChannel::new(1), Duration::from_secs(60));
    connection.close();

    assert!(sink.lines().is_empty());
}
