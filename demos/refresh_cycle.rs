//! Channel refresh and retry walkthrough
//!
//! This example drives a connection manager against a simulated backend:
//! - the first `get_connection` dials a channel
//! - a call hitting transient failures is retried with backoff
//! - a reconnect right after dialing is throttled
//! - closing the manager shuts the active channel down
//!
//! Run with: RUST_LOG=info cargo run --example refresh_cycle

use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use channel_refresh::{
    CallContext, ChannelHandle, ConnectionManagerBuilder, ConnectivityState, DialOptions,
    FnDialer, LoadBalancing,
};
use tracing_subscriber::EnvFilter;

/// Simulated channel to a backend pool
struct SimulatedChannel {
    generation: usize,
    shutdown: std::sync::atomic::AtomicBool,
}

impl ChannelHandle for SimulatedChannel {
    fn close(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        println!("  [channel #{}] closed", self.generation);
    }

    fn state(&self) -> ConnectivityState {
        if self.shutdown.load(Ordering::SeqCst) {
            ConnectivityState::Shutdown
        } else {
            ConnectivityState::Ready
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("channel_refresh=info".parse()?))
        .init();

    println!("=== Channel refresh walkthrough ===\n");

    let dialed = Arc::new(AtomicUsize::new(0));
    let dialer = FnDialer::new({
        let dialed = Arc::clone(&dialed);
        move |target: &str, options: &DialOptions| {
            let generation = dialed.fetch_add(1, Ordering::SeqCst) + 1;
            println!(
                "  [dialer] dialing {target} ({}), channel #{generation}",
                options.load_balancing.service_config()
            );
            Ok::<_, io::Error>(SimulatedChannel {
                generation,
                shutdown: std::sync::atomic::AtomicBool::new(false),
            })
        }
    });

    let manager = ConnectionManagerBuilder::new("inventory.internal:50051")
        .max_connection_age(Duration::from_secs(300))
        .max_retries(4)
        .load_balancing(LoadBalancing::RoundRobin)
        .enable_logging(true)
        .on_retry(|attempt, delay| println!("  [event] retry after attempt {attempt}, waiting {delay:?}"))
        .on_throttled(|since| println!("  [event] reconnect throttled, channel is {since:?} old"))
        .build(dialer);

    println!("1. First connection");
    let channel = manager.get_connection()?;
    println!("  state: {:?}\n", channel.state());

    println!("2. Call that fails twice with Unavailable");
    let failures = AtomicU32::new(0);
    let ctx = CallContext::with_timeout(Duration::from_secs(5));
    let reply = channel
        .call(&ctx, |handle| {
            let n = failures.fetch_add(1, Ordering::SeqCst);
            let generation = handle.generation;
            async move {
                if n < 2 {
                    Err(io::Error::new(
                        io::ErrorKind::ConnectionRefused,
                        "backend unavailable",
                    ))
                } else {
                    Ok(format!("stock level 42 (served by channel #{generation})"))
                }
            }
        })
        .await?;
    println!("  reply: {reply}\n");

    println!("3. Forced reconnect right after dialing");
    let same = manager.try_reconnect()?;
    println!("  same channel: {}\n", same.same_channel(&channel));

    println!("4. Shutdown");
    manager.close();
    println!("  state: {:?}", channel.state());
    println!("  channels dialed: {}", dialed.load(Ordering::SeqCst));

    Ok(())
}
