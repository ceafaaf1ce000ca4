//! Feed connection manager
//!
//! Drives the connection state machine over the real transport: keepalive,
//! fixed-delay reconnects, throttled latest-wins message delivery and the
//! published status stream.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{error, info, warn};

use super::state::{ClosePlan, ConnectionState, ConnectionTracker};
use super::FeedClient;
use crate::config::Config;
use crate::error::{FeedError, Result};
use crate::parser::{self, FeedMessage, SubscribeRequest};

/// How a connected session ended
enum PumpExit {
    /// Shutdown requested or the consumer went away
    Shutdown,
    /// Transport failure; the retry logic decides what happens next
    Transport(FeedError),
}

/// Depth-1 delivery slot for throttle coalescing.
///
/// Within a throttle window the last observed message wins; earlier
/// ones are dropped before reaching the book engine.
#[derive(Debug, Default)]
struct ThrottleSlot {
    pending: Option<FeedMessage>,
}

impl ThrottleSlot {
    fn observe(&mut self, msg: FeedMessage) {
        self.pending = Some(msg);
    }

    /// Take the surviving message for delivery at the window boundary
    fn drain(&mut self) -> Option<FeedMessage> {
        self.pending.take()
    }
}

/// Manages one logical feed session with automatic, bounded reconnection
pub struct ConnectionManager {
    client: FeedClient,
    tracker: ConnectionTracker,
    status_tx: watch::Sender<ConnectionState>,
    config: Arc<Config>,
}

impl ConnectionManager {
    /// Create a manager and the status stream its transitions publish to
    pub fn new(config: Arc<Config>) -> (Self, watch::Receiver<ConnectionState>) {
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);
        let manager = Self {
            client: FeedClient::new(&config.ws_endpoint),
            tracker: ConnectionTracker::new(config.max_reconnect_attempts),
            status_tx,
            config,
        };
        (manager, status_rx)
    }

    /// Whether the transport is open and writable
    pub fn is_ready(&self) -> bool {
        self.client.is_ready()
    }

    /// Run the connection cycle until shutdown or retry exhaustion.
    ///
    /// Decoded messages are coalesced per throttle window (last one wins)
    /// and delivered on `messages`. After `RetryExhausted` only a fresh
    /// `run` call restarts the cycle, with the retry counter reset.
    pub async fn run(
        &mut self,
        messages: mpsc::Sender<FeedMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        if !self.tracker.connect_requested() {
            return Ok(());
        }
        self.publish();

        loop {
            if *shutdown.borrow() {
                return self.shut_down().await;
            }

            match self.client.connect().await {
                Ok(()) => {
                    self.tracker.opened();
                    self.publish();

                    // The subscription is forwarded on behalf of the caller
                    // once the transport is confirmed writable
                    let request = SubscribeRequest::new(self.config.channels());
                    if self.is_ready() {
                        if let Err(e) = self.client.send_json(&request).await {
                            warn!(error = %e, "Failed to send subscribe request");
                        }
                    }

                    match self.pump(&messages, &mut shutdown).await {
                        PumpExit::Shutdown => return self.shut_down().await,
                        PumpExit::Transport(e) => {
                            warn!(error = %e, "Feed session lost");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Connect attempt failed"),
            }

            match self.tracker.transport_closed() {
                ClosePlan::Retry { attempt } => {
                    self.publish();
                    info!(
                        attempt,
                        delay_ms = self.config.reconnect_delay_ms,
                        "Reconnecting after delay"
                    );
                    tokio::select! {
                        _ = sleep(Duration::from_millis(self.config.reconnect_delay_ms)) => {
                            if !self.tracker.reconnect_due() {
                                return Ok(());
                            }
                            self.publish();
                        }
                        _ = shutdown.changed() => return self.shut_down().await,
                    }
                }
                ClosePlan::GiveUp => {
                    self.publish();
                    error!(
                        attempts = self.config.max_reconnect_attempts,
                        "Giving up on reconnection"
                    );
                    return Err(FeedError::RetryExhausted(self.config.max_reconnect_attempts));
                }
                ClosePlan::Ignore => return Ok(()),
            }
        }
    }

    /// Process frames on a connected session.
    ///
    /// Owns the keepalive timer and the throttle tick; both die with this
    /// call, so nothing fires on a defunct transport.
    async fn pump(
        &mut self,
        messages: &mpsc::Sender<FeedMessage>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> PumpExit {
        let keepalive_period = Duration::from_secs(self.config.keepalive_interval_secs);
        let throttle_period = Duration::from_millis(self.config.throttle_ms);
        let mut next_keepalive = Instant::now() + keepalive_period;
        let mut next_flush = Instant::now() + throttle_period;
        let mut slot = ThrottleSlot::default();

        loop {
            // Fire due timers before waiting on the socket again
            let now = Instant::now();
            if now >= next_keepalive {
                if let Err(e) = self.client.send_text(parser::PING).await {
                    return PumpExit::Transport(e);
                }
                next_keepalive = now + keepalive_period;
            }
            if now >= next_flush {
                if let Some(msg) = slot.drain() {
                    if messages.send(msg).await.is_err() {
                        return PumpExit::Shutdown;
                    }
                }
                next_flush = now + throttle_period;
            }

            let deadline = next_keepalive.min(next_flush);
            tokio::select! {
                _ = shutdown.changed() => return PumpExit::Shutdown,
                result = timeout_at(deadline, self.client.recv()) => match result {
                    Ok(Ok(Some(frame))) => match parser::decode_frame(&frame) {
                        // Within a throttle window the last decoded message
                        // wins; earlier ones are dropped here
                        Ok(Some(msg)) => slot.observe(msg),
                        Ok(None) => {}
                        Err(FeedError::UnsupportedFeedKind(kind)) => {
                            warn!(kind = %kind, "Dropping unsupported feed message");
                        }
                        Err(e) => {
                            // Decode failures never tear down the session
                            warn!(error = %e, "Failed to decode frame");
                        }
                    },
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => return PumpExit::Transport(e),
                    // Deadline reached; the due timer fires at the loop top
                    Err(_) => {}
                }
            }
        }
    }

    async fn shut_down(&mut self) -> Result<()> {
        self.tracker.close_requested();
        self.publish();
        self.client.close().await;
        info!("Connection manager shut down");
        Ok(())
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.tracker.state());
    }
}
