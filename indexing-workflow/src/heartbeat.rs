//! Liveness signals for long-running stages.
//!
//! Activities beat at stage start and before any step expected to outlast
//! the configured liveness interval; a supervisor watching the receiver can
//! treat a silent activity as stuck.

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

/// One liveness signal.
#[derive(Debug, Clone)]
pub struct HeartbeatStatus {
    pub stage: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl HeartbeatStatus {
    fn idle() -> Self {
        Self {
            stage: "idle".to_string(),
            message: String::new(),
            at: Utc::now(),
        }
    }
}

/// Heartbeat emitter handed to activities.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    tx: watch::Sender<HeartbeatStatus>,
}

impl Heartbeat {
    pub fn new() -> (Self, watch::Receiver<HeartbeatStatus>) {
        let (tx, rx) = watch::channel(HeartbeatStatus::idle());
        (Self { tx }, rx)
    }

    pub fn beat(&self, stage: &str, message: &str) {
        debug!(stage, message, "heartbeat");
        let _ = self.tx.send(HeartbeatStatus {
            stage: stage.to_string(),
            message: message.to_string(),
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn beats_are_observable_on_the_receiver() {
        let (heartbeat, mut rx) = Heartbeat::new();
        heartbeat.beat("parse_repo", "starting AST parsing");

        rx.changed().await.unwrap();
        let status = rx.borrow().clone();
        assert_eq!(status.stage, "parse_repo");
        assert_eq!(status.message, "starting AST parsing");
    }
}
