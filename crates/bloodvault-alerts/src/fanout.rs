//! Best-effort concurrent delivery.

use std::collections::HashSet;
use std::sync::Mutex;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::targeting::OutgoingMessage;

/// Message transport (WhatsApp, SMS gateway, ...).
pub trait MessageSender: Send + Sync {
    fn send(&self, phone: &str, body: &str) -> anyhow::Result<()>;
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeliveryReport {
    /// Donor ids whose message was accepted by the transport
    pub sent: Vec<i64>,
    /// Donor ids whose delivery failed, with the reason
    pub failed: Vec<(i64, String)>,
}

/// Send every message on its own thread and wait for all of them.
///
/// A failure is logged and recorded for that recipient only; nothing is
/// retried. Report entries follow the order of `messages`.
pub fn send_all<S>(sender: &S, messages: &[OutgoingMessage]) -> DeliveryReport
where
    S: MessageSender + ?Sized,
{
    let outcomes: Vec<Result<(), String>> = thread::scope(|scope| {
        let handles: Vec<_> = messages
            .iter()
            .map(|message| scope.spawn(move || sender.send(&message.phone, &message.body)))
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(format!("{:#}", e)),
                Err(_) => Err("sender panicked".to_string()),
            })
            .collect()
    });

    let mut report = DeliveryReport::default();
    for (message, outcome) in messages.iter().zip(outcomes) {
        match outcome {
            Ok(()) => report.sent.push(message.donor_id),
            Err(reason) => {
                warn!(donor_id = message.donor_id, phone = %message.phone, error = %reason, "message not delivered");
                report.failed.push((message.donor_id, reason));
            }
        }
    }

    info!(sent = report.sent.len(), failed = report.failed.len(), "alert fan-out finished");
    report
}

/// Transport that records messages instead of sending them.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    unreachable: HashSet<String>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send to `phone`.
    pub fn failing_for(mut self, phone: impl Into<String>) -> Self {
        self.unreachable.insert(phone.into());
        self
    }

    /// Recorded (phone, body) pairs, sorted by phone.
    pub fn sent(&self) -> Vec<(String, String)> {
        let mut sent = self
            .sent
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
        sent.sort();
        sent
    }
}

impl MessageSender for RecordingSender {
    fn send(&self, phone: &str, body: &str) -> anyhow::Result<()> {
        if self.unreachable.contains(phone) {
            anyhow::bail!("{} is unreachable", phone);
        }
        self.sent
            .lock()
            .map_err(|e| anyhow::anyhow!("recorder poisoned: {}", e))?
            .push((phone.to_string(), body.to_string()));
        Ok(())
    }
}
