//! Actuation - Intent Execution
//!
//! The decision cycle only emits intents. `ActuationWorker` drains them from
//! a bounded channel and hands each one to every registered `IntentSink`
//! (renderer, snapshot writer, alarm driver). A failing sink is logged and
//! skipped.

use crate::error::Result;
use crate::risk_engine::ActuationIntent;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

/// Consumer of actuation intents
#[async_trait]
pub trait IntentSink: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, intent: &ActuationIntent) -> Result<()>;
}

/// Writes intents as structured log lines
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl IntentSink for LoggingSink {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, intent: &ActuationIntent) -> Result<()> {
        match intent {
            ActuationIntent::DrawAnnotations {
                identity_id,
                camera,
                score,
                label,
                ..
            } => tracing::debug!(
                identity_id = %identity_id,
                camera = %camera,
                score = score,
                label = %label,
                "Annotate"
            ),
            ActuationIntent::CaptureSnapshot {
                identity_id,
                camera,
                score,
            } => tracing::info!(
                identity_id = %identity_id,
                camera = %camera,
                score = score,
                "Snapshot requested"
            ),
            ActuationIntent::RaiseAlarm { level } => {
                tracing::warn!(level = %level, "Alarm raised")
            }
        }
        Ok(())
    }
}

/// ActuationWorker instance
pub struct ActuationWorker {
    sinks: Vec<Box<dyn IntentSink>>,
}

impl ActuationWorker {
    /// Create new ActuationWorker
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Add a sink
    pub fn add_sink(&mut self, sink: Box<dyn IntentSink>) {
        self.sinks.push(sink);
    }

    /// Deliver one intent to every sink
    pub async fn dispatch(&self, intent: &ActuationIntent) {
        for sink in &self.sinks {
            if let Err(e) = sink.handle(intent).await {
                tracing::warn!(
                    sink = %sink.name(),
                    error = %e,
                    "Sink failed to handle intent"
                );
            }
        }
    }

    /// Drain the channel until it closes or shutdown is signalled
    pub async fn run(
        self,
        mut intents: mpsc::Receiver<ActuationIntent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64 {
        let mut delivered = 0u64;
        tracing::info!(sinks = self.sinks.len(), "Actuation worker started");

        loop {
            tokio::select! {
                intent = intents.recv() => {
                    match intent {
                        Some(intent) => {
                            self.dispatch(&intent).await;
                            delivered += 1;
                        }
                        None => break,
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(delivered = delivered, "Actuation worker stopped");
        delivered
    }
}

impl Default for ActuationWorker {
    fn default() -> Self {
        Self::new()
    }
}
