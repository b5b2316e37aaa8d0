use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    error::{AppError, AppResult},
    services::{
        clock::Clock,
        deadline::{self, DEFAULT_CALL_TIMEOUT},
    },
};

pub const QUIZ_COMPLETED: &str = "quiz_completed";
pub const RECOMMENDATIONS_SERVED: &str = "recommendations_served";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Destination of tracked events
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: &AnalyticsEvent) -> AppResult<()>;
}

#[derive(Clone)]
pub struct PostgresEventSink {
    db_pool: PgPool,
}

impl PostgresEventSink {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait::async_trait]
impl EventSink for PostgresEventSink {
    async fn record(&self, event: &AnalyticsEvent) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO analytics_events (event_type, payload, created_at) VALUES ($1, $2, $3)",
        )
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }
}

/// Fire-and-forget analytics tracking
///
/// `track` hands the event to a background writer and returns immediately; the caller
/// never observes whether the write succeeded.
#[derive(Clone)]
pub struct EventTracker {
    event_tx: mpsc::UnboundedSender<AnalyticsEvent>,
    clock: Arc<dyn Clock>,
}

/// Handle for gracefully shutting down the event writer
pub struct TrackerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl TrackerHandle {
    /// Signals the writer and waits until queued events are flushed
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Event tracker shutdown signal sent");
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Event writer task ended abnormally");
        }
    }
}

impl EventTracker {
    /// Creates a tracker and spawns its background writer
    pub fn start(sink: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> (Self, TrackerHandle) {
        Self::start_with_timeout(sink, clock, DEFAULT_CALL_TIMEOUT)
    }

    /// Like [`start`](Self::start), with a deadline on each sink write
    pub fn start_with_timeout(
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        write_timeout: Duration,
    ) -> (Self, TrackerHandle) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            Self::event_writer_task(sink, write_timeout, event_rx, shutdown_rx).await;
        });

        (
            Self { event_tx, clock },
            TrackerHandle { shutdown_tx, task },
        )
    }

    pub fn track(&self, event_type: &str, payload: serde_json::Value) {
        let event = AnalyticsEvent {
            event_type: event_type.to_string(),
            payload,
            created_at: self.clock.now(),
        };

        if let Err(e) = self.event_tx.send(event) {
            tracing::warn!(error = %e, "Event tracker stopped, dropping event");
        }
    }

    async fn event_writer_task(
        sink: Arc<dyn EventSink>,
        write_timeout: Duration,
        mut event_rx: mpsc::UnboundedReceiver<AnalyticsEvent>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Event writer task started");

        loop {
            tokio::select! {
                Some(event) = event_rx.recv() => {
                    Self::write(sink.as_ref(), write_timeout, &event).await;
                }
                Some(()) = shutdown_rx.recv() => {
                    // Trackers may still hold senders, so drain what is queued right now
                    let mut flushed = 0;
                    while let Ok(event) = event_rx.try_recv() {
                        Self::write(sink.as_ref(), write_timeout, &event).await;
                        flushed += 1;
                    }
                    tracing::info!(flushed = flushed, "Event writer task stopped");
                    break;
                }
                // Handle dropped and every tracker gone
                else => break,
            }
        }
    }

    async fn write(sink: &dyn EventSink, write_timeout: Duration, event: &AnalyticsEvent) {
        let recorded = deadline::bounded(
            write_timeout,
            "analytics event write",
            sink.record(event),
            AppError::Internal,
        )
        .await;
        if let Err(e) = recorded {
            tracing::error!(
                error = %e,
                event_type = %event.event_type,
                "Failed to record analytics event"
            );
        }
    }
}

/// Sink that only logs; used when no database is configured for events
pub struct LogEventSink;

#[async_trait::async_trait]
impl EventSink for LogEventSink {
    async fn record(&self, event: &AnalyticsEvent) -> AppResult<()> {
        tracing::debug!(
            event_type = %event.event_type,
            payload = %event.payload,
            "Analytics event"
        );
        Ok(())
    }
}
