//! Tracer (§4.9): start/end spans, keeping the most recent N in memory and
//! batching writes to storage on a background task, mirroring the
//! fetch-batch-store shape of `crates/mira-server/src/background/embeddings.rs`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;
use uuid::Uuid;

const DEFAULT_RING_CAPACITY: usize = 1000;
const WRITER_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Running,
    Ok,
    Error,
}

impl SpanStatus {
    fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Running => "running",
            SpanStatus::Ok => "ok",
            SpanStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Span {
    pub id: Uuid,
    pub name: String,
    pub model: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub status: SpanStatus,
    pub estimated_cost_cents: f64,
}

/// Cost per 1M tokens in USD cents, `(input, output)`. Unknown models cost 0.
static COST_TABLE_CENTS_PER_MILLION: Lazy<HashMap<&'static str, (f64, f64)>> = Lazy::new(|| {
    HashMap::from([
        ("gpt-4o", (250.0, 1000.0)),
        ("gpt-4o-mini", (15.0, 60.0)),
        ("claude-3-5-sonnet", (300.0, 1500.0)),
        ("claude-3-5-haiku", (80.0, 400.0)),
        ("deepseek-chat", (14.0, 28.0)),
        ("deepseek-reasoner", (55.0, 219.0)),
    ])
});

fn estimate_cost_cents(model: Option<&str>, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    let Some(model) = model else { return 0.0 };
    let Some((input_rate, output_rate)) = COST_TABLE_CENTS_PER_MILLION.get(model) else {
        return 0.0;
    };
    (prompt_tokens as f64 / 1_000_000.0) * input_rate + (completion_tokens as f64 / 1_000_000.0) * output_rate
}

/// Keeps a bounded ring buffer of recent spans in memory and forwards
/// completed spans to an async writer task that batches DB round-trips.
pub struct Tracer {
    ring: Mutex<VecDeque<Span>>,
    capacity: usize,
    writer_tx: mpsc::UnboundedSender<Span>,
}

impl Tracer {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Self::with_capacity(pool, DEFAULT_RING_CAPACITY)
    }

    pub fn with_capacity(pool: SqlitePool, capacity: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(pool, rx));
        Arc::new(Self {
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            writer_tx: tx,
        })
    }

    pub async fn start_span(&self, name: impl Into<String>, model: Option<String>) -> Uuid {
        let span = Span {
            id: Uuid::new_v4(),
            name: name.into(),
            model,
            start_time: Utc::now(),
            end_time: None,
            prompt_tokens: 0,
            completion_tokens: 0,
            status: SpanStatus::Running,
            estimated_cost_cents: 0.0,
        };
        let id = span.id;
        self.push(span).await;
        id
    }

    pub async fn end_span(&self, id: Uuid, prompt_tokens: u64, completion_tokens: u64, status: SpanStatus) {
        let mut ring = self.ring.lock().await;
        if let Some(span) = ring.iter_mut().find(|s| s.id == id) {
            span.end_time = Some(Utc::now());
            span.prompt_tokens = prompt_tokens;
            span.completion_tokens = completion_tokens;
            span.status = status;
            span.estimated_cost_cents = estimate_cost_cents(span.model.as_deref(), prompt_tokens, completion_tokens);
            let completed = span.clone();
            drop(ring);
            let _ = self.writer_tx.send(completed);
        }
    }

    async fn push(&self, span: Span) {
        let mut ring = self.ring.lock().await;
        if ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(span);
    }

    pub async fn recent(&self, limit: usize) -> Vec<Span> {
        let ring = self.ring.lock().await;
        ring.iter().rev().take(limit).cloned().collect()
    }
}

async fn run_writer(pool: SqlitePool, mut rx: mpsc::UnboundedReceiver<Span>) {
    if let Err(e) = sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trace_spans (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            model TEXT,
            start_time TEXT NOT NULL,
            end_time TEXT,
            prompt_tokens INTEGER NOT NULL,
            completion_tokens INTEGER NOT NULL,
            status TEXT NOT NULL,
            estimated_cost_cents REAL NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    {
        warn!(error = %e, "failed to create trace_spans table");
        return;
    }

    let mut batch = Vec::with_capacity(WRITER_BATCH_SIZE);
    loop {
        let received = rx.recv_many(&mut batch, WRITER_BATCH_SIZE).await;
        if received == 0 {
            break;
        }
        if let Err(e) = write_batch(&pool, &batch).await {
            warn!(error = %e, count = batch.len(), "failed to flush trace span batch");
        }
        batch.clear();
    }
}

async fn write_batch(pool: &SqlitePool, spans: &[Span]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for span in spans {
        sqlx::query(
            r#"
            INSERT INTO trace_spans (id, name, model, start_time, end_time, prompt_tokens, completion_tokens, status, estimated_cost_cents)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                end_time = excluded.end_time,
                prompt_tokens = excluded.prompt_tokens,
                completion_tokens = excluded.completion_tokens,
                status = excluded.status,
                estimated_cost_cents = excluded.estimated_cost_cents
            "#,
        )
        .bind(span.id.to_string())
        .bind(&span.name)
        .bind(&span.model)
        .bind(span.start_time.to_rfc3339())
        .bind(span.end_time.map(|t| t.to_rfc3339()))
        .bind(span.prompt_tokens as i64)
        .bind(span.completion_tokens as i64)
        .bind(span.status.as_str())
        .bind(span.estimated_cost_cents)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn new_tracer() -> Arc<Tracer> {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Tracer::new(pool)
    }

    #[tokio::test]
    async fn start_and_end_span_records_cost() {
        let tracer = new_tracer().await;
        let id = tracer.start_span("agent_run", Some("gpt-4o".to_string())).await;
        tracer.end_span(id, 1000, 500, SpanStatus::Ok).await;

        let recent = tracer.recent(10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].status, SpanStatus::Ok);
        assert!(recent[0].estimated_cost_cents > 0.0);
    }

    #[tokio::test]
    async fn unknown_model_costs_zero() {
        let tracer = new_tracer().await;
        let id = tracer.start_span("tool_call", Some("unknown-model".to_string())).await;
        tracer.end_span(id, 100, 100, SpanStatus::Ok).await;

        let recent = tracer.recent(10).await;
        assert_eq!(recent[0].estimated_cost_cents, 0.0);
    }

    #[tokio::test]
    async fn ring_buffer_is_bounded() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let tracer = Tracer::with_capacity(pool, 3);
        for i in 0..5 {
            tracer.start_span(format!("span-{i}"), None).await;
        }
        let recent = tracer.recent(10).await;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].name, "span-4");
    }
}
