//! Background delivery queue.
//!
//! Captures push events onto a bounded channel without waiting. A single
//! worker task drains the channel, buffers events, and delivers them in
//! batches when the buffer reaches `flush_at`, when `flush_interval` elapses,
//! on an explicit flush, and on shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::BatchConfig;
use crate::transport::TransportClient;
use crate::types::Event;

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Events accepted onto the queue.
    pub enqueued: u64,
    /// Events the backend accepted.
    pub sent: u64,
    /// Events whose batch failed after retries.
    pub failed: u64,
    /// Events rejected because the queue was full or shut down.
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

enum Command {
    Event(Box<Event>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

pub(crate) struct EventQueue {
    sender: mpsc::Sender<Command>,
    counters: Arc<Counters>,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventQueue {
    /// Spawns the delivery worker on the current tokio runtime.
    pub(crate) fn start(transport: Arc<dyn TransportClient>, config: BatchConfig) -> Self {
        let config = config.normalized();
        let (sender, receiver) = mpsc::channel(config.max_queue_size);
        let counters = Arc::new(Counters::default());

        let worker = Worker {
            receiver,
            transport,
            buffer: Vec::with_capacity(config.flush_at.min(config.max_batch_size)),
            config,
            counters: Arc::clone(&counters),
        };
        let handle = tokio::spawn(worker.run());

        Self { sender, counters, closed: AtomicBool::new(false), worker: Mutex::new(Some(handle)) }
    }

    /// Enqueues an event without waiting. Returns `false` if it was dropped.
    pub(crate) fn push(&self, event: Event) -> bool {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(event = event.event(), "client shut down, dropping event");
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        match self.sender.try_send(Command::Event(Box::new(event))) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            },
            Err(mpsc::error::TrySendError::Full(Command::Event(event))) => {
                tracing::warn!(event = event.event(), "analytics queue full, dropping event");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            },
            Err(_) => {
                tracing::debug!("analytics worker stopped, dropping event");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            },
        }
    }

    /// Delivers everything enqueued so far and waits for the worker to finish.
    pub(crate) async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Flushes, then stops the worker. Later pushes are dropped.
    pub(crate) async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Shutdown(ack)).await.is_ok() {
            let _ = done.await;
        }

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "analytics worker panicked");
            }
        }
        tracing::info!(sent = self.counters.sent.load(Ordering::Relaxed), "analytics client shut down");
    }

    /// Like [`shutdown`](Self::shutdown) but gives up after `timeout`.
    pub(crate) async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        let finished = tokio::time::timeout(timeout, self.shutdown()).await.is_ok();
        if !finished {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "analytics shutdown timed out");
        }
        finished
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            sent: self.counters.sent.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

struct Worker {
    receiver: mpsc::Receiver<Command>,
    transport: Arc<dyn TransportClient>,
    buffer: Vec<Event>,
    config: BatchConfig,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(Command::Event(event)) => {
                        self.buffer.push(*event);
                        if self.buffer.len() >= self.config.flush_at {
                            self.deliver().await;
                        }
                    },
                    Some(Command::Flush(ack)) => {
                        self.deliver().await;
                        let _ = ack.send(());
                    },
                    Some(Command::Shutdown(ack)) => {
                        self.drain().await;
                        let _ = ack.send(());
                        break;
                    },
                    None => {
                        self.deliver().await;
                        break;
                    },
                },
                _ = ticker.tick() => {
                    if !self.buffer.is_empty() {
                        self.deliver().await;
                    }
                },
            }
        }

        tracing::debug!("analytics worker stopped");
    }

    /// Collects whatever raced past the shutdown command, then delivers.
    async fn drain(&mut self) {
        self.receiver.close();
        while let Ok(command) = self.receiver.try_recv() {
            match command {
                Command::Event(event) => self.buffer.push(*event),
                Command::Flush(ack) | Command::Shutdown(ack) => {
                    let _ = ack.send(());
                },
            }
        }
        self.deliver().await;
    }

    async fn deliver(&mut self) {
        let mut pending = std::mem::take(&mut self.buffer);
        while !pending.is_empty() {
            let rest = pending.split_off(pending.len().min(self.config.max_batch_size));
            let batch = std::mem::replace(&mut pending, rest);
            let count = batch.len() as u64;

            match self.transport.send_batch(batch).await {
                Ok(()) => {
                    self.counters.sent.fetch_add(count, Ordering::Relaxed);
                },
                Err(error) => {
                    self.counters.failed.fetch_add(count, Ordering::Relaxed);
                    tracing::warn!(%error, count, "failed to deliver analytics batch");
                },
            }
        }
    }
}
