//! Stage graph with bounded queues and cascading shutdown.
//!
//! A [`Graph`] owns every queue and every worker thread of a run:
//!
//! - [`Graph::queue`] creates a bounded queue and returns its two ends. A
//!   full queue blocks the sender, so a slow stage slows its producers down
//!   instead of buffering without limit.
//! - [`Graph::source`] starts a single thread that produces items.
//! - [`Graph::stage`] starts a pool of workers draining one queue.
//!
//! Each source and stage declares the queues it feeds. [`Graph::finish`]
//! joins the stages in dependency order: a stage is joined once its input
//! queue is closed, and a queue is closed once every stage feeding it has
//! been joined. Completion therefore flows from the source down to the
//! terminal stages, and `finish` returns only after all of them drained.
//!
//! Outlets must be moved into the handler of the stage that feeds them.
//! A clone kept elsewhere holds its queue open, and the stage consuming it
//! never ends. Stages that wait on each other in a cycle are reported as
//! [`PipelineError::Stalled`]. Their workers cannot be joined, since nothing
//! will ever close their input; `finish` detaches them, still blocked on
//! their queues, and they end with the process.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::any::Any;
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::stats::Counter;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to start a worker for stage {stage}: {source}")]
    Spawn {
        stage: String,
        source: std::io::Error,
    },
    #[error("a worker of stage {0} panicked")]
    WorkerPanicked(String),
    /// The named stages were left detached, their workers blocked on input
    /// that never closes.
    #[error("stages never received the end of their input (workers left detached): {0:?}")]
    Stalled(Vec<String>),
}

/// Identifies a queue when declaring what a stage feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueId(usize);

/// Sending end of a queue.
pub struct Outlet<T> {
    sender: Sender<T>,
    id: QueueId,
    name: Arc<str>,
}

impl<T> Clone for Outlet<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            id: self.id,
            name: self.name.clone(),
        }
    }
}

impl<T> Outlet<T> {
    pub fn id(&self) -> QueueId {
        self.id
    }

    /// Enqueue `item`, blocking while the queue is full.
    pub fn send(&self, item: T) {
        if self.sender.send(item).is_err() {
            warn!(queue = %self.name, "consumers are gone, item dropped");
        }
    }
}

/// Receiving end of a queue.
pub struct Inlet<T> {
    receiver: Receiver<T>,
    id: QueueId,
}

struct QueueSlot {
    name: String,
    /// The graph's own sender, dropped to close the queue.
    sender: Option<Box<dyn Any + Send>>,
    producers: usize,
}

struct StageHandle {
    name: String,
    input: Option<QueueId>,
    feeds: Vec<QueueId>,
    workers: Vec<JoinHandle<()>>,
    processed: Arc<Counter>,
}

/// What a stage did, reported by [`Graph::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub name: String,
    pub workers: usize,
    pub processed: u64,
}

pub struct Graph {
    capacity: usize,
    queues: Vec<QueueSlot>,
    stages: Vec<StageHandle>,
}

impl Graph {
    /// A graph whose queues hold at most `capacity` items each.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn queue<T: Send + 'static>(&mut self, name: &str) -> (Outlet<T>, Inlet<T>) {
        let (sender, receiver) = bounded(self.capacity);
        let id = QueueId(self.queues.len());
        self.queues.push(QueueSlot {
            name: name.to_string(),
            sender: Some(Box::new(sender.clone())),
            producers: 0,
        });
        (
            Outlet {
                sender,
                id,
                name: Arc::from(name),
            },
            Inlet { receiver, id },
        )
    }

    fn declare_feeds(&mut self, feeds: &[QueueId]) {
        for id in feeds {
            self.queues[id.0].producers += 1;
        }
    }

    fn spawn(
        name: &str,
        index: usize,
        body: impl FnOnce() + Send + 'static,
    ) -> Result<JoinHandle<()>, PipelineError> {
        std::thread::Builder::new()
            .name(format!("{name}-{index}"))
            .spawn(body)
            .map_err(|source| PipelineError::Spawn {
                stage: name.to_string(),
                source,
            })
    }

    /// Start a single producer thread.
    pub fn source<F>(&mut self, name: &str, feeds: &[QueueId], produce: F) -> Result<(), PipelineError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.declare_feeds(feeds);
        let worker = Self::spawn(name, 0, produce)?;
        self.stages.push(StageHandle {
            name: name.to_string(),
            input: None,
            feeds: feeds.to_vec(),
            workers: vec![worker],
            processed: Arc::new(Counter::default()),
        });
        Ok(())
    }

    /// Start `workers` threads, each calling `handler` on items of `inlet`
    /// until the queue is closed and empty.
    pub fn stage<T, F>(
        &mut self,
        name: &str,
        workers: usize,
        inlet: Inlet<T>,
        feeds: &[QueueId],
        handler: F,
    ) -> Result<(), PipelineError>
    where
        T: Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.declare_feeds(feeds);
        let handler = Arc::new(handler);
        let processed = Arc::new(Counter::default());
        let mut handles = Vec::new();
        for index in 0..workers.max(1) {
            let receiver = inlet.receiver.clone();
            let handler = handler.clone();
            let processed = processed.clone();
            handles.push(Self::spawn(name, index, move || {
                for item in receiver.iter() {
                    handler(item);
                    processed.incr();
                }
            })?);
        }
        debug!(stage = name, workers = handles.len(), "stage started");
        self.stages.push(StageHandle {
            name: name.to_string(),
            input: Some(inlet.id),
            feeds: feeds.to_vec(),
            workers: handles,
            processed,
        });
        Ok(())
    }

    fn is_closed(&self, id: QueueId) -> bool {
        self.queues[id.0].sender.is_none()
    }

    /// Close every queue nobody declared to feed, so their consumers can end.
    fn close_unfed(&mut self) {
        for slot in &mut self.queues {
            if slot.producers == 0 && slot.sender.take().is_some() {
                debug!(queue = %slot.name, "closing queue without producers");
            }
        }
    }

    /// Join every stage in dependency order and close the queues behind them.
    ///
    /// A panicking worker does not stop the shutdown: its queues are still
    /// closed so the rest of the graph drains, and the first panic is
    /// reported once everything has been joined.
    ///
    /// When no pending stage can ever see its input close, the remaining
    /// workers are detached and [`PipelineError::Stalled`] names their stages.
    pub fn finish(mut self) -> Result<Vec<StageReport>, PipelineError> {
        self.close_unfed();
        let mut pending = std::mem::take(&mut self.stages);
        let mut reports = Vec::new();
        let mut first_error = None;

        while !pending.is_empty() {
            let Some(position) = pending
                .iter()
                .position(|s| s.input.is_none_or(|id| self.is_closed(id)))
            else {
                let names: Vec<String> = pending.iter().map(|s| s.name.clone()).collect();
                warn!(stages = ?names, "stalled, detaching their workers");
                return Err(PipelineError::Stalled(names));
            };
            let stage = pending.remove(position);
            let workers = stage.workers.len();
            for worker in stage.workers {
                if worker.join().is_err() {
                    error!(stage = %stage.name, "worker panicked");
                    first_error.get_or_insert_with(|| PipelineError::WorkerPanicked(stage.name.clone()));
                }
            }
            debug!(stage = %stage.name, processed = stage.processed.get(), "stage drained");

            for id in &stage.feeds {
                let slot = &mut self.queues[id.0];
                slot.producers = slot.producers.saturating_sub(1);
                if slot.producers == 0 {
                    slot.sender = None;
                    debug!(queue = %slot.name, "queue closed");
                }
            }
            reports.push(StageReport {
                name: stage.name,
                workers,
                processed: stage.processed.get(),
            });
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }
}

/// Workers for a stage: `ratio` of the CPU count, at least one, capped by
/// `max_workers` when given.
pub fn workers_for(ratio: f64, cpus: usize, max_workers: Option<usize>) -> usize {
    let wanted = ((cpus as f64) * ratio).round() as usize;
    let capped = match max_workers {
        Some(max) => wanted.min(max),
        None => wanted,
    };
    capped.clamp(1, cpus.max(1))
}
