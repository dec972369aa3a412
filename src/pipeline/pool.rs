//! Bounded worker pool used for asynchronous delivery.
//!
//! Each worker owns one bounded queue. Callers pick a lane per sink, so every
//! record for a given sink goes through the same worker and keeps the order
//! in which a single producer submitted it. A full queue blocks the producer.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::errors::SetupError;
use crate::models::LogRecord;
use crate::pipeline::sink::Sink;

/// Largest accepted `pool_size`.
pub const MAX_POOL_SIZE: usize = 64;

/// Records buffered per worker before producers block.
pub const QUEUE_CAPACITY: usize = 1024;

enum Job {
    Deliver {
        sink: Arc<Sink>,
        record: Arc<LogRecord>,
    },
    Flush(SyncSender<()>),
}

pub struct WorkerPool {
    senders: Vec<SyncSender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, SetupError> {
        if size == 0 || size > MAX_POOL_SIZE {
            return Err(SetupError::InvalidPoolSize(size));
        }

        let mut senders = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);
        for i in 0..size {
            let (tx, rx) = mpsc::sync_channel(QUEUE_CAPACITY);
            let handle = thread::Builder::new()
                .name(format!("schemalog-worker-{}", i))
                .spawn(move || run_worker(rx))?;
            senders.push(tx);
            handles.push(handle);
        }
        Ok(Self { senders, handles })
    }

    pub fn size(&self) -> usize {
        self.senders.len()
    }

    /// Queues `record` for `sink` on the worker owning `lane`.
    pub fn submit(&self, lane: usize, sink: Arc<Sink>, record: Arc<LogRecord>) {
        let sender = &self.senders[lane % self.senders.len()];
        // Send only fails once the worker has exited, which happens during drop.
        let _ = sender.send(Job::Deliver { sink, record });
    }

    /// Blocks until every job queued before this call has been delivered.
    pub fn flush(&self) {
        let acks: Vec<Receiver<()>> = self
            .senders
            .iter()
            .filter_map(|sender| {
                let (ack_tx, ack_rx) = mpsc::sync_channel(1);
                sender.send(Job::Flush(ack_tx)).ok().map(|_| ack_rx)
            })
            .collect();
        for ack in acks {
            let _ = ack.recv();
        }
    }
}

impl Drop for WorkerPool {
    /// Closes the queues and waits for the workers to drain them.
    fn drop(&mut self) {
        self.senders.clear();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_worker(jobs: Receiver<Job>) {
    for job in jobs {
        match job {
            Job::Deliver { sink, record } => {
                sink.deliver(&record);
            }
            Job::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
