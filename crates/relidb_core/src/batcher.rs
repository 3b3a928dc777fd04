//! Write coalescing.
//!
//! Concurrent [`crate::Store::batch`] closures funnel through a single
//! worker that drains them into one backend write transaction, amortizing
//! commit overhead. Effects of one batch are atomic and appear in append
//! order.

use crate::context::Context;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::store::Shared;
use crate::transaction::Transaction;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Upper bound on closures drained into one transaction.
const MAX_BATCH: usize = 64;

/// How long the worker waits for more closures after the first arrives.
const BATCH_WINDOW: Duration = Duration::from_millis(2);

pub(crate) type BatchFn<T> = Box<dyn FnMut(&mut Transaction<'_, T>) -> Result<()> + Send>;

struct BatchItem<T: Entry> {
    ctx: Context,
    run: BatchFn<T>,
    reply: Sender<Result<()>>,
}

/// The coalescing queue and its worker thread.
pub(crate) struct Batcher<T: Entry> {
    queue: Sender<BatchItem<T>>,
    worker: JoinHandle<()>,
}

impl<T: Entry> Batcher<T> {
    pub(crate) fn start(shared: Arc<Shared<T>>) -> Result<Self> {
        let (queue, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("relidb-batcher".into())
            .spawn(move || worker_loop(&shared, &rx))?;
        Ok(Self { queue, worker })
    }

    /// Enqueues a closure and returns its reply channel.
    pub(crate) fn append(&self, ctx: Context, run: BatchFn<T>) -> Result<Receiver<Result<()>>> {
        let (reply, receiver) = mpsc::channel();
        self.queue
            .send(BatchItem { ctx, run, reply })
            .map_err(|_| Error::Closed)?;
        Ok(receiver)
    }

    /// Stops the worker after it drains the queue.
    pub(crate) fn shutdown(self) {
        drop(self.queue);
        if self.worker.join().is_err() {
            warn!("batch worker panicked during shutdown");
        }
    }
}

fn worker_loop<T: Entry>(shared: &Shared<T>, rx: &Receiver<BatchItem<T>>) {
    debug!("batch worker started");
    while let Ok(first) = rx.recv() {
        let mut items = vec![first];
        let deadline = Instant::now() + BATCH_WINDOW;
        while items.len() < MAX_BATCH {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(item) => items.push(item),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        run_batch(shared, items);
    }
    debug!("batch worker stopped");
}

/// Runs a batch to completion.
///
/// A failing item rolls the whole transaction back and is excluded; the
/// survivors re-run in a fresh transaction. Each pass removes at least one
/// item, so this terminates.
fn run_batch<T: Entry>(shared: &Shared<T>, mut items: Vec<BatchItem<T>>) {
    while !items.is_empty() {
        match attempt(shared, &mut items) {
            Attempt::Committed => {
                for item in items.drain(..) {
                    let _ = item.reply.send(Ok(()));
                }
            }
            Attempt::ItemFailed(index, err) => {
                let failed = items.remove(index);
                let _ = failed.reply.send(Err(err));
            }
            Attempt::Aborted(message) => {
                warn!(%message, "batch aborted");
                for item in items.drain(..) {
                    let _ = item.reply.send(Err(Error::batch_aborted(message.clone())));
                }
            }
        }
    }
}

enum Attempt {
    Committed,
    ItemFailed(usize, Error),
    Aborted(String),
}

fn attempt<T: Entry>(shared: &Shared<T>, items: &mut [BatchItem<T>]) -> Attempt {
    let _guard = shared.write_lock.lock();
    let tx = match shared.backend.begin_write() {
        Ok(tx) => tx,
        Err(err) => return Attempt::Aborted(err.to_string()),
    };
    let mut txn = Transaction::write(shared, Context::background(), tx);

    for (index, item) in items.iter_mut().enumerate() {
        txn.set_context(item.ctx.clone());
        let result = item.ctx.check().and_then(|()| (item.run)(&mut txn));
        if let Err(err) = result {
            if let Some((tx, _log)) = txn.finish_write() {
                tx.rollback();
            }
            return Attempt::ItemFailed(index, err);
        }
    }

    let Some((tx, log)) = txn.finish_write() else {
        return Attempt::Aborted("write transaction vanished".into());
    };
    let staged = match shared.journal.stage(log) {
        Ok(staged) => staged,
        Err(err) => {
            tx.rollback();
            return Attempt::Aborted(err.to_string());
        }
    };
    match tx.commit() {
        Ok(()) => match staged.commit() {
            Ok(()) => Attempt::Committed,
            Err(err) => Attempt::Aborted(err.to_string()),
        },
        Err(err) => {
            if let Err(discard_err) = staged.discard() {
                warn!(%discard_err, "failed to discard staged journal records");
            }
            Attempt::Aborted(err.to_string())
        }
    }
}
