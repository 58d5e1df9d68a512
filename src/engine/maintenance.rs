//! Background maintenance: one worker thread running catalog tasks in submission order.

use crossbeam_channel::{Sender, bounded, unbounded};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::engine::db_ops::Catalog;

#[derive(Debug)]
enum Task {
    /// Delete every row attributed to a forgotten root, then checkpoint.
    DeleteRoot(String),
    Checkpoint,
    /// After a bulk import: reclaim space, then checkpoint.
    VacuumCheckpoint,
    /// Reply once every earlier task has run.
    Barrier(Sender<()>),
}

pub struct Maintenance {
    tx: Mutex<Option<Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Maintenance {
    pub fn start(catalog: Arc<Catalog>) -> Self {
        let (tx, rx) = unbounded::<Task>();
        let worker = thread::spawn(move || {
            for task in rx {
                run_task(&catalog, task);
            }
            debug!("maintenance worker exiting");
        });
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn submit(&self, task: Task) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.send(task).is_ok(),
            None => false,
        }
    }

    pub fn delete_root(&self, root: &str) {
        if !self.submit(Task::DeleteRoot(root.to_string())) {
            warn!("maintenance worker gone; rows under {} not deleted", root);
        }
    }

    pub fn checkpoint(&self) {
        self.submit(Task::Checkpoint);
    }

    pub fn vacuum_checkpoint(&self) {
        self.submit(Task::VacuumCheckpoint);
    }

    /// Block until every task submitted before this call has finished.
    pub fn flush(&self) {
        let (done_tx, done_rx) = bounded(1);
        if self.submit(Task::Barrier(done_tx)) {
            let _ = done_rx.recv();
        }
    }

    /// Finish queued tasks and stop the worker.
    pub fn shutdown(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(h) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = h.join();
        }
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_task(catalog: &Catalog, task: Task) {
    let start = Instant::now();
    let res = match task {
        Task::DeleteRoot(root) => catalog.delete_root_rows(&root).and_then(|n| {
            info!(
                "Deleted {} rows of {} in {:.2}s",
                n,
                root,
                start.elapsed().as_secs_f64()
            );
            catalog.checkpoint()
        }),
        Task::Checkpoint => catalog.checkpoint(),
        Task::VacuumCheckpoint => catalog.vacuum().and_then(|_| catalog.checkpoint()),
        Task::Barrier(done) => {
            let _ = done.send(());
            Ok(())
        }
    };
    if let Err(e) = res {
        warn!("maintenance task failed: {:#}", e);
    }
}
