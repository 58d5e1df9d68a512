//! Outstanding directory work. The walk is finished when the count returns to zero, which stays
//! correct while tasks keep enqueueing children.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct PendingWork {
    count: AtomicUsize,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
}

impl Default for PendingWork {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingWork {
    pub fn new() -> Self {
        let (done_tx, done_rx) = bounded(1);
        Self {
            count: AtomicUsize::new(0),
            done_tx,
            done_rx,
        }
    }

    /// Register one unit before it is handed to anyone.
    pub fn add(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Retire one unit. The last one fires the completion signal.
    pub fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _ = self.done_tx.try_send(());
        }
    }

    pub fn outstanding(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Fires once the count drops to zero.
    pub fn done(&self) -> &Receiver<()> {
        &self.done_rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn signals_when_fan_out_drains() {
        let p = Arc::new(PendingWork::new());
        p.add();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                p.add();
                let p = Arc::clone(&p);
                std::thread::spawn(move || p.finish())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(p.done().try_recv().is_err());
        p.finish();
        assert!(p.done().try_recv().is_ok());
        assert_eq!(p.outstanding(), 0);
    }
}
