use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, select};
use tsgw_common::UnixTimestamp;
use tsgw_statsd::metric;

use crate::KeyCache;
use crate::statsd::{KeyCacheGauges, KeyCacheTimers};

/// Handle to the background thread pruning a [`KeyCache`].
///
/// The thread stops when the handle is dropped or [`shutdown`](Self::shutdown) is called.
#[derive(Debug)]
pub struct PrunerHandle {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PrunerHandle {
    /// Stops the pruner and waits for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Disconnecting the channel wakes up the thread.
        self.shutdown.take();
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.join().is_err() {
            tsgw_log::error!("key cache pruner panicked");
        }
    }
}

impl Drop for PrunerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl KeyCache {
    /// Starts a background thread that calls [`prune`](Self::prune) every prune interval.
    pub fn spawn_pruner(self: &Arc<Self>) -> io::Result<PrunerHandle> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let ticker = crossbeam_channel::tick(self.prune_interval());
        let cache = Arc::clone(self);

        let thread = thread::Builder::new()
            .name("keycache-pruner".to_owned())
            .spawn(move || {
                tsgw_log::debug!(
                    interval = ?cache.prune_interval(),
                    stale_threshold = ?cache.stale_threshold(),
                    "key cache pruner started"
                );

                loop {
                    select! {
                        recv(ticker) -> _ => {
                            let report = metric!(timer(KeyCacheTimers::Prune), {
                                cache.prune(UnixTimestamp::now())
                            });

                            metric!(gauge(KeyCacheGauges::Size) = report.keys as u64);
                            metric!(gauge(KeyCacheGauges::Orgs) = report.orgs as u64);
                            tsgw_log::debug!(
                                keys = report.keys,
                                orgs = report.orgs,
                                removed_orgs = report.removed_orgs,
                                "pruned key cache"
                            );
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }

                tsgw_log::debug!("key cache pruner stopped");
            })?;

        Ok(PrunerHandle {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }
}
