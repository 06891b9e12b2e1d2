use chrono::NaiveDateTime;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Provenance, Resource, SyncResult};
use crate::api::RemoteFetcher;
use crate::snapshot::{self, SlotLock, SnapshotStore};

/// Source of "now" for wall-clock derived fields.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Local wall-clock time, the calendar the feed's timestamps are written in.
pub fn local_clock() -> Clock {
    Arc::new(|| chrono::Local::now().naive_local())
}

/// Runs cache-aside fetch cycles for one resource type.
///
/// Only the most recent cycle is live: starting a new one aborts the previous
/// cycle's task, and every emission is checked against the current generation
/// before it is sent, so a superseded cycle can never deliver a result.
pub struct Synchronizer<R: Resource> {
    fetcher: Arc<dyn RemoteFetcher>,
    store: Arc<dyn SnapshotStore>,
    clock: Clock,
    cache_read_timeout: Duration,
    generation: Arc<AtomicU64>,
    active: Mutex<Option<JoinHandle<()>>>,
    write_lock: SlotLock,
    _resource: PhantomData<fn() -> R>,
}

/// Emissions of a single fetch cycle, in order. Ends after the terminal
/// result, or early if the cycle is superseded or cancelled.
pub struct SyncCycle<T> {
    generation: u64,
    rx: mpsc::Receiver<SyncResult<T>>,
}

impl<T> SyncCycle<T> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn next(&mut self) -> Option<SyncResult<T>> {
        self.rx.recv().await
    }

    /// Drain the whole cycle.
    #[cfg(test)]
    pub async fn collect(mut self) -> Vec<SyncResult<T>> {
        let mut out = Vec::with_capacity(2);
        while let Some(result) = self.rx.recv().await {
            out.push(result);
        }
        out
    }
}

impl<R: Resource> Synchronizer<R> {
    pub fn new(
        fetcher: Arc<dyn RemoteFetcher>,
        store: Arc<dyn SnapshotStore>,
        clock: Clock,
        cache_read_timeout: Duration,
    ) -> Self {
        Synchronizer {
            fetcher,
            store,
            clock,
            cache_read_timeout,
            generation: Arc::new(AtomicU64::new(0)),
            active: Mutex::new(None),
            write_lock: SlotLock::default(),
            _resource: PhantomData,
        }
    }

    pub fn key(&self) -> &'static str {
        R::KEY
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Start a fresh fetch cycle, superseding any cycle still in flight.
    pub fn sync(&self) -> SyncCycle<R::Output> {
        let (tx, rx) = mpsc::channel(2);

        // Bump and spawn under the lock so concurrent callers can't leave an
        // older cycle registered as the active one.
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let cycle = Cycle::<R> {
            generation,
            current: Arc::clone(&self.generation),
            fetcher: Arc::clone(&self.fetcher),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            cache_read_timeout: self.cache_read_timeout,
            write_lock: Arc::clone(&self.write_lock),
            tx,
            _resource: PhantomData,
        };
        let task = tokio::spawn(cycle.run());

        if let Some(previous) = active.replace(task) {
            if !previous.is_finished() {
                debug!(resource = R::KEY, generation, "Superseding in-flight sync cycle");
            }
            previous.abort();
        }

        SyncCycle { generation, rx }
    }

    /// Stop the active cycle, if any. No further results are emitted for it.
    pub fn cancel(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        // Invalidate the generation first so a result racing the abort is dropped
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = active.take() {
            task.abort();
        }
    }
}

impl<R: Resource> Drop for Synchronizer<R> {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Cycle<R: Resource> {
    generation: u64,
    current: Arc<AtomicU64>,
    fetcher: Arc<dyn RemoteFetcher>,
    store: Arc<dyn SnapshotStore>,
    clock: Clock,
    cache_read_timeout: Duration,
    write_lock: SlotLock,
    tx: mpsc::Sender<SyncResult<R::Output>>,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Cycle<R> {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    /// Send unless superseded or abandoned. Returns whether the cycle should
    /// keep going.
    async fn emit(&self, result: SyncResult<R::Output>) -> bool {
        if !self.is_current() {
            debug!(
                resource = R::KEY,
                generation = self.generation,
                "Dropping emission from superseded cycle"
            );
            return false;
        }
        self.tx.send(result).await.is_ok()
    }

    async fn run(self) {
        let key = R::KEY;
        let generation = self.generation;

        let cached: Option<Vec<R::Payload>> =
            snapshot::load_json(Arc::clone(&self.store), key, self.cache_read_timeout).await;
        let cached = cached
            .filter(|payloads| !payloads.is_empty())
            .map(|payloads| R::decode(payloads, (self.clock)()));

        if let Some(data) = &cached {
            debug!(resource = key, generation, "Emitting snapshot while network is pending");
            let immediate = SyncResult::Success {
                data: data.clone(),
                provenance: None,
            };
            if !self.emit(immediate).await {
                return;
            }
        }

        let fetched = tokio::select! {
            res = R::fetch(self.fetcher.as_ref()) => res,
            _ = self.tx.closed() => {
                debug!(resource = key, generation, "Sync cycle abandoned by consumer");
                return;
            }
        };

        let terminal = match fetched {
            Ok(payloads) => {
                if !self.is_current() {
                    return;
                }
                // Re-checked under the slot lock: an aborted cycle's blocking
                // write can outlive the task that started it
                let current = Arc::clone(&self.current);
                snapshot::save_json(
                    Arc::clone(&self.store),
                    key,
                    &payloads,
                    &self.write_lock,
                    move || current.load(Ordering::SeqCst) == generation,
                )
                .await;
                let data = R::decode(payloads, (self.clock)());
                info!(
                    resource = key,
                    generation,
                    source = self.fetcher.name(),
                    "Fetched fresh data"
                );
                SyncResult::Success {
                    data,
                    provenance: Some(Provenance::Network),
                }
            }
            Err(e) => match cached {
                Some(data) if e.is_transport() => {
                    info!(resource = key, generation, error = %e, "Offline, serving snapshot");
                    SyncResult::Success {
                        data,
                        provenance: Some(Provenance::Cache),
                    }
                }
                Some(data) => {
                    warn!(
                        resource = key,
                        generation,
                        error = %e,
                        body = e.body().unwrap_or_default(),
                        "Fetch failed, serving snapshot"
                    );
                    SyncResult::Success {
                        data,
                        provenance: Some(Provenance::Cache),
                    }
                }
                None => {
                    warn!(
                        resource = key,
                        generation,
                        error = %e,
                        body = e.body().unwrap_or_default(),
                        "Fetch failed with no snapshot"
                    );
                    SyncResult::Failure {
                        message: e.to_string(),
                    }
                }
            },
        };

        self.emit(terminal).await;
    }
}
