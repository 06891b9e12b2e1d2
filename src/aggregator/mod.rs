//! Combines the three resource streams and the user's filter selections into
//! one derived view.
//!
//! Architecture:
//! ```text
//!  Synchronizer<Sports>        ─┐
//!  Synchronizer<Competitions>  ─┼─ forwarders ─▶ updates ─┐
//!  Synchronizer<Events>        ─┘                          ├─▶ actor
//!  AggregatorHandle (select / retry / shutdown) ─▶ commands ┘    │
//!                                                   recompute() ─▶ watch<DerivedView>
//! ```
//!
//! The actor is the only writer of the inputs; every update is applied and
//! the view republished before the next one is taken off the queues.

pub mod view;

pub use view::{recompute, DerivedView, Inputs};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::api::RemoteFetcher;
use crate::models::{Competition, DateCategory, EventCollection, Sport};
use crate::snapshot::SnapshotStore;
use crate::sync::{
    Clock, Competitions, Events, Resource, Sports, SyncCycle, SyncResult, Synchronizer,
};

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Aggregator has shut down")]
pub struct AggregatorClosed;

/// Everything the aggregator needs to build its synchronizers.
pub struct AggregatorConfig {
    pub fetcher: Arc<dyn RemoteFetcher>,
    pub store: Arc<dyn SnapshotStore>,
    pub clock: Clock,
    pub cache_read_timeout: Duration,
    /// `None` disables periodic refresh
    pub refresh_interval: Option<Duration>,
}

enum Command {
    SelectSport(i64),
    SelectDateCategory(DateCategory),
    Retry,
    Shutdown(oneshot::Sender<()>),
}

enum Update {
    Sports(u64, SyncResult<Vec<Sport>>),
    Competitions(u64, SyncResult<Vec<Competition>>),
    Events(u64, SyncResult<EventCollection>),
}

/// Cheap, cloneable access to a running aggregator. The aggregator stops
/// once `shutdown` is called or every handle has been dropped.
#[derive(Clone)]
pub struct AggregatorHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<DerivedView>,
}

impl AggregatorHandle {
    /// Receiver notified on every recomputation.
    pub fn subscribe(&self) -> watch::Receiver<DerivedView> {
        self.view.clone()
    }

    pub fn current(&self) -> DerivedView {
        self.view.borrow().clone()
    }

    /// Select a sport; the date filter goes back to today.
    pub async fn select_sport(&self, sport_id: i64) -> Result<(), AggregatorClosed> {
        self.send(Command::SelectSport(sport_id)).await
    }

    pub async fn select_date_category(
        &self,
        category: DateCategory,
    ) -> Result<(), AggregatorClosed> {
        self.send(Command::SelectDateCategory(category)).await
    }

    /// Start fresh fetch cycles for every resource, keeping the selections.
    pub async fn retry(&self) -> Result<(), AggregatorClosed> {
        self.send(Command::Retry).await
    }

    /// Stop the aggregator and cancel any in-flight fetches. Resolves once
    /// the actor has stopped.
    pub async fn shutdown(&self) -> Result<(), AggregatorClosed> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Command::Shutdown(done_tx)).await?;
        done_rx.await.map_err(|_| AggregatorClosed)
    }

    async fn send(&self, command: Command) -> Result<(), AggregatorClosed> {
        self.commands.send(command).await.map_err(|_| AggregatorClosed)
    }
}

pub struct Aggregator {
    sports: Synchronizer<Sports>,
    competitions: Synchronizer<Competitions>,
    events: Synchronizer<Events>,
    inputs: Inputs,
    updates_tx: mpsc::Sender<Update>,
    view_tx: watch::Sender<DerivedView>,
    refresh_interval: Option<Duration>,
}

impl Aggregator {
    /// Spawn the actor, kick off the first fetch cycles and return a handle.
    pub fn spawn(config: AggregatorConfig) -> (AggregatorHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (updates_tx, updates_rx) = mpsc::channel(64);
        let (view_tx, view_rx) = watch::channel(DerivedView::Loading);

        let AggregatorConfig {
            fetcher,
            store,
            clock,
            cache_read_timeout,
            refresh_interval,
        } = config;

        let aggregator = Aggregator {
            sports: Synchronizer::new(
                Arc::clone(&fetcher),
                Arc::clone(&store),
                Arc::clone(&clock),
                cache_read_timeout,
            ),
            competitions: Synchronizer::new(
                Arc::clone(&fetcher),
                Arc::clone(&store),
                Arc::clone(&clock),
                cache_read_timeout,
            ),
            events: Synchronizer::new(fetcher, store, clock, cache_read_timeout),
            inputs: Inputs::default(),
            updates_tx,
            view_tx,
            refresh_interval: refresh_interval.filter(|d| !d.is_zero()),
        };

        let task = tokio::spawn(aggregator.run(commands_rx, updates_rx));
        let handle = AggregatorHandle {
            commands: commands_tx,
            view: view_rx,
        };
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut updates: mpsc::Receiver<Update>,
    ) {
        info!(
            refresh = ?self.refresh_interval,
            "Aggregator started"
        );
        self.start_cycles();

        let mut refresh = self.refresh_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        let mut done: Option<oneshot::Sender<()>> = None;
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown(ack)) => {
                        done = Some(ack);
                        break;
                    }
                    Some(command) => self.apply_command(command),
                    None => {
                        debug!("All aggregator handles dropped");
                        break;
                    }
                },
                Some(update) = updates.recv() => self.apply_update(update),
                _ = next_tick(&mut refresh) => {
                    debug!("Periodic refresh");
                    self.start_cycles();
                }
            }
        }

        // Refuse further commands before acknowledging shutdown
        commands.close();
        self.sports.cancel();
        self.competitions.cancel();
        self.events.cancel();
        info!("Aggregator stopped");
        if let Some(ack) = done {
            let _ = ack.send(());
        }
    }

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::SelectSport(sport_id) => {
                debug!(sport_id, "Sport selected");
                self.inputs.selected_sport_id = Some(sport_id);
                self.inputs.selected_date_category = DateCategory::Today;
            }
            Command::SelectDateCategory(category) => {
                debug!(%category, "Date category selected");
                self.inputs.selected_date_category = category;
            }
            Command::Retry => {
                info!("Retrying all resources");
                self.start_cycles();
                return;
            }
            // Handled by the run loop
            Command::Shutdown(_) => return,
        }
        self.publish();
    }

    fn apply_update(&mut self, update: Update) {
        let applied = match update {
            Update::Sports(generation, result) => {
                accept(&self.sports, generation, result, &mut self.inputs.sports)
            }
            Update::Competitions(generation, result) => accept(
                &self.competitions,
                generation,
                result,
                &mut self.inputs.competitions,
            ),
            Update::Events(generation, result) => {
                accept(&self.events, generation, result, &mut self.inputs.events)
            }
        };
        if applied {
            self.publish();
        }
    }

    fn publish(&self) {
        let view = recompute(&self.inputs);
        match &view {
            DerivedView::Success(v) => debug!(
                live = v.live_matches.len(),
                upcoming = v.upcoming_matches.len(),
                offline = v.is_offline,
                "View recomputed"
            ),
            other => debug!(state = ?other, "View recomputed"),
        }
        self.view_tx.send_replace(view);
    }

    /// Start a fresh cycle on every synchronizer. Previous results stay in
    /// place until the new cycles report.
    fn start_cycles(&self) {
        forward(self.sports.sync(), self.updates_tx.clone(), Update::Sports);
        forward(
            self.competitions.sync(),
            self.updates_tx.clone(),
            Update::Competitions,
        );
        forward(self.events.sync(), self.updates_tx.clone(), Update::Events);
    }
}

/// Store `result` unless its cycle has been superseded.
fn accept<R: Resource>(
    sync: &Synchronizer<R>,
    generation: u64,
    result: SyncResult<R::Output>,
    slot: &mut Option<SyncResult<R::Output>>,
) -> bool {
    if !sync.is_current(generation) {
        debug!(resource = sync.key(), generation, "Ignoring superseded result");
        return false;
    }
    match result.message() {
        Some(message) => debug!(
            resource = sync.key(),
            generation,
            error = message,
            "Accepted sync failure"
        ),
        None => debug!(
            resource = sync.key(),
            generation,
            provenance = ?result.provenance(),
            "Accepted sync result"
        ),
    }
    *slot = Some(result);
    true
}

fn forward<T, F>(mut cycle: SyncCycle<T>, updates: mpsc::Sender<Update>, wrap: F)
where
    T: Send + 'static,
    F: Fn(u64, SyncResult<T>) -> Update + Send + 'static,
{
    tokio::spawn(async move {
        let generation = cycle.generation();
        while let Some(result) = cycle.next().await {
            let terminal = result.is_terminal();
            if updates.send(wrap(generation, result)).await.is_err() || terminal {
                break;
            }
        }
    });
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompetitionPayload, DateCategory};
    use crate::snapshot::test_support::MemoryStore;
    use crate::sync::synchronizer::test_support::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn spawn_with(
        fetcher: Arc<ScriptedFetcher>,
        store: Arc<MemoryStore>,
        refresh_interval: Option<Duration>,
    ) -> (AggregatorHandle, JoinHandle<()>) {
        Aggregator::spawn(AggregatorConfig {
            fetcher,
            store,
            clock: fixed_clock("2025-06-09 12:00"),
            cache_read_timeout: Duration::from_millis(500),
            refresh_interval,
        })
    }

    async fn wait_for<F>(handle: &AggregatorHandle, pred: F) -> DerivedView
    where
        F: FnMut(&DerivedView) -> bool,
    {
        let mut rx = handle.subscribe();
        let view = tokio::time::timeout(WAIT, rx.wait_for(pred))
            .await
            .expect("timed out waiting for view")
            .expect("aggregator stopped");
        view.clone()
    }

    /// Both gating resources have delivered data
    fn is_loaded(view: &DerivedView) -> bool {
        matches!(
            view,
            DerivedView::Success(v) if !v.sports.is_empty() && !v.live_matches.is_empty()
        )
    }

    fn full_feed() -> ScriptedFetcher {
        ScriptedFetcher::new(
            vec![Script::Ok(vec![
                sport_payload(1, "Football"),
                sport_payload(2, "Basketball"),
            ])],
            vec![Script::Ok(vec![CompetitionPayload {
                id: 10,
                sport_id: 1,
                name: "Premier League".into(),
                icon_url: None,
            }])],
            vec![Script::Ok(vec![
                event_payload(1, 1, "LIVE", "2025-06-09 11:00"),
                event_payload(2, 2, "LIVE", "2025-06-09 11:30"),
                event_payload(3, 1, "PRE_MATCH", "2025-06-09 20:00"),
                event_payload(4, 1, "PRE_MATCH", "2025-06-10 20:00"),
                event_payload(5, 2, "PRE_MATCH", "2025-06-09 19:00"),
            ])],
        )
    }

    #[tokio::test]
    async fn test_initial_view_resolves_first_sport() {
        let (handle, _task) = spawn_with(
            Arc::new(full_feed()),
            Arc::new(MemoryStore::default()),
            None,
        );

        let view = wait_for(&handle, is_loaded).await;

        let DerivedView::Success(view) = view else { unreachable!() };
        assert_eq!(view.selected_sport_id, Some(1));
        assert_eq!(view.live_matches.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(view.upcoming_matches.iter().map(|e| e.id).collect::<Vec<_>>(), vec![3]);
        assert!(!view.is_offline);
    }

    #[tokio::test]
    async fn test_select_sport_resets_date_category() {
        let (handle, _task) = spawn_with(
            Arc::new(full_feed()),
            Arc::new(MemoryStore::default()),
            None,
        );
        wait_for(&handle, is_loaded).await;

        handle.select_date_category(DateCategory::Tomorrow).await.unwrap();
        wait_for(&handle, |v| {
            matches!(
                v,
                DerivedView::Success(v) if v.selected_date_category == DateCategory::Tomorrow
            )
        })
        .await;

        handle.select_sport(2).await.unwrap();
        let view = wait_for(&handle, |v| {
            matches!(v, DerivedView::Success(v) if v.selected_sport_id == Some(2))
        })
        .await;

        let DerivedView::Success(view) = view else { unreachable!() };
        assert_eq!(view.selected_date_category, DateCategory::Today);
        assert_eq!(view.live_matches.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(view.upcoming_matches.iter().map(|e| e.id).collect::<Vec<_>>(), vec![5]);
    }

    #[tokio::test]
    async fn test_select_date_category_keeps_sport() {
        let (handle, _task) = spawn_with(
            Arc::new(full_feed()),
            Arc::new(MemoryStore::default()),
            None,
        );
        wait_for(&handle, is_loaded).await;

        handle.select_sport(1).await.unwrap();
        handle.select_date_category(DateCategory::Tomorrow).await.unwrap();
        let view = wait_for(&handle, |v| {
            matches!(
                v,
                DerivedView::Success(v) if v.selected_date_category == DateCategory::Tomorrow
            )
        })
        .await;

        let DerivedView::Success(view) = view else { unreachable!() };
        assert_eq!(view.selected_sport_id, Some(1));
        assert_eq!(view.upcoming_matches.iter().map(|e| e.id).collect::<Vec<_>>(), vec![4]);
    }

    #[tokio::test]
    async fn test_error_then_retry_recovers_and_keeps_selection() {
        let fetcher = Arc::new(ScriptedFetcher::new(
            vec![Script::Transport, Script::Ok(vec![sport_payload(1, "Football")])],
            vec![Script::Status(500)],
            vec![
                Script::Status(502),
                Script::Ok(vec![event_payload(1, 7, "LIVE", "2025-06-09 11:00")]),
            ],
        ));
        let (handle, _task) = spawn_with(fetcher.clone(), Arc::new(MemoryStore::default()), None);

        wait_for(&handle, |v| *v == DerivedView::Error).await;

        handle.select_sport(7).await.unwrap();
        handle.retry().await.unwrap();
        let view = wait_for(&handle, |v| {
            matches!(v, DerivedView::Success(v) if !v.live_matches.is_empty())
        })
        .await;

        let DerivedView::Success(view) = view else { unreachable!() };
        assert_eq!(view.selected_sport_id, Some(7));
        assert_eq!(view.live_matches[0].id, 1);
        assert_eq!(fetcher.sports.calls(), 2);
    }

    #[tokio::test]
    async fn test_offline_when_network_fails_with_snapshot() {
        let cached = serde_json::to_vec(&vec![sport_payload(1, "Football")]).unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new(
            vec![Script::Transport],
            vec![Script::Transport],
            vec![Script::Ok(vec![])],
        ));
        let (handle, _task) = spawn_with(
            fetcher,
            Arc::new(MemoryStore::with_slot("sports", &cached)),
            None,
        );

        let view = wait_for(&handle, |v| {
            matches!(v, DerivedView::Success(v) if v.is_offline)
        })
        .await;
        let DerivedView::Success(view) = view else { unreachable!() };
        assert_eq!(view.sports.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting_commands() {
        let (handle, task) = spawn_with(
            Arc::new(full_feed()),
            Arc::new(MemoryStore::default()),
            None,
        );
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(handle.retry().await, Err(AggregatorClosed));
        assert_eq!(handle.select_sport(1).await, Err(AggregatorClosed));
    }

    #[tokio::test]
    async fn test_dropping_all_handles_stops_aggregator() {
        let (handle, task) = spawn_with(
            Arc::new(full_feed()),
            Arc::new(MemoryStore::default()),
            Some(Duration::from_millis(10)),
        );
        drop(handle);
        tokio::time::timeout(WAIT, task)
            .await
            .expect("aggregator kept running")
            .unwrap();
    }

    #[tokio::test]
    async fn test_periodic_refresh_starts_new_cycles() {
        let fetcher = Arc::new(full_feed());
        let (handle, task) = spawn_with(
            fetcher.clone(),
            Arc::new(MemoryStore::default()),
            Some(Duration::from_millis(20)),
        );

        tokio::time::timeout(WAIT, async {
            while fetcher.sports.calls() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("refresh never fired");

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        let calls = fetcher.sports.calls();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fetcher.sports.calls(), calls, "refresh kept running after shutdown");
    }

    #[tokio::test]
    async fn test_superseded_result_is_ignored() {
        let fetcher = Arc::new(full_feed());
        let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::default());
        let sync: Synchronizer<Sports> = Synchronizer::new(
            fetcher,
            store,
            fixed_clock("2025-06-09 12:00"),
            Duration::from_millis(500),
        );
        let stale = sync.sync().generation();
        let current = sync.sync().generation();

        let mut slot = None;
        let result = SyncResult::Success {
            data: vec![],
            provenance: None,
        };
        assert!(!accept(&sync, stale, result.clone(), &mut slot));
        assert!(slot.is_none());
        assert!(accept(&sync, current, result, &mut slot));
        assert!(slot.is_some());
    }
}
