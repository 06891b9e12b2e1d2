use chrono::NaiveDateTime;
use futures_util::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};

use crate::api::{FetchError, RemoteFetcher};
use crate::models::{
    Competition, CompetitionPayload, Event, EventCollection, EventPayload, Sport, SportPayload,
};

/// One remotely-fetched, locally-snapshotted resource type.
pub trait Resource: Send + Sync + 'static {
    /// Wire shape, persisted verbatim in the snapshot store
    type Payload: Serialize + DeserializeOwned + Send + Sync + 'static;
    /// Decoded shape handed to consumers
    type Output: Clone + Send + Sync + 'static;

    /// Snapshot slot name
    const KEY: &'static str;

    fn fetch(fetcher: &dyn RemoteFetcher) -> BoxFuture<'_, Result<Vec<Self::Payload>, FetchError>>;

    /// `now` feeds any wall-clock derived fields (event date categories).
    fn decode(payloads: Vec<Self::Payload>, now: NaiveDateTime) -> Self::Output;
}

pub struct Sports;
pub struct Competitions;
pub struct Events;

impl Resource for Sports {
    type Payload = SportPayload;
    type Output = Vec<Sport>;
    const KEY: &'static str = "sports";

    fn fetch(fetcher: &dyn RemoteFetcher) -> BoxFuture<'_, Result<Vec<SportPayload>, FetchError>> {
        fetcher.fetch_sports()
    }

    fn decode(payloads: Vec<SportPayload>, _now: NaiveDateTime) -> Vec<Sport> {
        payloads.into_iter().map(Sport::from).collect()
    }
}

impl Resource for Competitions {
    type Payload = CompetitionPayload;
    type Output = Vec<Competition>;
    const KEY: &'static str = "competitions";

    fn fetch(
        fetcher: &dyn RemoteFetcher,
    ) -> BoxFuture<'_, Result<Vec<CompetitionPayload>, FetchError>> {
        fetcher.fetch_competitions()
    }

    fn decode(payloads: Vec<CompetitionPayload>, _now: NaiveDateTime) -> Vec<Competition> {
        payloads.into_iter().map(Competition::from).collect()
    }
}

impl Resource for Events {
    type Payload = EventPayload;
    type Output = EventCollection;
    const KEY: &'static str = "events";

    fn fetch(fetcher: &dyn RemoteFetcher) -> BoxFuture<'_, Result<Vec<EventPayload>, FetchError>> {
        fetcher.fetch_events()
    }

    fn decode(payloads: Vec<EventPayload>, now: NaiveDateTime) -> EventCollection {
        let events: Vec<Event> = payloads.into_iter().map(|p| p.into_event(now)).collect();
        EventCollection::from_events(events)
    }
}
