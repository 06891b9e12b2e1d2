use serde::Serialize;
use std::collections::HashMap;

use crate::categorize::parse_timestamp;
use crate::models::{Competition, DateCategory, Event, EventCollection, Sport};
use crate::sync::SyncResult;

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DerivedView {
    Loading,
    Error,
    Success(MatchesView),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchesView {
    pub sports: Vec<Sport>,
    pub live_matches: Vec<Event>,
    pub upcoming_matches: Vec<Event>,
    pub selected_sport_id: Option<i64>,
    pub selected_date_category: DateCategory,
    pub is_offline: bool,
}

/// Latest value of every aggregator input. `None` results mean the resource
/// has not emitted anything yet.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    pub sports: Option<SyncResult<Vec<Sport>>>,
    pub competitions: Option<SyncResult<Vec<Competition>>>,
    pub events: Option<SyncResult<EventCollection>>,
    pub selected_sport_id: Option<i64>,
    pub selected_date_category: DateCategory,
}

fn payload<T>(result: &Option<SyncResult<T>>) -> Option<&T> {
    result.as_ref().and_then(SyncResult::data)
}

fn failed<T>(result: &Option<SyncResult<T>>) -> bool {
    result.as_ref().is_some_and(SyncResult::is_failure)
}

fn from_cache<T>(result: &Option<SyncResult<T>>) -> bool {
    result.as_ref().is_some_and(SyncResult::is_from_cache)
}

/// Derive the view from the current inputs.
///
/// Only sports and events gate the error state: competitions are enrichment
/// and their failure alone never produces `Error`. Any non-empty sports or
/// events payload yields `Success` regardless of failures elsewhere.
pub fn recompute(inputs: &Inputs) -> DerivedView {
    let no_events = EventCollection::default();
    let sports: &[Sport] = payload(&inputs.sports).map(Vec::as_slice).unwrap_or(&[]);
    let competitions: &[Competition] =
        payload(&inputs.competitions).map(Vec::as_slice).unwrap_or(&[]);
    let events = payload(&inputs.events).unwrap_or(&no_events);

    let has_data = !sports.is_empty() || !events.is_empty();
    let all_failed = failed(&inputs.sports) && failed(&inputs.events);

    if has_data {
        let is_offline = from_cache(&inputs.sports) || from_cache(&inputs.events);
        DerivedView::Success(build_view(
            sports,
            competitions,
            events,
            inputs.selected_sport_id,
            inputs.selected_date_category,
            is_offline,
        ))
    } else if all_failed {
        DerivedView::Error
    } else {
        DerivedView::Loading
    }
}

fn build_view(
    sports: &[Sport],
    competitions: &[Competition],
    events: &EventCollection,
    selected_sport_id: Option<i64>,
    date_category: DateCategory,
    is_offline: bool,
) -> MatchesView {
    let current_sport_id = selected_sport_id.or_else(|| sports.first().map(|s| s.id));
    let lookup: HashMap<i64, Competition> =
        competitions.iter().map(|c| (c.id, c.clone())).collect();
    let sport_matches = |e: &&Event| current_sport_id.map_or(true, |id| e.sport_id == id);

    let live_matches = events
        .live
        .iter()
        .filter(sport_matches)
        .map(|e| e.with_competition(&lookup))
        .collect();

    let mut upcoming_matches: Vec<Event> = events
        .upcoming
        .iter()
        .filter(sport_matches)
        .filter(|e| e.date_category == Some(date_category))
        .map(|e| e.with_competition(&lookup))
        .collect();
    // Stable: equal kickoff times keep fetch order
    upcoming_matches.sort_by_key(|e| parse_timestamp(&e.date));

    MatchesView {
        sports: sports.to_vec(),
        live_matches,
        upcoming_matches,
        selected_sport_id: current_sport_id,
        selected_date_category: date_category,
        is_offline,
    }
}
