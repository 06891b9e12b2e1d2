use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub mod payload;

pub use payload::{CompetitionPayload, EventPayload, SportPayload};

/// A sport as listed by the feed (football, basketball, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sport {
    pub id: i64,
    pub name: String,
    pub icon_url: Option<String>,
}

/// A competition (league, cup) belonging to one sport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competition {
    pub id: i64,
    pub sport_id: i64,
    pub name: String,
    pub icon_url: Option<String>,
}

/// A single fixture, either in play or scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub home_team: String,
    pub away_team: String,
    pub home_team_avatar: Option<String>,
    pub away_team_avatar: Option<String>,
    /// Scheduled kick-off, "YYYY-MM-DD HH:MM"
    pub date: String,
    pub status: EventStatus,
    /// Elapsed-time label such as "45'" (live events only)
    pub current_time: Option<String>,
    pub score: Option<Score>,
    pub sport_id: i64,
    pub competition_id: i64,
    /// Computed at decode time; always `None` for live events
    pub date_category: Option<DateCategory>,
    /// Attached by the aggregator when the competition is known
    pub competition: Option<Competition>,
}

impl Event {
    /// Copy of this event with its owning competition attached (or cleared
    /// when the lookup has no entry for it).
    pub fn with_competition(&self, competitions: &HashMap<i64, Competition>) -> Event {
        Event {
            competition: competitions.get(&self.competition_id).cloned(),
            ..self.clone()
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == EventStatus::Live
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Live,
    PreMatch,
}

impl EventStatus {
    /// Wire status to domain status. Anything other than "LIVE" is treated
    /// as a scheduled fixture.
    pub fn from_wire(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("live") {
            EventStatus::Live
        } else {
            EventStatus::PreMatch
        }
    }
}

/// Coarse bucket for upcoming fixtures relative to today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateCategory {
    #[default]
    Today,
    Tomorrow,
    Weekend,
    NextWeek,
}

impl fmt::Display for DateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DateCategory::Today => "today",
            DateCategory::Tomorrow => "tomorrow",
            DateCategory::Weekend => "weekend",
            DateCategory::NextWeek => "next_week",
        };
        f.write_str(s)
    }
}

impl FromStr for DateCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "today" => Ok(DateCategory::Today),
            "tomorrow" => Ok(DateCategory::Tomorrow),
            "weekend" => Ok(DateCategory::Weekend),
            "next_week" | "nextweek" => Ok(DateCategory::NextWeek),
            other => Err(format!("unknown date category '{}'", other)),
        }
    }
}

/// All known events split into in-play and scheduled, each in fetch order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCollection {
    pub live: Vec<Event>,
    pub upcoming: Vec<Event>,
}

impl EventCollection {
    pub fn from_events(events: Vec<Event>) -> Self {
        let (live, upcoming): (Vec<Event>, Vec<Event>) =
            events.into_iter().partition(Event::is_live);
        EventCollection { live, upcoming }
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty() && self.upcoming.is_empty()
    }
}
