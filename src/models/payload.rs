//! Wire shapes returned by the feed API and persisted as snapshots.
//!
//! Field names follow the feed's camelCase JSON. Snapshots store these
//! payloads verbatim, so decoding a snapshot and decoding a fresh response go
//! through the same conversions below.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{Competition, Event, EventStatus, Score, Sport};
use crate::categorize::categorize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SportPayload {
    pub id: i64,
    pub name: String,
    #[serde(default, alias = "sportIconUrl")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionPayload {
    pub id: i64,
    pub sport_id: i64,
    pub name: String,
    #[serde(default, alias = "competitionIconUrl")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub id: i64,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub home_team_avatar: Option<String>,
    #[serde(default)]
    pub away_team_avatar: Option<String>,
    pub date: String,
    pub status: String,
    #[serde(default)]
    pub current_time: Option<String>,
    #[serde(default)]
    pub result: Option<ScorePayload>,
    pub sport_id: i64,
    pub competition_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePayload {
    pub home: u32,
    pub away: u32,
}

impl From<SportPayload> for Sport {
    fn from(p: SportPayload) -> Self {
        Sport {
            id: p.id,
            name: p.name,
            icon_url: p.icon_url,
        }
    }
}

impl From<CompetitionPayload> for Competition {
    fn from(p: CompetitionPayload) -> Self {
        Competition {
            id: p.id,
            sport_id: p.sport_id,
            name: p.name,
            icon_url: p.icon_url,
        }
    }
}

impl From<ScorePayload> for Score {
    fn from(p: ScorePayload) -> Self {
        Score {
            home: p.home,
            away: p.away,
        }
    }
}

impl EventPayload {
    /// Decode into a domain event. The date category is derived from `now`
    /// for scheduled fixtures only, so decoding the same payload on another
    /// day can yield a different category.
    pub fn into_event(self, now: NaiveDateTime) -> Event {
        let status = EventStatus::from_wire(&self.status);
        let date_category = match status {
            EventStatus::Live => None,
            EventStatus::PreMatch => categorize(&self.date, now),
        };
        Event {
            id: self.id,
            home_team: self.home_team,
            away_team: self.away_team,
            home_team_avatar: self.home_team_avatar,
            away_team_avatar: self.away_team_avatar,
            date: self.date,
            status,
            current_time: self.current_time,
            score: self.result.map(Score::from),
            sport_id: self.sport_id,
            competition_id: self.competition_id,
            date_category,
            competition: None,
        }
    }
}
