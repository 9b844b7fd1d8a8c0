use std::fmt;
use std::ops::Range;

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type SessionId = Ulid;
pub type ConferenceId = Ulid;

/// Opaque user identifier handed to us by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Half-open time-of-day interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Span {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> TimeDelta {
        self.end.signed_duration_since(self.start)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: NaiveTime) -> bool {
        self.start <= t && t < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    pub first_name: String,
    pub last_name: Option<String>,
    pub organization: Option<String>,
    /// e.g. "moderator", "panelist"
    pub role: Option<String>,
}

impl Speaker {
    pub fn new(first_name: impl Into<String>, last_name: Option<&str>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.map(str::to_string),
            organization: None,
            role: None,
        }
    }

    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conference {
    pub id: ConferenceId,
    pub name: String,
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub url: Option<String>,
    pub description: Option<String>,
}

impl Conference {
    pub fn new(id: ConferenceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            location: None,
            start_date: None,
            end_date: None,
            url: None,
            description: None,
        }
    }
}

/// A catalog session. Read-only as far as scheduling is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub conference_id: ConferenceId,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub track: Option<String>,
    pub session_type: Option<String>,
    #[serde(default)]
    pub speakers: Vec<Speaker>,
}

impl Session {
    pub fn new(
        id: SessionId,
        conference_id: ConferenceId,
        title: impl Into<String>,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self {
            id,
            conference_id,
            title: title.into(),
            description: None,
            date,
            start_time,
            end_time,
            track: None,
            session_type: None,
            speakers: Vec::new(),
        }
    }

    pub fn with_track(mut self, track: impl Into<String>) -> Self {
        self.track = Some(track.into());
        self
    }

    pub fn with_speaker(mut self, speaker: Speaker) -> Self {
        self.speakers.push(speaker);
        self
    }

    pub fn span(&self) -> Span {
        Span::new(self.start_time, self.end_time)
    }

    /// Schedule ordering: date, then start time, then id.
    pub fn sort_key(&self) -> (NaiveDate, NaiveTime, SessionId) {
        (self.date, self.start_time, self.id)
    }

    /// Two distinct sessions conflict when they share a date and their spans overlap.
    pub fn conflicts_with(&self, other: &Session) -> bool {
        self.id != other.id && self.date == other.date && self.span().overlaps(&other.span())
    }
}

/// A session on a user's schedule together with its derived conflict flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledSession {
    pub session: Session,
    pub has_conflict: bool,
}

/// All sessions one user has scheduled, sorted by `Session::sort_key`.
#[derive(Debug, Clone)]
pub struct UserSchedule {
    pub user_id: UserId,
    pub slots: Vec<ScheduledSession>,
}

impl UserSchedule {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            slots: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.slots.iter().any(|s| s.session.id == *session_id)
    }

    pub fn date_of(&self, session_id: &SessionId) -> Option<NaiveDate> {
        self.slots
            .iter()
            .find(|s| s.session.id == *session_id)
            .map(|s| s.session.date)
    }

    /// Insert keeping sort order. Returns false if the session was already present.
    pub fn insert_slot(&mut self, session: Session) -> bool {
        if self.contains(&session.id) {
            return false;
        }
        let key = session.sort_key();
        let pos = self
            .slots
            .binary_search_by_key(&key, |s| s.session.sort_key())
            .unwrap_or_else(|e| e);
        self.slots.insert(
            pos,
            ScheduledSession {
                session,
                has_conflict: false,
            },
        );
        true
    }

    pub fn remove_slot(&mut self, session_id: &SessionId) -> Option<ScheduledSession> {
        let pos = self.slots.iter().position(|s| s.session.id == *session_id)?;
        Some(self.slots.remove(pos))
    }

    /// Index range of the slots on `date`.
    pub fn day_range(&self, date: NaiveDate) -> Range<usize> {
        let lo = self.slots.partition_point(|s| s.session.date < date);
        let hi = self.slots.partition_point(|s| s.session.date <= date);
        lo..hi
    }

    pub fn day(&self, date: NaiveDate) -> &[ScheduledSession] {
        let range = self.day_range(date);
        &self.slots[range]
    }

    pub fn day_mut(&mut self, date: NaiveDate) -> &mut [ScheduledSession] {
        let range = self.day_range(date);
        &mut self.slots[range]
    }

    /// Distinct dates present in the schedule, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.slots.iter().map(|s| s.session.date).collect();
        dates.dedup();
        dates
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEntry {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub has_conflict: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub total_sessions: usize,
    pub conference_days: usize,
    pub distinct_tracks: usize,
    pub conflicts: usize,
}

/// Persisted schedule mutations. Conflict flags are derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SessionScheduled {
        user_id: UserId,
        session_id: SessionId,
    },
    SessionUnscheduled {
        user_id: UserId,
        session_id: SessionId,
    },
}

impl Event {
    pub fn user_id(&self) -> &UserId {
        match self {
            Event::SessionScheduled { user_id, .. } | Event::SessionUnscheduled { user_id, .. } => {
                user_id
            }
        }
    }

    pub fn session_id(&self) -> SessionId {
        match self {
            Event::SessionScheduled { session_id, .. }
            | Event::SessionUnscheduled { session_id, .. } => *session_id,
        }
    }
}
