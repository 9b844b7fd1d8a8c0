use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    InvalidSession(&'static str),
    LimitExceeded(&'static str),
    /// Seed file could not be read or parsed.
    Seed(String),
    /// Backend unreachable (remote catalogs).
    Unavailable(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::NotFound(id) => write!(f, "not found: {id}"),
            CatalogError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            CatalogError::InvalidSession(msg) => write!(f, "invalid session: {msg}"),
            CatalogError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            CatalogError::Seed(e) => write!(f, "catalog seed error: {e}"),
            CatalogError::Unavailable(e) => write!(f, "catalog unavailable: {e}"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Browse filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub track: Option<String>,
    pub date: Option<NaiveDate>,
    pub conference_id: Option<ConferenceId>,
}

impl SessionFilter {
    pub fn matches(&self, session: &Session) -> bool {
        self.track
            .as_deref()
            .is_none_or(|t| session.track.as_deref() == Some(t))
            && self.date.is_none_or(|d| session.date == d)
            && self.conference_id.is_none_or(|c| session.conference_id == c)
    }
}

/// Read-only access to session records owned elsewhere.
#[async_trait]
pub trait SessionCatalog: Send + Sync {
    async fn get_session(&self, id: &SessionId) -> Result<Session, CatalogError>;

    async fn list_sessions_on_date(&self, date: NaiveDate) -> Result<Vec<Session>, CatalogError>;

    /// Sessions matching `filter`, ordered by date then start time.
    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, CatalogError>;
}

/// On-disk seed format for [`InMemoryCatalog`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub conferences: Vec<Conference>,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

/// Organizer-side catalog kept in memory.
pub struct InMemoryCatalog {
    conferences: DashMap<ConferenceId, Conference>,
    sessions: DashMap<SessionId, Session>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted(mut sessions: Vec<Session>) -> Vec<Session> {
    sessions.sort_by_key(Session::sort_key);
    sessions
}

fn validate_session(session: &Session) -> Result<(), CatalogError> {
    if session.title.trim().is_empty() {
        return Err(CatalogError::InvalidSession("title is empty"));
    }
    if session.title.len() > MAX_TITLE_LEN {
        return Err(CatalogError::LimitExceeded("session title too long"));
    }
    if session.start_time >= session.end_time {
        return Err(CatalogError::InvalidSession("start time must be before end time"));
    }
    if session.speakers.len() > MAX_SPEAKERS_PER_SESSION {
        return Err(CatalogError::LimitExceeded("too many speakers"));
    }
    Ok(())
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            conferences: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    pub fn from_seed(seed: CatalogSeed) -> Result<Self, CatalogError> {
        let catalog = Self::new();
        for conference in seed.conferences {
            catalog.create_conference(conference)?;
        }
        for session in seed.sessions {
            catalog.add_session(session)?;
        }
        Ok(catalog)
    }

    /// Load a JSON seed of the shape `{ "conferences": [...], "sessions": [...] }`.
    pub fn load_json(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Seed(format!("{}: {e}", path.display())))?;
        let seed: CatalogSeed = serde_json::from_str(&raw)
            .map_err(|e| CatalogError::Seed(format!("{}: {e}", path.display())))?;
        let catalog = Self::from_seed(seed)?;
        tracing::info!(
            path = %path.display(),
            conferences = catalog.conferences.len(),
            sessions = catalog.sessions.len(),
            "loaded session catalog"
        );
        Ok(catalog)
    }

    pub fn create_conference(&self, conference: Conference) -> Result<(), CatalogError> {
        if self.conferences.contains_key(&conference.id) {
            return Err(CatalogError::AlreadyExists(conference.id));
        }
        self.conferences.insert(conference.id, conference);
        Ok(())
    }

    pub fn add_session(&self, session: Session) -> Result<(), CatalogError> {
        validate_session(&session)?;
        if self.sessions.len() >= MAX_CATALOG_SESSIONS {
            return Err(CatalogError::LimitExceeded("too many sessions"));
        }
        if !self.conferences.contains_key(&session.conference_id) {
            return Err(CatalogError::NotFound(session.conference_id));
        }
        if self.sessions.contains_key(&session.id) {
            return Err(CatalogError::AlreadyExists(session.id));
        }
        self.sessions.insert(session.id, session);
        Ok(())
    }

    /// Remove a session from the catalog. Schedules referencing it must be
    /// purged separately (see `ScheduleStore::purge_session`).
    pub fn remove_session(&self, id: &SessionId) -> Result<Session, CatalogError> {
        self.sessions
            .remove(id)
            .map(|(_, s)| s)
            .ok_or(CatalogError::NotFound(*id))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn conferences(&self) -> Vec<Conference> {
        let mut all: Vec<Conference> = self.conferences.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.name.cmp(&b.name)));
        all
    }

    /// Distinct track names, sorted.
    pub fn tracks(&self) -> Vec<String> {
        let mut tracks: Vec<String> = self
            .sessions
            .iter()
            .filter_map(|e| e.value().track.clone())
            .collect();
        tracks.sort();
        tracks.dedup();
        tracks
    }

    /// Distinct session dates, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.sessions.iter().map(|e| e.value().date).collect();
        dates.sort();
        dates.dedup();
        dates
    }
}

#[async_trait]
impl SessionCatalog for InMemoryCatalog {
    async fn get_session(&self, id: &SessionId) -> Result<Session, CatalogError> {
        self.sessions
            .get(id)
            .map(|e| e.value().clone())
            .ok_or(CatalogError::NotFound(*id))
    }

    async fn list_sessions_on_date(&self, date: NaiveDate) -> Result<Vec<Session>, CatalogError> {
        self.list_sessions(&SessionFilter {
            date: Some(date),
            ..SessionFilter::default()
        })
        .await
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, CatalogError> {
        Ok(sorted(
            self.sessions
                .iter()
                .filter(|e| filter.matches(e.value()))
                .map(|e| e.value().clone())
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, day).unwrap()
    }

    fn catalog_with_conference() -> (InMemoryCatalog, ConferenceId) {
        let catalog = InMemoryCatalog::new();
        let conf = Ulid::new();
        catalog.create_conference(Conference::new(conf, "RustConf")).unwrap();
        (catalog, conf)
    }

    #[tokio::test]
    async fn add_and_get_session() {
        let (catalog, conf) = catalog_with_conference();
        let s = Session::new(Ulid::new(), conf, "Keynote", d(10), t(9, 0), t(10, 0));
        catalog.add_session(s.clone()).unwrap();
        assert_eq!(catalog.get_session(&s.id).await.unwrap(), s);
    }

    #[tokio::test]
    async fn get_missing_session_is_not_found() {
        let catalog = InMemoryCatalog::new();
        let id = Ulid::new();
        assert_eq!(
            catalog.get_session(&id).await,
            Err(CatalogError::NotFound(id))
        );
    }

    #[test]
    fn inverted_times_rejected() {
        let (catalog, conf) = catalog_with_conference();
        let s = Session::new(Ulid::new(), conf, "Backwards", d(10), t(11, 0), t(10, 0));
        assert!(matches!(
            catalog.add_session(s),
            Err(CatalogError::InvalidSession(_))
        ));
    }

    #[test]
    fn zero_length_session_rejected() {
        let (catalog, conf) = catalog_with_conference();
        let s = Session::new(Ulid::new(), conf, "Instant", d(10), t(10, 0), t(10, 0));
        assert!(catalog.add_session(s).is_err());
    }

    #[test]
    fn blank_title_rejected() {
        let (catalog, conf) = catalog_with_conference();
        let s = Session::new(Ulid::new(), conf, "  ", d(10), t(9, 0), t(10, 0));
        assert_eq!(
            catalog.add_session(s),
            Err(CatalogError::InvalidSession("title is empty"))
        );
    }

    #[test]
    fn unknown_conference_rejected() {
        let catalog = InMemoryCatalog::new();
        let conf = Ulid::new();
        let s = Session::new(Ulid::new(), conf, "Orphan", d(10), t(9, 0), t(10, 0));
        assert_eq!(catalog.add_session(s), Err(CatalogError::NotFound(conf)));
    }

    #[test]
    fn duplicate_session_rejected() {
        let (catalog, conf) = catalog_with_conference();
        let s = Session::new(Ulid::new(), conf, "Twice", d(10), t(9, 0), t(10, 0));
        catalog.add_session(s.clone()).unwrap();
        assert_eq!(catalog.add_session(s.clone()), Err(CatalogError::AlreadyExists(s.id)));
    }

    #[tokio::test]
    async fn list_sessions_ordered_and_filtered() {
        let (catalog, conf) = catalog_with_conference();
        let late = Session::new(Ulid::new(), conf, "Late", d(11), t(9, 0), t(10, 0)).with_track("Systems");
        let afternoon =
            Session::new(Ulid::new(), conf, "Afternoon", d(10), t(14, 0), t(15, 0)).with_track("Web");
        let morning =
            Session::new(Ulid::new(), conf, "Morning", d(10), t(9, 0), t(10, 0)).with_track("Systems");
        for s in [&late, &afternoon, &morning] {
            catalog.add_session(s.clone()).unwrap();
        }

        let all = catalog.list_sessions(&SessionFilter::default()).await.unwrap();
        let titles: Vec<_> = all.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Morning", "Afternoon", "Late"]);

        let systems = catalog
            .list_sessions(&SessionFilter {
                track: Some("Systems".into()),
                ..SessionFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(systems.len(), 2);

        let day_ten = catalog.list_sessions_on_date(d(10)).await.unwrap();
        assert_eq!(day_ten, vec![morning, afternoon]);

        assert_eq!(catalog.tracks(), vec!["Systems".to_string(), "Web".to_string()]);
        assert_eq!(catalog.dates(), vec![d(10), d(11)]);
    }

    #[test]
    fn remove_session() {
        let (catalog, conf) = catalog_with_conference();
        let s = Session::new(Ulid::new(), conf, "Gone", d(10), t(9, 0), t(10, 0));
        catalog.add_session(s.clone()).unwrap();
        assert_eq!(catalog.remove_session(&s.id).unwrap(), s);
        assert_eq!(catalog.session_count(), 0);
        assert!(catalog.remove_session(&s.id).is_err());
    }

    #[tokio::test]
    async fn load_json_seed() {
        let dir = std::env::temp_dir().join("agenda_test_catalog");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("seed.json");
        let conf = Ulid::new();
        let sid = Ulid::new();
        let json = format!(
            r#"{{
                "conferences": [{{ "id": "{conf}", "name": "EuroRust", "location": "Vienna" }}],
                "sessions": [{{
                    "id": "{sid}",
                    "conference_id": "{conf}",
                    "title": "Async in depth",
                    "date": "2025-10-09",
                    "start_time": "09:00:00",
                    "end_time": "09:45:00",
                    "track": "Async",
                    "speakers": [{{ "first_name": "Ferris", "last_name": "Crab" }}]
                }}]
            }}"#
        );
        std::fs::write(&path, json).unwrap();

        let catalog = InMemoryCatalog::load_json(&path).unwrap();
        let session = catalog.get_session(&sid).await.unwrap();
        assert_eq!(session.title, "Async in depth");
        assert_eq!(session.speakers[0].display_name(), "Ferris Crab");
        assert_eq!(session.description, None);
        assert_eq!(catalog.conferences()[0].location.as_deref(), Some("Vienna"));
    }

    #[test]
    fn load_json_missing_file() {
        let path = std::env::temp_dir().join("agenda_test_catalog_missing.json");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            InMemoryCatalog::load_json(&path),
            Err(CatalogError::Seed(_))
        ));
    }
}
