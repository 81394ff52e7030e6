//! Long-lived scheduling contexts and their lifecycle.
//!
//! ```text
//!  active ──pause──▶ paused
//!    ▲                 │
//!    └─────resume──────┘
//!  active | paused ──finish──▶ finished (terminal)
//! ```

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::storage::{JsonArrayFile, StoreError};

/// Name of the session created when a cycle runs with none active.
pub const DEFAULT_SESSION_NAME: &str = "default-session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Paused,
    Finished,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Active, SessionState::Paused)
                | (SessionState::Paused, SessionState::Active)
                | (SessionState::Active, SessionState::Finished)
                | (SessionState::Paused, SessionState::Finished)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Finished => "finished",
        })
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session {id} cannot go from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: SessionState,
        to: SessionState,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: SessionState,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub last_trace_id: Option<String>,
}

/// File-backed session list. Sessions are never deleted.
pub struct SessionStore {
    file: JsonArrayFile<Session>,
}

impl SessionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let file = JsonArrayFile::new(path);
        file.ensure()?;
        Ok(Self { file })
    }

    pub fn create(&self, name: &str, metadata: Map<String, Value>) -> Result<Session, SessionError> {
        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            state: SessionState::Active,
            metadata,
            last_trace_id: None,
        };
        let stored = session.clone();
        self.file.update(move |sessions| sessions.push(stored))?;
        info!(session_id = %session.session_id, name, "session created");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Result<Session, SessionError> {
        self.file
            .load()?
            .into_iter()
            .find(|s| s.session_id == id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    pub fn list(&self) -> Result<Vec<Session>, SessionError> {
        Ok(self.file.load()?)
    }

    /// Most recently updated session in the `active` state.
    pub fn get_active(&self) -> Result<Option<Session>, SessionError> {
        Ok(self
            .file
            .load()?
            .into_iter()
            .filter(|s| s.state == SessionState::Active)
            .max_by_key(|s| s.updated_at))
    }

    pub fn pause(&self, id: &str) -> Result<Session, SessionError> {
        self.transition(id, SessionState::Paused)
    }

    pub fn resume(&self, id: &str) -> Result<Session, SessionError> {
        self.transition(id, SessionState::Active)
    }

    pub fn finish(&self, id: &str) -> Result<Session, SessionError> {
        self.transition(id, SessionState::Finished)
    }

    pub fn set_last_trace(&self, id: &str, trace_id: &str) -> Result<Session, SessionError> {
        self.modify(id, |s| {
            s.last_trace_id = Some(trace_id.to_string());
            Ok(())
        })
    }

    fn transition(&self, id: &str, next: SessionState) -> Result<Session, SessionError> {
        let session = self.modify(id, |s| {
            if !s.state.can_transition_to(next) {
                return Err(SessionError::InvalidTransition {
                    id: s.session_id.clone(),
                    from: s.state,
                    to: next,
                });
            }
            s.state = next;
            Ok(())
        })?;
        info!(session_id = id, state = %next, "session state changed");
        Ok(session)
    }

    fn modify(
        &self,
        id: &str,
        f: impl FnOnce(&mut Session) -> Result<(), SessionError>,
    ) -> Result<Session, SessionError> {
        self.file.try_update(|sessions| {
            let session = sessions
                .iter_mut()
                .find(|s| s.session_id == id)
                .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
            f(session)?;
            session.updated_at = Utc::now();
            Ok(session.clone())
        })
    }
}
