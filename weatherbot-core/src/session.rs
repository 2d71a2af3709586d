use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::llm::Content;

pub const APP_NAME: &str = "WeatherBotApp";
pub const DEFAULT_USER_ID: &str = "default_user";

/// Conversation state for one user of one app.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub app_name: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub history: Vec<Content>,
}

impl Session {
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
            history: Vec::new(),
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey {
            app_name: self.app_name.clone(),
            user_id: self.user_id.clone(),
            id: self.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub id: Uuid,
}

/// Sessions kept only for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemorySessionService {
    sessions: HashMap<SessionKey, Session>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_session(&mut self, app_name: &str, user_id: &str) -> SessionKey {
        let session = Session::new(app_name, user_id);
        let key = session.key();
        tracing::debug!(session_id = %key.id, app_name, user_id, "Created session");
        self.sessions.insert(key.clone(), session);
        key
    }

    pub fn get(&self, key: &SessionKey) -> Option<&Session> {
        self.sessions.get(key)
    }

    pub fn get_mut(&mut self, key: &SessionKey) -> Option<&mut Session> {
        self.sessions.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
