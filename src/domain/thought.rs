use serde::Serialize;
use time::OffsetDateTime;

use super::state::ThoughtState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thought {
    pub id: i64,
    pub content: String,
    pub current_state: ThoughtState,
    pub tend_counter: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_tended_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub eligibility_at: OffsetDateTime,
    pub valence: Option<i64>,
    pub energy: Option<i64>,
}

impl Thought {
    pub fn is_tend_eligible(&self, now: OffsetDateTime) -> bool {
        self.current_state.awaits_tending() && self.eligibility_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub id: i64,
    pub thought_id: i64,
    pub kind: String,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub previous_state: Option<ThoughtState>,
    pub next_state: Option<ThoughtState>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Captured,
    StateChange,
    ContentUpdated,
    Annotated,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Captured => "captured",
            EventKind::StateChange => "state_change",
            EventKind::ContentUpdated => "content_updated",
            EventKind::Annotated => "annotated",
        }
    }
}
