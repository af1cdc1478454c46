use std::error::Error;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use time::OffsetDateTime;

use crate::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtState {
    Captured,
    Resting,
    Tended,
    Evolved,
    Released,
    Archived,
}

impl ThoughtState {
    pub const ALL: [ThoughtState; 6] = [
        ThoughtState::Captured,
        ThoughtState::Resting,
        ThoughtState::Tended,
        ThoughtState::Evolved,
        ThoughtState::Released,
        ThoughtState::Archived,
    ];

    pub const INITIAL: ThoughtState = ThoughtState::Captured;

    pub fn as_str(self) -> &'static str {
        match self {
            ThoughtState::Captured => "captured",
            ThoughtState::Resting => "resting",
            ThoughtState::Tended => "tended",
            ThoughtState::Evolved => "evolved",
            ThoughtState::Released => "released",
            ThoughtState::Archived => "archived",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ThoughtState::Evolved | ThoughtState::Released | ThoughtState::Archived
        )
    }

    /// States that may become due for tending once their settle time passes.
    pub fn awaits_tending(self) -> bool {
        matches!(self, ThoughtState::Captured | ThoughtState::Resting)
    }

    /// States a tended thought may be resolved into.
    pub fn is_resolution(self) -> bool {
        matches!(
            self,
            ThoughtState::Resting
                | ThoughtState::Evolved
                | ThoughtState::Released
                | ThoughtState::Archived
        )
    }

    /// The whole lifecycle table. Eligibility timing is checked separately by
    /// [`ThoughtState::mark_tended`].
    pub fn apply(self, transition: Transition) -> Result<ThoughtState, InvalidStateTransition> {
        let next = match (self, transition) {
            (ThoughtState::Captured | ThoughtState::Resting, Transition::MarkTended) => {
                Some(ThoughtState::Tended)
            }
            (ThoughtState::Tended, Transition::Resolve(next)) if next.is_resolution() => Some(next),
            (
                ThoughtState::Captured | ThoughtState::Resting | ThoughtState::Tended,
                Transition::Evolve,
            ) => Some(ThoughtState::Evolved),
            _ => None,
        };

        next.ok_or(InvalidStateTransition {
            from: self,
            transition,
            reason: RejectReason::WrongState,
        })
    }

    pub fn mark_tended(
        self,
        eligibility_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<ThoughtState, InvalidStateTransition> {
        let next = self.apply(Transition::MarkTended)?;
        if eligibility_at > now {
            return Err(InvalidStateTransition {
                from: self,
                transition: Transition::MarkTended,
                reason: RejectReason::NotYetEligible { eligibility_at },
            });
        }
        Ok(next)
    }
}

impl fmt::Display for ThoughtState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThoughtState {
    type Err = ParseThoughtStateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let normalized = trimmed
            .strip_prefix("--")
            .unwrap_or(trimmed)
            .to_ascii_lowercase();
        let state = match normalized.as_str() {
            "captured" => ThoughtState::Captured,
            "resting" | "rest" => ThoughtState::Resting,
            "tended" => ThoughtState::Tended,
            "evolved" | "evolve" => ThoughtState::Evolved,
            "released" | "release" => ThoughtState::Released,
            "archived" | "archive" => ThoughtState::Archived,
            _ => {
                return Err(ParseThoughtStateError {
                    value: value.to_string(),
                });
            }
        };

        Ok(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    MarkTended,
    Resolve(ThoughtState),
    Evolve,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::MarkTended => f.write_str("mark tended"),
            Transition::Resolve(next) => write!(f, "resolve to {next}"),
            Transition::Evolve => f.write_str("evolve"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseThoughtStateError {
    value: String,
}

impl fmt::Display for ParseThoughtStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid thought state '{}': expected one of {}",
            self.value,
            ThoughtState::ALL
                .iter()
                .map(|state| state.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl Error for ParseThoughtStateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    WrongState,
    NotYetEligible { eligibility_at: OffsetDateTime },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidStateTransition {
    pub from: ThoughtState,
    pub transition: Transition,
    pub reason: RejectReason,
}

impl fmt::Display for InvalidStateTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            RejectReason::WrongState => write!(
                f,
                "invalid state transition: cannot {} a thought in state {}",
                self.transition, self.from
            ),
            RejectReason::NotYetEligible { eligibility_at } => write!(
                f,
                "invalid state transition: cannot {} a {} thought before it is eligible at {}",
                self.transition,
                self.from,
                timestamp::encode(eligibility_at)
            ),
        }
    }
}

impl Error for InvalidStateTransition {}
