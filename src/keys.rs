//! Key layout shared by every reader and writer of the store.
//!
//! ```text
//! leaderboard:global:{timeframe}:{period}                          -> sorted set
//! leaderboard:{project}:{timeframe}:{period}                       -> sorted set
//! user:{scope}:{timeframe}:{period}:{user_id}:{contribution_id}    -> hash
//! ```
//!
//! These formats are part of the storage contract: live periods written by an
//! older build must stay readable.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::period::Timeframe;

pub const DELIMITER: char = ':';
pub const GLOBAL_SCOPE: &str = "global";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} contains the key delimiter ':': {value}")]
    Delimiter { field: &'static str, value: String },

    #[error("project scope may not be named 'global'")]
    ReservedScope,
}

/// Either the synthetic global aggregate or one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Project(String),
}

impl Scope {
    /// Builds a validated project scope.
    pub fn project(id: impl Into<String>) -> Result<Self, KeyError> {
        let id = id.into();
        validate("project", &id)?;
        if id == GLOBAL_SCOPE {
            return Err(KeyError::ReservedScope);
        }
        Ok(Scope::Project(id))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Scope::Global => GLOBAL_SCOPE,
            Scope::Project(id) => id,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Scope::Global)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == GLOBAL_SCOPE {
            Ok(Scope::Global)
        } else {
            Scope::project(s)
        }
    }
}

fn validate(field: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::Empty { field });
    }
    if value.contains(DELIMITER) {
        return Err(KeyError::Delimiter {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

pub fn global_ranking_key(timeframe: Timeframe, period: &str) -> Result<String, KeyError> {
    validate("period", period)?;
    Ok(format!("leaderboard:{GLOBAL_SCOPE}:{timeframe}:{period}"))
}

pub fn scoped_ranking_key(
    project: &str,
    timeframe: Timeframe,
    period: &str,
) -> Result<String, KeyError> {
    validate("project", project)?;
    validate("period", period)?;
    Ok(format!("leaderboard:{project}:{timeframe}:{period}"))
}

/// Ranking key for any scope.
pub fn ranking_key(scope: &Scope, timeframe: Timeframe, period: &str) -> Result<String, KeyError> {
    match scope {
        Scope::Global => global_ranking_key(timeframe, period),
        Scope::Project(project) => scoped_ranking_key(project, timeframe, period),
    }
}

pub fn contribution_key(
    scope: &Scope,
    timeframe: Timeframe,
    period: &str,
    user_id: &str,
    contribution_id: &str,
) -> Result<String, KeyError> {
    validate("scope", scope.as_str())?;
    validate("period", period)?;
    validate("user_id", user_id)?;
    validate("contribution_id", contribution_id)?;
    Ok(format!(
        "user:{scope}:{timeframe}:{period}:{user_id}:{contribution_id}"
    ))
}

/// Validates a user id on its own, for write paths that only build ranking keys.
pub fn validate_user_id(user_id: &str) -> Result<(), KeyError> {
    validate("user_id", user_id)
}
