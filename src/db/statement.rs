//! Statement shaping.
//!
//! A `Statement` carries SQL text, positional bind parameters, the command
//! kind, and an optional connection-profile selector.

use crate::db::params::SqlParam;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Kind of command a statement represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Plain SQL text.
    #[default]
    Text,
    /// Stored procedure invocation; the SQL field holds the procedure name
    /// and the call is rendered with one placeholder per parameter.
    StoredProcedure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<SqlParam>,
    #[serde(default)]
    pub kind: CommandKind,
    /// Connection profile to run against. None selects the default profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl Statement {
    /// Create a plain-text SQL statement.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            kind: CommandKind::Text,
            profile: None,
        }
    }

    /// Create a stored-procedure invocation by procedure name.
    pub fn stored_procedure(name: impl Into<String>) -> Self {
        Self {
            sql: name.into(),
            params: Vec::new(),
            kind: CommandKind::StoredProcedure,
            profile: None,
        }
    }

    /// Add a bind parameter.
    pub fn with_param(mut self, param: impl Into<SqlParam>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Add bind parameters.
    pub fn with_params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SqlParam>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    /// Select the connection profile to run against.
    pub fn on_profile(mut self, name: impl Into<String>) -> Self {
        self.profile = Some(name.into());
        self
    }

    /// Get the profile selector.
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Render the executable SQL text.
    pub fn render(&self) -> Cow<'_, str> {
        match self.kind {
            CommandKind::Text => Cow::Borrowed(&self.sql),
            CommandKind::StoredProcedure => {
                let placeholders = vec!["?"; self.params.len()].join(", ");
                Cow::Owned(format!("CALL {}({})", self.sql, placeholders))
            }
        }
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}
