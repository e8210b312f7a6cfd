//! Validated test names used as baseline keys

use serde::{Deserialize, Serialize};

use crate::error::{Result, VisregError};

/// Longest accepted test name, in bytes
pub const MAX_NAME_LEN: usize = 128;

/// A caller-supplied test name that is safe to use as a storage key.
///
/// Only ASCII alphanumerics, `-`, `_` and `.` are allowed, the name may not
/// start with `.` and may not contain `..`, so it can never address anything
/// outside its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestName(String);

impl TestName {
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name.len() > MAX_NAME_LEN {
            Some("name is longer than 128 bytes")
        } else if name.starts_with('.') {
            Some("name may not start with '.'")
        } else if name.contains("..") {
            Some("name may not contain '..'")
        } else if name.contains(['/', '\\']) {
            Some("name may not contain path separators")
        } else if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            Some("name may only contain ASCII letters, digits, '-', '_' and '.'")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(VisregError::InvalidName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name for one breakpoint of a responsive comparison
    pub fn at_breakpoint(&self, width: u32) -> Result<Self> {
        Self::parse(format!("{}-{}w", self.0, width))
    }
}

impl std::fmt::Display for TestName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TestName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TestName {
    type Error = VisregError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<TestName> for String {
    fn from(name: TestName) -> Self {
        name.0
    }
}

impl std::str::FromStr for TestName {
    type Err = VisregError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
