//! Author identity for new commits and changes.
//!
//! The resolution chain: explicit author > `LIX_AUTHOR` env > config
//! `author.name` > active account in the history > `anonymous`.

use std::env;

use serde::{Deserialize, Serialize};

/// Name used when nothing else identifies the author.
pub const ANONYMOUS: &str = "anonymous";

/// Environment variable consulted for the author name.
pub const AUTHOR_ENV: &str = "LIX_AUTHOR";

/// A named actor stored in the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
}

impl Account {
    /// An account whose id equals its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS)
    }
}

/// Environment reader, swapped out in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

fn resolve_author_with(
    explicit: Option<&str>,
    configured: Option<&str>,
    stored: Option<&Account>,
    env: &dyn EnvReader,
) -> String {
    let non_blank = |s: &&str| !s.trim().is_empty();

    if let Some(author) = explicit.filter(non_blank) {
        return author.to_string();
    }
    if let Some(author) = env.get(AUTHOR_ENV) {
        return author;
    }
    if let Some(author) = configured.filter(non_blank) {
        return author.to_string();
    }
    stored.map_or_else(|| ANONYMOUS.to_string(), |account| account.name.clone())
}

/// Resolve the author for a write.
///
/// 1. `explicit` (e.g. a `--author` flag)
/// 2. `LIX_AUTHOR` environment variable
/// 3. `configured` (config `author.name`)
/// 4. `stored` (the history's active account)
/// 5. [`ANONYMOUS`]
#[must_use]
pub fn resolve_author(
    explicit: Option<&str>,
    configured: Option<&str>,
    stored: Option<&Account>,
) -> String {
    resolve_author_with(explicit, configured, stored, &RealEnv)
}
