//! Session persistence and cookie handling.
//!
//! A session is the credential bundle captured at login time: an
//! ordered list of normalized cookie strings plus bookkeeping fields.

pub mod cookies;
pub mod store;

pub use store::SessionStore;

use serde::{Deserialize, Serialize};

use crate::timeutil::now_iso8601;

/// Persisted credential bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Normalized single-cookie strings (`name=value; Domain=...`).
    #[serde(default)]
    pub cookies: Vec<String>,

    /// ISO-8601 timestamp of the last update.
    pub updated_at: String,

    /// Whether the session passed required-cookie validation when saved.
    #[serde(default)]
    pub valid: bool,
}

impl Session {
    /// Session built from already-normalized cookies.
    pub fn new(cookies: Vec<String>) -> Self {
        Self {
            cookies,
            updated_at: now_iso8601(),
            valid: true,
        }
    }

    /// Cookieless session used to reach guest endpoints when no login
    /// has been performed.
    pub fn anonymous() -> Self {
        Self {
            cookies: Vec::new(),
            updated_at: now_iso8601(),
            valid: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}
