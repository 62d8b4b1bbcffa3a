//! Per-tenant school configuration.
//!
//! A [`SchoolConfig`] is loaded once per session and never mutated; it is
//! passed explicitly into every adapter and permission check.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::profile::{Role, UserProfile, email_domain};
use crate::time::MonthDay;

/// Calendar source identifiers for one branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchCalendars {
    /// Google calendar id of the branch academic calendar.
    pub academic_calendar_id: Option<String>,
    /// Google calendar id of the branch school-events calendar.
    pub events_calendar_id: Option<String>,
    /// Google calendar id of the staff-only calendar.
    pub staff_calendar_id: Option<String>,
}

/// Tenant feature flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Whether Google Calendar integration is enabled at all.
    pub google_calendar_enabled: bool,
    /// Whether Google Calendar is read-only (API key) instead of interactive.
    pub google_calendar_read_only: bool,
    /// Roles allowed to see Google Workspace events and sign in.
    pub google_calendar_roles: Vec<Role>,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            google_calendar_enabled: false,
            google_calendar_read_only: true,
            google_calendar_roles: vec![Role::Teacher, Role::Staff, Role::Admin],
        }
    }
}

/// Per-tenant configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchoolConfig {
    /// Tenant identifier.
    pub school_id: String,
    /// Display name.
    pub name: String,
    /// Allowed email domain for Google sign-in (e.g. `school.edu`).
    pub domain: String,
    /// Feature flags.
    pub features: FeatureFlags,
    /// Calendar sources per branch id.
    pub branches: BTreeMap<String, BranchCalendars>,
    /// Last day of the academic year.
    pub academic_year_end: MonthDay,
}

impl Default for SchoolConfig {
    fn default() -> Self {
        Self {
            school_id: String::new(),
            name: String::new(),
            domain: String::new(),
            features: FeatureFlags::default(),
            branches: BTreeMap::new(),
            academic_year_end: MonthDay::new(6, 30),
        }
    }
}

impl SchoolConfig {
    /// Creates a configuration for a tenant domain.
    pub fn new(school_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            school_id: school_id.into(),
            domain: domain.into(),
            ..Self::default()
        }
    }

    /// Builder method to enable Google Calendar.
    pub fn with_google_calendar(mut self, read_only: bool) -> Self {
        self.features.google_calendar_enabled = true;
        self.features.google_calendar_read_only = read_only;
        self
    }

    /// Builder method to register a branch's calendars.
    pub fn with_branch(mut self, branch_id: impl Into<String>, calendars: BranchCalendars) -> Self {
        self.branches.insert(branch_id.into(), calendars);
        self
    }

    /// Returns the calendars for a branch.
    pub fn branch(&self, branch_id: &str) -> Option<&BranchCalendars> {
        self.branches.get(branch_id)
    }

    /// Whether the user may see Google Workspace events and sign in to Google.
    ///
    /// Requires the tenant flag and an allowed role.
    pub fn can_access_google_calendar(&self, profile: &UserProfile) -> bool {
        self.features.google_calendar_enabled
            && self.features.google_calendar_roles.contains(&profile.role)
    }

    /// Whether an email address belongs to the tenant domain.
    pub fn is_allowed_email(&self, email: &str) -> bool {
        let allowed = self.domain.trim().trim_start_matches('@').to_ascii_lowercase();
        !allowed.is_empty() && email_domain(email).is_some_and(|domain| domain == allowed)
    }
}
