//! Role-based event visibility and edit rights.
//!
//! Each category has one rule object implementing [`CategoryRule`];
//! [`rule_for`] picks it. Categories without special handling fall back to
//! [`DefaultRule`]: visible to everyone, editable by no one.

use edusis_core::{Audience, CalendarEvent, EventCategory, Role, SchoolConfig, StudentRef, UserProfile};
use tracing::debug;

/// Visibility and edit rights for one event category.
pub trait CategoryRule: Send + Sync {
    /// Whether the user may see the event.
    fn is_visible(&self, profile: &UserProfile, event: &CalendarEvent, school: &SchoolConfig) -> bool;

    /// Whether the user may edit the event.
    fn can_edit(&self, _profile: &UserProfile, _event: &CalendarEvent, _school: &SchoolConfig) -> bool {
        false
    }

    /// Whether the user may delete the event. Follows [`CategoryRule::can_edit`].
    fn can_delete(&self, profile: &UserProfile, event: &CalendarEvent, school: &SchoolConfig) -> bool {
        self.can_edit(profile, event, school)
    }
}

fn contains(list: &[String], value: Option<&str>) -> bool {
    value.is_some_and(|v| list.iter().any(|item| item == v))
}

fn is_creator(profile: &UserProfile, event: &CalendarEvent) -> bool {
    event.created_by.as_deref() == Some(profile.id.as_str())
}

/// Whether an audience reaches a student by id, class or grade.
fn addresses_student(audience: &Audience, student: &StudentRef) -> bool {
    audience.is_public
        || contains(&audience.student_ids, Some(&student.id))
        || contains(&audience.class_ids, student.class_id.as_deref())
        || contains(&audience.grades, student.grade.as_deref())
}

/// Whether an audience reaches a student's class or grade.
fn addresses_class(audience: &Audience, student: &StudentRef) -> bool {
    audience.is_public
        || contains(&audience.class_ids, student.class_id.as_deref())
        || contains(&audience.grades, student.grade.as_deref())
}

/// Homework: students and families see what is addressed to them, staff see all.
#[derive(Debug)]
pub struct HomeworkRule;

impl CategoryRule for HomeworkRule {
    fn is_visible(&self, profile: &UserProfile, event: &CalendarEvent, _school: &SchoolConfig) -> bool {
        if profile.role.is_staff() {
            return true;
        }
        profile
            .followed_students()
            .iter()
            .any(|student| addresses_student(&event.audience, student))
    }

    fn can_edit(&self, profile: &UserProfile, event: &CalendarEvent, _school: &SchoolConfig) -> bool {
        profile.role == Role::Teacher && is_creator(profile, event)
    }
}

/// Timetable sessions.
#[derive(Debug)]
pub struct TimetableRule;

impl CategoryRule for TimetableRule {
    fn is_visible(&self, profile: &UserProfile, event: &CalendarEvent, _school: &SchoolConfig) -> bool {
        match profile.role {
            Role::Staff | Role::Admin => true,
            Role::Teacher => contains(&event.audience.teacher_ids, Some(&profile.id)),
            Role::Student | Role::Parent | Role::Guardian => profile
                .followed_students()
                .iter()
                .any(|student| addresses_class(&event.audience, student)),
        }
    }

    fn can_edit(&self, profile: &UserProfile, _event: &CalendarEvent, _school: &SchoolConfig) -> bool {
        profile.role == Role::Admin
    }
}

/// School events: visible tenant-wide.
#[derive(Debug)]
pub struct SchoolEventRule;

impl CategoryRule for SchoolEventRule {
    fn is_visible(&self, _profile: &UserProfile, _event: &CalendarEvent, _school: &SchoolConfig) -> bool {
        true
    }

    fn can_edit(&self, profile: &UserProfile, event: &CalendarEvent, _school: &SchoolConfig) -> bool {
        profile.role == Role::Admin || is_creator(profile, event)
    }
}

/// Google Workspace events follow the tenant's Google access settings.
#[derive(Debug)]
pub struct GoogleWorkspaceRule;

impl CategoryRule for GoogleWorkspaceRule {
    fn is_visible(&self, profile: &UserProfile, _event: &CalendarEvent, school: &SchoolConfig) -> bool {
        school.can_access_google_calendar(profile)
    }
}

/// Notifications reach their recipients, or everyone when public.
#[derive(Debug)]
pub struct NotificationRule;

impl CategoryRule for NotificationRule {
    fn is_visible(&self, profile: &UserProfile, event: &CalendarEvent, _school: &SchoolConfig) -> bool {
        event.audience.is_public || contains(&event.audience.recipient_ids, Some(&profile.id))
    }
}

#[derive(Debug)]
pub struct DefaultRule;

impl CategoryRule for DefaultRule {
    fn is_visible(&self, _profile: &UserProfile, _event: &CalendarEvent, _school: &SchoolConfig) -> bool {
        true
    }
}

/// Returns the rule governing a category.
pub fn rule_for(category: EventCategory) -> &'static dyn CategoryRule {
    match category {
        EventCategory::Homework => &HomeworkRule,
        EventCategory::Timetable => &TimetableRule,
        EventCategory::SchoolEvent => &SchoolEventRule,
        EventCategory::GoogleWorkspace => &GoogleWorkspaceRule,
        EventCategory::Notification => &NotificationRule,
        EventCategory::Academic | EventCategory::Exam | EventCategory::Birthday => &DefaultRule,
    }
}

pub fn is_visible(profile: &UserProfile, event: &CalendarEvent, school: &SchoolConfig) -> bool {
    rule_for(event.category).is_visible(profile, event, school)
}

pub fn can_edit(profile: &UserProfile, event: &CalendarEvent, school: &SchoolConfig) -> bool {
    rule_for(event.category).can_edit(profile, event, school)
}

pub fn can_delete(profile: &UserProfile, event: &CalendarEvent, school: &SchoolConfig) -> bool {
    rule_for(event.category).can_delete(profile, event, school)
}

/// Keeps the events the user may see, in order, with `editable` set.
pub fn filter_events_for_user(
    events: Vec<CalendarEvent>,
    profile: &UserProfile,
    school: &SchoolConfig,
) -> Vec<CalendarEvent> {
    let total = events.len();
    let visible: Vec<CalendarEvent> = events
        .into_iter()
        .filter_map(|mut event| {
            let rule = rule_for(event.category);
            if !rule.is_visible(profile, &event, school) {
                return None;
            }
            event.editable = rule.can_edit(profile, &event, school);
            Some(event)
        })
        .collect();

    debug!(
        user = %profile.id,
        role = %profile.role,
        total,
        visible = visible.len(),
        "Filtered events for user"
    );
    visible
}
