//! The signed-in user, as supplied by the authentication collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a user within the school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Parent,
    Guardian,
    Teacher,
    Staff,
    Admin,
}

impl Role {
    /// Returns the wire name of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Parent => "parent",
            Self::Guardian => "guardian",
            Self::Teacher => "teacher",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }

    /// Teachers, staff and admins.
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Teacher | Self::Staff | Self::Admin)
    }

    /// Parents and guardians.
    pub fn is_family(&self) -> bool {
        matches!(self, Self::Parent | Self::Guardian)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A student linked to a parent or guardian account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentRef {
    pub id: String,
    pub class_id: Option<String>,
    pub grade: Option<String>,
}

/// The signed-in user.
///
/// The calendar core treats the profile as read-only input.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable user identifier.
    pub id: String,
    /// The user's role.
    pub role: Role,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Account email, if known.
    #[serde(default)]
    pub email: Option<String>,
    /// Branch (campus) the user belongs to.
    #[serde(default)]
    pub branch_id: Option<String>,
    /// Grade, for students.
    #[serde(default)]
    pub grade: Option<String>,
    /// Class (section), for students.
    #[serde(default)]
    pub class_id: Option<String>,
    /// Linked students, for parents and guardians.
    #[serde(default)]
    pub children: Vec<StudentRef>,
    /// Opaque token for the school backend.
    #[serde(default, skip_serializing)]
    pub auth_token: String,
}

impl UserProfile {
    /// Creates a profile with the required fields.
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            name: String::new(),
            email: None,
            branch_id: None,
            grade: None,
            class_id: None,
            children: Vec::new(),
            auth_token: String::new(),
        }
    }

    /// Builder method to set the branch.
    pub fn with_branch(mut self, branch_id: impl Into<String>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    /// Builder method to set grade and class.
    pub fn with_class(mut self, grade: impl Into<String>, class_id: impl Into<String>) -> Self {
        self.grade = Some(grade.into());
        self.class_id = Some(class_id.into());
        self
    }

    /// Builder method to set the email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Builder method to link a student.
    pub fn with_child(mut self, child: StudentRef) -> Self {
        self.children.push(child);
        self
    }

    /// Builder method to set the backend auth token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = token.into();
        self
    }

    /// The students whose schedule this user follows.
    ///
    /// A student follows itself; parents and guardians follow their children.
    pub fn followed_students(&self) -> Vec<StudentRef> {
        match self.role {
            Role::Student => vec![StudentRef {
                id: self.id.clone(),
                class_id: self.class_id.clone(),
                grade: self.grade.clone(),
            }],
            Role::Parent | Role::Guardian => self.children.clone(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for UserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserProfile")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("branch_id", &self.branch_id)
            .field("grade", &self.grade)
            .field("class_id", &self.class_id)
            .field("children", &self.children)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// Returns the lowercase domain part of an email address.
pub fn email_domain(email: &str) -> Option<String> {
    let (local, domain) = email.trim().rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(domain.to_ascii_lowercase())
}
