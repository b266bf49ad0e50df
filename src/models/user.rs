//! User model
//!
//! Staff accounts (authors, editors, admins) and storefront customers share
//! one table. The role decides which route groups a user may reach.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Email address (unique, stored lowercase)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub role: UserRole,
    pub status: UserStatus,
    /// Whether TOTP two-factor authentication is active
    pub two_factor_enabled: bool,
    /// Confirmed TOTP secret (base32)
    #[serde(skip_serializing)]
    pub two_factor_secret: Option<String>,
    /// Secret generated by setup but not yet confirmed
    #[serde(skip_serializing)]
    pub two_factor_pending_secret: Option<String>,
    /// Deadline for mandatory 2FA setup; unset until first authenticated request
    pub two_factor_grace_expires_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User. The password must already be hashed.
    pub fn new(email: String, password_hash: String, display_name: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            email,
            password_hash,
            display_name,
            role,
            status: UserStatus::Active,
            two_factor_enabled: false,
            two_factor_secret: None,
            two_factor_pending_secret: None,
            two_factor_grace_expires_at: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the user holds at least the given role
    pub fn has_role(&self, min: UserRole) -> bool {
        self.role.at_least(min)
    }

    pub fn is_staff(&self) -> bool {
        self.role.at_least(UserRole::Author)
    }

    pub fn is_banned(&self) -> bool {
        self.status == UserStatus::Banned
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// User role, ordered from least to most privileged:
/// `customer < author < editor < admin < super_admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Storefront customer
    Customer,
    /// Writes blog posts and uploads media
    Author,
    /// Manages all site content
    Editor,
    /// Manages users, orders and submissions
    Admin,
    /// May grant and revoke admin roles
    SuperAdmin,
}

impl UserRole {
    /// Check if this role is `min` or more privileged
    pub fn at_least(self, min: UserRole) -> bool {
        self >= min
    }

    /// Roles that only a super admin may grant or revoke
    pub fn is_elevated(self) -> bool {
        self >= UserRole::Admin
    }

    pub fn all() -> [UserRole; 5] {
        [
            UserRole::Customer,
            UserRole::Author,
            UserRole::Editor,
            UserRole::Admin,
            UserRole::SuperAdmin,
        ]
    }
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Customer
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Customer => write!(f, "customer"),
            UserRole::Author => write!(f, "author"),
            UserRole::Editor => write!(f, "editor"),
            UserRole::Admin => write!(f, "admin"),
            UserRole::SuperAdmin => write!(f, "super_admin"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "customer" => Ok(UserRole::Customer),
            "author" => Ok(UserRole::Author),
            "editor" => Ok(UserRole::Editor),
            "admin" => Ok(UserRole::Admin),
            "super_admin" => Ok(UserRole::SuperAdmin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Account state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    /// Cannot log in; existing sessions are rejected
    Banned,
}

impl Default for UserStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Banned => write!(f, "banned"),
        }
    }
}

impl FromStr for UserStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "banned" => Ok(UserStatus::Banned),
            _ => Err(anyhow::anyhow!("Invalid user status: {}", s)),
        }
    }
}

/// Input for creating a user (before password hashing)
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub email: String,
    /// Plaintext password (will be hashed)
    pub password: String,
    pub display_name: String,
    /// Defaults to customer
    #[serde(default)]
    pub role: Option<UserRole>,
}

/// Input for updating a user
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateUserInput {
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// New password (will be hashed)
    pub password: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}
