//! Single-valued user role and its legacy boolean projections.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a user holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular employee. Submits expenses.
    #[default]
    User,
    /// Full access to everything.
    Admin,
    /// Approves expenses in managed departments and categories.
    Manager,
    /// Reconciles payments and external entries.
    Accounting,
    /// Oversees welfare budgets.
    Hr,
}

impl Role {
    /// Every role, in backfill precedence order (highest first).
    pub const PRECEDENCE: [Self; 5] = [
        Self::Admin,
        Self::Accounting,
        Self::Hr,
        Self::Manager,
        Self::User,
    ];

    /// Returns the string representation of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Accounting => "accounting",
            Self::Hr => "hr",
        }
    }

    /// Parses a role from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "accounting" => Some(Self::Accounting),
            "hr" => Some(Self::Hr),
            _ => None,
        }
    }

    /// Reads a legacy boolean flag: true iff the role is the flag's role.
    #[must_use]
    pub fn flag(self, flag: LegacyFlag) -> bool {
        self == flag.role()
    }

    /// Writes a legacy boolean flag.
    ///
    /// Setting a flag makes the user that role. Clearing it reverts to
    /// [`Role::User`] only when the user currently holds that role; any other
    /// non-user role is kept.
    #[must_use]
    pub fn with_flag(self, flag: LegacyFlag, value: bool) -> Self {
        if value {
            flag.role()
        } else if self == flag.role() {
            Self::User
        } else {
            self
        }
    }

    /// All four legacy flags derived from this role.
    #[must_use]
    pub fn legacy_flags(self) -> LegacyFlags {
        LegacyFlags {
            is_admin: self.flag(LegacyFlag::Admin),
            is_manager: self.flag(LegacyFlag::Manager),
            is_accounting: self.flag(LegacyFlag::Accounting),
            is_hr: self.flag(LegacyFlag::Hr),
        }
    }

    /// Collapses a set of historical flags into one role by precedence
    /// (admin > accounting > hr > manager > user).
    #[must_use]
    pub fn from_legacy_flags(flags: LegacyFlags) -> Self {
        if flags.is_admin {
            Self::Admin
        } else if flags.is_accounting {
            Self::Accounting
        } else if flags.is_hr {
            Self::Hr
        } else if flags.is_manager {
            Self::Manager
        } else {
            Self::User
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the historical boolean role flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyFlag {
    /// `is_admin`
    Admin,
    /// `is_manager`
    Manager,
    /// `is_accounting`
    Accounting,
    /// `is_hr`
    Hr,
}

impl LegacyFlag {
    /// Every flag.
    pub const ALL: [Self; 4] = [Self::Admin, Self::Manager, Self::Accounting, Self::Hr];

    /// The role this flag aliases.
    #[must_use]
    pub const fn role(self) -> Role {
        match self {
            Self::Admin => Role::Admin,
            Self::Manager => Role::Manager,
            Self::Accounting => Role::Accounting,
            Self::Hr => Role::Hr,
        }
    }
}

/// The four legacy flags as rendered in API payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LegacyFlags {
    /// Derived `role == admin`.
    pub is_admin: bool,
    /// Derived `role == manager`.
    pub is_manager: bool,
    /// Derived `role == accounting`.
    pub is_accounting: bool,
    /// Derived `role == hr`.
    pub is_hr: bool,
}

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// May sign in.
    #[default]
    Active,
    /// Treated as unauthenticated everywhere.
    Inactive,
    /// Awaiting activation by an admin.
    Pending,
}

impl UserStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Pending => "pending",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }

    /// Only active accounts may hold a session.
    #[must_use]
    pub const fn can_authenticate(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("user", Some(Role::User))]
    #[case("ADMIN", Some(Role::Admin))]
    #[case("Manager", Some(Role::Manager))]
    #[case("accounting", Some(Role::Accounting))]
    #[case("hr", Some(Role::Hr))]
    #[case("owner", None)]
    fn test_role_parse(#[case] input: &str, #[case] expected: Option<Role>) {
        assert_eq!(Role::parse(input), expected);
    }

    #[test]
    fn test_role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Hr).unwrap(), "\"hr\"");
        let role: Role = serde_json::from_str("\"accounting\"").unwrap();
        assert_eq!(role, Role::Accounting);
    }

    #[test]
    fn test_flags_are_exclusive() {
        let flags = Role::Manager.legacy_flags();
        assert!(flags.is_manager);
        assert!(!flags.is_admin && !flags.is_accounting && !flags.is_hr);
        assert_eq!(Role::User.legacy_flags(), LegacyFlags::default());
    }

    #[test]
    fn test_clear_flag_of_other_role_keeps_role() {
        assert_eq!(
            Role::Accounting.with_flag(LegacyFlag::Manager, false),
            Role::Accounting
        );
        assert_eq!(Role::Manager.with_flag(LegacyFlag::Manager, false), Role::User);
    }

    #[rstest]
    #[case(LegacyFlags { is_admin: true, is_manager: true, is_accounting: true, is_hr: true }, Role::Admin)]
    #[case(LegacyFlags { is_admin: false, is_manager: true, is_accounting: true, is_hr: true }, Role::Accounting)]
    #[case(LegacyFlags { is_admin: false, is_manager: true, is_accounting: false, is_hr: true }, Role::Hr)]
    #[case(LegacyFlags { is_admin: false, is_manager: true, is_accounting: false, is_hr: false }, Role::Manager)]
    #[case(LegacyFlags::default(), Role::User)]
    fn test_from_legacy_flags_precedence(#[case] flags: LegacyFlags, #[case] expected: Role) {
        assert_eq!(Role::from_legacy_flags(flags), expected);
    }

    #[test]
    fn test_inactive_cannot_authenticate() {
        assert!(UserStatus::Active.can_authenticate());
        assert!(!UserStatus::Inactive.can_authenticate());
        assert!(!UserStatus::Pending.can_authenticate());
    }
}
