//! The authenticated user and the permission predicates derived from it.

use std::collections::BTreeSet;

use super::role::Role;

/// Where an expense sits in the org structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpenseScope {
    /// Department owning the subcategory's category.
    pub department_id: i32,
    /// Category owning the subcategory.
    pub category_id: i32,
}

/// Which expenses a principal may list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Every expense (admin, accounting).
    All,
    /// Own expenses plus those under managed departments or categories.
    Managed {
        /// The principal's own id.
        user_id: i32,
        /// Managed department ids.
        department_ids: Vec<i32>,
        /// Managed category ids.
        category_ids: Vec<i32>,
    },
    /// Own expenses only.
    Own(i32),
}

/// Which departments of a year a principal may see in the structure view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureScope {
    /// Every department; editable.
    All,
    /// Every department; read-only.
    AllReadOnly,
    /// Only the listed departments; read-only.
    Restricted(BTreeSet<i32>),
}

impl StructureScope {
    /// Whether a department is included.
    #[must_use]
    pub fn includes(&self, department_id: i32) -> bool {
        match self {
            Self::All | Self::AllReadOnly => true,
            Self::Restricted(ids) => ids.contains(&department_id),
        }
    }

    /// Whether the view is read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        !matches!(self, Self::All)
    }
}

/// An authenticated, active user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// User id.
    pub user_id: i32,
    /// Single-valued role.
    pub role: Role,
    /// Home department, if assigned.
    pub home_department_id: Option<i32>,
    /// Departments the user manages.
    pub managed_department_ids: BTreeSet<i32>,
    /// Categories the user may approve across departments.
    pub managed_category_ids: BTreeSet<i32>,
}

impl Principal {
    /// A principal with no department links.
    #[must_use]
    pub fn new(user_id: i32, role: Role) -> Self {
        Self {
            user_id,
            role,
            home_department_id: None,
            managed_department_ids: BTreeSet::new(),
            managed_category_ids: BTreeSet::new(),
        }
    }

    /// Returns true for admins.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Submitter-is-self predicate.
    #[must_use]
    pub const fn is_self(&self, user_id: i32) -> bool {
        self.user_id == user_id
    }

    /// Home-department predicate.
    #[must_use]
    pub fn in_home_department(&self, department_id: i32) -> bool {
        self.home_department_id == Some(department_id)
    }

    /// Managed-departments predicate.
    #[must_use]
    pub fn manages_department(&self, department_id: i32) -> bool {
        self.managed_department_ids.contains(&department_id)
    }

    /// Managed-categories predicate.
    #[must_use]
    pub fn manages_category(&self, category_id: i32) -> bool {
        self.managed_category_ids.contains(&category_id)
    }

    /// Managed departments or managed categories cover the scope.
    fn manages_scope(&self, scope: ExpenseScope) -> bool {
        self.manages_department(scope.department_id) || self.manages_category(scope.category_id)
    }

    /// May submit against a subcategory in `scope`.
    ///
    /// The department must be one the user belongs to (home or managed), or
    /// the category must be delegated to the user.
    #[must_use]
    pub fn can_submit_to(&self, scope: ExpenseScope) -> bool {
        self.is_admin() || self.in_home_department(scope.department_id) || self.manages_scope(scope)
    }

    /// May approve or reject an expense in `scope`.
    #[must_use]
    pub fn can_approve(&self, scope: ExpenseScope) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Manager => self.manages_scope(scope),
            Role::User | Role::Accounting | Role::Hr => false,
        }
    }

    /// May see one expense.
    #[must_use]
    pub fn can_view(&self, submitter_id: i32, scope: ExpenseScope) -> bool {
        match self.role {
            Role::Admin | Role::Accounting => true,
            Role::Manager => self.is_self(submitter_id) || self.manages_scope(scope),
            Role::User | Role::Hr => self.is_self(submitter_id),
        }
    }

    /// May drive the payment-status machine and the external-entry flag.
    #[must_use]
    pub fn can_manage_payments(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Accounting)
    }

    /// May edit an expense: the submitter while pending, admin always.
    #[must_use]
    pub fn can_edit(&self, submitter_id: i32, is_pending: bool) -> bool {
        self.is_admin() || (self.is_self(submitter_id) && is_pending)
    }

    /// May read and edit welfare budgets.
    #[must_use]
    pub fn can_manage_welfare(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Hr)
    }

    /// Listing filter for expenses.
    #[must_use]
    pub fn visibility(&self) -> Visibility {
        match self.role {
            Role::Admin | Role::Accounting => Visibility::All,
            Role::Manager => Visibility::Managed {
                user_id: self.user_id,
                department_ids: self.managed_department_ids.iter().copied().collect(),
                category_ids: self.managed_category_ids.iter().copied().collect(),
            },
            Role::User | Role::Hr => Visibility::Own(self.user_id),
        }
    }

    /// Department scope for the structure view.
    ///
    /// `managed_category_departments` holds the departments owning the
    /// principal's managed categories.
    #[must_use]
    pub fn structure_scope(&self, managed_category_departments: &[i32]) -> StructureScope {
        match self.role {
            Role::Admin => StructureScope::All,
            Role::Accounting => StructureScope::AllReadOnly,
            Role::Manager | Role::Hr | Role::User => {
                let mut ids: BTreeSet<i32> = self.managed_department_ids.clone();
                ids.extend(self.home_department_id);
                ids.extend(managed_category_departments.iter().copied());
                StructureScope::Restricted(ids)
            }
        }
    }
}
