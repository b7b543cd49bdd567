//! Identity and role model.
//!
//! Every user holds exactly one [`Role`]. The historical boolean flags
//! (`is_admin`, `is_manager`, `is_accounting`, `is_hr`) are projections over
//! that role. Permission checks rest on four predicates: submitter is self,
//! home-department match, managed-departments match and managed-categories
//! match. Admin subsumes all of them.

mod principal;
mod role;

#[cfg(test)]
mod role_props;

pub use principal::{ExpenseScope, Principal, StructureScope, Visibility};
pub use role::{LegacyFlag, LegacyFlags, Role, UserStatus};
