//! Planning for "copy structure from previous year" and "migrate users".

use std::collections::{BTreeSet, HashMap, HashSet};

/// A department of the source year with its full subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDepartment {
    /// Source department id.
    pub id: i32,
    /// Department name.
    pub name: String,
    /// Department currency.
    pub currency: String,
    /// Categories under this department.
    pub categories: Vec<SourceCategory>,
}

/// A category of the source year with its subcategory names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCategory {
    /// Category name.
    pub name: String,
    /// Welfare flag, carried into the copy.
    pub is_welfare: bool,
    /// Subcategory names.
    pub subcategories: Vec<String>,
}

/// A category to create under a freshly copied department. Budget is zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCopy {
    /// Category name.
    pub name: String,
    /// Welfare flag.
    pub is_welfare: bool,
    /// Subcategory names, each created with a zero budget.
    pub subcategories: Vec<String>,
}

/// What happens to one source department.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepartmentCopy {
    /// A same-named department exists in the target year; reuse it and copy nothing below it.
    Reuse {
        /// Source department id.
        source_id: i32,
        /// Existing target department id.
        target_id: i32,
    },
    /// Create the department with a zero budget, then its whole subtree.
    Create {
        /// Source department id.
        source_id: i32,
        /// Department name.
        name: String,
        /// Department currency.
        currency: String,
        /// Categories to create.
        categories: Vec<CategoryCopy>,
    },
}

impl DepartmentCopy {
    /// Source department id.
    #[must_use]
    pub const fn source_id(&self) -> i32 {
        match self {
            Self::Reuse { source_id, .. } | Self::Create { source_id, .. } => *source_id,
        }
    }
}

/// Ordered plan for copying one year's structure into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyPlan {
    /// One entry per source department, in source order.
    pub departments: Vec<DepartmentCopy>,
}

impl CopyPlan {
    /// Number of departments that will be created.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.departments
            .iter()
            .filter(|d| matches!(d, DepartmentCopy::Create { .. }))
            .count()
    }

    /// True when executing the plan creates nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created_count() == 0
    }
}

/// Builds the copy plan.
///
/// `target_by_name` maps the names of departments already present in the
/// target year to their ids.
#[must_use]
pub fn plan_copy(source: &[SourceDepartment], target_by_name: &HashMap<String, i32>) -> CopyPlan {
    let departments = source
        .iter()
        .map(|dept| match target_by_name.get(&dept.name) {
            Some(&target_id) => DepartmentCopy::Reuse {
                source_id: dept.id,
                target_id,
            },
            None => DepartmentCopy::Create {
                source_id: dept.id,
                name: dept.name.clone(),
                currency: dept.currency.clone(),
                categories: dept
                    .categories
                    .iter()
                    .map(|c| CategoryCopy {
                        name: c.name.clone(),
                        is_welfare: c.is_welfare,
                        subcategories: c.subcategories.clone(),
                    })
                    .collect(),
            },
        })
        .collect();

    CopyPlan { departments }
}

/// Manager-department links to add on the target year.
///
/// `source_links` are `(user_id, source_department_id)` pairs;
/// `department_map` maps source to target department ids; links already in
/// `existing` are skipped. The result is sorted and free of duplicates.
#[must_use]
pub fn plan_manager_links(
    source_links: &[(i32, i32)],
    department_map: &HashMap<i32, i32>,
    existing: &HashSet<(i32, i32)>,
) -> Vec<(i32, i32)> {
    source_links
        .iter()
        .filter_map(|&(user_id, source_dept)| {
            department_map
                .get(&source_dept)
                .map(|&target_dept| (user_id, target_dept))
        })
        .filter(|link| !existing.contains(link))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Home-department moves for "migrate users".
///
/// `users` are `(user_id, home_department_id)` pairs. Users whose home is not
/// a mapped source department are left alone.
#[must_use]
pub fn plan_user_migration(
    users: &[(i32, i32)],
    department_map: &HashMap<i32, i32>,
) -> Vec<(i32, i32)> {
    users
        .iter()
        .filter_map(|&(user_id, home)| {
            department_map
                .get(&home)
                .filter(|&&target| target != home)
                .map(|&target| (user_id, target))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Vec<SourceDepartment> {
        vec![
            SourceDepartment {
                id: 1,
                name: "R&D".to_string(),
                currency: "ILS".to_string(),
                categories: vec![SourceCategory {
                    name: "Tools".to_string(),
                    is_welfare: false,
                    subcategories: vec!["Software".to_string(), "Hardware".to_string()],
                }],
            },
            SourceDepartment {
                id: 2,
                name: "Sales".to_string(),
                currency: "USD".to_string(),
                categories: vec![SourceCategory {
                    name: "Team events".to_string(),
                    is_welfare: true,
                    subcategories: vec![],
                }],
            },
        ]
    }

    #[test]
    fn test_plan_creates_missing_departments() {
        let plan = plan_copy(&source(), &HashMap::new());
        assert_eq!(plan.created_count(), 2);
        match &plan.departments[1] {
            DepartmentCopy::Create {
                name,
                currency,
                categories,
                ..
            } => {
                assert_eq!(name, "Sales");
                assert_eq!(currency, "USD");
                assert!(categories[0].is_welfare);
            }
            DepartmentCopy::Reuse { .. } => panic!("expected create"),
        }
    }

    #[test]
    fn test_plan_reuses_same_named_department() {
        let target = HashMap::from([("R&D".to_string(), 11)]);
        let plan = plan_copy(&source(), &target);
        assert_eq!(
            plan.departments[0],
            DepartmentCopy::Reuse {
                source_id: 1,
                target_id: 11
            }
        );
        assert_eq!(plan.created_count(), 1);
    }

    #[test]
    fn test_plan_noop_when_all_present() {
        let target = HashMap::from([("R&D".to_string(), 11), ("Sales".to_string(), 12)]);
        assert!(plan_copy(&source(), &target).is_noop());
    }

    #[test]
    fn test_manager_links_skip_existing_and_unmapped() {
        let map = HashMap::from([(1, 11), (2, 12)]);
        let existing = HashSet::from([(7, 11)]);
        let links = plan_manager_links(&[(7, 1), (8, 2), (9, 3), (8, 2)], &map, &existing);
        assert_eq!(links, vec![(8, 12)]);
    }

    #[test]
    fn test_user_migration_moves_only_source_homes() {
        let map = HashMap::from([(1, 11), (2, 12)]);
        let moves = plan_user_migration(&[(100, 1), (101, 2), (102, 11), (103, 40)], &map);
        assert_eq!(moves, vec![(100, 11), (101, 12)]);
    }
}
