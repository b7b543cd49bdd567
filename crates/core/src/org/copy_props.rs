//! Property tests for structure copying.

use std::collections::HashMap;

use proptest::prelude::*;

use super::copy::{DepartmentCopy, SourceCategory, SourceDepartment, plan_copy};

/// A year held in memory: departments with their category trees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct YearStore {
    next_id: i32,
    departments: Vec<(i32, String, Vec<SourceCategory>)>,
}

impl YearStore {
    fn names(&self) -> HashMap<String, i32> {
        self.departments
            .iter()
            .map(|(id, name, _)| (name.clone(), *id))
            .collect()
    }

    /// Executes a copy of `source` into this year and returns the id map.
    fn copy_from(&mut self, source: &[SourceDepartment]) -> HashMap<i32, i32> {
        let plan = plan_copy(source, &self.names());
        let mut map = HashMap::new();
        for dept in plan.departments {
            match dept {
                DepartmentCopy::Reuse {
                    source_id,
                    target_id,
                } => {
                    map.insert(source_id, target_id);
                }
                DepartmentCopy::Create {
                    source_id,
                    name,
                    categories,
                    ..
                } => {
                    self.next_id += 1;
                    let cats = categories
                        .into_iter()
                        .map(|c| SourceCategory {
                            name: c.name,
                            is_welfare: c.is_welfare,
                            subcategories: c.subcategories,
                        })
                        .collect();
                    self.departments.push((self.next_id, name, cats));
                    map.insert(source_id, self.next_id);
                }
            }
        }
        map
    }
}

fn sorted_tree(categories: &[SourceCategory]) -> Vec<(String, bool, Vec<String>)> {
    let mut tree: Vec<_> = categories
        .iter()
        .map(|c| {
            let mut subs = c.subcategories.clone();
            subs.sort();
            (c.name.clone(), c.is_welfare, subs)
        })
        .collect();
    tree.sort();
    tree
}

fn any_source() -> impl Strategy<Value = Vec<SourceDepartment>> {
    let category = ("[A-Z][a-z]{0,5}", any::<bool>(), prop::collection::vec("[a-z]{1,5}", 0..4))
        .prop_map(|(name, is_welfare, subcategories)| SourceCategory {
            name,
            is_welfare,
            subcategories,
        });
    prop::collection::btree_map("[A-Z]{2,4}", prop::collection::vec(category, 0..4), 0..6).prop_map(
        |depts| {
            depts
                .into_iter()
                .zip(1..)
                .map(|((name, categories), id)| SourceDepartment {
                    id,
                    name,
                    currency: "ILS".to_string(),
                    categories,
                })
                .collect()
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Copying twice leaves the target exactly as copying once.
    #[test]
    fn prop_copy_is_idempotent(source in any_source(), preexisting in prop::collection::vec("[A-Z]{2,4}", 0..3)) {
        let mut target = YearStore { next_id: 1000, ..YearStore::default() };
        for name in preexisting {
            if !target.names().contains_key(&name) {
                target.next_id += 1;
                let id = target.next_id;
                target.departments.push((id, name, vec![]));
            }
        }

        let first_map = target.copy_from(&source);
        let after_once = target.clone();
        let second_map = target.copy_from(&source);

        prop_assert_eq!(&target, &after_once);
        prop_assert_eq!(first_map, second_map);
    }

    /// Every source department has a same-named target, and fresh copies
    /// carry the same category and subcategory multisets.
    #[test]
    fn prop_copy_preserves_trees(source in any_source()) {
        let mut target = YearStore::default();
        let map = target.copy_from(&source);

        for dept in &source {
            let target_id = map[&dept.id];
            let (_, name, cats) = target
                .departments
                .iter()
                .find(|(id, _, _)| *id == target_id)
                .expect("mapped department exists");
            prop_assert_eq!(name, &dept.name);
            prop_assert_eq!(sorted_tree(cats), sorted_tree(&dept.categories));
        }
    }
}
