//! Integration tests for the organization repository.

mod common;

use common::{connect, create_department, create_user, create_year, unique_name};
use outlay_core::identity::{Role, StructureScope};
use outlay_db::{
    OrganizationRepository, UserRepository,
    repositories::{OrganizationError, UpdateDepartmentInput, UpdateUserInput},
};
use outlay_core::org::StructureError;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_department_name_in_year_is_rejected() {
    let db = connect().await;
    let repo = OrganizationRepository::new(db.clone());
    let year = create_year(&db).await;
    let name = unique_name("R&D");

    create_department(&db, year.id, &name).await;
    let err = repo
        .create_department(year.id, &name, dec!(0), "ILS")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrganizationError::Structure(StructureError::DuplicateDepartment { .. })
    ));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_racing_duplicate_departments_conflict() {
    let db = connect().await;
    let repo = OrganizationRepository::new(db.clone());
    let year = create_year(&db).await;
    let name = unique_name("Ops");

    let (first, second) = tokio::join!(
        repo.create_department(year.id, &name, dec!(0), "ILS"),
        repo.create_department(year.id, &name, dec!(0), "ILS"),
    );

    let errors: Vec<_> = [first, second].into_iter().filter_map(Result::err).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].status_code(), 409);
    assert_eq!(errors[0].error_code(), "DUPLICATE_DEPARTMENT");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_department_currency_is_validated() {
    let db = connect().await;
    let repo = OrganizationRepository::new(db.clone());
    let year = create_year(&db).await;

    let err = repo
        .create_department(year.id, &unique_name("Fx"), dec!(0), "ILSX")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);

    let dept = repo
        .create_department(year.id, &unique_name("Fx"), dec!(0), "usd")
        .await
        .unwrap();
    assert_eq!(dept.currency, "USD");

    let err = repo
        .update_department(
            dept.id,
            UpdateDepartmentInput {
                currency: Some("12$".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrganizationError::Structure(StructureError::InvalidInput(_))
    ));
    assert_eq!(repo.get_department(dept.id).await.unwrap().currency, "USD");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_delete_guards_follow_references() {
    let db = connect().await;
    let repo = OrganizationRepository::new(db.clone());
    let year = create_year(&db).await;
    let dept = create_department(&db, year.id, "Sales").await;
    let cat = repo
        .create_category(dept.id, "Travel", dec!(1000), false)
        .await
        .unwrap();

    let err = repo.delete_department(dept.id).await.unwrap_err();
    assert_eq!(err.status_code(), 409);

    let err = repo.delete_year(year.year).await.unwrap_err();
    assert_eq!(err.status_code(), 409);

    repo.delete_category(cat.id).await.unwrap();
    repo.delete_department(dept.id).await.unwrap();
    repo.delete_year(year.year).await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_copy_structure_is_idempotent_and_migrates_users() {
    let db = connect().await;
    let repo = OrganizationRepository::new(db.clone());
    let source = create_year(&db).await;
    let target = create_year(&db).await;

    let rnd = create_department(&db, source.id, "R&D").await;
    create_department(&db, source.id, "Sales").await;
    let tools = repo
        .create_category(rnd.id, "Tools", dec!(50000), false)
        .await
        .unwrap();
    repo.create_subcategory(tools.id, "Software", dec!(20000))
        .await
        .unwrap();
    repo.create_category(rnd.id, "Fun", dec!(500), true)
        .await
        .unwrap();

    let alice = create_user(&db, Role::User, Some(rnd.id)).await;
    let bob = create_user(&db, Role::Manager, None).await;
    UserRepository::new(db.clone())
        .update(
            bob.id,
            UpdateUserInput {
                managed_department_ids: Some(vec![rnd.id]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let first = repo
        .copy_structure(source.year, target.year, true)
        .await
        .unwrap();
    assert_eq!(first.departments_created, 2);
    assert_eq!(first.departments_reused, 0);
    assert_eq!(first.manager_links_added, 1);
    assert_eq!(first.users_migrated, 1);

    let tree = repo
        .load_structure(target.id, &StructureScope::All)
        .await
        .unwrap();
    let names: BTreeSet<&str> = tree.iter().map(|d| d.department.name.as_str()).collect();
    assert_eq!(names, BTreeSet::from(["R&D", "Sales"]));
    let new_rnd = tree.iter().find(|d| d.department.name == "R&D").unwrap();
    assert_eq!(new_rnd.department.budget, dec!(0));
    assert_eq!(new_rnd.categories.len(), 2);
    let fun = new_rnd
        .categories
        .iter()
        .find(|c| c.category.name == "Fun")
        .unwrap();
    assert!(fun.category.is_welfare);
    let new_tools = new_rnd
        .categories
        .iter()
        .find(|c| c.category.name == "Tools")
        .unwrap();
    assert_eq!(new_tools.subcategories.len(), 1);
    assert_eq!(new_tools.subcategories[0].budget, dec!(0));

    let users = UserRepository::new(db.clone());
    let moved = users.find_by_id(alice.id).await.unwrap().unwrap();
    assert_eq!(moved.department_id, Some(new_rnd.department.id));
    let bob = users.find_with_links(bob.id).await.unwrap().unwrap();
    assert!(bob.managed_department_ids.contains(&rnd.id));
    assert!(bob.managed_department_ids.contains(&new_rnd.department.id));

    let second = repo
        .copy_structure(source.year, target.year, true)
        .await
        .unwrap();
    assert_eq!(second.departments_created, 0);
    assert_eq!(second.departments_reused, 2);
    assert_eq!(second.manager_links_added, 0);
    assert_eq!(second.users_migrated, 0);

    let again = repo
        .load_structure(target.id, &StructureScope::All)
        .await
        .unwrap();
    let total_categories: usize = again.iter().map(|d| d.categories.len()).sum();
    assert_eq!(again.len(), 2);
    assert_eq!(total_categories, 2);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_copy_to_same_year_is_rejected() {
    let db = connect().await;
    let repo = OrganizationRepository::new(db.clone());
    let year = create_year(&db).await;

    let err = repo
        .copy_structure(year.year, year.year, false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrganizationError::Structure(StructureError::SameYear)
    ));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_restricted_structure_scope() {
    let db = connect().await;
    let repo = OrganizationRepository::new(db.clone());
    let year = create_year(&db).await;
    let hr = create_department(&db, year.id, "HR").await;
    let eng = create_department(&db, year.id, "Engineering").await;

    let tree = repo
        .load_structure(year.id, &StructureScope::Restricted(BTreeSet::from([hr.id])))
        .await
        .unwrap();

    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].department.id, hr.id);
    assert!(tree.iter().all(|d| d.department.id != eng.id));
}
