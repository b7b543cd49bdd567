//! Integration tests for the user repository.

mod common;

use common::{connect, create_department, create_user, create_year, unique_name};
use outlay_core::identity::{Role, UserStatus, Visibility};
use outlay_db::{
    OrganizationRepository, UserRepository,
    repositories::{UpdateUserInput, UserError},
};
use rust_decimal_macros::dec;

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_login_lookup_by_username_or_email() {
    let db = connect().await;
    let user = create_user(&db, Role::User, None).await;
    let repo = UserRepository::new(db.clone());

    let by_name = repo.find_by_login(&user.username).await.unwrap().unwrap();
    let by_email = repo
        .find_by_login(&user.email.to_uppercase())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_name.id, user.id);
    assert_eq!(by_email.id, user.id);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_update_replaces_links_and_builds_principal() {
    let db = connect().await;
    let org = OrganizationRepository::new(db.clone());
    let year = create_year(&db).await;
    let hr = create_department(&db, year.id, "HR").await;
    let eng = create_department(&db, year.id, "Engineering").await;
    let welfare = org
        .create_category(hr.id, "HR Welfare", dec!(1000), true)
        .await
        .unwrap();

    let dan = create_user(&db, Role::User, Some(eng.id)).await;
    let repo = UserRepository::new(db.clone());
    let updated = repo
        .update(
            dan.id,
            UpdateUserInput {
                role: Some(Role::Manager),
                managed_category_ids: Some(vec![welfare.id, welfare.id]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let principal = updated.principal();
    assert_eq!(principal.role, Role::Manager);
    assert_eq!(principal.home_department_id, Some(eng.id));
    assert!(principal.manages_category(welfare.id));
    assert!(matches!(principal.visibility(), Visibility::Managed { .. }));

    let approvers = repo.approvers_for(hr.id, welfare.id).await.unwrap();
    assert!(approvers.iter().any(|u| u.id == dan.id));

    let cleared = repo
        .update(
            dan.id,
            UpdateUserInput {
                managed_category_ids: Some(vec![]),
                status: Some(UserStatus::Inactive),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.managed_category_ids.is_empty());
    assert_eq!(cleared.status(), UserStatus::Inactive);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_username_is_conflict() {
    let db = connect().await;
    let user = create_user(&db, Role::User, None).await;
    let repo = UserRepository::new(db.clone());

    let err = repo
        .create(outlay_db::repositories::CreateUserInput {
            username: user.username.clone(),
            email: format!("{}@example.com", unique_name("other")),
            full_name: "Other".to_string(),
            password_hash: None,
            department_id: None,
            role: Role::User,
            status: UserStatus::Active,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, UserError::DuplicateUsername(_)));
    assert_eq!(err.status_code(), 409);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_sso_upsert_creates_once() {
    let db = connect().await;
    let repo = UserRepository::new(db.clone());
    let email = format!("{}@corp.example", unique_name("sso"));

    let first = repo.upsert_sso(&email, "Sso User", None).await.unwrap();
    let second = repo.upsert_sso(&email, "Sso User", None).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.status, "active");
    assert_eq!(first.role, "user");
    assert!(first.password_hash.is_none());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_delete_prunes_links() {
    let db = connect().await;
    let year = create_year(&db).await;
    let dept = create_department(&db, year.id, "Ops").await;
    let manager = create_user(&db, Role::Manager, None).await;
    let repo = UserRepository::new(db.clone());
    repo.update(
        manager.id,
        UpdateUserInput {
            managed_department_ids: Some(vec![dept.id]),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    repo.delete(manager.id).await.unwrap();
    assert!(repo.find_by_id(manager.id).await.unwrap().is_none());

    OrganizationRepository::new(db.clone())
        .delete_department(dept.id)
        .await
        .unwrap();
}
