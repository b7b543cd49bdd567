//! Replaces the four permission flags on `users` with a single `role`.
//!
//! Backfill precedence: admin > accounting > hr > manager > user.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DOWN_SQL).await?;
        Ok(())
    }
}

const UP_SQL: &str = r"
ALTER TABLE users
    ADD COLUMN role VARCHAR(20) NOT NULL DEFAULT 'user'
    CHECK (role IN ('user', 'admin', 'manager', 'accounting', 'hr'));

UPDATE users SET role = CASE
    WHEN is_admin THEN 'admin'
    WHEN is_accounting THEN 'accounting'
    WHEN is_hr THEN 'hr'
    WHEN is_manager THEN 'manager'
    ELSE 'user'
END;

ALTER TABLE users
    DROP COLUMN is_admin,
    DROP COLUMN is_manager,
    DROP COLUMN is_accounting,
    DROP COLUMN is_hr;
";

const DOWN_SQL: &str = r"
ALTER TABLE users
    ADD COLUMN is_admin BOOLEAN NOT NULL DEFAULT false,
    ADD COLUMN is_manager BOOLEAN NOT NULL DEFAULT false,
    ADD COLUMN is_accounting BOOLEAN NOT NULL DEFAULT false,
    ADD COLUMN is_hr BOOLEAN NOT NULL DEFAULT false;

UPDATE users SET
    is_admin = (role = 'admin'),
    is_manager = (role = 'manager'),
    is_accounting = (role = 'accounting'),
    is_hr = (role = 'hr');

ALTER TABLE users DROP COLUMN role;
";
