//! `SeaORM` entity definitions.

pub mod prelude;

pub mod budget_years;
pub mod categories;
pub mod credit_cards;
pub mod departments;
pub mod exchange_rate_cache;
pub mod expenses;
pub mod subcategories;
pub mod suppliers;
pub mod user_managed_categories;
pub mod user_managed_departments;
pub mod users;
