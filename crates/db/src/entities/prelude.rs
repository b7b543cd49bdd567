//! Entity re-exports.

pub use super::budget_years::Entity as BudgetYears;
pub use super::categories::Entity as Categories;
pub use super::credit_cards::Entity as CreditCards;
pub use super::departments::Entity as Departments;
pub use super::exchange_rate_cache::Entity as ExchangeRateCache;
pub use super::expenses::Entity as Expenses;
pub use super::subcategories::Entity as Subcategories;
pub use super::suppliers::Entity as Suppliers;
pub use super::user_managed_categories::Entity as UserManagedCategories;
pub use super::user_managed_departments::Entity as UserManagedDepartments;
pub use super::users::Entity as Users;
