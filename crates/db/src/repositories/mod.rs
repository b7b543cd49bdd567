//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.

pub mod budget;
pub mod credit_card;
pub mod exchange_rate;
pub mod expense;
pub mod organization;
pub mod report;
pub mod supplier;
pub mod user;

pub use budget::{BudgetQueryError, BudgetRepository};
pub use credit_card::{CardRemoval, CreditCardError, CreditCardRepository};
pub use exchange_rate::ExchangeRateRepository;
pub use expense::{
    ExpenseChanges, ExpenseFilter, ExpenseRecord, ExpenseRepoError, ExpenseRepository,
    MoneyChange, NewExpense,
};
pub use organization::{
    CategoryNode, CopyReport, DepartmentNode, OrganizationError, OrganizationRepository,
    UpdateCategoryInput, UpdateDepartmentInput, UpdateSubcategoryInput,
};
pub use report::{AdminStats, DepartmentSpend, ReportError, ReportRepository, StatusCount};
pub use supplier::{SupplierError, SupplierInput, SupplierRemoval, SupplierRepository};
pub use user::{CreateUserInput, UpdateUserInput, UserError, UserRepository, UserWithLinks};
