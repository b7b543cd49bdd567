//! Initial database migration.
//!
//! Creates the budget-year structure, users with the historical permission
//! flags, the supplier and card registries, expenses and the exchange-rate
//! cache.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ORGANIZATION STRUCTURE
        // ============================================================
        db.execute_unprepared(BUDGET_YEARS_SQL).await?;
        db.execute_unprepared(DEPARTMENTS_SQL).await?;
        db.execute_unprepared(CATEGORIES_SQL).await?;
        db.execute_unprepared(SUBCATEGORIES_SQL).await?;

        // ============================================================
        // PART 2: USERS AND DELEGATION
        // ============================================================
        db.execute_unprepared(USERS_SQL).await?;
        db.execute_unprepared(MANAGED_LINKS_SQL).await?;

        // ============================================================
        // PART 3: REGISTRIES
        // ============================================================
        db.execute_unprepared(SUPPLIERS_SQL).await?;
        db.execute_unprepared(CREDIT_CARDS_SQL).await?;

        // ============================================================
        // PART 4: EXPENSES
        // ============================================================
        db.execute_unprepared(EXPENSES_SQL).await?;

        // ============================================================
        // PART 5: EXCHANGE RATE CACHE
        // ============================================================
        db.execute_unprepared(EXCHANGE_RATE_CACHE_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const BUDGET_YEARS_SQL: &str = r"
CREATE TABLE budget_years (
    id SERIAL PRIMARY KEY,
    year INTEGER NOT NULL UNIQUE,
    name VARCHAR(100) NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT false,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

const DEPARTMENTS_SQL: &str = r"
CREATE TABLE departments (
    id SERIAL PRIMARY KEY,
    budget_year_id INTEGER NOT NULL REFERENCES budget_years(id),
    name VARCHAR(100) NOT NULL,
    budget NUMERIC(18, 2) NOT NULL DEFAULT 0 CHECK (budget >= 0),
    currency CHAR(3) NOT NULL DEFAULT 'ILS',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_departments_year_name UNIQUE (budget_year_id, name)
);

CREATE INDEX idx_departments_year ON departments(budget_year_id);
";

const CATEGORIES_SQL: &str = r"
CREATE TABLE categories (
    id SERIAL PRIMARY KEY,
    department_id INTEGER NOT NULL REFERENCES departments(id),
    name VARCHAR(100) NOT NULL,
    budget NUMERIC(18, 2) NOT NULL DEFAULT 0 CHECK (budget >= 0),
    is_welfare BOOLEAN NOT NULL DEFAULT false,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_categories_department ON categories(department_id);
CREATE INDEX idx_categories_welfare ON categories(is_welfare) WHERE is_welfare;
";

const SUBCATEGORIES_SQL: &str = r"
CREATE TABLE subcategories (
    id SERIAL PRIMARY KEY,
    category_id INTEGER NOT NULL REFERENCES categories(id),
    name VARCHAR(100) NOT NULL,
    budget NUMERIC(18, 2) NOT NULL DEFAULT 0 CHECK (budget >= 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_subcategories_category ON subcategories(category_id);
";

const USERS_SQL: &str = r"
CREATE TABLE users (
    id SERIAL PRIMARY KEY,
    username VARCHAR(80) NOT NULL UNIQUE,
    email VARCHAR(255) NOT NULL UNIQUE,
    full_name VARCHAR(200) NOT NULL DEFAULT '',
    password_hash VARCHAR(255),
    department_id INTEGER REFERENCES departments(id),
    is_admin BOOLEAN NOT NULL DEFAULT false,
    is_manager BOOLEAN NOT NULL DEFAULT false,
    is_accounting BOOLEAN NOT NULL DEFAULT false,
    is_hr BOOLEAN NOT NULL DEFAULT false,
    status VARCHAR(20) NOT NULL DEFAULT 'active'
        CHECK (status IN ('active', 'inactive', 'pending')),
    last_login_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_users_department ON users(department_id);
";

const MANAGED_LINKS_SQL: &str = r"
-- Weak many-to-many links; pruned explicitly on delete
CREATE TABLE user_managed_departments (
    user_id INTEGER NOT NULL REFERENCES users(id),
    department_id INTEGER NOT NULL REFERENCES departments(id),
    PRIMARY KEY (user_id, department_id)
);

CREATE TABLE user_managed_categories (
    user_id INTEGER NOT NULL REFERENCES users(id),
    category_id INTEGER NOT NULL REFERENCES categories(id),
    PRIMARY KEY (user_id, category_id)
);

CREATE INDEX idx_managed_departments_dept ON user_managed_departments(department_id);
CREATE INDEX idx_managed_categories_cat ON user_managed_categories(category_id);
";

const SUPPLIERS_SQL: &str = r"
CREATE TABLE suppliers (
    id SERIAL PRIMARY KEY,
    name VARCHAR(200) NOT NULL,
    contact_person VARCHAR(200),
    email VARCHAR(255),
    phone VARCHAR(50),
    address TEXT,
    tax_id VARCHAR(50),
    bank_name VARCHAR(200),
    bank_account_number VARCHAR(50),
    bank_branch VARCHAR(50),
    swift_code VARCHAR(20),
    iban VARCHAR(50),
    notes TEXT,
    status VARCHAR(20) NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'inactive')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_suppliers_status ON suppliers(status);
";

const CREDIT_CARDS_SQL: &str = r"
CREATE TABLE credit_cards (
    id SERIAL PRIMARY KEY,
    last_four_digits CHAR(4) NOT NULL CHECK (last_four_digits ~ '^[0-9]{4}$'),
    description VARCHAR(200),
    status VARCHAR(20) NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'inactive')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

const EXPENSES_SQL: &str = r"
CREATE TABLE expenses (
    id SERIAL PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    subcategory_id INTEGER NOT NULL REFERENCES subcategories(id),
    supplier_id INTEGER REFERENCES suppliers(id),
    credit_card_id INTEGER REFERENCES credit_cards(id),

    amount NUMERIC(18, 2) NOT NULL CHECK (amount > 0),
    currency CHAR(3) NOT NULL,
    -- Unrounded: amount * rate
    amount_base NUMERIC(24, 8),
    rate NUMERIC(18, 6),

    description TEXT NOT NULL,
    reason TEXT NOT NULL,
    type VARCHAR(20) NOT NULL
        CHECK (type IN ('needs_approval', 'pre_approved', 'future_approval')),
    status VARCHAR(20) NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'approved', 'rejected')),
    rejection_reason TEXT,

    payment_method VARCHAR(20)
        CHECK (payment_method IN ('credit', 'bank_transfer', 'standing_order', 'check')),
    payment_due_date VARCHAR(20)
        CHECK (payment_due_date IN ('start_of_month', 'end_of_month')),
    invoice_date DATE,

    quote_filename VARCHAR(255),
    invoice_filename VARCHAR(255),
    receipt_filename VARCHAR(255),

    handler_id INTEGER REFERENCES users(id),
    handled_at TIMESTAMPTZ,

    is_paid BOOLEAN NOT NULL DEFAULT false,
    paid_by_id INTEGER REFERENCES users(id),
    paid_at TIMESTAMPTZ,
    payment_status VARCHAR(20) NOT NULL DEFAULT 'pending_attention'
        CHECK (payment_status IN ('pending_attention', 'pending_payment', 'paid')),

    external_entry BOOLEAN NOT NULL DEFAULT false,
    external_entry_by_id INTEGER REFERENCES users(id),
    external_entry_at TIMESTAMPTZ,

    submitted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),

    CONSTRAINT chk_rejection_reason
        CHECK (status <> 'rejected' OR coalesce(length(trim(rejection_reason)), 0) > 0),
    CONSTRAINT chk_paid_coherent
        CHECK (is_paid = (payment_status = 'paid') AND is_paid = (paid_at IS NOT NULL)),
    CONSTRAINT chk_unapproved_untouched
        CHECK (status = 'approved' OR (NOT is_paid AND NOT external_entry)),
    CONSTRAINT chk_base_pair
        CHECK ((amount_base IS NULL) = (rate IS NULL))
);

CREATE INDEX idx_expenses_user ON expenses(user_id, submitted_at DESC);
CREATE INDEX idx_expenses_subcategory ON expenses(subcategory_id);
CREATE INDEX idx_expenses_status ON expenses(status);
CREATE INDEX idx_expenses_submitted ON expenses(submitted_at DESC);
";

const EXCHANGE_RATE_CACHE_SQL: &str = r"
CREATE TABLE exchange_rate_cache (
    id SERIAL PRIMARY KEY,
    currency CHAR(3) NOT NULL,
    rate_date DATE NOT NULL,
    rate NUMERIC(18, 6) NOT NULL CHECK (rate > 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_exchange_rate_cache UNIQUE (currency, rate_date)
);
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS exchange_rate_cache CASCADE;
DROP TABLE IF EXISTS expenses CASCADE;
DROP TABLE IF EXISTS credit_cards CASCADE;
DROP TABLE IF EXISTS suppliers CASCADE;
DROP TABLE IF EXISTS user_managed_categories CASCADE;
DROP TABLE IF EXISTS user_managed_departments CASCADE;
DROP TABLE IF EXISTS users CASCADE;
DROP TABLE IF EXISTS subcategories CASCADE;
DROP TABLE IF EXISTS categories CASCADE;
DROP TABLE IF EXISTS departments CASCADE;
DROP TABLE IF EXISTS budget_years CASCADE;
";
