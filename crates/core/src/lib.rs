//! Core business logic for Outlay.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! External systems (rate sources, the rate cache, document analysis, mail)
//! sit behind traits implemented in other crates.
//!
//! # Modules
//!
//! - `identity` - Roles and permission predicates
//! - `org` - Budget-year structure copy planning
//! - `currency` - Exchange rates with a fallback chain
//! - `document` - Invoice and receipt data extraction
//! - `expense` - Submission, approval and payment state machines
//! - `budget` - Approved-spend aggregation
//! - `notification` - Email templates and dispatch
//! - `reports` - Accounting export
//! - `auth` - Password hashing
//! - `storage` - Attachment storage

pub mod auth;
pub mod budget;
pub mod currency;
pub mod document;
pub mod expense;
pub mod identity;
pub mod notification;
pub mod org;
pub mod reports;
pub mod storage;
