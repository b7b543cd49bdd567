//! `SeaORM` Entity for expenses table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub subcategory_id: i32,
    pub supplier_id: Option<i32>,
    pub credit_card_id: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub amount: Decimal,
    pub currency: String,
    #[sea_orm(column_type = "Decimal(Some((24, 8)))", nullable)]
    pub amount_base: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((18, 6)))", nullable)]
    pub rate: Option<Decimal>,
    pub description: String,
    pub reason: String,
    #[sea_orm(column_name = "type")]
    pub expense_type: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub payment_method: Option<String>,
    pub payment_due_date: Option<String>,
    pub invoice_date: Option<Date>,
    pub quote_filename: Option<String>,
    pub invoice_filename: Option<String>,
    pub receipt_filename: Option<String>,
    pub handler_id: Option<i32>,
    pub handled_at: Option<DateTimeUtc>,
    pub is_paid: bool,
    pub paid_by_id: Option<i32>,
    pub paid_at: Option<DateTimeUtc>,
    pub payment_status: String,
    pub external_entry: bool,
    pub external_entry_by_id: Option<i32>,
    pub external_entry_at: Option<DateTimeUtc>,
    pub submitted_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Submitter,
    #[sea_orm(
        belongs_to = "super::subcategories::Entity",
        from = "Column::SubcategoryId",
        to = "super::subcategories::Column::Id"
    )]
    Subcategories,
    #[sea_orm(
        belongs_to = "super::suppliers::Entity",
        from = "Column::SupplierId",
        to = "super::suppliers::Column::Id"
    )]
    Suppliers,
    #[sea_orm(
        belongs_to = "super::credit_cards::Entity",
        from = "Column::CreditCardId",
        to = "super::credit_cards::Column::Id"
    )]
    CreditCards,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Submitter.def()
    }
}

impl Related<super::subcategories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subcategories.def()
    }
}

impl Related<super::suppliers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Suppliers.def()
    }
}

impl Related<super::credit_cards::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CreditCards.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
