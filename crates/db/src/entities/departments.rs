//! `SeaORM` Entity for departments table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "departments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub budget_year_id: i32,
    pub name: String,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub budget: Decimal,
    pub currency: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::budget_years::Entity",
        from = "Column::BudgetYearId",
        to = "super::budget_years::Column::Id"
    )]
    BudgetYears,
    #[sea_orm(has_many = "super::categories::Entity")]
    Categories,
}

impl Related<super::budget_years::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BudgetYears.def()
    }
}

impl Related<super::categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Categories.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
