// Copyright 2023 Remi Bernotavicius

use chrono::NaiveDateTime;
use derive_more::{Display, From};
use diesel::associations::{Associations, Identifiable};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow, Queryable};
use diesel::expression::{AsExpression, Selectable};
use diesel::prelude::{AsChangeset, Insertable};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::SmallInt;
use diesel::sqlite::Sqlite;
use diesel_derive_newtype::DieselNewType;
use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// Declares an enum persisted as a raw `SMALLINT`. The integer meaning lives only here, the
/// schema does not constrain the column. On the wire the enum is the same raw integer.
macro_rules! small_int_enum {
    ($(#[$meta:meta])* $name:ident {
        $($variant:ident = $value:literal => $display:literal,)+
    }) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Display,
            EnumIter,
            Hash,
            Copy,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            AsExpression,
            FromSqlRow,
            Serialize,
            Deserialize,
        )]
        #[diesel(sql_type = SmallInt)]
        #[serde(into = "i16", try_from = "i16")]
        pub enum $name {
            $(
                #[display($display)]
                $variant = $value,
            )+
        }

        impl $name {
            pub fn iter() -> impl Iterator<Item = Self> {
                <Self as strum::IntoEnumIterator>::iter()
            }
        }

        impl From<$name> for i16 {
            fn from(v: $name) -> i16 {
                v as i16
            }
        }

        impl TryFrom<i16> for $name {
            type Error = String;

            fn try_from(v: i16) -> Result<Self, String> {
                Self::iter().find(|e| i16::from(*e) == v).ok_or_else(|| {
                    let expected: Vec<String> = Self::iter()
                        .map(|e| format!("{}={e}", i16::from(e)))
                        .collect();
                    format!(
                        "invalid {} {v}, expected one of {}",
                        stringify!($name),
                        expected.join(", ")
                    )
                })
            }
        }

        impl ToSql<SmallInt, Sqlite> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
                out.set_value(i32::from(i16::from(*self)));
                Ok(IsNull::No)
            }
        }

        impl FromSql<SmallInt, Sqlite> for $name {
            fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
                let raw = <i16 as FromSql<SmallInt, Sqlite>>::from_sql(bytes)?;
                Ok(Self::try_from(raw)?)
            }
        }
    };
}

small_int_enum! {
    Difficulty {
        Easy = 1 => "easy",
        Medium = 2 => "medium",
        Complex = 3 => "complex",
    }
}

small_int_enum! {
    /// Ordering follows the integer value, so sorting groups main ingredients first.
    IngredientType {
        Main = 1 => "main",
        Secondary = 2 => "secondary",
        Seasoning = 3 => "seasoning",
    }
}

small_int_enum! {
    CookingRating {
        Great = 1 => "great",
        Okay = 2 => "okay",
        Average = 3 => "average",
        Poor = 4 => "poor",
    }
}

#[derive(
    DieselNewType,
    Debug,
    Display,
    From,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Copy,
    Clone,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct DishId(i32);

#[derive(
    DieselNewType,
    Debug,
    Display,
    From,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Copy,
    Clone,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct IngredientId(i32);

#[derive(DieselNewType, Debug, Display, From, Hash, PartialEq, Eq, Copy, Clone, Serialize)]
#[serde(transparent)]
pub struct DishStepId(i32);

#[derive(DieselNewType, Debug, Display, From, Hash, PartialEq, Eq, Copy, Clone, Serialize)]
#[serde(transparent)]
pub struct DishHistoryId(i32);

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::database::schema::dish)]
pub struct Dish {
    pub id: DishId,
    pub dish_name: String,
    pub difficult: Difficulty,
    pub create_time: NaiveDateTime,
    pub modify_time: NaiveDateTime,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = crate::database::schema::dish)]
pub struct NewDishRow<'a> {
    pub dish_name: &'a str,
    pub difficult: Difficulty,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::database::schema::ingredient)]
pub struct Ingredient {
    pub id: IngredientId,
    pub ingredient_name: String,
    #[serde(rename = "type")]
    pub ingredient_type: IngredientType,
    pub create_time: NaiveDateTime,
    pub modify_time: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::ingredient)]
pub struct NewIngredientRow<'a> {
    pub ingredient_name: &'a str,
    pub ingredient_type: IngredientType,
}

/// The edge between a dish and an ingredient. `usage` describes how much of the ingredient this
/// dish needs, so it lives here and never on the shared [`Ingredient`] row.
#[derive(Associations, Queryable, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(belongs_to(Dish))]
#[diesel(belongs_to(Ingredient))]
#[diesel(primary_key(dish_id, ingredient_id))]
#[diesel(table_name = crate::database::schema::dish_ingredients)]
pub struct DishIngredientLink {
    pub dish_id: DishId,
    pub ingredient_id: IngredientId,
    /// Index of the entry in the list the dish was created from.
    pub position: i32,
    pub usage: String,
    pub create_time: NaiveDateTime,
    pub modify_time: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::dish_ingredients)]
pub struct NewDishIngredientLink<'a> {
    pub dish_id: DishId,
    pub ingredient_id: IngredientId,
    pub position: i32,
    pub usage: &'a str,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(belongs_to(Dish))]
#[diesel(table_name = crate::database::schema::dish_step)]
pub struct DishStep {
    pub id: DishStepId,
    pub dish_id: DishId,
    pub step_order: i32,
    pub step_text: String,
    pub create_time: NaiveDateTime,
    pub modify_time: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::dish_step)]
pub struct NewDishStep<'a> {
    pub dish_id: DishId,
    pub step_order: i32,
    pub step_text: &'a str,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(belongs_to(Dish))]
#[diesel(table_name = crate::database::schema::dish_history)]
pub struct DishHistory {
    pub id: DishHistoryId,
    pub dish_id: DishId,
    pub cooking_time: NaiveDateTime,
    pub cooking_rating: CookingRating,
    pub create_time: NaiveDateTime,
    pub modify_time: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::dish_history)]
pub struct NewDishHistory {
    pub dish_id: DishId,
    pub cooking_time: NaiveDateTime,
    pub cooking_rating: CookingRating,
}

#[test]
fn small_int_enums_match_their_column_values() {
    let difficulties: Vec<i16> = Difficulty::iter().map(i16::from).collect();
    assert_eq!(difficulties, vec![1, 2, 3]);

    let ratings: Vec<i16> = CookingRating::iter().map(i16::from).collect();
    assert_eq!(ratings, vec![1, 2, 3, 4]);

    assert_eq!(IngredientType::try_from(3i16), Ok(IngredientType::Seasoning));
    assert!(IngredientType::Main < IngredientType::Secondary);
    assert!(IngredientType::Secondary < IngredientType::Seasoning);
}

#[test]
fn small_int_enum_rejects_unknown_values() {
    let err = Difficulty::try_from(4i16).unwrap_err();
    assert_eq!(
        err,
        "invalid Difficulty 4, expected one of 1=easy, 2=medium, 3=complex"
    );
    assert!(CookingRating::try_from(0i16).is_err());
}

#[test]
fn small_int_enum_json_is_the_raw_integer() {
    assert_eq!(serde_json::to_string(&IngredientType::Seasoning).unwrap(), "3");
    let rating: CookingRating = serde_json::from_str("2").unwrap();
    assert_eq!(rating, CookingRating::Okay);
    assert!(serde_json::from_str::<Difficulty>("7").is_err());
}
