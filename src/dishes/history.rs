// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{CookingRating, DishHistory, DishId, NewDishHistory};
use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct NewHistory {
    pub dish_id: DishId,
    pub cooking_rating: CookingRating,
    /// Defaults to now.
    #[serde(default)]
    pub cooking_time: Option<NaiveDateTime>,
}

/// Records that a dish was cooked.
pub fn record_cooking(conn: &mut database::Connection, new: &NewHistory) -> Result<DishHistory> {
    use database::schema::dish_history;

    if super::get_dish(conn, new.dish_id)?.is_none() {
        return Err(Error::NotFound(format!("dish {} not found", new.dish_id)));
    }

    let cooking_time = new
        .cooking_time
        .unwrap_or_else(|| chrono::Local::now().naive_local());
    let entry = diesel::insert_into(dish_history::table)
        .values(NewDishHistory {
            dish_id: new.dish_id,
            cooking_time,
            cooking_rating: new.cooking_rating,
        })
        .returning(DishHistory::as_returning())
        .get_result(conn)?;
    log::info!(
        "dish {} cooked at {cooking_time}, rated {}",
        new.dish_id,
        new.cooking_rating
    );
    Ok(entry)
}

/// Every time the dish was cooked, most recent first.
pub fn history_for_dish(
    conn: &mut database::Connection,
    for_dish: DishId,
) -> Result<Vec<DishHistory>> {
    use database::schema::dish_history::dsl::*;

    Ok(dish_history
        .filter(dish_id.eq(for_dish))
        .select(DishHistory::as_select())
        .order((cooking_time.desc(), create_time.desc(), id.desc()))
        .load(conn)?)
}

pub fn cooking_count(conn: &mut database::Connection, for_dish: DishId) -> Result<i64> {
    use database::schema::dish_history::dsl::*;

    Ok(dish_history
        .filter(dish_id.eq(for_dish))
        .count()
        .get_result(conn)?)
}

#[cfg(test)]
fn at(s: &str) -> Option<NaiveDateTime> {
    Some(NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap())
}

#[test]
fn history_is_newest_first() {
    use crate::dishes::{create_dish, NewDish};
    use crate::database::models::Difficulty;

    let mut conn = database::test_connection();
    let dish = create_dish(
        &mut conn,
        &NewDish {
            dish_name: "干煸豆角".into(),
            difficult: Difficulty::Medium,
        },
    )
    .unwrap();

    for (time, rating) in [
        ("2024-05-01 18:30", CookingRating::Okay),
        ("2024-05-09 19:00", CookingRating::Great),
        ("2024-05-04 12:15", CookingRating::Poor),
    ] {
        record_cooking(
            &mut conn,
            &NewHistory {
                dish_id: dish.id,
                cooking_rating: rating,
                cooking_time: at(time),
            },
        )
        .unwrap();
    }

    let ratings: Vec<_> = history_for_dish(&mut conn, dish.id)
        .unwrap()
        .into_iter()
        .map(|h| h.cooking_rating)
        .collect();
    assert_eq!(
        ratings,
        vec![CookingRating::Great, CookingRating::Poor, CookingRating::Okay]
    );
    assert_eq!(cooking_count(&mut conn, dish.id).unwrap(), 3);
}

#[test]
fn cooking_time_defaults_to_now() {
    use crate::dishes::{create_dish, NewDish};
    use crate::database::models::Difficulty;

    let mut conn = database::test_connection();
    let dish = create_dish(
        &mut conn,
        &NewDish {
            dish_name: "蒜蓉西兰花".into(),
            difficult: Difficulty::Easy,
        },
    )
    .unwrap();

    let before = chrono::Local::now().naive_local();
    let entry = record_cooking(
        &mut conn,
        &NewHistory {
            dish_id: dish.id,
            cooking_rating: CookingRating::Average,
            cooking_time: None,
        },
    )
    .unwrap();
    assert!(entry.cooking_time >= before);
    assert_eq!(entry.dish_id, dish.id);
}

#[test]
fn unknown_dish() {
    let mut conn = database::test_connection();

    let err = record_cooking(
        &mut conn,
        &NewHistory {
            dish_id: DishId::from(5),
            cooking_rating: CookingRating::Great,
            cooking_time: None,
        },
    )
    .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    assert!(history_for_dish(&mut conn, DishId::from(5))
        .unwrap()
        .is_empty());
    assert_eq!(cooking_count(&mut conn, DishId::from(5)).unwrap(), 0);
}
