// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{Difficulty, Dish, DishId, NewDishRow};
use crate::error::{Error, Result};
use crate::ingredients::validate_name;
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Deserialize;

pub mod detail;
pub mod history;
pub mod listing;
pub mod writer;

#[derive(Debug, Clone, Deserialize)]
pub struct NewDish {
    pub dish_name: String,
    pub difficult: Difficulty,
}

pub fn create_dish(conn: &mut database::Connection, new: &NewDish) -> Result<Dish> {
    use database::schema::dish::dsl::*;

    let name = validate_name("dish_name", &new.dish_name)?;
    let created = diesel::insert_into(dish)
        .values(NewDishRow {
            dish_name: name,
            difficult: new.difficult,
        })
        .returning(Dish::as_returning())
        .get_result(conn)?;
    log::info!("created dish {} {name:?}", created.id);
    Ok(created)
}

pub fn get_dish(conn: &mut database::Connection, dish_id: DishId) -> Result<Option<Dish>> {
    use database::schema::dish::dsl::*;

    Ok(dish
        .find(dish_id)
        .select(Dish::as_select())
        .get_result(conn)
        .optional()?)
}

/// Renames and re-grades a dish. Returns `None` when there is no such dish.
pub fn update_dish(
    conn: &mut database::Connection,
    dish_id: DishId,
    edit: &NewDish,
) -> Result<Option<Dish>> {
    use database::schema::dish::dsl::*;

    let name = validate_name("dish_name", &edit.dish_name)?;
    let updated = diesel::update(dish.find(dish_id))
        .set(NewDishRow {
            dish_name: name,
            difficult: edit.difficult,
        })
        .execute(conn)?;
    if updated == 0 {
        return Ok(None);
    }
    // RETURNING would not see the modify_time written by the update trigger.
    get_dish(conn, dish_id)
}

/// Deletes a dish along with its ingredient links, steps and cooking history. The ingredients
/// themselves are shared and stay. Returns `false` when there is no such dish.
pub fn delete_dish(conn: &mut database::Connection, delete_id: DishId) -> Result<bool> {
    use database::schema::{dish, dish_history, dish_ingredients, dish_step};
    use diesel::delete;

    conn.immediate_transaction::<_, Error, _>(|conn| {
        delete(dish_ingredients::table.filter(dish_ingredients::dish_id.eq(delete_id)))
            .execute(conn)?;
        delete(dish_step::table.filter(dish_step::dish_id.eq(delete_id))).execute(conn)?;
        delete(dish_history::table.filter(dish_history::dish_id.eq(delete_id))).execute(conn)?;
        let deleted = delete(dish::table.find(delete_id)).execute(conn)?;
        if deleted > 0 {
            log::info!("deleted dish {delete_id}");
        }
        Ok(deleted > 0)
    })
}

#[test]
fn create_get_update_delete() {
    let mut conn = database::test_connection();

    let created = create_dish(
        &mut conn,
        &NewDish {
            dish_name: "红烧肉".into(),
            difficult: Difficulty::Medium,
        },
    )
    .unwrap();
    assert_eq!(get_dish(&mut conn, created.id).unwrap(), Some(created.clone()));

    let updated = update_dish(
        &mut conn,
        created.id,
        &NewDish {
            dish_name: "东坡肉".into(),
            difficult: Difficulty::Complex,
        },
    )
    .unwrap()
    .unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.dish_name, "东坡肉");
    assert_eq!(updated.difficult, Difficulty::Complex);
    assert_eq!(updated.create_time, created.create_time);

    assert!(delete_dish(&mut conn, created.id).unwrap());
    assert_eq!(get_dish(&mut conn, created.id).unwrap(), None);
    assert!(!delete_dish(&mut conn, created.id).unwrap());
}

#[test]
fn update_missing_dish_is_none() {
    let mut conn = database::test_connection();

    let edit = NewDish {
        dish_name: "鱼香肉丝".into(),
        difficult: Difficulty::Easy,
    };
    assert_eq!(update_dish(&mut conn, DishId::from(99), &edit).unwrap(), None);
}

#[test]
fn blank_dish_name_is_rejected() {
    let mut conn = database::test_connection();

    let err = create_dish(
        &mut conn,
        &NewDish {
            dish_name: " \t".into(),
            difficult: Difficulty::Easy,
        },
    )
    .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[cfg(test)]
fn long_ago() -> chrono::NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

#[test]
fn update_refreshes_modify_time() {
    let mut conn = database::test_connection();

    let created = create_dish(
        &mut conn,
        &NewDish {
            dish_name: "水煮鱼".into(),
            difficult: Difficulty::Complex,
        },
    )
    .unwrap();
    assert_eq!(created.create_time, created.modify_time);

    diesel::sql_query(format!(
        "UPDATE dish SET create_time = '2000-01-01 00:00:00', \
         modify_time = '2000-01-01 00:00:00' WHERE id = {}",
        created.id
    ))
    .execute(&mut conn)
    .unwrap();
    let backdated = get_dish(&mut conn, created.id).unwrap().unwrap();
    assert_eq!(backdated.modify_time, long_ago());

    let updated = update_dish(
        &mut conn,
        created.id,
        &NewDish {
            dish_name: "水煮牛肉".into(),
            difficult: Difficulty::Complex,
        },
    )
    .unwrap()
    .unwrap();
    assert_eq!(updated.create_time, long_ago());
    assert!(updated.modify_time > updated.create_time);
}
