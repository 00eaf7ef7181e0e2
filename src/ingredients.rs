// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{Ingredient, IngredientId, IngredientType, NewIngredientRow};
use crate::error::{Error, Result};
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct NewIngredient {
    pub ingredient_name: String,
    #[serde(rename = "type")]
    pub ingredient_type: IngredientType,
}

pub(crate) fn validate_name<'a>(what: &str, name: &'a str) -> Result<&'a str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation(format!("{what} must not be empty")));
    }
    Ok(name)
}

fn find_by_name(
    conn: &mut database::Connection,
    find_name: &str,
) -> Result<Option<IngredientId>> {
    use database::schema::ingredient::dsl::*;

    Ok(ingredient
        .select(id)
        .filter(ingredient_name.eq(find_name))
        .get_result(conn)
        .optional()?)
}

/// Finds the ingredient called `name`, creating it with `new_type` if there is none yet.
///
/// An existing ingredient keeps the type it was first created with. The insert is an upsert
/// followed by a re-read, which picks up a row a concurrent caller created first. Runs on the
/// caller's connection, so a surrounding transaction also rolls back the new row.
pub fn resolve(
    conn: &mut database::Connection,
    name: &str,
    new_type: IngredientType,
) -> Result<IngredientId> {
    use database::schema::ingredient::dsl::*;

    if let Some(existing) = find_by_name(conn, name)? {
        return Ok(existing);
    }

    let inserted = diesel::insert_into(ingredient)
        .values(NewIngredientRow {
            ingredient_name: name,
            ingredient_type: new_type,
        })
        .on_conflict(ingredient_name)
        .do_nothing()
        .execute(conn)?;
    if inserted == 0 {
        log::debug!("ingredient {name:?} was created concurrently, re-reading it");
    } else {
        log::debug!("created ingredient {name:?} ({new_type})");
    }

    find_by_name(conn, name)?
        .ok_or_else(|| Error::Conflict(format!("ingredient {name:?} could not be resolved")))
}

pub fn list_ingredients(conn: &mut database::Connection, limit: i64) -> Result<Vec<Ingredient>> {
    use database::schema::ingredient::dsl::*;

    Ok(ingredient
        .select(Ingredient::as_select())
        .order(id.asc())
        .limit(limit)
        .load(conn)?)
}

pub fn get_ingredient(
    conn: &mut database::Connection,
    ingredient_id: IngredientId,
) -> Result<Option<Ingredient>> {
    use database::schema::ingredient::dsl::*;

    Ok(ingredient
        .find(ingredient_id)
        .select(Ingredient::as_select())
        .get_result(conn)
        .optional()?)
}

pub fn create_ingredient(
    conn: &mut database::Connection,
    new: &NewIngredient,
) -> Result<Ingredient> {
    use database::schema::ingredient::dsl::*;

    let name = validate_name("ingredient_name", &new.ingredient_name)?;
    diesel::insert_into(ingredient)
        .values(NewIngredientRow {
            ingredient_name: name,
            ingredient_type: new.ingredient_type,
        })
        .returning(Ingredient::as_returning())
        .get_result(conn)
        .map_err(Error::from)
        .map_err(|e| {
            if e.is_unique_violation() {
                Error::Conflict(format!("ingredient {name:?} already exists"))
            } else {
                e
            }
        })
}

#[cfg(test)]
fn ingredient_count(conn: &mut database::Connection) -> i64 {
    database::schema::ingredient::table
        .count()
        .get_result(conn)
        .unwrap()
}

#[test]
fn resolve_creates_then_reuses() {
    let mut conn = database::test_connection();

    let first = resolve(&mut conn, "鸡肉", IngredientType::Main).unwrap();
    let second = resolve(&mut conn, "鸡肉", IngredientType::Main).unwrap();
    assert_eq!(first, second);
    assert_eq!(ingredient_count(&mut conn), 1);

    let other = resolve(&mut conn, "生姜", IngredientType::Secondary).unwrap();
    assert_ne!(first, other);
    assert_eq!(ingredient_count(&mut conn), 2);
}

#[test]
fn resolve_keeps_first_type() {
    let mut conn = database::test_connection();

    let id = resolve(&mut conn, "花椒", IngredientType::Seasoning).unwrap();
    assert_eq!(
        resolve(&mut conn, "花椒", IngredientType::Main).unwrap(),
        id
    );

    let stored = get_ingredient(&mut conn, id).unwrap().unwrap();
    assert_eq!(stored.ingredient_type, IngredientType::Seasoning);
}

#[test]
fn resolve_matches_names_exactly() {
    let mut conn = database::test_connection();

    let lower = resolve(&mut conn, "tofu", IngredientType::Main).unwrap();
    let upper = resolve(&mut conn, "Tofu", IngredientType::Main).unwrap();
    assert_ne!(lower, upper);
}

#[test]
fn create_ingredient_rejects_duplicates_and_blank_names() {
    let mut conn = database::test_connection();

    let new = NewIngredient {
        ingredient_name: " 豆腐 ".into(),
        ingredient_type: IngredientType::Main,
    };
    let created = create_ingredient(&mut conn, &new).unwrap();
    assert_eq!(created.ingredient_name, "豆腐");

    let err = create_ingredient(&mut conn, &new).unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "{err}");

    let blank = NewIngredient {
        ingredient_name: "  ".into(),
        ingredient_type: IngredientType::Main,
    };
    assert!(matches!(
        create_ingredient(&mut conn, &blank),
        Err(Error::Validation(_))
    ));
}

#[test]
fn list_ingredients_is_ordered_and_limited() {
    let mut conn = database::test_connection();

    for (name, kind) in [
        ("猪肉", IngredientType::Main),
        ("大葱", IngredientType::Secondary),
        ("盐", IngredientType::Seasoning),
    ] {
        resolve(&mut conn, name, kind).unwrap();
    }

    let names: Vec<String> = list_ingredients(&mut conn, 2)
        .unwrap()
        .into_iter()
        .map(|i| i.ingredient_name)
        .collect();
    assert_eq!(names, vec!["猪肉", "大葱"]);
}
