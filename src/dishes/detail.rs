// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{
    Difficulty, Dish, DishId, DishIngredientLink, DishStep, Ingredient, IngredientId,
    IngredientType,
};
use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use diesel::prelude::OptionalExtension as _;
use diesel::BelongingToDsl as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Serialize;

/// An ingredient as used by one dish. The timestamps are the ingredient's own.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DishIngredient {
    pub id: IngredientId,
    pub ingredient_name: String,
    #[serde(rename = "type")]
    pub ingredient_type: IngredientType,
    pub usage: String,
    pub create_time: NaiveDateTime,
    pub modify_time: NaiveDateTime,
}

impl DishIngredient {
    fn new(link: DishIngredientLink, ingredient: Ingredient) -> Self {
        Self {
            id: ingredient.id,
            ingredient_name: ingredient.ingredient_name,
            ingredient_type: ingredient.ingredient_type,
            usage: link.usage,
            create_time: ingredient.create_time,
            modify_time: ingredient.modify_time,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DishDetail {
    pub id: DishId,
    pub dish_name: String,
    pub difficult: Difficulty,
    /// Main ingredients first, then secondary, then seasonings.
    pub ingredients: Vec<DishIngredient>,
    /// Ascending by `step_order`.
    pub steps: Vec<DishStep>,
    pub create_time: NaiveDateTime,
    pub modify_time: NaiveDateTime,
}

fn load_ingredients(conn: &mut database::Connection, dish: &Dish) -> Result<Vec<DishIngredient>> {
    use database::schema::{dish_ingredients, ingredient};

    let mut ingredients: Vec<DishIngredient> = DishIngredientLink::belonging_to(dish)
        .inner_join(ingredient::table)
        .select((DishIngredientLink::as_select(), Ingredient::as_select()))
        .order(dish_ingredients::position.asc())
        .load(conn)?
        .into_iter()
        .map(|(link, ingredient)| DishIngredient::new(link, ingredient))
        .collect();

    // Stable, so ingredients of one type keep the order they were added in.
    ingredients.sort_by_key(|i| i.ingredient_type);
    Ok(ingredients)
}

fn load_steps(conn: &mut database::Connection, dish: &Dish) -> Result<Vec<DishStep>> {
    use database::schema::dish_step;

    Ok(DishStep::belonging_to(dish)
        .select(DishStep::as_select())
        .order((dish_step::step_order.asc(), dish_step::id.asc()))
        .load(conn)?)
}

/// Loads a dish with its ingredients (and their usage) and its steps, or `None` if there is no
/// such dish. All reads happen in one transaction, so a dish being written concurrently is seen
/// either complete or not at all.
pub fn dish_detail(conn: &mut database::Connection, dish_id: DishId) -> Result<Option<DishDetail>> {
    use database::schema::dish;
    use diesel::Connection as _;

    conn.transaction::<_, Error, _>(|conn| {
        let Some(found) = dish::table
            .find(dish_id)
            .select(Dish::as_select())
            .get_result(conn)
            .optional()?
        else {
            return Ok(None);
        };

        let ingredients = load_ingredients(conn, &found)?;
        let steps = load_steps(conn, &found)?;
        Ok(Some(DishDetail {
            id: found.id,
            dish_name: found.dish_name,
            difficult: found.difficult,
            ingredients,
            steps,
            create_time: found.create_time,
            modify_time: found.modify_time,
        }))
    })
}

#[cfg(test)]
fn create(
    conn: &mut database::Connection,
    name: &str,
    ingredients: &[(&str, IngredientType, &str)],
    steps: &[(i32, &str)],
) -> DishId {
    use super::writer::{create_dish_aggregate, IngredientEntry, NewDishAggregate, StepEntry};

    create_dish_aggregate(
        conn,
        &NewDishAggregate {
            dish_name: name.into(),
            difficult: Difficulty::Medium,
            ingredients: ingredients
                .iter()
                .map(|&(n, t, u)| IngredientEntry {
                    ingredient_name: n.into(),
                    ingredient_type: t,
                    usage: u.into(),
                })
                .collect(),
            steps: steps
                .iter()
                .map(|&(o, t)| StepEntry {
                    step_order: o,
                    step_text: t.into(),
                })
                .collect(),
        },
    )
    .unwrap()
    .id
}

#[test]
fn mapo_tofu() {
    let mut conn = database::test_connection();

    let id = create(
        &mut conn,
        "麻婆豆腐",
        &[
            ("豆腐", IngredientType::Main, "一块"),
            ("辣椒油", IngredientType::Seasoning, "适量"),
        ],
        &[(1, "切块"), (2, "下锅炒")],
    );

    let detail = dish_detail(&mut conn, id).unwrap().unwrap();
    assert_eq!(detail.id, id);
    assert_eq!(detail.dish_name, "麻婆豆腐");
    assert_eq!(detail.difficult, Difficulty::Medium);

    let ingredients: Vec<_> = detail
        .ingredients
        .iter()
        .map(|i| (i.ingredient_name.as_str(), i.ingredient_type, i.usage.as_str()))
        .collect();
    assert_eq!(
        ingredients,
        vec![
            ("豆腐", IngredientType::Main, "一块"),
            ("辣椒油", IngredientType::Seasoning, "适量"),
        ]
    );

    let steps: Vec<_> = detail.steps.iter().map(|s| s.step_text.as_str()).collect();
    assert_eq!(steps, vec!["切块", "下锅炒"]);
}

#[test]
fn ingredients_are_grouped_by_type_keeping_input_order() {
    let mut conn = database::test_connection();

    let id = create(
        &mut conn,
        "回锅肉",
        &[
            ("豆瓣酱", IngredientType::Seasoning, "一勺"),
            ("五花肉", IngredientType::Main, "300g"),
            ("青蒜", IngredientType::Secondary, "两根"),
            ("蒜苗", IngredientType::Main, "一把"),
        ],
        &[],
    );

    let detail = dish_detail(&mut conn, id).unwrap().unwrap();
    let names: Vec<_> = detail
        .ingredients
        .iter()
        .map(|i| i.ingredient_name.as_str())
        .collect();
    assert_eq!(names, vec!["五花肉", "蒜苗", "青蒜", "豆瓣酱"]);
}

#[test]
fn steps_are_sorted_by_order() {
    let mut conn = database::test_connection();

    let id = create(
        &mut conn,
        "糖醋排骨",
        &[],
        &[(30, "收汁"), (10, "焯水"), (20, "炒糖色")],
    );

    let detail = dish_detail(&mut conn, id).unwrap().unwrap();
    let orders: Vec<_> = detail.steps.iter().map(|s| s.step_order).collect();
    assert_eq!(orders, vec![10, 20, 30]);
    let texts: Vec<_> = detail.steps.iter().map(|s| s.step_text.as_str()).collect();
    assert_eq!(texts, vec!["焯水", "炒糖色", "收汁"]);
}

#[test]
fn empty_dish_has_empty_lists() {
    let mut conn = database::test_connection();

    let id = create(&mut conn, "白米饭", &[], &[]);

    let json = serde_json::to_value(dish_detail(&mut conn, id).unwrap().unwrap()).unwrap();
    assert_eq!(json["ingredients"], serde_json::json!([]));
    assert_eq!(json["steps"], serde_json::json!([]));
    assert_eq!(json["difficult"], serde_json::json!(2));
}

#[test]
fn repeated_reads_are_identical() {
    let mut conn = database::test_connection();

    let id = create(
        &mut conn,
        "酸辣土豆丝",
        &[
            ("土豆", IngredientType::Main, "两个"),
            ("醋", IngredientType::Seasoning, "一勺"),
        ],
        &[(1, "切丝"), (2, "快炒")],
    );

    let first = serde_json::to_vec(&dish_detail(&mut conn, id).unwrap()).unwrap();
    let second = serde_json::to_vec(&dish_detail(&mut conn, id).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn missing_dish_is_none() {
    let mut conn = database::test_connection();

    assert_eq!(dish_detail(&mut conn, DishId::from(12)).unwrap(), None);
}
