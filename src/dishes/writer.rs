// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{
    Difficulty, Dish, IngredientType, NewDishIngredientLink, NewDishRow, NewDishStep,
};
use crate::error::{Error, Result};
use crate::ingredients::{self, validate_name};
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientEntry {
    pub ingredient_name: String,
    /// Only used when the ingredient does not exist yet.
    #[serde(rename = "type")]
    pub ingredient_type: IngredientType,
    #[serde(default)]
    pub usage: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepEntry {
    pub step_order: i32,
    pub step_text: String,
}

/// A dish together with everything it is made of, as submitted for creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDishAggregate {
    pub dish_name: String,
    pub difficult: Difficulty,
    #[serde(default)]
    pub ingredients: Vec<IngredientEntry>,
    #[serde(default)]
    pub steps: Vec<StepEntry>,
}

impl NewDishAggregate {
    fn validate(&self) -> Result<()> {
        validate_name("dish_name", &self.dish_name)?;
        for entry in &self.ingredients {
            validate_name("ingredient_name", &entry.ingredient_name)?;
        }
        Ok(())
    }
}

fn insert_ingredient_links(
    conn: &mut database::Connection,
    dish: &Dish,
    entries: &[IngredientEntry],
) -> Result<()> {
    use database::schema::dish_ingredients;

    for (position, entry) in entries.iter().enumerate() {
        let name = entry.ingredient_name.trim();
        let ingredient_id = ingredients::resolve(conn, name, entry.ingredient_type)?;
        let position = i32::try_from(position)
            .map_err(|_| Error::Validation("too many ingredients".into()))?;

        diesel::insert_into(dish_ingredients::table)
            .values(NewDishIngredientLink {
                dish_id: dish.id,
                ingredient_id,
                position,
                usage: &entry.usage,
            })
            .execute(conn)
            .map_err(Error::from)
            .map_err(|e| {
                if e.is_unique_violation() {
                    Error::Conflict(format!("ingredient {name:?} is listed more than once"))
                } else {
                    e
                }
            })?;
    }
    Ok(())
}

fn insert_steps(conn: &mut database::Connection, dish: &Dish, entries: &[StepEntry]) -> Result<()> {
    use database::schema::dish_step;

    if entries.is_empty() {
        return Ok(());
    }
    let rows: Vec<_> = entries
        .iter()
        .map(|entry| NewDishStep {
            dish_id: dish.id,
            step_order: entry.step_order,
            step_text: &entry.step_text,
        })
        .collect();
    diesel::insert_into(dish_step::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

/// Creates a dish with its ingredient links and steps as one unit.
///
/// Ingredients are resolved by name, creating the ones not seen before. Steps are stored with
/// the orders given, without renumbering. Everything, including newly created ingredients, is
/// rolled back if any part fails. Takes the database write lock up front (`BEGIN IMMEDIATE`).
pub fn create_dish_aggregate(
    conn: &mut database::Connection,
    new: &NewDishAggregate,
) -> Result<Dish> {
    use database::schema::dish;

    new.validate()?;

    let created = conn.immediate_transaction::<_, Error, _>(|conn| {
        let created = diesel::insert_into(dish::table)
            .values(NewDishRow {
                dish_name: new.dish_name.trim(),
                difficult: new.difficult,
            })
            .returning(Dish::as_returning())
            .get_result(conn)?;

        insert_ingredient_links(conn, &created, &new.ingredients)?;
        insert_steps(conn, &created, &new.steps)?;
        Ok(created)
    })?;

    log::info!(
        "created dish {} {:?} ({}) with {} ingredients and {} steps",
        created.id,
        created.dish_name,
        created.difficult,
        new.ingredients.len(),
        new.steps.len()
    );
    Ok(created)
}

#[cfg(test)]
fn count(conn: &mut database::Connection, table: &str) -> i64 {
    use diesel::sql_types::BigInt;

    #[derive(diesel::QueryableByName)]
    struct Count {
        #[diesel(sql_type = BigInt)]
        n: i64,
    }

    diesel::sql_query(format!("SELECT COUNT(*) AS n FROM {table}"))
        .get_result::<Count>(conn)
        .unwrap()
        .n
}

#[cfg(test)]
fn entry(name: &str, ingredient_type: IngredientType, usage: &str) -> IngredientEntry {
    IngredientEntry {
        ingredient_name: name.into(),
        ingredient_type,
        usage: usage.into(),
    }
}

#[cfg(test)]
fn step(step_order: i32, step_text: &str) -> StepEntry {
    StepEntry {
        step_order,
        step_text: step_text.into(),
    }
}

#[test]
fn creates_dish_links_and_steps() {
    let mut conn = database::test_connection();

    let created = create_dish_aggregate(
        &mut conn,
        &NewDishAggregate {
            dish_name: "麻婆豆腐".into(),
            difficult: Difficulty::Medium,
            ingredients: vec![
                entry("豆腐", IngredientType::Main, "一块"),
                entry("辣椒油", IngredientType::Seasoning, "适量"),
            ],
            steps: vec![step(1, "切块"), step(2, "下锅炒")],
        },
    )
    .unwrap();
    assert_eq!(created.dish_name, "麻婆豆腐");
    assert_eq!(created.difficult, Difficulty::Medium);

    assert_eq!(count(&mut conn, "dish"), 1);
    assert_eq!(count(&mut conn, "ingredient"), 2);
    assert_eq!(count(&mut conn, "dish_ingredients"), 2);
    assert_eq!(count(&mut conn, "dish_step"), 2);
}

#[test]
fn shared_ingredient_is_created_once() {
    use crate::database::models::{DishIngredientLink, Ingredient};
    use crate::database::schema::{dish_ingredients, ingredient};
    use diesel::BelongingToDsl as _;
    use diesel::ExpressionMethods as _;
    use diesel::QueryDsl as _;

    let mut conn = database::test_connection();

    for name in ["宫保鸡丁", "白切鸡"] {
        create_dish_aggregate(
            &mut conn,
            &NewDishAggregate {
                dish_name: name.into(),
                difficult: Difficulty::Easy,
                ingredients: vec![entry("鸡肉", IngredientType::Main, "300g")],
                steps: vec![],
            },
        )
        .unwrap();
    }

    let chicken: Vec<Ingredient> = ingredient::table
        .filter(ingredient::ingredient_name.eq("鸡肉"))
        .select(Ingredient::as_select())
        .load(&mut conn)
        .unwrap();
    assert_eq!(chicken.len(), 1);

    let links: Vec<DishIngredientLink> = DishIngredientLink::belonging_to(&chicken)
        .select(DishIngredientLink::as_select())
        .order(dish_ingredients::dish_id.asc())
        .load(&mut conn)
        .unwrap();
    assert_eq!(links.len(), 2);
    assert_ne!(links[0].dish_id, links[1].dish_id);
}

#[test]
fn usage_stays_on_the_link() {
    use crate::database::models::DishIngredientLink;
    use crate::database::schema::dish_ingredients;
    use diesel::QueryDsl as _;

    let mut conn = database::test_connection();

    for (name, usage) in [("青椒肉丝", "两个"), ("虎皮青椒", "五个")] {
        create_dish_aggregate(
            &mut conn,
            &NewDishAggregate {
                dish_name: name.into(),
                difficult: Difficulty::Easy,
                ingredients: vec![entry("青椒", IngredientType::Secondary, usage)],
                steps: vec![],
            },
        )
        .unwrap();
    }

    let usages: Vec<String> = dish_ingredients::table
        .select(DishIngredientLink::as_select())
        .load(&mut conn)
        .unwrap()
        .into_iter()
        .map(|l| l.usage)
        .collect();
    assert_eq!(usages.len(), 2);
    assert!(usages.contains(&"两个".to_string()));
    assert!(usages.contains(&"五个".to_string()));
}

#[test]
fn duplicate_ingredient_rolls_back_everything() {
    let mut conn = database::test_connection();

    let err = create_dish_aggregate(
        &mut conn,
        &NewDishAggregate {
            dish_name: "番茄炒蛋".into(),
            difficult: Difficulty::Easy,
            ingredients: vec![
                entry("番茄", IngredientType::Main, "两个"),
                entry("鸡蛋", IngredientType::Main, "三个"),
                entry("番茄", IngredientType::Main, "一个"),
            ],
            steps: vec![step(1, "打蛋")],
        },
    )
    .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "{err}");

    assert_eq!(count(&mut conn, "dish"), 0);
    assert_eq!(count(&mut conn, "ingredient"), 0);
    assert_eq!(count(&mut conn, "dish_ingredients"), 0);
    assert_eq!(count(&mut conn, "dish_step"), 0);
}

#[test]
fn failing_step_rolls_back_everything() {
    use diesel::connection::SimpleConnection as _;

    let mut conn = database::test_connection();
    conn.batch_execute(
        "CREATE TRIGGER reject_step BEFORE INSERT ON dish_step \
         WHEN NEW.step_text = 'boom' BEGIN SELECT RAISE(ABORT, 'rejected step'); END;",
    )
    .unwrap();

    let existing = create_dish_aggregate(
        &mut conn,
        &NewDishAggregate {
            dish_name: "清蒸鲈鱼".into(),
            difficult: Difficulty::Medium,
            ingredients: vec![entry("鲈鱼", IngredientType::Main, "一条")],
            steps: vec![step(1, "蒸")],
        },
    )
    .unwrap();

    let err = create_dish_aggregate(
        &mut conn,
        &NewDishAggregate {
            dish_name: "水煮鱼".into(),
            difficult: Difficulty::Complex,
            ingredients: vec![
                entry("鲈鱼", IngredientType::Main, "一条"),
                entry("花椒", IngredientType::Seasoning, "一把"),
            ],
            steps: vec![step(10, "片鱼"), step(20, "boom")],
        },
    )
    .unwrap_err();
    assert!(matches!(err, Error::Store(_)), "{err}");

    // Only the first dish and its ingredient survive.
    assert_eq!(count(&mut conn, "dish"), 1);
    assert_eq!(count(&mut conn, "ingredient"), 1);
    assert_eq!(count(&mut conn, "dish_ingredients"), 1);
    assert_eq!(count(&mut conn, "dish_step"), 1);
    assert_eq!(
        crate::dishes::get_dish(&mut conn, existing.id).unwrap(),
        Some(existing)
    );
}

#[test]
fn invalid_input_writes_nothing() {
    let mut conn = database::test_connection();

    for new in [
        NewDishAggregate {
            dish_name: "".into(),
            difficult: Difficulty::Easy,
            ingredients: vec![],
            steps: vec![],
        },
        NewDishAggregate {
            dish_name: "凉拌黄瓜".into(),
            difficult: Difficulty::Easy,
            ingredients: vec![entry(" ", IngredientType::Main, "一根")],
            steps: vec![],
        },
    ] {
        let err = create_dish_aggregate(&mut conn, &new).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err}");
    }
    assert_eq!(count(&mut conn, "dish"), 0);
}

#[test]
fn concurrent_first_use_creates_one_ingredient() {
    use std::thread;

    let dir = tempfile::tempdir().unwrap();
    let store = database::test_store(&dir);

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                let mut conn = store.conn().unwrap();
                create_dish_aggregate(
                    &mut conn,
                    &NewDishAggregate {
                        dish_name: format!("牛肉 {i}"),
                        difficult: Difficulty::Easy,
                        ingredients: vec![entry("牛肉", IngredientType::Main, "500g")],
                        steps: vec![step(1, "炖")],
                    },
                )
                .unwrap()
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let mut conn = store.conn().unwrap();
    assert_eq!(count(&mut conn, "dish"), 4);
    assert_eq!(count(&mut conn, "ingredient"), 1);
    assert_eq!(count(&mut conn, "dish_ingredients"), 4);
}

#[test]
fn links_and_steps_carry_timestamps() {
    use crate::database::models::{DishIngredientLink, DishStep};
    use crate::database::schema::{dish_ingredients, dish_step};
    use diesel::BelongingToDsl as _;
    use diesel::ExpressionMethods as _;
    use diesel::QueryDsl as _;

    let mut conn = database::test_connection();
    let created = create_dish_aggregate(
        &mut conn,
        &NewDishAggregate {
            dish_name: "白灼虾".into(),
            difficult: Difficulty::Easy,
            ingredients: vec![entry("虾", IngredientType::Main, "半斤")],
            steps: vec![step(1, "煮水")],
        },
    )
    .unwrap();

    let link = DishIngredientLink::belonging_to(&created)
        .select(DishIngredientLink::as_select())
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(link.create_time, link.modify_time);
    assert!(link.create_time >= created.create_time);

    let first_step = DishStep::belonging_to(&created)
        .select(DishStep::as_select())
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(first_step.create_time, first_step.modify_time);
    assert!(first_step.create_time >= created.create_time);

    let long_ago = "2000-01-01 00:00:00";
    for table in ["dish_ingredients", "dish_step"] {
        diesel::sql_query(format!(
            "UPDATE {table} SET create_time = '{long_ago}', modify_time = '{long_ago}'"
        ))
        .execute(&mut conn)
        .unwrap();
    }
    diesel::update(dish_ingredients::table)
        .set(dish_ingredients::usage.eq("一斤"))
        .execute(&mut conn)
        .unwrap();
    diesel::update(dish_step::table)
        .set(dish_step::step_text.eq("烧开水"))
        .execute(&mut conn)
        .unwrap();

    let link = DishIngredientLink::belonging_to(&created)
        .select(DishIngredientLink::as_select())
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(link.usage, "一斤");
    assert!(link.modify_time > link.create_time);

    let first_step = DishStep::belonging_to(&created)
        .select(DishStep::as_select())
        .get_result(&mut conn)
        .unwrap();
    assert!(first_step.modify_time > first_step.create_time);
}
