// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::fold;
use crate::database::models::{Difficulty, Dish, DishId, DishIngredientLink, IngredientType};
use crate::database::schema::dish;
use crate::error::{Error, Result};
use diesel::expression_methods::EscapeExpressionMethods as _;
use diesel::expression_methods::TextExpressionMethods as _;
use diesel::sqlite::Sqlite;
use diesel::BelongingToDsl as _;
use diesel::Connection as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How many main ingredients a summary card shows.
pub const CARD_MAIN_INGREDIENTS: usize = 3;

fn default_size() -> i64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct DishQuery {
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
    /// Case-insensitive substring of the dish name, for any script. Empty means no filter.
    #[serde(default, alias = "dishName")]
    pub dish_name: Option<String>,
    #[serde(default)]
    pub difficult: Option<Difficulty>,
}

impl Default for DishQuery {
    fn default() -> Self {
        Self {
            page: 0,
            size: default_size(),
            dish_name: None,
            difficult: None,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DishCard {
    pub id: DishId,
    pub dish_name: String,
    pub difficult: Difficulty,
    pub main_ingredients: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DishPage {
    pub items: Vec<DishCard>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
}

/// Escapes `LIKE` wildcards so the name filter matches them literally.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn filtered(query: &DishQuery) -> dish::BoxedQuery<'static, Sqlite> {
    let mut statement = dish::table.into_boxed();
    if let Some(name) = query.dish_name.as_deref().filter(|n| !n.is_empty()) {
        let pattern = like_pattern(&name.to_lowercase());
        statement = statement.filter(fold(dish::dish_name).like(pattern).escape('\\'));
    }
    if let Some(difficult) = query.difficult {
        statement = statement.filter(dish::difficult.eq(difficult));
    }
    statement
}

fn main_ingredient_names(
    conn: &mut database::Connection,
    dishes: &[Dish],
) -> Result<HashMap<DishId, Vec<String>>> {
    use database::schema::{dish_ingredients, ingredient};

    if dishes.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(DishIngredientLink, String)> = DishIngredientLink::belonging_to(dishes)
        .inner_join(ingredient::table)
        .filter(ingredient::ingredient_type.eq(IngredientType::Main))
        .select((DishIngredientLink::as_select(), ingredient::ingredient_name))
        .order((dish_ingredients::dish_id.asc(), dish_ingredients::position.asc()))
        .load(conn)?;

    let mut names: HashMap<DishId, Vec<String>> = HashMap::new();
    for (link, name) in rows {
        let for_dish = names.entry(link.dish_id).or_default();
        if for_dish.len() < CARD_MAIN_INGREDIENTS {
            for_dish.push(name);
        }
    }
    Ok(names)
}

/// One page of dishes matching `query`, ordered by id, plus the number of matches overall.
/// Sizes above `max_size` are clamped to it.
pub fn list_dishes(
    conn: &mut database::Connection,
    query: &DishQuery,
    max_size: i64,
) -> Result<DishPage> {
    if query.page < 0 {
        return Err(Error::Validation("page must be >= 0".into()));
    }
    if query.size < 1 {
        return Err(Error::Validation("size must be >= 1".into()));
    }
    let size = query.size.min(max_size);
    if size < query.size {
        log::debug!("clamping page size {} to {size}", query.size);
    }
    let offset = query
        .page
        .checked_mul(size)
        .ok_or_else(|| Error::Validation(format!("page {} is out of range", query.page)))?;

    let (dishes, total, mut main_ingredients) = conn.transaction::<_, Error, _>(|conn| {
        let dishes: Vec<Dish> = filtered(query)
            .select(Dish::as_select())
            .order(dish::id.asc())
            .offset(offset)
            .limit(size)
            .load(conn)?;
        let total: i64 = filtered(query).count().get_result(conn)?;
        let main_ingredients = main_ingredient_names(conn, &dishes)?;
        Ok((dishes, total, main_ingredients))
    })?;
    let items = dishes
        .into_iter()
        .map(|d| DishCard {
            main_ingredients: main_ingredients.remove(&d.id).unwrap_or_default(),
            id: d.id,
            dish_name: d.dish_name,
            difficult: d.difficult,
        })
        .collect();

    Ok(DishPage {
        items,
        total,
        page: query.page,
        size,
    })
}

#[cfg(test)]
fn create(
    conn: &mut database::Connection,
    name: &str,
    difficult: Difficulty,
    ingredients: &[(&str, IngredientType)],
) -> DishId {
    use super::writer::{create_dish_aggregate, IngredientEntry, NewDishAggregate};

    create_dish_aggregate(
        conn,
        &NewDishAggregate {
            dish_name: name.into(),
            difficult,
            ingredients: ingredients
                .iter()
                .map(|&(n, t)| IngredientEntry {
                    ingredient_name: n.into(),
                    ingredient_type: t,
                    usage: String::new(),
                })
                .collect(),
            steps: vec![],
        },
    )
    .unwrap()
    .id
}

#[cfg(test)]
fn names(page: &DishPage) -> Vec<&str> {
    page.items.iter().map(|c| c.dish_name.as_str()).collect()
}

#[test]
fn pagination_windows() {
    let mut conn = database::test_connection();
    for i in 1..=25 {
        create(&mut conn, &format!("dish {i}"), Difficulty::Easy, &[]);
    }

    let query = DishQuery {
        page: 2,
        size: 10,
        ..Default::default()
    };
    let page = list_dishes(&mut conn, &query, 100).unwrap();
    assert_eq!(page.total, 25);
    assert_eq!(page.page, 2);
    assert_eq!(page.size, 10);
    assert_eq!(
        names(&page),
        vec!["dish 21", "dish 22", "dish 23", "dish 24", "dish 25"]
    );

    let query = DishQuery {
        page: 3,
        size: 10,
        ..Default::default()
    };
    let page = list_dishes(&mut conn, &query, 100).unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total, 25);
}

#[test]
fn size_is_clamped_and_bad_windows_rejected() {
    let mut conn = database::test_connection();
    for i in 1..=5 {
        create(&mut conn, &format!("dish {i}"), Difficulty::Easy, &[]);
    }

    let query = DishQuery {
        size: 50,
        ..Default::default()
    };
    let page = list_dishes(&mut conn, &query, 2).unwrap();
    assert_eq!(page.size, 2);
    assert_eq!(names(&page), vec!["dish 1", "dish 2"]);

    for (page, size) in [(-1, 10), (0, 0), (0, -3), (i64::MAX, 2)] {
        let query = DishQuery {
            page,
            size,
            ..Default::default()
        };
        assert!(matches!(
            list_dishes(&mut conn, &query, 100),
            Err(Error::Validation(_))
        ));
    }
}

#[test]
fn filters_combine() {
    let mut conn = database::test_connection();
    create(&mut conn, "Kung Pao Chicken", Difficulty::Medium, &[]);
    create(&mut conn, "chicken soup", Difficulty::Easy, &[]);
    create(&mut conn, "Mapo Tofu", Difficulty::Medium, &[]);
    create(&mut conn, "100% beef", Difficulty::Easy, &[]);
    create(&mut conn, "1000 beef", Difficulty::Easy, &[]);

    let query = DishQuery {
        dish_name: Some("CHICKEN".into()),
        ..Default::default()
    };
    let page = list_dishes(&mut conn, &query, 100).unwrap();
    assert_eq!(names(&page), vec!["Kung Pao Chicken", "chicken soup"]);
    assert_eq!(page.total, 2);

    let query = DishQuery {
        dish_name: Some("chicken".into()),
        difficult: Some(Difficulty::Medium),
        ..Default::default()
    };
    let page = list_dishes(&mut conn, &query, 100).unwrap();
    assert_eq!(names(&page), vec!["Kung Pao Chicken"]);
    assert_eq!(page.total, 1);

    let query = DishQuery {
        difficult: Some(Difficulty::Medium),
        ..Default::default()
    };
    assert_eq!(list_dishes(&mut conn, &query, 100).unwrap().total, 2);

    let query = DishQuery {
        dish_name: Some("0%".into()),
        ..Default::default()
    };
    let page = list_dishes(&mut conn, &query, 100).unwrap();
    assert_eq!(names(&page), vec!["100% beef"]);

    let query = DishQuery {
        dish_name: Some(String::new()),
        ..Default::default()
    };
    assert_eq!(list_dishes(&mut conn, &query, 100).unwrap().total, 5);
}

#[test]
fn name_filter_ignores_case_beyond_ascii() {
    let mut conn = database::test_connection();
    create(&mut conn, "Crème Brûlée", Difficulty::Complex, &[]);
    create(&mut conn, "Щи", Difficulty::Easy, &[]);
    create(&mut conn, "ÉCLAIR", Difficulty::Complex, &[]);

    for (needle, expected) in [
        ("crème", vec!["Crème Brûlée"]),
        ("BRÛLÉE", vec!["Crème Brûlée"]),
        ("щи", vec!["Щи"]),
        ("éclair", vec!["ÉCLAIR"]),
    ] {
        let query = DishQuery {
            dish_name: Some(needle.into()),
            ..Default::default()
        };
        let page = list_dishes(&mut conn, &query, 100).unwrap();
        assert_eq!(names(&page), expected, "filter {needle:?}");
        assert_eq!(page.total, 1, "filter {needle:?}");
    }
}

#[test]
fn cards_show_up_to_three_main_ingredients() {
    use maplit::hashmap;

    let mut conn = database::test_connection();
    let hotpot = create(
        &mut conn,
        "火锅",
        Difficulty::Complex,
        &[
            ("牛肉", IngredientType::Main),
            ("花椒", IngredientType::Seasoning),
            ("羊肉", IngredientType::Main),
            ("白菜", IngredientType::Secondary),
            ("虾仁", IngredientType::Main),
            ("豆皮", IngredientType::Main),
        ],
    );
    let eggs = create(
        &mut conn,
        "西红柿鸡蛋",
        Difficulty::Easy,
        &[("鸡蛋", IngredientType::Main), ("盐", IngredientType::Seasoning)],
    );
    let rice = create(&mut conn, "米饭", Difficulty::Easy, &[("米", IngredientType::Secondary)]);

    let page = list_dishes(&mut conn, &DishQuery::default(), 100).unwrap();
    let cards: HashMap<DishId, Vec<String>> = page
        .items
        .into_iter()
        .map(|c| (c.id, c.main_ingredients))
        .collect();
    assert_eq!(
        cards,
        hashmap! {
            hotpot => vec!["牛肉".to_string(), "羊肉".into(), "虾仁".into()],
            eggs => vec!["鸡蛋".to_string()],
            rice => vec![],
        }
    );
}

#[test]
fn query_accepts_camel_case_name() {
    let query: DishQuery = serde_json::from_str(r#"{"dishName": "鱼", "difficult": 3}"#).unwrap();
    assert_eq!(query.page, 0);
    assert_eq!(query.size, 10);
    assert_eq!(query.dish_name.as_deref(), Some("鱼"));
    assert_eq!(query.difficult, Some(Difficulty::Complex));
}
