// Copyright 2023 Remi Bernotavicius

use super::{success, ApiResponse, AppState};
use crate::database::models::{Difficulty, Dish, DishHistory, DishId};
use crate::dishes::detail::{dish_detail, DishDetail};
use crate::dishes::history::{cooking_count, history_for_dish, record_cooking, NewHistory};
use crate::dishes::listing::{list_dishes, DishPage, DishQuery};
use crate::dishes::writer::{create_dish_aggregate, NewDishAggregate};
use crate::dishes::{self, NewDish};
use crate::error::{Error, Result};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

type Body<T> = std::result::Result<Json<T>, JsonRejection>;
type IdPath = std::result::Result<Path<DishId>, PathRejection>;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/dish", post(create))
        .route("/dish/add", post(add))
        .route("/dish/select", post(select))
        .route("/dish/history/create", post(create_history))
        .route("/dish/{id}", get(detail).put(update).delete(delete))
        .route("/dish/{id}/history", get(history))
        .route("/dish/{id}/cooking-count", get(count))
}

fn not_found(id: DishId) -> Error {
    Error::NotFound(format!("dish {id} not found"))
}

async fn create(State(state): State<AppState>, body: Body<NewDish>) -> Result<Json<ApiResponse<Dish>>> {
    let Json(new) = body?;
    success(state.with_conn(move |conn| dishes::create_dish(conn, &new)).await?)
}

#[derive(Serialize)]
struct AddedDish {
    id: DishId,
    dish_name: String,
    difficult: Difficulty,
}

async fn add(
    State(state): State<AppState>,
    body: Body<NewDishAggregate>,
) -> Result<Json<ApiResponse<AddedDish>>> {
    let Json(aggregate) = body?;
    let dish = state
        .with_conn(move |conn| create_dish_aggregate(conn, &aggregate))
        .await?;
    success(AddedDish {
        id: dish.id,
        dish_name: dish.dish_name,
        difficult: dish.difficult,
    })
}

async fn select(
    State(state): State<AppState>,
    body: Body<DishQuery>,
) -> Result<Json<ApiResponse<DishPage>>> {
    let Json(query) = body?;
    let max_page_size = state.max_page_size;
    success(
        state
            .with_conn(move |conn| list_dishes(conn, &query, max_page_size))
            .await?,
    )
}

async fn detail(State(state): State<AppState>, id: IdPath) -> Result<Json<ApiResponse<DishDetail>>> {
    let Path(id) = id?;
    let found = state.with_conn(move |conn| dish_detail(conn, id)).await?;
    success(found.ok_or_else(|| not_found(id))?)
}

async fn update(
    State(state): State<AppState>,
    id: IdPath,
    body: Body<NewDish>,
) -> Result<Json<ApiResponse<Dish>>> {
    let Path(id) = id?;
    let Json(edit) = body?;
    let updated = state
        .with_conn(move |conn| dishes::update_dish(conn, id, &edit))
        .await?;
    success(updated.ok_or_else(|| not_found(id))?)
}

async fn delete(State(state): State<AppState>, id: IdPath) -> Result<Json<ApiResponse<DishId>>> {
    let Path(id) = id?;
    if !state.with_conn(move |conn| dishes::delete_dish(conn, id)).await? {
        return Err(not_found(id));
    }
    success(id)
}

async fn create_history(
    State(state): State<AppState>,
    body: Body<NewHistory>,
) -> Result<Json<ApiResponse<DishHistory>>> {
    let Json(new) = body?;
    success(state.with_conn(move |conn| record_cooking(conn, &new)).await?)
}

async fn history(
    State(state): State<AppState>,
    id: IdPath,
) -> Result<Json<ApiResponse<Vec<DishHistory>>>> {
    let Path(id) = id?;
    success(state.with_conn(move |conn| history_for_dish(conn, id)).await?)
}

async fn count(State(state): State<AppState>, id: IdPath) -> Result<Json<ApiResponse<i64>>> {
    let Path(id) = id?;
    success(state.with_conn(move |conn| cooking_count(conn, id)).await?)
}

#[cfg(test)]
use super::{call, test_app};
#[cfg(test)]
use axum::http::StatusCode;
#[cfg(test)]
use serde_json::json;

#[cfg(test)]
fn mapo_tofu() -> serde_json::Value {
    json!({
        "dish_name": "麻婆豆腐",
        "difficult": 2,
        "ingredients": [
            {"ingredient_name": "豆腐", "type": 1, "usage": "一块"},
            {"ingredient_name": "辣椒油", "type": 3, "usage": "适量"},
        ],
        "steps": [
            {"step_order": 1, "step_text": "切块"},
            {"step_order": 2, "step_text": "下锅炒"},
        ],
    })
}

#[tokio::test]
async fn add_then_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, body) = call(&app, "POST", "/dish/add", Some(mapo_tofu())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["dish_name"], "麻婆豆腐");
    assert_eq!(body["data"]["difficult"], 2);
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = call(&app, "GET", &format!("/dish/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let detail = &body["data"];
    assert_eq!(detail["ingredients"][0]["ingredient_name"], "豆腐");
    assert_eq!(detail["ingredients"][0]["type"], 1);
    assert_eq!(detail["ingredients"][0]["usage"], "一块");
    assert_eq!(detail["ingredients"][1]["ingredient_name"], "辣椒油");
    assert_eq!(detail["steps"][0]["step_text"], "切块");
    assert_eq!(detail["steps"][1]["step_text"], "下锅炒");

    let (status, body) = call(&app, "GET", "/dish/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
    assert_eq!(body["data"], serde_json::Value::Null);
}

#[tokio::test]
async fn duplicate_ingredient_in_one_dish_is_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let mut dish = mapo_tofu();
    dish["ingredients"][1]["ingredient_name"] = json!("豆腐");
    let (status, body) = call(&app, "POST", "/dish/add", Some(dish)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);

    let (_, body) = call(&app, "POST", "/dish/select", Some(json!({}))).await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn select_pages_and_filters() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    call(&app, "POST", "/dish/add", Some(mapo_tofu())).await;
    for name in ["宫保鸡丁", "口水鸡"] {
        let (status, _) = call(
            &app,
            "POST",
            "/dish",
            Some(json!({"dish_name": name, "difficult": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = call(
        &app,
        "POST",
        "/dish/select",
        Some(json!({"page": 0, "size": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["size"], 2);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["items"][0]["main_ingredients"], json!(["豆腐"]));

    let (_, body) = call(
        &app,
        "POST",
        "/dish/select",
        Some(json!({"dishName": "鸡", "difficult": 1})),
    )
    .await;
    assert_eq!(body["data"]["total"], 2);

    let (status, body) = call(&app, "POST", "/dish/select", Some(json!({"page": -1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn update_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (_, body) = call(
        &app,
        "POST",
        "/dish",
        Some(json!({"dish_name": "红烧肉", "difficult": 2})),
    )
    .await;
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = call(
        &app,
        "PUT",
        &format!("/dish/{id}"),
        Some(json!({"dish_name": "东坡肉", "difficult": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["dish_name"], "东坡肉");
    assert_eq!(body["data"]["difficult"], 3);

    let (status, _) = call(
        &app,
        "PUT",
        "/dish/404",
        Some(json!({"dish_name": "东坡肉", "difficult": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, "DELETE", &format!("/dish/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], id);

    let (status, _) = call(&app, "DELETE", &format!("/dish/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cooking_history() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (_, body) = call(&app, "POST", "/dish/add", Some(mapo_tofu())).await;
    let id = body["data"]["id"].as_i64().unwrap();

    for (time, rating) in [("2024-06-01T18:00:00", 2), ("2024-06-03T12:30:00", 1)] {
        let (status, body) = call(
            &app,
            "POST",
            "/dish/history/create",
            Some(json!({"dish_id": id, "cooking_rating": rating, "cooking_time": time})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["dish_id"], id);
    }

    let (_, body) = call(&app, "GET", &format!("/dish/{id}/history"), None).await;
    let ratings: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["cooking_rating"].as_i64().unwrap())
        .collect();
    assert_eq!(ratings, vec![1, 2]);

    let (_, body) = call(&app, "GET", &format!("/dish/{id}/cooking-count"), None).await;
    assert_eq!(body["data"], 2);

    let (status, body) = call(
        &app,
        "POST",
        "/dish/history/create",
        Some(json!({"dish_id": 999, "cooking_rating": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}
