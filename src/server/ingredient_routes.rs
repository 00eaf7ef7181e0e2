// Copyright 2023 Remi Bernotavicius

use super::{success, ApiResponse, AppState};
use crate::database::models::{Ingredient, IngredientId};
use crate::error::{Error, Result};
use crate::ingredients::{self, NewIngredient};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

const LIST_LIMIT: i64 = 1000;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/ingredient", post(create))
        .route("/ingredient/list", get(list))
        .route("/ingredient/{id}", get(fetch))
}

async fn list(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Ingredient>>>> {
    success(
        state
            .with_conn(|conn| ingredients::list_ingredients(conn, LIST_LIMIT))
            .await?,
    )
}

async fn create(
    State(state): State<AppState>,
    body: std::result::Result<Json<NewIngredient>, JsonRejection>,
) -> Result<Json<ApiResponse<Ingredient>>> {
    let Json(new) = body?;
    success(
        state
            .with_conn(move |conn| ingredients::create_ingredient(conn, &new))
            .await?,
    )
}

async fn fetch(
    State(state): State<AppState>,
    id: std::result::Result<Path<IngredientId>, PathRejection>,
) -> Result<Json<ApiResponse<Ingredient>>> {
    let Path(id) = id?;
    let found = state
        .with_conn(move |conn| ingredients::get_ingredient(conn, id))
        .await?;
    success(found.ok_or_else(|| Error::NotFound(format!("ingredient {id} not found")))?)
}

#[tokio::test]
async fn create_list_and_fetch() {
    use super::{call, test_app};
    use axum::http::StatusCode;
    use serde_json::json;

    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, body) = call(
        &app,
        "POST",
        "/ingredient",
        Some(json!({"ingredient_name": "八角", "type": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["type"], 3);
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = call(
        &app,
        "POST",
        "/ingredient",
        Some(json!({"ingredient_name": "八角", "type": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);

    let (_, body) = call(&app, "GET", "/ingredient/list", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["ingredient_name"], "八角");

    let (status, body) = call(&app, "GET", &format!("/ingredient/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ingredient_name"], "八角");

    let (status, body) = call(&app, "GET", "/ingredient/77", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "ingredient 77 not found");
}
