mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn insert_rejects_before_any_lookup() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/insert", server.base_url))
        .header("x-user", common::x_user(1, "admin"))
        .json(&json!({"payload": {"data": {}}}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await?, json!({"error": "Missing table or data object"}));

    let res = client
        .post(format!("{}/insert", server.base_url))
        .header("x-user", common::x_user(4, "teacher"))
        .json(&json!({"payload": {"table": "student", "data": {"name": "Ali"}}}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(res.json::<Value>().await?, json!({"error": "Access denied for this operation"}));
    Ok(())
}

#[tokio::test]
async fn update_checks_id_and_ownership() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .put(format!("{}/update-one/abc", server.base_url))
        .header("x-user", common::x_user(1, "admin"))
        .json(&json!({"type": "course", "data": {"name": "Algorithms"}}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await?, json!({"error": "Invalid ID"}));

    let res = client
        .put(format!("{}/update-one/2", server.base_url))
        .header("x-user", common::x_user(1, "admin"))
        .json(&json!({"type": "admin", "data": {"name": "Someone"}}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(res.json::<Value>().await?, json!({"error": "Admins can only update their own account"}));
    Ok(())
}

#[tokio::test]
async fn delete_requires_type_and_ids() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .delete(format!("{}/delete", server.base_url))
        .header("x-user", common::x_user(1, "admin"))
        .json(&json!({"ids": []}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = res.json::<Value>().await?;
    assert_eq!(body["error"], "Validation failed");
    assert_eq!(body["details"]["type"], "Type is required");
    assert_eq!(body["details"]["ids"], "At least one ID is required");

    let res = client
        .delete(format!("{}/delete/3", server.base_url))
        .header("x-user", common::x_user(3, "student"))
        .json(&json!({"type": "teacher"}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(res.json::<Value>().await?, json!({"error": "Only admin can delete teachers"}));
    Ok(())
}
