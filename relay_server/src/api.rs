use actix_web::web::Json;
use actix_web::{Result, route};
use serde_json::{Value, json};

#[route("/health", method = "GET")]
pub async fn health_endpoint() -> Result<Json<Value>> {
    Ok(Json(json!({"healthy": true})))
}
