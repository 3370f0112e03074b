#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

mod api;
mod ws;

use std::str::FromStr as _;
use std::sync::Arc;
use std::{env, sync::Mutex};

use actix_cors::Cors;
use actix_web::{App, http, middleware, web};
use campusconnect_directory::{HttpUserDirectory, UserDirectory};
use campusconnect_ws::JoinPolicy;
use tokio::try_join;

/// Shared per-worker state for the handshake path.
pub struct AppState {
    pub ws_secret: String,
    pub join_policy: JoinPolicy,
    pub directory: Arc<dyn UserDirectory>,
}

static RELAY_SERVER_HANDLE: once_cell::sync::Lazy<Mutex<Option<ws::server::RelayServerHandle>>> =
    once_cell::sync::Lazy::new(|| Mutex::new(None));

#[actix_web::main]
async fn main() -> Result<(), std::io::Error> {
    env_logger::init();

    let service_port = {
        let args: Vec<String> = env::args().collect();

        if args.len() > 1 {
            args[1].parse::<u16>().unwrap()
        } else {
            8000
        }
    };

    let ws_secret = env::var("CAMPUSCONNECT_WS_SECRET").expect("CAMPUSCONNECT_WS_SECRET not set");
    let directory_url =
        env::var("CAMPUSCONNECT_DIRECTORY_URL").expect("CAMPUSCONNECT_DIRECTORY_URL not set");
    let join_policy = env::var("CAMPUSCONNECT_JOIN_POLICY").map_or_else(
        |_| JoinPolicy::default(),
        |value| JoinPolicy::from_str(&value).expect("Invalid CAMPUSCONNECT_JOIN_POLICY"),
    );

    let (relay_server, server_tx) = ws::server::RelayServer::new();
    let relay_server = tokio::task::spawn(relay_server.run());

    let directory: Arc<dyn UserDirectory> = Arc::new(HttpUserDirectory::new(&directory_url));

    let app = move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![http::header::AUTHORIZATION, http::header::ACCEPT])
            .allowed_header(http::header::CONTENT_TYPE)
            .supports_credentials()
            .max_age(3600);

        RELAY_SERVER_HANDLE
            .lock()
            .unwrap()
            .replace(server_tx.clone());

        App::new()
            .wrap(cors)
            .wrap(middleware::Compress::default())
            .app_data(web::Data::new(AppState {
                ws_secret: ws_secret.clone(),
                join_policy,
                directory: directory.clone(),
            }))
            .service(api::health_endpoint)
            .service(ws::api::websocket)
    };

    let http_server = actix_web::HttpServer::new(app)
        .bind(("0.0.0.0", service_port))?
        .run();

    try_join!(
        async move {
            let resp = http_server.await;
            RELAY_SERVER_HANDLE.lock().unwrap().take();
            resp
        },
        async move { relay_server.await.unwrap() }
    )?;

    Ok(())
}
