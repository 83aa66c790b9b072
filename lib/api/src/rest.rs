use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use draekz_core::{link_fixer, WorkflowGraph};
use draekz_storage::schema::{self, ConfigSection};
use draekz_storage::UserConfigFile;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const CONFIG_JS_ROUTE: &str = "/draekz/config.js";
pub const CONFIG_ROUTE: &str = "/draekz/api/config";
pub const LINK_FIXER_CHECK_ROUTE: &str = "/draekz/api/link_fixer/check";
pub const LINK_FIXER_FIX_ROUTE: &str = "/draekz/api/link_fixer/fix";

#[derive(Deserialize)]
struct ConfigQuery {
    refresh: Option<String>,
}

#[derive(Deserialize)]
struct ConfigForm {
    json: String,
}

/// Shared by every handler.
pub struct ApiState {
    config: Arc<UserConfigFile>,
    schema: Vec<ConfigSection>,
}

impl ApiState {
    pub fn new(config: Arc<UserConfigFile>) -> Self {
        Self {
            config,
            schema: schema::configurable(),
        }
    }
}

pub struct RestApi;

impl RestApi {
    pub async fn start(config: Arc<UserConfigFile>, port: u16) -> std::io::Result<()> {
        let state = web::Data::new(ApiState::new(config));
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(state.clone())
                .configure(Self::routes)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }

    /// Registers every route on `cfg`.
    pub fn routes(cfg: &mut web::ServiceConfig) {
        cfg.route(CONFIG_JS_ROUTE, web::get().to(get_config_js))
            .route(CONFIG_ROUTE, web::get().to(get_config))
            .route(CONFIG_ROUTE, web::post().to(set_config))
            .route(LINK_FIXER_CHECK_ROUTE, web::post().to(check_links))
            .route(LINK_FIXER_FIX_ROUTE, web::post().to(fix_links));
    }
}

fn is_truthy_param(value: Option<&str>) -> bool {
    matches!(value, Some("true") | Some("1"))
}

async fn get_config_js(state: web::Data<ApiState>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok()
        .content_type("application/javascript")
        .body(state.config.to_js_module()))
}

async fn get_config(
    state: web::Data<ApiState>,
    query: web::Query<ConfigQuery>,
) -> ActixResult<HttpResponse> {
    if is_truthy_param(query.refresh.as_deref()) {
        if let Err(e) = state.config.refresh() {
            tracing::error!(error = %e, "Failed to refresh user config");
            return Ok(HttpResponse::InternalServerError().json(serde_json::json!({
                "status": "error",
                "error": e.to_string()
            })));
        }
    }
    Ok(HttpResponse::Ok().json(state.config.get_config()))
}

async fn set_config(
    state: web::Data<ApiState>,
    form: web::Form<ConfigForm>,
) -> ActixResult<HttpResponse> {
    let changes: Map<String, Value> = match serde_json::from_str(&form.json) {
        Ok(changes) => changes,
        Err(e) => {
            return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "status": "error",
                "error": format!("Invalid config json: {}", e)
            })));
        }
    };

    if let Err(e) = state.config.set_user_config(&changes) {
        tracing::error!(error = %e, "Failed to save user config");
        return Ok(HttpResponse::InternalServerError().json(serde_json::json!({
            "status": "error",
            "error": e.to_string()
        })));
    }

    for (key, value) in &changes {
        if let Some(entry) = schema::find_entry(&state.schema, key) {
            entry.run_on_save(value);
        }
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "ok"})))
}

async fn check_links(body: web::Json<WorkflowGraph>) -> ActixResult<HttpResponse> {
    let report = link_fixer::check(&body.into_inner());
    if report.has_bad_links {
        tracing::info!(violations = report.details.len(), "Checked workflow has bad links");
    }
    Ok(HttpResponse::Ok().json(report))
}

async fn fix_links(body: web::Json<WorkflowGraph>) -> ActixResult<HttpResponse> {
    let result = link_fixer::fix(&body.into_inner());
    tracing::info!(
        patched = result.patched,
        deleted = result.deleted,
        remaining = result.remaining.len(),
        "Fixed workflow links"
    );
    Ok(HttpResponse::Ok().json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};
    use draekz_core::log_level::{self, LogLevel};
    use serde_json::json;
    use tempfile::TempDir;

    fn state(dir: &TempDir) -> web::Data<ApiState> {
        let config = Arc::new(UserConfigFile::open(dir.path()).unwrap());
        web::Data::new(ApiState::new(config))
    }

    #[actix_web::test]
    async fn test_get_config_and_js() {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(App::new().app_data(state(&dir)).configure(RestApi::routes)).await;

        let req = test::TestRequest::get().uri(CONFIG_ROUTE).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["log_level"], "WARN");

        let req = test::TestRequest::get().uri(CONFIG_JS_ROUTE).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/javascript"
        );
        let text = test::read_body(resp).await;
        assert!(text.starts_with(b"export const draekzConfig = {"));
    }

    #[actix_web::test]
    async fn test_post_config_saves_and_applies_log_level() {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(App::new().app_data(state(&dir)).configure(RestApi::routes)).await;
        let previous = log_level::active_level();

        let changes = json!({"features.menu_bookmarks.enabled": false, "log_level": "DEBUG"});
        let req = test::TestRequest::post()
            .uri(CONFIG_ROUTE)
            .set_form([("json", changes.to_string())])
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({"status": "ok"}));
        assert_eq!(log_level::active_level(), LogLevel::Debug);
        log_level::set_active_level(previous);

        let req = test::TestRequest::get().uri(CONFIG_ROUTE).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["features"]["menu_bookmarks"]["enabled"], false);
    }

    #[actix_web::test]
    async fn test_post_config_rejects_bad_json() {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(App::new().app_data(state(&dir)).configure(RestApi::routes)).await;

        let req = test::TestRequest::post()
            .uri(CONFIG_ROUTE)
            .set_form([("json", "{nope")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_refresh_rereads_file() {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(App::new().app_data(state(&dir)).configure(RestApi::routes)).await;
        std::fs::write(
            dir.path().join(draekz_storage::USER_CONFIG_FILE_NAME),
            r#"{"log_level": "DEV"}"#,
        )
        .unwrap();

        let req = test::TestRequest::get().uri(CONFIG_ROUTE).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["log_level"], "WARN");

        let req = test::TestRequest::get()
            .uri("/draekz/api/config?refresh=true")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["log_level"], "DEV");
    }

    #[actix_web::test]
    async fn test_link_fixer_routes() {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(App::new().app_data(state(&dir)).configure(RestApi::routes)).await;
        let workflow = json!({
            "nodes": [
                {"id": 1, "outputs": [{"links": [1]}]},
                {"id": 2, "inputs": [{"link": 1}]}
            ],
            "links": [[1, 1, 0, 2, 0, "MODEL"], [2, 1, 0, 99, 0, "MODEL"]]
        });

        let req = test::TestRequest::post()
            .uri(LINK_FIXER_CHECK_ROUTE)
            .set_json(&workflow)
            .to_request();
        let report: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report["hasBadLinks"], true);

        let req = test::TestRequest::post()
            .uri(LINK_FIXER_FIX_ROUTE)
            .set_json(&workflow)
            .to_request();
        let fixed: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(fixed["hasBadLinks"], false);
        assert_eq!(fixed["graph"]["links"], json!([[1, 1, 0, 2, 0, "MODEL"]]));
    }
}
