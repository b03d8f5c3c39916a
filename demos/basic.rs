//! Minimal berth application — JSON endpoints behind the built-in pipeline.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/_status/ping
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -H 'request-priority: sheddable' http://localhost:3000/users/42

use berth::{
    AppBuilder, Application, ApplicationIdentity, ConfigSource, HostingEnvironment, Request,
    Response, Router, ServiceBeacon,
};
use http::StatusCode;

struct UserApi;

impl Application for UserApi {
    fn setup(&self, builder: &mut AppBuilder, _env: &HostingEnvironment) {
        builder
            .setup_ping(|ping| ping.commit_hash = Some(env!("CARGO_PKG_VERSION").to_owned()))
            .setup_logging(|logging| logging.log_query_string = true)
            .router(
                Router::new()
                    .get("/users/{id}", get_user)
                    .post("/users", create_user),
            );
    }
}

// GET /users/{id}
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    let priority = req.info().map(|info| info.priority);
    tracing::debug!(?priority, "serving user lookup");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#).into_bytes())
}

// POST /users
async fn create_user(req: Request) -> Response {
    if req.body().is_empty() {
        return Response::status(StatusCode::BAD_REQUEST);
    }

    // Real app: let input: CreateUser = serde_json::from_slice(req.body())?;
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(r#"{"id":"99","name":"new_user"}"#.as_bytes().to_vec())
}

#[tokio::main]
async fn main() -> Result<(), berth::Error> {
    let env = HostingEnvironment::builder()
        .identity(ApplicationIdentity::new("demo", "dev", "user-api", "1"))
        .beacon(ServiceBeacon::new("127.0.0.1:3000".parse().expect("valid address")))
        .config(ConfigSource::Env { prefix: "USER_API_".into() })
        .build()?;

    berth::logging::init(&env)?;
    env.shutdown_on_process_signals();

    berth::run(UserApi, env).await
}
