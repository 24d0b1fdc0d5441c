mod app;
mod auth;
mod config;
mod email;
mod error;
mod state;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "lenslock=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    let sweep_every = app_state.config.reset.sweep_interval_secs;
    if sweep_every > 0 {
        app_state
            .resets
            .spawn_sweeper(std::time::Duration::from_secs(sweep_every));
    }

    let config = app_state.config.clone();
    let app = app::build_app(app_state);
    app::serve(app, &config.host, config.port).await
}
