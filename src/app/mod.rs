pub mod config;
mod error;
mod logging;
pub mod registry;
pub mod runtime;
pub mod services;

pub use error::AppError;

fn bootstrap() -> Result<config::AppConfig, AppError> {
    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        username = %config.username,
        scan_interval_secs = config.scan_interval_secs,
        http_bind = %config.http_bind,
        request_timeout_ms = config.request_timeout_ms,
        im_url = %config.im_url,
        track_url = %config.track_url,
        debug_file = config.debug_file.as_deref().unwrap_or("-"),
        "application bootstrap initialized"
    );

    Ok(config)
}

pub fn run() -> Result<(), AppError> {
    let config = bootstrap()?;
    runtime::run(config)
}

/// Polls and logs without serving HTTP.
pub fn run_poller() -> Result<(), AppError> {
    let config = bootstrap()?;
    runtime::run_headless(config)
}
