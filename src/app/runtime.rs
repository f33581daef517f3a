use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::debug_file::ScriptedMowerApi;
use crate::adapters::husqvarna::{HusqvarnaApi, MowerApi, MowerApiError};
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::registry::{MowerRegistry, RegistryError};
use crate::app::services::SharedEntityStore;
use crate::domain::entity::{SensorSink, TrackerSink};
use crate::domain::mower_state::{Clock, TimestampMs};

const STOP_POLL_SLICE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimestampMs {
        TimestampMs(Utc::now().timestamp_millis())
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("login failed: {0}")]
    Authentication(#[source] MowerApiError),
    #[error("failed to list robots: {0}")]
    ListRobots(#[source] MowerApiError),
    #[error("no robots found for this account")]
    NoRobotsFound,
    #[error("failed to select robot {id}: {source}")]
    SelectRobot {
        id: String,
        #[source]
        source: MowerApiError,
    },
    #[error("failed to register robot: {0}")]
    Registry(#[from] RegistryError),
}

impl From<SetupError> for AppError {
    fn from(error: SetupError) -> Self {
        match error {
            SetupError::Authentication(source) => AppError::Authentication(source.to_string()),
            SetupError::NoRobotsFound => AppError::NoRobotsFound,
            other => AppError::setup(other),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub updated: usize,
    pub failed: usize,
}

/// Logs in once, enumerates the account's robots and binds one client per robot.
///
/// Any failure aborts the whole setup; nothing is registered partially.
pub fn setup<A: MowerApi>(
    api: &mut A,
    username: &str,
    password: &str,
    tracker: Option<Arc<dyn TrackerSink>>,
) -> Result<MowerRegistry, SetupError> {
    api.login(username, password)
        .map_err(SetupError::Authentication)?;

    let robots = api.list_robots().map_err(SetupError::ListRobots)?;
    if robots.is_empty() {
        return Err(SetupError::NoRobotsFound);
    }

    let mut registry = MowerRegistry::new();
    for robot in robots {
        let client = api
            .select_robot(&robot.id)
            .map_err(|source| SetupError::SelectRobot {
                id: robot.id.clone(),
                source,
            })?;
        registry.register(robot, client)?;
    }

    if let Some(tracker) = tracker {
        for mower in registry.iter_mut() {
            mower.attach_tracker(Arc::clone(&tracker));
        }
    }

    Ok(registry)
}

pub struct MowerPoller<S, Cl> {
    registry: MowerRegistry,
    sink: S,
    clock: Cl,
}

impl<S, Cl> MowerPoller<S, Cl>
where
    S: SensorSink,
    Cl: Clock,
{
    pub fn new(registry: MowerRegistry, sink: S, clock: Cl) -> Self {
        Self {
            registry,
            sink,
            clock,
        }
    }

    /// Polls every mower once. A failing mower never stops the others.
    pub fn sweep(&mut self) -> SweepReport {
        let sweep_id = Uuid::new_v4();
        let span = tracing::debug_span!("sweep", %sweep_id);
        let _entered = span.enter();

        let mut report = SweepReport::default();

        for mower in self.registry.iter_mut() {
            match mower.poll(&self.clock) {
                Ok(()) => {
                    report.updated += 1;
                    tracing::debug!(mower_id = %mower.id(), "mower status updated");
                }
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(
                        mower_id = %mower.id(),
                        stale = mower.is_stale(),
                        error = %error,
                        "mower poll failed, keeping last known status"
                    );
                }
            }

            if let Some(view) = mower.sensor_view() {
                self.sink.publish_sensor(view);
            }
            self.sink.report_health(mower.health());
        }

        tracing::debug!(
            updated = report.updated,
            failed = report.failed,
            "sweep finished"
        );

        report
    }
}

pub fn start_poller<S, Cl>(
    mut poller: MowerPoller<S, Cl>,
    scan_interval: Duration,
    stop_flag: Arc<AtomicBool>,
) -> JoinHandle<()>
where
    S: SensorSink + 'static,
    Cl: Clock + Send + 'static,
{
    std::thread::spawn(move || {
        while !stop_flag.load(Ordering::Relaxed) {
            let started = Instant::now();
            let report = poller.sweep();
            if report.failed > 0 {
                tracing::warn!(
                    updated = report.updated,
                    failed = report.failed,
                    "sweep completed with failures"
                );
            }

            while started.elapsed() < scan_interval && !stop_flag.load(Ordering::Relaxed) {
                let remaining = scan_interval.saturating_sub(started.elapsed());
                std::thread::sleep(remaining.min(STOP_POLL_SLICE));
            }
        }
    })
}

fn cloud_api(config: &AppConfig) -> Result<HusqvarnaApi, AppError> {
    HusqvarnaApi::new(
        config.endpoints(),
        Duration::from_millis(config.request_timeout_ms),
    )
    .map_err(AppError::setup)
}

fn scripted_api(path: &str) -> Result<ScriptedMowerApi, AppError> {
    tracing::info!(path = %path, "replaying mower api from debug script");
    ScriptedMowerApi::from_file(path).map_err(AppError::setup)
}

fn connect<A: MowerApi>(
    api: &mut A,
    config: &AppConfig,
    tracker: Option<Arc<dyn TrackerSink>>,
) -> Result<MowerRegistry, AppError> {
    let registry = setup(api, &config.username, &config.password, tracker).map_err(|error| {
        tracing::error!(error = %error, "automower setup failed");
        AppError::from(error)
    })?;

    for mower in registry.list() {
        tracing::info!(
            mower_id = %mower.id(),
            name = %mower.name(),
            model = %mower.model(),
            dev_id = %mower.dev_id(),
            "mower registered"
        );
    }

    Ok(registry)
}

/// Closes the account session once polling has stopped. A failed logout is only logged.
pub fn end_session<A: MowerApi>(api: &mut A) {
    match api.logout() {
        Ok(()) => tracing::info!("automower session closed"),
        Err(error) => tracing::warn!(error = %error, "automower logout failed"),
    }
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    match config.debug_file.clone() {
        Some(path) => serve(scripted_api(&path)?, config),
        None => serve(cloud_api(&config)?, config),
    }
}

pub fn run_headless(config: AppConfig) -> Result<(), AppError> {
    match config.debug_file.clone() {
        Some(path) => poll_only(scripted_api(&path)?, &config),
        None => poll_only(cloud_api(&config)?, &config),
    }
}

fn serve<A: MowerApi>(mut api: A, config: AppConfig) -> Result<(), AppError> {
    let store = SharedEntityStore::new();
    let tracker: Arc<dyn TrackerSink> = Arc::new(store.clone());
    let registry = connect(&mut api, &config, Some(tracker))?;

    let poller = MowerPoller::new(registry, store.clone(), SystemClock);
    let stop_flag = Arc::new(AtomicBool::new(false));
    let poller_handle = start_poller(
        poller,
        Duration::from_secs(config.scan_interval_secs),
        Arc::clone(&stop_flag),
    );

    let api_state = ApiState {
        entity_queries: store,
    };
    let http_bind = config.http_bind.clone();

    tracing::info!(bind = %http_bind, "http server starting");

    let server_result = actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .wrap(Cors::default().allow_any_origin().allowed_methods(vec!["GET"]))
                .app_data(web::Data::new(api_state.clone()))
                .configure(configure_routes)
        })
        .bind(&http_bind)?
        .run()
        .await
    });

    stop_flag.store(true, Ordering::Relaxed);
    let join_result = poller_handle.join();
    end_session(&mut api);

    if join_result.is_err() {
        return Err(AppError::runtime("poller thread panicked"));
    }

    server_result.map_err(AppError::runtime)
}

fn poll_only<A: MowerApi>(mut api: A, config: &AppConfig) -> Result<(), AppError> {
    let store = SharedEntityStore::new();
    let tracker: Arc<dyn TrackerSink> = Arc::new(store.clone());
    let registry = connect(&mut api, config, Some(tracker))?;

    let poller = MowerPoller::new(registry, store, SystemClock);
    let stop_flag = Arc::new(AtomicBool::new(false));
    let poller_handle = start_poller(
        poller,
        Duration::from_secs(config.scan_interval_secs),
        stop_flag,
    );

    let join_result = poller_handle.join();
    end_session(&mut api);

    join_result.map_err(|_| AppError::runtime("poller thread panicked"))
}
