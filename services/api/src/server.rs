use crate::cli::ServeArgs;
use crate::infra::{AppState, Pipeline};
use crate::routes::with_pipeline_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use order_risk::config::AppConfig;
use order_risk::error::AppError;
use order_risk::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let pipeline = Pipeline::from_config(&config.pipeline)?;
    let app = with_pipeline_routes(&pipeline)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let sweeper = if args.no_sweep {
        None
    } else {
        Some(spawn_sweep_loop(pipeline, config.pipeline.sweep_interval))
    };
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        sweep_interval_secs = config.pipeline.sweep_interval.as_secs(),
        "order risk pipeline ready"
    );

    let served = axum::serve(listener, app).await;
    if let Some(handle) = sweeper {
        handle.abort();
    }
    served?;
    Ok(())
}

/// Runs daily maintenance on a fixed interval. The first tick fires immediately so
/// a restarted service catches up on the current day.
fn spawn_sweep_loop(pipeline: Pipeline, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(err) = pipeline.run_daily(Utc::now()).await {
                error!(%err, "scheduled sweep failed");
            }
        }
    })
}
