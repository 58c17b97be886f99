use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use tracing::info;

use talentgate::config::AppConfig;
use talentgate::error::AppError;
use talentgate::telemetry;
use talentgate::workflows::screening::{
    ApplicationRepository, HttpScoringClient, InMemoryRunStore, ScreeningService,
};

use crate::cli::ServeArgs;
use crate::infra::{
    demo_dataset, AppState, ChannelNotificationQueue, InMemoryApplicationRepository,
    InMemoryJobRepository,
};
use crate::routes::with_screening_routes;

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

    let jobs = Arc::new(InMemoryJobRepository::default());
    let applications = Arc::new(InMemoryApplicationRepository::default());
    let runs = Arc::new(InMemoryRunStore::default());
    let backend = Arc::new(HttpScoringClient::from_config(&config.scoring)?);

    if args.seed_demo {
        let (posting, sample_applications) = demo_dataset();
        info!(job_id = %posting.job_id, "seeding demo posting and applications");
        jobs.insert(posting);
        for application in sample_applications {
            if let Err(err) = applications.insert(application) {
                tracing::warn!(error = %err, "demo application not seeded");
            }
        }
    }

    let (notifications, mut notice_receiver) = ChannelNotificationQueue::channel();
    tokio::spawn(async move {
        while let Some(notice) = notice_receiver.recv().await {
            info!(
                application_id = %notice.application_id,
                job_id = %notice.job_id,
                stage = notice.stage.label(),
                "stage change notification"
            );
        }
    });

    let screening_service = Arc::new(ScreeningService::new(
        jobs,
        applications,
        runs,
        backend,
        Arc::new(notifications),
    ));

    let app = with_screening_routes(screening_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "screening api ready");

    axum::serve(listener, app).await?;
    Ok(())
}
