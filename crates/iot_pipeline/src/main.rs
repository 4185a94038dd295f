mod config;

use chrono::Utc;
use common::domain::{
    PartitionMonth, ReadingRepository, SensorRegistration, SensorRegistry, SensorType,
};
use common::in_memory::InMemorySensorStore;
use common::postgres::{
    PostgresAnalyticsRepository, PostgresClient, PostgresConfig, PostgresReadingRepository,
    SchemaManager,
};
use common::telemetry::{TelemetryConfig, TelemetryProviders, init_telemetry, shutdown_telemetry};
use config::{ServiceConfig, StorageBackend};
use ingest_worker::domain::{PipelineStorage, SensorSimulator};
use ingest_worker::ingest_worker::IngestWorker;
use iot_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        storage_backend = ?config.storage_backend,
        otel_enabled = config.otel_enabled,
        "Starting iot pipeline"
    );
    debug!("Configuration: {:?}", config);

    let simulator = SensorSimulator::new(config.simulator_config());
    let registrations = simulator.registrations();

    let storage = match config.storage_backend {
        StorageBackend::Postgres => initialize_postgres_storage(&config, &registrations).await,
        StorageBackend::Memory => initialize_memory_storage(&config, &registrations).await,
    };
    let storage = match storage {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to initialize storage: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let worker = IngestWorker::new(Box::new(simulator), storage, config.pipeline_config());

    Runner::new()
        .with_named_process("ingest_pipeline", worker.into_runner_process())
        .with_closer(move || async move {
            info!("Flushing telemetry");
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.closer_timeout_secs))
        .run()
        .await;
}

/// Prepare the schema, partitions and registry, then open one client per
/// pipeline component.
async fn initialize_postgres_storage(
    config: &ServiceConfig,
    registrations: &[SensorRegistration],
) -> anyhow::Result<PipelineStorage> {
    let postgres_config = config.postgres_config();

    let setup_client = create_postgres_client(&postgres_config).await?;
    let schema = SchemaManager::new(setup_client.clone());
    if config.apply_schema {
        schema.apply_schema().await?;
    }
    schema
        .ensure_partitions_ahead(
            PartitionMonth::from_timestamp(Utc::now()),
            config.partition_months_ahead,
        )
        .await?;
    schema.seed_sensors(registrations).await?;
    setup_client.close();

    let router_client = create_postgres_client(&postgres_config).await?;
    let aggregator_client = create_postgres_client(&postgres_config).await?;
    let monitor_client = create_postgres_client(&postgres_config).await?;

    info!(
        host = %postgres_config.host,
        database = %postgres_config.database,
        "PostgreSQL storage ready"
    );

    Ok(PipelineStorage {
        router: Arc::new(PostgresReadingRepository::new(router_client)),
        aggregator_readings: Arc::new(PostgresReadingRepository::new(aggregator_client.clone())),
        aggregator_analytics: Arc::new(PostgresAnalyticsRepository::new(aggregator_client)),
        monitor: Arc::new(PostgresReadingRepository::new(monitor_client)),
    })
}

async fn create_postgres_client(config: &PostgresConfig) -> anyhow::Result<PostgresClient> {
    let client = PostgresClient::from_config(config)?;
    client.ping().await?;
    Ok(client)
}

/// Single shared store, prepared with the same rules as the database.
async fn initialize_memory_storage(
    config: &ServiceConfig,
    registrations: &[SensorRegistration],
) -> anyhow::Result<PipelineStorage> {
    let store = InMemorySensorStore::new();
    for registration in registrations {
        store.register_sensor(registration).await?;
    }
    let months =
        PartitionMonth::from_timestamp(Utc::now()).with_following(config.partition_months_ahead);
    for month in months {
        for sensor_type in SensorType::ALL {
            store.ensure_partition(sensor_type, month).await?;
        }
    }
    info!(sensors = registrations.len(), "in-memory storage ready");

    Ok(PipelineStorage {
        router: Arc::new(store.clone()),
        aggregator_readings: Arc::new(store.clone()),
        aggregator_analytics: Arc::new(store.clone()),
        monitor: Arc::new(store),
    })
}
