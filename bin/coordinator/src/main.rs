use futures::StreamExt;
use std::sync::Arc;
use switchyard_coordinator::config::CoordinatorConfig;
use switchyard_coordinator::failures::{consume_failures, sweep_expired};
use switchyard_coordinator::source::NatsWorkflowSource;
use switchyard_dlq::DeadLetterQueue;
use switchyard_dlq::nats::{NatsDeadLetterStore, NatsTaskBroker, failure_consumer};
use switchyard_triggers::TriggerRegistry;
use switchyard_triggers::nats::{NatsRegistryStore, NatsScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = CoordinatorConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let client = async_nats::connect(&config.nats.url)
        .await
        .expect("failed to connect to NATS");
    let jetstream = async_nats::jetstream::new(client);

    // Re-register every active workflow
    let kv_config = config.nats.kv_config();
    let store = NatsRegistryStore::new(&jetstream, &kv_config)
        .await
        .expect("failed to open registry bucket");
    let scheduler = NatsScheduler::new(&jetstream, &kv_config)
        .await
        .expect("failed to open periodic task bucket");
    let registry = TriggerRegistry::new(store, scheduler, config.registry.to_registry_config());
    let source = NatsWorkflowSource::new(&jetstream, &config.nats.workflows_bucket)
        .await
        .expect("failed to open workflow bucket");

    match registry.register_all(&source).await {
        Ok(report) => {
            for (workflow_id, reason) in &report.failed {
                tracing::warn!(workflow_id = %workflow_id, reason = %reason, "Workflow triggers not fully registered");
            }
            tracing::info!(
                registered = report.registered,
                failed = report.failed.len(),
                "Startup re-registration finished"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "Startup re-registration skipped");
        }
    }

    // Dead letter queue
    let queue_config = config.nats.queue_config();
    let broker = NatsTaskBroker::new(
        jetstream.clone(),
        &queue_config,
        config.nats.handlers.clone(),
    )
    .await
    .expect("failed to set up task broker");
    let dead_letters = NatsDeadLetterStore::new(&jetstream, &queue_config)
        .await
        .expect("failed to open dead letter bucket");
    let queue = Arc::new(DeadLetterQueue::with_store(
        broker,
        dead_letters,
        config.dead_letter.to_dead_letter_config(),
    ));

    match queue.restore().await {
        Ok(restored) => tracing::info!(restored, "Restored dead letters"),
        Err(e) => tracing::warn!(error = %e, "Dead letters not restored"),
    }

    let sweeper = tokio::spawn(sweep_expired(
        Arc::clone(&queue),
        config.dead_letter.cleanup_interval(),
    ));

    let messages = failure_consumer(&jetstream, &queue_config)
        .await
        .expect("failed to bind failure consumer")
        .messages()
        .await
        .expect("failed to consume failure signals");
    let deliveries = messages.filter_map(|message| async move {
        match message {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to receive failure signal");
                None
            }
        }
    });
    let consumer = tokio::spawn(consume_failures(deliveries, Arc::clone(&queue)));

    tracing::info!(
        failure_subject = %config.nats.failure_subject,
        failure_consumer = %config.nats.failure_consumer,
        "Coordinator running"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");

    consumer.abort();
    sweeper.abort();

    let stats = queue.get_stats().await;
    tracing::info!(
        dead_letters = stats.total,
        pending = stats.status_count(switchyard_dlq::DeadLetterStatus::Pending),
        "Dead letter queue at shutdown"
    );
}
