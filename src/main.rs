//! xjoin Kubernetes Operator
//!
//! ## Usage
//!
//! ```bash
//! # Run the operator (requires kubeconfig)
//! xjoin-operator
//!
//! # Watch a single namespace with debug logging
//! RUST_LOG=debug xjoin-operator --namespace xjoin
//! ```

use clap::Parser;
use kube::api::Api;
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use xjoin_operator::{
    DataSourcePipelineBlueprint, IndexPipelineBlueprint, IndexValidatorController, OperatorConfig,
};

fn watched<K>(client: &Client, config: &OperatorConfig) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match config.watched_namespace() {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Arc::new(OperatorConfig::parse());

    info!("Starting xjoin Kubernetes Operator");
    info!(
        "Watching namespace: {}",
        config.watched_namespace().unwrap_or("all")
    );
    info!("Failed validation jobs: {:?}", config.failed_job_policy);

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let datasource_driver = Arc::new(DataSourcePipelineBlueprint::driver(client.clone(), config.clone()));
    let index_driver = Arc::new(IndexPipelineBlueprint::driver(client.clone(), config.clone()));
    let validator_controller = Arc::new(IndexValidatorController::new(client.clone(), config.clone()));

    let datasource_handle = {
        let api = watched(&client, &config);
        tokio::spawn(async move {
            if let Err(e) = datasource_driver.run(api).await {
                error!("Data source pipeline controller error: {}", e);
            }
        })
    };

    let index_handle = {
        let api = watched(&client, &config);
        tokio::spawn(async move {
            if let Err(e) = index_driver.run(api).await {
                error!("Index pipeline controller error: {}", e);
            }
        })
    };

    let validator_handle = tokio::spawn(async move {
        if let Err(e) = validator_controller.run().await {
            error!("Index validator controller error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = datasource_handle => {
            if let Err(e) = result {
                error!("Data source pipeline controller task failed: {}", e);
            }
        }
        result = index_handle => {
            if let Err(e) = result {
                error!("Index pipeline controller task failed: {}", e);
            }
        }
        result = validator_handle => {
            if let Err(e) = result {
                error!("Index validator controller task failed: {}", e);
            }
        }
    }

    info!("xjoin Operator shutting down");
    Ok(())
}
