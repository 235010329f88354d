//! Threatmap session store - Main Entry Point
//!
//! Loads configuration, opens the configured storage, and rehydrates the
//! session the way the front-end does at start-up.

use std::sync::Arc;

use threatmap_application::{ApplicationError, AuthStore};
use threatmap_infrastructure::StorageConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = StorageConfig::from_env().map_err(|e| ApplicationError::Config(e.to_string()))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let storage = config
        .open_storage()
        .map_err(|e| ApplicationError::Config(e.to_string()))?;

    let store = Arc::new(
        AuthStore::builder()
            .storage(storage)
            .persist_snapshot(config.persist_snapshot)
            .snapshot_key(config.snapshot_key.clone())
            .build(),
    );

    store.subscribe(|snapshot| {
        tracing::info!(
            authenticated = snapshot.is_authenticated,
            loading = snapshot.is_loading,
            user_id = snapshot.user_id().unwrap_or("-"),
            "session changed"
        );
    });

    store.check_auth_from_storage();

    match store.user() {
        Some(user) => tracing::info!(user_id = %user.id, email = %user.email, "session restored"),
        None => tracing::info!("no stored session"),
    }

    Ok(())
}
