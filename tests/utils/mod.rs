//! Shared helpers for the integration tests.

use std::sync::Once;

use openbadges_vc::Service;
use openbadges_vc::config::Config;
use openbadges_vc::provider::InMemoryProvider;
use tracing::Level;

static INIT: Once = Once::new();

/// Initialize the tracing subscriber once per test binary.
pub fn init_tracer() {
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt().with_max_level(Level::ERROR).finish();
        tracing::subscriber::set_global_default(subscriber).expect("subscriber set");
    });
}

/// A service over a throwaway keys directory and an in-memory provider.
pub async fn service() -> (Service<InMemoryProvider>, Config) {
    let dir = std::env::temp_dir().join(format!("obvc-it-{}", uuid::Uuid::new_v4()));
    let config = Config::new(dir, "https://issuer.example.org");
    let service =
        Service::new(config.clone(), InMemoryProvider::new()).await.expect("service initializes");
    (service, config)
}

/// Remove the service's keys directory.
pub async fn cleanup(config: &Config) {
    let _ = tokio::fs::remove_dir_all(&config.keys_dir).await;
}
