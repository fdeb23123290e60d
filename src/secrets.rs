//! Resync of services whose TLS secret changed.
//!
//! The desired-state builder registers every (secret, service) pair it sees.
//! The watcher follows secret events cluster-wide and bumps a timestamp
//! annotation on the dependent services, which the controller observes as
//! a service change.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    runtime::{watcher, WatchStreamExt},
    Api, ResourceExt,
};

use crate::{consts, error::VultrLBResult, store::ObjectStore};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Subscription {
    secret: String,
    service: String,
}

/// Services to resync per namespace, keyed by the secret they use.
#[derive(Debug, Clone, Default)]
pub struct SecretRegistry {
    subscriptions: Arc<Mutex<HashMap<String, Vec<Subscription>>>>,
}

impl SecretRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` as the user of `secret`.
    /// Each service has one entry; pointing it at another secret moves it.
    pub fn register(&self, namespace: &str, secret: &str, service: &str) {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entries = subscriptions.entry(namespace.to_string()).or_default();
        match entries.iter_mut().find(|entry| entry.service == service) {
            Some(entry) if entry.secret == secret => {
                tracing::debug!("Service {namespace}/{service} is already watched");
            }
            Some(entry) => {
                tracing::info!(
                    "Service {namespace}/{service} moved from secret {} to {secret}",
                    entry.secret
                );
                entry.secret = secret.to_string();
            }
            None => {
                entries.push(Subscription {
                    secret: secret.to_string(),
                    service: service.to_string(),
                });
                tracing::info!("Watching secret {namespace}/{secret} for service {service}");
            }
        }
    }

    /// Names of the services in `namespace` that use `secret`.
    #[must_use]
    pub fn dependents(&self, namespace: &str, secret: &str) -> Vec<String> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.secret == secret)
                    .map(|entry| entry.service.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub struct SecretWatcher {
    store: Arc<dyn ObjectStore>,
    registry: SecretRegistry,
}

impl SecretWatcher {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, registry: SecretRegistry) -> Self {
        Self { store, registry }
    }

    /// Follow secret events in all namespaces until the process exits.
    /// Relisting and resuming are left to the runtime watcher.
    pub async fn run(&self, api: Api<Secret>) {
        tracing::info!("Starting secret watcher");
        self.follow(watcher(api, watcher::Config::default()).default_backoff())
            .await;
        tracing::warn!("Secret watcher stream has ended");
    }

    /// Consume secret events. Stream errors are logged and skipped.
    pub async fn follow<S>(&self, events: S)
    where
        S: Stream<Item = Result<watcher::Event<Secret>, watcher::Error>>,
    {
        let mut events = Box::pin(events);
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => self.handle_event(event).await,
                Err(err) => tracing::warn!("Secret watch failed: {err}"),
            }
        }
    }

    /// Resync the dependents of an applied secret.
    /// Deletions and the initial listing are ignored.
    pub async fn handle_event(&self, event: watcher::Event<Secret>) {
        let secret = match event {
            watcher::Event::Apply(secret) => secret,
            watcher::Event::Delete(_)
            | watcher::Event::Init
            | watcher::Event::InitApply(_)
            | watcher::Event::InitDone => return,
        };
        let Some(namespace) = secret.namespace() else {
            return;
        };
        let name = secret.name_any();
        for service in self.registry.dependents(&namespace, &name) {
            tracing::info!("Secret {namespace}/{name} changed, resyncing service {service}");
            if let Err(err) = self.touch_service(&namespace, &service).await {
                tracing::warn!("Cannot resync service {namespace}/{service}: {err}");
            }
        }
    }

    async fn touch_service(&self, namespace: &str, name: &str) -> VultrLBResult<()> {
        let mut svc = self.store.get_service(namespace, name).await?;
        svc.annotations_mut().insert(
            consts::LB_SSL_LAST_UPDATED_ANN_NAME.to_string(),
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
        );
        self.store.replace_service(&svc).await?;
        Ok(())
    }
}
