#![warn(
    // Base lints.
    clippy::all,
    // Some pedantic lints.
    clippy::pedantic,
    // New lints which are cool.
    clippy::nursery,
)]
#![
    allow(
        // I don't care about this.
        clippy::module_name_repetitions,
        // Yo, the hell you should put
        // it in docs, if signature is clear as sky.
        clippy::missing_errors_doc
    )
]

use clap::Parser;
use config::OperatorConfig;
use error::{VultrLBError, VultrLBResult};
use futures::StreamExt;
use k8s_openapi::{
    api::core::v1::{LoadBalancerIngress, Node, Secret, Service},
    serde_json::json,
};
use kube::{
    api::{ListParams, PatchParams},
    runtime::{controller::Action, watcher, Controller},
    Resource, ResourceExt,
};
use label_filter::LabelFilter;
use lb::LoadBalancers;
use secrets::{SecretRegistry, SecretWatcher};
use std::{str::FromStr, sync::Arc, time::Duration};
use store::{KubeStore, ObjectStore};
use vultr::{
    metadata::{InstanceMetadata, MetadataClient},
    VultrApi, VultrClient,
};

pub mod annotations;
pub mod binding;
pub mod config;
pub mod consts;
pub mod desired;
pub mod error;
pub mod finalizers;
pub mod label_filter;
pub mod lb;
pub mod locator;
pub mod secrets;
pub mod store;
pub mod vultr;

#[cfg(test)]
mod testing;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> VultrLBResult<()> {
    dotenvy::dotenv().ok();
    let operator_config = config::OperatorConfig::parse();
    tracing_subscriber::fmt()
        .with_max_level(operator_config.log_level)
        .init();

    tracing::info!("Starting vultrlb operator v{}", env!("CARGO_PKG_VERSION"));
    let http_timeout = Duration::from_secs(operator_config.http_timeout);
    let vultr_client: Arc<dyn VultrApi> = Arc::new(VultrClient::new(
        &operator_config.api_url,
        operator_config.api_key.clone(),
        &operator_config.user_agent,
        http_timeout,
    )?);
    let (region, vpc_id) = discover_location(&operator_config, http_timeout).await?;
    tracing::info!("Load balancers will be created in region {region}");

    let kube_client = kube::Client::try_default().await?;
    tracing::info!("Kube client is connected");

    let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(kube_client.clone()));
    let registry = SecretRegistry::new();
    let load_balancers = LoadBalancers::new(
        vultr_client,
        store.clone(),
        registry.clone(),
        region,
        vpc_id,
    );

    let secret_watcher = SecretWatcher::new(store, registry);
    let secrets_api = kube::Api::<Secret>::all(kube_client.clone());
    tokio::spawn(async move { secret_watcher.run(secrets_api).await });
    tracing::info!("Secret watcher is started");

    let context = Arc::new(CurrentContext::new(
        kube_client.clone(),
        operator_config,
        load_balancers,
    ));
    tracing::info!("Starting the controller");
    Controller::new(
        kube::Api::<Service>::all(kube_client),
        watcher::Config::default(),
    )
    .run(reconcile_service, on_error, context)
    .for_each(|reconcilation_result| async move {
        match reconcilation_result {
            Ok((service, _action)) => {
                tracing::info!("Reconcilation of a service {} was successful", service.name);
            }
            Err(err) => match err {
                // During reconcilation process,
                // the controller has decided to skip the service.
                kube::runtime::controller::Error::ReconcilerFailed(
                    VultrLBError::SkipService,
                    _,
                ) => {}
                _ => {
                    tracing::error!("Error reconciling service: {:#?}", err);
                }
            },
        }
    })
    .await;
    Ok(())
}

/// Region and VPC of the node the operator runs on.
/// Configured values win over the metadata service.
async fn discover_location(
    config: &OperatorConfig,
    timeout: Duration,
) -> VultrLBResult<(String, Option<String>)> {
    if let (Some(region), Some(vpc_id)) = (&config.region, &config.vpc_id) {
        return Ok((region.clone(), Some(vpc_id.clone())));
    }
    let metadata = match MetadataClient::new(&config.metadata_url, timeout)?
        .fetch()
        .await
    {
        Ok(metadata) => metadata,
        Err(err) if config.region.is_some() => {
            tracing::warn!("Cannot read instance metadata, VPC discovery is disabled: {err}");
            InstanceMetadata::default()
        }
        Err(err) => return Err(err),
    };
    Ok((
        config.region.clone().unwrap_or(metadata.region),
        config.vpc_id.clone().or(metadata.vpc_id),
    ))
}

pub struct CurrentContext {
    pub client: kube::Client,
    pub config: OperatorConfig,
    pub load_balancers: LoadBalancers,
}

impl CurrentContext {
    #[must_use]
    pub const fn new(
        client: kube::Client,
        config: OperatorConfig,
        load_balancers: LoadBalancers,
    ) -> Self {
        Self {
            client,
            config,
            load_balancers,
        }
    }
}

fn is_load_balancer(svc: &Service) -> bool {
    svc.spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        .is_some_and(|svc_type| svc_type == "LoadBalancer")
}

/// Reconcile the service.
/// This function is called by the controller for each service.
/// It will create or update the load balancer based on the service.
/// If the service is being deleted, it will clean up the resources.
#[tracing::instrument(skip(svc,context), fields(service=svc.name_any()))]
pub async fn reconcile_service(
    svc: Arc<Service>,
    context: Arc<CurrentContext>,
) -> VultrLBResult<Action> {
    if !is_load_balancer(&svc) {
        // The type was changed away from LoadBalancer after we took over.
        if finalizers::check(&svc) {
            tracing::info!("Service is no longer a LoadBalancer. Cleaning up resources.");
            context.load_balancers.ensure_load_balancer_deleted(&svc).await?;
            finalizers::remove(context.client.clone(), &svc).await?;
        }
        tracing::debug!("Service type is not LoadBalancer. Skipping...");
        return Err(VultrLBError::SkipService);
    }

    tracing::info!("Starting service reconcilation");

    // If the service is being deleted, we need to clean up the resources.
    if svc.meta().deletion_timestamp.is_some() {
        if finalizers::check(&svc) {
            tracing::info!("Service deletion detected. Cleaning up resources.");
            context.load_balancers.ensure_load_balancer_deleted(&svc).await?;
            finalizers::remove(context.client.clone(), &svc).await?;
        }
        return Ok(Action::await_change());
    }

    // Add finalizer if it's not there yet.
    if !finalizers::check(&svc) {
        finalizers::add(context.client.clone(), &svc).await?;
    }

    reconcile_load_balancer(svc, context).await
}

/// Nodes that should receive traffic from the load balancer of `svc`.
///
/// Nodes without a provider id are not Vultr instances yet, and nodes
/// carrying the exclusion label are never used.
async fn get_backend_nodes(
    svc: &Service,
    context: &Arc<CurrentContext>,
) -> VultrLBResult<Vec<Node>> {
    let label_filter = svc
        .annotations()
        .get(consts::LB_NODE_SELECTOR_ANN_NAME)
        .map(|selector| LabelFilter::from_str(selector))
        .transpose()?
        .unwrap_or_default();
    let nodes_api = kube::Api::<Node>::all(context.client.clone());
    let nodes = nodes_api
        .list(&ListParams::default())
        .await?
        .into_iter()
        .filter(|node| {
            node.spec
                .as_ref()
                .and_then(|spec| spec.provider_id.as_deref())
                .is_some_and(|provider_id| !provider_id.is_empty())
        })
        .filter(|node| !node.labels().contains_key(consts::EXCLUDE_FROM_LB_LABEL_NAME))
        .filter(|node| label_filter.check(node.labels()))
        .collect::<Vec<_>>();
    Ok(nodes)
}

/// Reconcile the `LoadBalancer` type of service.
/// The balancer is created if missing and converged otherwise,
/// and the resulting addresses are written to the service status.
pub async fn reconcile_load_balancer(
    svc: Arc<Service>,
    context: Arc<CurrentContext>,
) -> VultrLBResult<Action> {
    let nodes = get_backend_nodes(&svc, &context).await?;
    tracing::debug!(
        "Found {} backend nodes for load balancer {}",
        nodes.len(),
        context.load_balancers.get_load_balancer_name(&svc)
    );

    // One lookup per pass: ensure converges an existing balancer as well.
    let ingress = context
        .load_balancers
        .ensure_load_balancer(&svc, &nodes)
        .await?;

    update_status(&svc, &context, ingress).await?;
    Ok(Action::requeue(Duration::from_secs(
        context.config.requeue_interval,
    )))
}

async fn update_status(
    svc: &Service,
    context: &Arc<CurrentContext>,
    ingress: Vec<LoadBalancerIngress>,
) -> VultrLBResult<()> {
    let current = svc
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.clone())
        .unwrap_or_default();
    if current == ingress {
        return Ok(());
    }
    let svc_api = kube::Api::<Service>::namespaced(
        context.client.clone(),
        svc.namespace()
            .unwrap_or_else(|| context.client.default_namespace().to_string())
            .as_str(),
    );
    svc_api
        .patch_status(
            svc.name_any().as_str(),
            &PatchParams::default(),
            &kube::api::Patch::Merge(json!({
                "status" :{
                    "loadBalancer": {
                        "ingress": ingress
                    }
                }
            })),
        )
        .await?;
    tracing::info!("Service status is updated");
    Ok(())
}

/// Handle the error during reconcilation.
#[allow(clippy::needless_pass_by_value)]
fn on_error(_: Arc<Service>, error: &VultrLBError, context: Arc<CurrentContext>) -> Action {
    match error {
        VultrLBError::SkipService => Action::await_change(),
        // Both resolve on their own shortly, check again soon.
        VultrLBError::NotActive(_) | VultrLBError::RecreationNeeded { .. } => {
            Action::requeue(Duration::from_secs(context.config.not_active_requeue))
        }
        _ => Action::requeue(Duration::from_secs(context.config.requeue_interval)),
    }
}
