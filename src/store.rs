//! Access to the cluster objects the operator reads and writes.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::{api::PostParams, Api, Client, ResourceExt};

use crate::error::{VultrLBError, VultrLBResult};

/// Services and secrets as seen by the reconciliation engine.
///
/// `replace_service` carries the resource version of the object it was
/// given, so writing a stale copy fails with [`VultrLBError::Conflict`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_service(&self, namespace: &str, name: &str) -> VultrLBResult<Service>;
    async fn replace_service(&self, service: &Service) -> VultrLBResult<Service>;
    async fn get_secret(&self, namespace: &str, name: &str) -> VultrLBResult<Secret>;
}

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_service(&self, namespace: &str, name: &str) -> VultrLBResult<Service> {
        let api = Api::<Service>::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn replace_service(&self, service: &Service) -> VultrLBResult<Service> {
        let namespace = service.namespace().ok_or(VultrLBError::SkipService)?;
        let name = service.name_any();
        let api = Api::<Service>::namespaced(self.client.clone(), &namespace);
        match api.replace(&name, &PostParams::default(), service).await {
            Ok(updated) => Ok(updated),
            Err(kube::Error::Api(response)) if response.code == 409 => {
                Err(VultrLBError::Conflict(format!("{namespace}/{name}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> VultrLBResult<Secret> {
        let api = Api::<Secret>::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }
}
