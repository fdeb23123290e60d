use k8s_openapi::{api::core::v1::Service, serde_json::json};
use kube::{
    api::{Patch, PatchParams},
    Api, Client, ResourceExt,
};

use crate::{
    consts,
    error::{VultrLBError, VultrLBResult},
};

/// Add the finalizer to the service, keeping the ones already set.
/// The load balancer is deleted before the service is allowed to go away.
pub async fn add(client: Client, svc: &Service) -> VultrLBResult<()> {
    let api = Api::<Service>::namespaced(
        client,
        svc.namespace().ok_or(VultrLBError::SkipService)?.as_str(),
    );
    let mut finalizers = svc.finalizers().to_vec();
    finalizers.push(consts::FINALIZER_NAME.to_string());
    let patch = json!({
        "metadata": {
            "finalizers": finalizers
        }
    });
    api.patch(
        svc.name_any().as_str(),
        &PatchParams::default(),
        &Patch::Merge(patch),
    )
    .await?;
    Ok(())
}

/// Check if service has the finalizer.
#[must_use]
pub fn check(service: &Service) -> bool {
    service
        .finalizers()
        .iter()
        .any(|finalizer| finalizer == consts::FINALIZER_NAME)
}

/// Remove the finalizer from the service.
/// This will allow the service to be deleted.
pub async fn remove(client: Client, svc: &Service) -> VultrLBResult<()> {
    if !check(svc) {
        return Ok(());
    }
    let api = Api::<Service>::namespaced(
        client,
        svc.namespace().ok_or(VultrLBError::SkipService)?.as_str(),
    );
    let finalizers = svc
        .finalizers()
        .iter()
        .filter(|item| item.as_str() != consts::FINALIZER_NAME)
        .collect::<Vec<_>>();
    let patch = json!({
        "metadata": {
            "finalizers": finalizers
        }
    });
    api.patch(
        svc.name_any().as_str(),
        &PatchParams::default(),
        &Patch::Merge(patch),
    )
    .await?;
    Ok(())
}
