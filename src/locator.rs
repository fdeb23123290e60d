use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;

use crate::{
    annotations, consts,
    error::{VultrLBError, VultrLBResult},
    vultr::{LoadBalancer, VultrApi},
};

/// Resolves the remote load balancer of a service.
///
/// Absence is `Ok(None)`; every `Err` is a real failure.
#[derive(Clone)]
pub struct Locator {
    api: Arc<dyn VultrApi>,
}

impl Locator {
    #[must_use]
    pub fn new(api: Arc<dyn VultrApi>) -> Self {
        Self { api }
    }

    pub async fn find_by_id(&self, id: &str) -> VultrLBResult<Option<LoadBalancer>> {
        self.api.get_load_balancer(id).await
    }

    /// Walk every page of the listing looking for `label`.
    pub async fn find_by_name(&self, label: &str) -> VultrLBResult<Option<LoadBalancer>> {
        let mut matches = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let (page, meta) = self
                .api
                .list_load_balancers(cursor.as_deref(), consts::LIST_PAGE_SIZE)
                .await?;
            matches.extend(page.into_iter().filter(|lb| lb.label == label));
            if meta.links.next.is_empty() {
                break;
            }
            cursor = Some(meta.links.next);
        }
        if matches.len() > 1 {
            return Err(VultrLBError::DuplicateLabel {
                label: label.to_string(),
                ids: matches.into_iter().map(|lb| lb.id).collect(),
            });
        }
        Ok(matches.pop())
    }

    /// The bound id wins when present. Otherwise the default name is tried
    /// first, then the label override.
    pub async fn locate(&self, svc: &Service) -> VultrLBResult<Option<LoadBalancer>> {
        if let Some(id) = annotations::load_balancer_id(svc.annotations()) {
            tracing::debug!("Looking up load balancer by id {id}");
            return self.find_by_id(id).await;
        }
        let default_name = annotations::default_load_balancer_name(svc);
        if let Some(lb) = self.find_by_name(&default_name).await? {
            return Ok(Some(lb));
        }
        let name = annotations::load_balancer_name(svc);
        if name == default_name {
            return Ok(None);
        }
        self.find_by_name(&name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{remote_lb, service, FakeVultr};

    fn locator(fake: &Arc<FakeVultr>) -> Locator {
        let api: Arc<dyn VultrApi> = fake.clone();
        Locator::new(api)
    }

    #[tokio::test]
    async fn find_by_name_walks_every_page() {
        let fake = Arc::new(FakeVultr::default());
        for i in 0..60 {
            fake.insert(remote_lb(&format!("lb-{i}"), &format!("label-{i}")));
        }

        let found = locator(&fake).find_by_name("label-57").await.unwrap();
        assert_eq!(found.unwrap().id, "lb-57");
        let pages = fake
            .calls()
            .iter()
            .filter(|call| call.starts_with("list"))
            .count();
        assert_eq!(pages, 3);
    }

    #[tokio::test]
    async fn unknown_service_is_not_found() {
        let fake = Arc::new(FakeVultr::default());
        fake.insert(remote_lb("lb-1", "someone-else"));

        let svc = service("ns", "web", &[]);
        assert!(locator(&fake).locate(&svc).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_labels_are_an_error() {
        let fake = Arc::new(FakeVultr::default());
        fake.insert(remote_lb("lb-1", "web"));
        fake.insert(remote_lb("lb-2", "web"));

        match locator(&fake).find_by_name("web").await {
            Err(VultrLBError::DuplicateLabel { label, ids }) => {
                assert_eq!(label, "web");
                assert_eq!(ids, vec!["lb-1".to_string(), "lb-2".to_string()]);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn label_override_is_used_after_the_default_name() {
        let fake = Arc::new(FakeVultr::default());
        fake.insert(remote_lb("lb-1", "custom"));

        let svc = service("ns", "web", &[(consts::LB_LABEL_ANN_NAME, "custom")]);
        let found = locator(&fake).locate(&svc).await.unwrap();
        assert_eq!(found.unwrap().id, "lb-1");
    }

    #[tokio::test]
    async fn bound_id_is_authoritative() {
        let fake = Arc::new(FakeVultr::default());
        fake.insert(remote_lb("lb-1", "custom"));
        fake.insert(remote_lb("lb-2", "other"));

        let svc = service(
            "ns",
            "web",
            &[
                (consts::LB_LABEL_ANN_NAME, "custom"),
                (consts::LB_ID_ANN_NAME, "lb-2"),
            ],
        );
        let found = locator(&fake).locate(&svc).await.unwrap();
        assert_eq!(found.unwrap().id, "lb-2");

        let svc = service("ns", "web", &[(consts::LB_ID_ANN_NAME, "lb-gone")]);
        assert!(locator(&fake).locate(&svc).await.unwrap().is_none());
        assert!(!fake.calls().iter().any(|call| call.starts_with("list")));
    }
}
