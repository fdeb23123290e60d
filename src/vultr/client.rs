use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use super::{
    models::{
        ApiErrorBody, ForwardingRule, ForwardingRuleList, InstancesUpdate, LoadBalancer,
        LoadBalancerEnvelope, LoadBalancerList, LoadBalancerReq, Meta,
    },
    VultrApi,
};
use crate::error::{VultrLBError, VultrLBResult};

/// Client of the Vultr v2 REST API.
#[derive(Debug, Clone)]
pub struct VultrClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl VultrClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        user_agent: &str,
        timeout: Duration,
    ) -> VultrLBResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|source| VultrLBError::Http {
                operation: "building http client".to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2{}", self.base_url, path)
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> VultrLBResult<Response> {
        request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|source| VultrLBError::Http {
                operation: operation.to_string(),
                source,
            })
    }

    /// Turn a non-success response into [`VultrLBError::VultrApi`].
    async fn check(operation: &str, response: Response) -> VultrLBResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .map(|err| err.error)
            .filter(|msg| !msg.is_empty())
            .unwrap_or(body);
        Err(VultrLBError::VultrApi {
            operation: operation.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(operation: &str, response: Response) -> VultrLBResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|source| VultrLBError::Http {
                operation: operation.to_string(),
                source,
            })
    }

    async fn patch<B: Serialize + Sync>(
        &self,
        operation: &str,
        id: &str,
        body: &B,
    ) -> VultrLBResult<()> {
        let request = self
            .http
            .patch(self.url(&format!("/load-balancers/{id}")))
            .json(body);
        let response = self.send(operation, request).await?;
        Self::check(operation, response).await?;
        Ok(())
    }
}

#[async_trait]
impl VultrApi for VultrClient {
    async fn list_load_balancers(
        &self,
        cursor: Option<&str>,
        per_page: u32,
    ) -> VultrLBResult<(Vec<LoadBalancer>, Meta)> {
        let operation = "listing load balancers";
        let mut query = vec![("per_page", per_page.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let request = self.http.get(self.url("/load-balancers")).query(&query);
        let response = Self::check(operation, self.send(operation, request).await?).await?;
        let list: LoadBalancerList = Self::json(operation, response).await?;
        Ok((list.load_balancers, list.meta))
    }

    async fn get_load_balancer(&self, id: &str) -> VultrLBResult<Option<LoadBalancer>> {
        let operation = format!("getting load balancer {id}");
        let request = self.http.get(self.url(&format!("/load-balancers/{id}")));
        let response = self.send(&operation, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(&operation, response).await?;
        let envelope: LoadBalancerEnvelope = Self::json(&operation, response).await?;
        Ok(Some(envelope.load_balancer))
    }

    async fn create_load_balancer(&self, req: &LoadBalancerReq) -> VultrLBResult<LoadBalancer> {
        let operation = format!("creating load balancer {}", req.label);
        let request = self.http.post(self.url("/load-balancers")).json(req);
        let response = Self::check(&operation, self.send(&operation, request).await?).await?;
        let envelope: LoadBalancerEnvelope = Self::json(&operation, response).await?;
        Ok(envelope.load_balancer)
    }

    async fn update_load_balancer(&self, id: &str, req: &LoadBalancerReq) -> VultrLBResult<()> {
        self.patch(&format!("updating load balancer {id}"), id, req)
            .await
    }

    async fn delete_load_balancer(&self, id: &str) -> VultrLBResult<()> {
        let operation = format!("deleting load balancer {id}");
        let request = self.http.delete(self.url(&format!("/load-balancers/{id}")));
        Self::check(&operation, self.send(&operation, request).await?).await?;
        Ok(())
    }

    async fn delete_ssl(&self, id: &str) -> VultrLBResult<()> {
        let operation = format!("removing certificate of load balancer {id}");
        let request = self
            .http
            .delete(self.url(&format!("/load-balancers/{id}/ssl")));
        Self::check(&operation, self.send(&operation, request).await?).await?;
        Ok(())
    }

    async fn list_forwarding_rules(&self, id: &str) -> VultrLBResult<Vec<ForwardingRule>> {
        let operation = format!("listing forwarding rules of load balancer {id}");
        let request = self
            .http
            .get(self.url(&format!("/load-balancers/{id}/forwarding-rules")))
            .query(&[("per_page", "500")]);
        let response = Self::check(&operation, self.send(&operation, request).await?).await?;
        let list: ForwardingRuleList = Self::json(&operation, response).await?;
        Ok(list.forwarding_rules)
    }

    async fn create_forwarding_rule(&self, id: &str, rule: &ForwardingRule) -> VultrLBResult<()> {
        let operation = format!(
            "adding forwarding rule for port {} to load balancer {id}",
            rule.frontend_port
        );
        let request = self
            .http
            .post(self.url(&format!("/load-balancers/{id}/forwarding-rules")))
            .json(rule);
        Self::check(&operation, self.send(&operation, request).await?).await?;
        Ok(())
    }

    async fn delete_forwarding_rule(&self, id: &str, rule_id: &str) -> VultrLBResult<()> {
        let operation = format!("deleting forwarding rule {rule_id} of load balancer {id}");
        let request = self.http.delete(self.url(&format!(
            "/load-balancers/{id}/forwarding-rules/{rule_id}"
        )));
        Self::check(&operation, self.send(&operation, request).await?).await?;
        Ok(())
    }

    async fn list_instances(&self, id: &str) -> VultrLBResult<Vec<String>> {
        let balancer = self
            .get_load_balancer(id)
            .await?
            .ok_or(VultrLBError::LoadBalancerNotFound)?;
        Ok(balancer.instances)
    }

    // The API only accepts the whole backend list, so single-instance
    // changes are applied on top of the currently attached set.
    async fn attach_instance(&self, id: &str, instance: &str) -> VultrLBResult<()> {
        let mut instances = self.list_instances(id).await?;
        if instances.iter().any(|attached| attached == instance) {
            return Ok(());
        }
        instances.push(instance.to_string());
        self.patch(
            &format!("attaching instance {instance} to load balancer {id}"),
            id,
            &InstancesUpdate {
                instances: &instances,
            },
        )
        .await
    }

    async fn detach_instance(&self, id: &str, instance: &str) -> VultrLBResult<()> {
        let instances = self.list_instances(id).await?;
        if !instances.iter().any(|attached| attached == instance) {
            return Ok(());
        }
        let remaining = instances
            .into_iter()
            .filter(|attached| attached != instance)
            .collect::<Vec<_>>();
        self.patch(
            &format!("detaching instance {instance} from load balancer {id}"),
            id,
            &InstancesUpdate {
                instances: &remaining,
            },
        )
        .await
    }
}
