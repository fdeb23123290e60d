//! In-memory collaborators for unit tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

use async_trait::async_trait;
use k8s_openapi::{
    api::core::v1::{Node, NodeSpec, Secret, Service, ServicePort, ServiceSpec},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
    ByteString,
};
use kube::ResourceExt;

use crate::{
    consts,
    error::{VultrLBError, VultrLBResult},
    store::ObjectStore,
    vultr::{
        models::{GenericInfo, Links},
        ForwardingRule, LoadBalancer, LoadBalancerReq, Meta, VultrApi,
    },
};

/// LoadBalancer service `namespace/name` exposing port 80 on node port 30080.
pub fn service(namespace: &str, name: &str, annotations: &[(&str, &str)]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("6f1c2d3e-4b5a-6978-8a9b-{:0>12}", name.len())),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            ports: Some(vec![port(80, 30080)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn port(port: i32, node_port: i32) -> ServicePort {
    ServicePort {
        name: Some(format!("port-{port}")),
        port,
        node_port: Some(node_port),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

pub fn node(name: &str, provider_id: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: Some(provider_id.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn tls_secret(namespace: &str, name: &str, cert: &str, key: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (
                consts::TLS_CERT_KEY.to_string(),
                ByteString(cert.as_bytes().to_vec()),
            ),
            (
                consts::TLS_PRIVATE_KEY_KEY.to_string(),
                ByteString(key.as_bytes().to_vec()),
            ),
        ])),
        ..Default::default()
    }
}

fn not_found(kind: &str, namespace: &str, name: &str) -> VultrLBError {
    VultrLBError::KubeError(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{kind} {namespace}/{name} not found"),
        reason: "NotFound".to_string(),
        code: 404,
    }))
}

fn missing_lb(id: &str) -> VultrLBError {
    VultrLBError::VultrApi {
        operation: format!("using load balancer {id}"),
        status: 404,
        message: "load balancer not found".to_string(),
    }
}

#[derive(Default)]
struct VultrState {
    load_balancers: Vec<LoadBalancer>,
    calls: Vec<String>,
    next_id: u32,
    create_status: Option<String>,
}

impl VultrState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn find(&mut self, id: &str) -> VultrLBResult<&mut LoadBalancer> {
        self.load_balancers
            .iter_mut()
            .find(|lb| lb.id == id)
            .ok_or_else(|| missing_lb(id))
    }
}

/// Fake Vultr account. Every call is recorded as a short string such as
/// `create web` or `delete_rule r-1`.
#[derive(Default)]
pub struct FakeVultr {
    state: Mutex<VultrState>,
}

impl FakeVultr {
    pub fn insert(&self, lb: LoadBalancer) {
        self.state.lock().unwrap().load_balancers.push(lb);
    }

    pub fn load_balancer(&self, id: &str) -> Option<LoadBalancer> {
        let state = self.state.lock().unwrap();
        state.load_balancers.iter().find(|lb| lb.id == id).cloned()
    }

    pub fn count(&self) -> usize {
        self.state.lock().unwrap().load_balancers.len()
    }

    /// Status given to load balancers created from now on.
    pub fn set_create_status(&self, status: &str) {
        self.state.lock().unwrap().create_status = Some(status.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded calls that changed something.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.starts_with("list") && !call.starts_with("get"))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(&self, call: String) -> std::sync::MutexGuard<'_, VultrState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

/// Active load balancer with the given id and label.
pub fn remote_lb(id: &str, label: &str) -> LoadBalancer {
    LoadBalancer {
        id: id.to_string(),
        label: label.to_string(),
        region: "ewr".to_string(),
        status: consts::LB_STATUS_ACTIVE.to_string(),
        ipv4: "192.0.2.10".to_string(),
        ipv6: "2001:db8::10".to_string(),
        nodes: 1,
        generic_info: GenericInfo {
            balancing_algorithm: "roundrobin".to_string(),
            timeout: consts::DEFAULT_LB_TIMEOUT,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn apply_settings(lb: &mut LoadBalancer, req: &LoadBalancerReq) {
    lb.label.clone_from(&req.label);
    lb.generic_info = GenericInfo {
        balancing_algorithm: req.balancing_algorithm.clone(),
        ssl_redirect: req.ssl_redirect,
        http2: req.http2,
        http3: req.http3,
        proxy_protocol: req.proxy_protocol,
        timeout: req.timeout,
        sticky_sessions: req.sticky_session.clone(),
        vpc: req.vpc.clone().unwrap_or_default(),
    };
    lb.health_check = req.health_check.clone();
    lb.nodes = req.nodes;
    lb.firewall_rules.clone_from(&req.firewall_rules);
    if req.ssl.is_some() {
        lb.has_ssl = true;
    }
}

#[async_trait]
impl VultrApi for FakeVultr {
    async fn list_load_balancers(
        &self,
        cursor: Option<&str>,
        per_page: u32,
    ) -> VultrLBResult<(Vec<LoadBalancer>, Meta)> {
        let state = self.record(format!("list cursor={}", cursor.unwrap_or("")));
        let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let total = state.load_balancers.len();
        let end = (start + per_page as usize).min(total);
        let page = state.load_balancers[start.min(end)..end].to_vec();
        let next = if end < total {
            end.to_string()
        } else {
            String::new()
        };
        Ok((
            page,
            Meta {
                total: total as u64,
                links: Links {
                    next,
                    prev: String::new(),
                },
            },
        ))
    }

    async fn get_load_balancer(&self, id: &str) -> VultrLBResult<Option<LoadBalancer>> {
        let state = self.record(format!("get {id}"));
        Ok(state.load_balancers.iter().find(|lb| lb.id == id).cloned())
    }

    async fn create_load_balancer(&self, req: &LoadBalancerReq) -> VultrLBResult<LoadBalancer> {
        let mut state = self.record(format!("create {}", req.label));
        let id = state.next_id("lb");
        let mut lb = remote_lb(&id, &req.label);
        lb.region = req.region.clone().unwrap_or_default();
        lb.status = state
            .create_status
            .clone()
            .unwrap_or_else(|| consts::LB_STATUS_ACTIVE.to_string());
        apply_settings(&mut lb, req);
        for rule in req.forwarding_rules.iter().flatten() {
            let mut rule = rule.clone();
            rule.id = state.next_id("rule");
            lb.forwarding_rules.push(rule);
        }
        lb.instances = req.instances.clone().unwrap_or_default();
        state.load_balancers.push(lb.clone());
        Ok(lb)
    }

    async fn update_load_balancer(&self, id: &str, req: &LoadBalancerReq) -> VultrLBResult<()> {
        let mut state = self.record(format!("update {id}"));
        let lb = state.find(id)?;
        apply_settings(lb, req);
        Ok(())
    }

    async fn delete_load_balancer(&self, id: &str) -> VultrLBResult<()> {
        let mut state = self.record(format!("delete {id}"));
        state.find(id)?;
        state.load_balancers.retain(|lb| lb.id != id);
        Ok(())
    }

    async fn delete_ssl(&self, id: &str) -> VultrLBResult<()> {
        let mut state = self.record(format!("delete_ssl {id}"));
        state.find(id)?.has_ssl = false;
        Ok(())
    }

    async fn list_forwarding_rules(&self, id: &str) -> VultrLBResult<Vec<ForwardingRule>> {
        let mut state = self.record(format!("list_rules {id}"));
        Ok(state.find(id)?.forwarding_rules.clone())
    }

    async fn create_forwarding_rule(&self, id: &str, rule: &ForwardingRule) -> VultrLBResult<()> {
        let mut state = self.record(format!(
            "create_rule {}:{}->{}:{}",
            rule.frontend_protocol, rule.frontend_port, rule.backend_protocol, rule.backend_port
        ));
        let rule_id = state.next_id("rule");
        let lb = state.find(id)?;
        let mut rule = rule.clone();
        rule.id = rule_id;
        lb.forwarding_rules.push(rule);
        Ok(())
    }

    async fn delete_forwarding_rule(&self, id: &str, rule_id: &str) -> VultrLBResult<()> {
        let mut state = self.record(format!("delete_rule {rule_id}"));
        state.find(id)?.forwarding_rules.retain(|rule| rule.id != rule_id);
        Ok(())
    }

    async fn list_instances(&self, id: &str) -> VultrLBResult<Vec<String>> {
        let mut state = self.record(format!("list_instances {id}"));
        Ok(state.find(id)?.instances.clone())
    }

    async fn attach_instance(&self, id: &str, instance: &str) -> VultrLBResult<()> {
        let mut state = self.record(format!("attach {instance}"));
        let lb = state.find(id)?;
        if !lb.instances.iter().any(|i| i == instance) {
            lb.instances.push(instance.to_string());
        }
        Ok(())
    }

    async fn detach_instance(&self, id: &str, instance: &str) -> VultrLBResult<()> {
        let mut state = self.record(format!("detach {instance}"));
        state.find(id)?.instances.retain(|i| i != instance);
        Ok(())
    }
}

#[derive(Default)]
struct StoreState {
    services: HashMap<(String, String), Service>,
    secrets: HashMap<(String, String), Secret>,
    service_writes: usize,
    forced_conflicts: u32,
}

/// Fake object store honouring resource versions on service writes.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

impl FakeStore {
    pub fn insert_service(&self, mut svc: Service) {
        if svc.resource_version().is_none() {
            svc.metadata.resource_version = Some("1".to_string());
        }
        let namespace = svc.namespace().unwrap_or_default();
        let name = svc.name_any();
        self.state
            .lock()
            .unwrap()
            .services
            .insert(key(&namespace, &name), svc);
    }

    pub fn insert_secret(&self, secret: Secret) {
        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_any();
        self.state
            .lock()
            .unwrap()
            .secrets
            .insert(key(&namespace, &name), secret);
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.state
            .lock()
            .unwrap()
            .services
            .get(&key(namespace, name))
            .cloned()
    }

    /// Successful service writes so far.
    pub fn service_writes(&self) -> usize {
        self.state.lock().unwrap().service_writes
    }

    /// Make the next `count` service writes fail as if another writer won.
    pub fn fail_next_writes_with_conflict(&self, count: u32) {
        self.state.lock().unwrap().forced_conflicts = count;
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get_service(&self, namespace: &str, name: &str) -> VultrLBResult<Service> {
        self.service(namespace, name)
            .ok_or_else(|| not_found("service", namespace, name))
    }

    async fn replace_service(&self, service: &Service) -> VultrLBResult<Service> {
        let namespace = service.namespace().unwrap_or_default();
        let name = service.name_any();
        let mut state = self.state.lock().unwrap();
        if state.forced_conflicts > 0 {
            state.forced_conflicts -= 1;
            return Err(VultrLBError::Conflict(format!("{namespace}/{name}")));
        }
        let current = state
            .services
            .get(&key(&namespace, &name))
            .ok_or_else(|| not_found("service", &namespace, &name))?;
        if current.resource_version() != service.resource_version() {
            return Err(VultrLBError::Conflict(format!("{namespace}/{name}")));
        }
        let version = current
            .resource_version()
            .and_then(|rv| rv.parse::<u64>().ok())
            .unwrap_or(0);
        let mut stored = service.clone();
        stored.metadata.resource_version = Some((version + 1).to_string());
        state.services.insert(key(&namespace, &name), stored.clone());
        state.service_writes += 1;
        Ok(stored)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> VultrLBResult<Secret> {
        self.state
            .lock()
            .unwrap()
            .secrets
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| not_found("secret", namespace, name))
    }
}
