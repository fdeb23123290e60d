use std::time::Duration;

use serde::Deserialize;

use crate::error::{VultrLBError, VultrLBResult};

/// What the operator needs to know about the node it runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceMetadata {
    /// Lower-cased region code, e.g. `ewr`.
    pub region: String,
    /// VPC the node is attached to, if any.
    pub vpc_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMetadata {
    region: RawRegion,
    interfaces: Vec<RawInterface>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRegion {
    regioncode: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInterface {
    #[serde(rename = "network-v2-id")]
    network_v2_id: String,
    networkid: String,
}

/// Client of the link-local instance metadata service.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new(base_url: &str, timeout: Duration) -> VultrLBResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| VultrLBError::Http {
                operation: "building metadata client".to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn fetch(&self) -> VultrLBResult<InstanceMetadata> {
        let operation = "fetching instance metadata";
        let response = self
            .http
            .get(format!("{}/v1.json", self.base_url))
            .send()
            .await
            .map_err(|source| VultrLBError::Http {
                operation: operation.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VultrLBError::Metadata(format!("{status}: {body}")));
        }
        let raw = response
            .json::<RawMetadata>()
            .await
            .map_err(|source| VultrLBError::Http {
                operation: operation.to_string(),
                source,
            })?;
        Ok(raw.into())
    }
}

impl From<RawMetadata> for InstanceMetadata {
    fn from(raw: RawMetadata) -> Self {
        let vpc_id = raw.interfaces.into_iter().find_map(|iface| {
            [iface.network_v2_id, iface.networkid]
                .into_iter()
                .find(|id| !id.is_empty())
        });
        Self {
            region: raw.region.regioncode.to_lowercase(),
            vpc_id,
        }
    }
}
