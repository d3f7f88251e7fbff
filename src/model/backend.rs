//! Backend sets: endpoints plus load-balancing and failure-detection policy.

use serde::{Deserialize, Serialize};
use md5::{Digest, Md5};

use crate::model::{int_enum, nullable, TrueOrFalse, YesOrNo};

int_enum! {
    /// How traffic is split between versions.
    pub enum FlowControlPolicy { Gray = 0, Weight = 1 }
}

int_enum! {
    /// Policy group a version participates in.
    pub enum VersionPolicy { A = 0, B = 1, C = 2 }
}

/// Listener protocol derived from a port name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerProtocol {
    Tcp,
    Http,
    Http2,
}

impl ListenerProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerProtocol::Tcp => "TCP",
            ListenerProtocol::Http => "HTTP",
            ListenerProtocol::Http2 => "HTTP2",
        }
    }
}

/// A service's cluster definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BackendSet {
    #[serde(deserialize_with = "nullable")]
    pub endpoints: Vec<Endpoint>,
    pub name: String,
    pub version: String,
    /// Cluster-level virtual IP.
    pub cluster_ip: String,
    #[serde(deserialize_with = "nullable")]
    pub ports: Vec<Port>,
    /// -1 disabled, 0 enabled.
    pub netflow_tag_enable: i32,
    #[serde(rename = "EDSVersions", deserialize_with = "nullable")]
    pub versions: Vec<VersionSpec>,
    #[serde(rename = "CircuitBreaker", deserialize_with = "nullable")]
    pub circuit_breakers: Vec<CircuitBreaker>,
    #[serde(deserialize_with = "nullable")]
    pub outlier_detection: OutlierDetection,
    #[serde(rename = "K8SKindId")]
    pub k8s_kind_id: i32,
    pub enable_circuitbreaker: TrueOrFalse,
    pub enable_outlier_detection: TrueOrFalse,
    pub enable_health_check: TrueOrFalse,
    #[serde(deserialize_with = "nullable")]
    pub health_check: HealthCheck,
    pub gray_strategy: i32,
}

impl BackendSet {
    /// Distinct non-empty endpoint version tags, first seen first.
    pub fn endpoint_versions(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for endpoint in &self.endpoints {
            if !endpoint.version.is_empty() && !seen.contains(&endpoint.version) {
                seen.push(endpoint.version.clone());
            }
        }
        seen
    }

    /// Distinct policy tags across all version specs, first seen first.
    pub fn policies(&self) -> Vec<VersionPolicy> {
        let mut seen = Vec::new();
        for policy in self.versions.iter().flat_map(|v| v.policies.iter()) {
            if !seen.contains(policy) {
                seen.push(*policy);
            }
        }
        seen
    }

    /// MD5 hex digest of the fields that change what the data plane must
    /// program: endpoint names, version switches, endpoint IPs and the
    /// cluster IP. Matches the version strings already held by consumers.
    ///
    /// Empty when the set has no endpoints.
    pub fn fingerprint(&self) -> String {
        if self.endpoints.is_empty() {
            return String::new();
        }

        let names: Vec<&str> = self.endpoints.iter().map(|e| e.name.as_str()).collect();
        let versions: Vec<String> = self
            .versions
            .iter()
            .map(|v| format!("{}-{}", v.version, v.enable.is_yes()))
            .collect();
        let ips: Vec<&str> = self.endpoints.iter().map(|e| e.ip.as_str()).collect();

        let mut hasher = Md5::new();
        hasher.update(names.join("*"));
        hasher.update(versions.join("*"));
        hasher.update(ips.join("*"));
        hasher.update(&self.cluster_ip);
        hex::encode(hasher.finalize())
    }

    /// Endpoints whose status is enabled.
    pub fn enabled_endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter().filter(|e| e.status.is_yes())
    }
}

/// One member of a backend set. Endpoints have no identity of their own.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Endpoint {
    pub namespace: String,
    pub ip: String,
    pub port: i32,
    /// Carried for weighted balancers; round robin ignores it.
    pub weight: i32,
    pub protocol: String,
    pub version: String,
    pub name: String,
    pub status: YesOrNo,
}

impl Endpoint {
    /// `ip:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Base URL for HTTP upstream requests.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Port {
    pub name: String,
    pub protocol: String,
    pub port: i32,
    pub node_port: i32,
    pub target_port: i32,
}

impl Port {
    /// Protocol from the second `-` separated segment of the name
    /// (`web-http` → HTTP); TCP when absent or unrecognized.
    pub fn protocol(&self) -> ListenerProtocol {
        match self.name.split('-').nth(1) {
            Some("http") => ListenerProtocol::Http,
            Some("http2") => ListenerProtocol::Http2,
            _ => ListenerProtocol::Tcp,
        }
    }
}

/// Traffic policy for one deployed version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VersionSpec {
    pub version: String,
    pub enable: YesOrNo,
    pub select_policy: FlowControlPolicy,
    pub flow_weight: i32,
    #[serde(rename = "Policys", deserialize_with = "nullable")]
    pub policies: Vec<VersionPolicy>,
    #[serde(rename = "NetflowTag", deserialize_with = "nullable")]
    pub netflow_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CircuitBreaker {
    pub priority: i32,
    pub max_connections: u32,
    pub max_pending_requests: u32,
    pub max_requests: u32,
    pub max_retries: u32,
    pub track_remaining: bool,
    pub max_connection_pools: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OutlierDetection {
    #[serde(rename = "Consecutive_5Xx")]
    pub consecutive_5xx: u32,
    pub interval: u32,
    pub base_ejection_time: u32,
    pub max_ejection_percent: u32,
    #[serde(rename = "EnforcingConsecutive_5Xx")]
    pub enforcing_consecutive_5xx: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HealthCheck {
    /// Seconds between probes.
    pub interval: i64,
    #[serde(deserialize_with = "nullable")]
    pub http_health_check: HttpHealthCheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HttpHealthCheck {
    pub path: String,
}
