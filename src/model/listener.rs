//! Listener sets: routing rules and plugins for one proxy listener group.

use serde::{Deserialize, Serialize};

use crate::model::{int_enum, nullable};

int_enum! {
    /// How a rule's prefix is compared with the request path.
    pub enum RouteMatchType { Path = 0, Prefix = 1, Regex = 2 }
}

int_enum! {
    /// Time window of a rate-limit threshold.
    pub enum UnitType { Second = 0, Minute = 1, Hour = 2, Day = 3 }
}

int_enum! {
    /// What a rate limit is keyed on.
    pub enum LimitType { Route = 0, Cluster = 1, ClientIp = 2, Guid = 3 }
}

int_enum! {
    /// Whether routes carry a leading city segment (`/sz`, `/sh`, ...).
    pub enum CityPrefix { Enabled = 0, Disabled = 1 }
}

/// A named group of listeners with shared plugins.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListenerSet {
    pub name: String,
    pub route_match_type: RouteMatchType,
    pub version: String,
    #[serde(deserialize_with = "nullable")]
    pub plugins: Vec<Plugin>,
    #[serde(deserialize_with = "nullable")]
    pub listeners: Vec<Listener>,
    pub enable_mirror: bool,
}

impl ListenerSet {
    /// Whether a plugin with this exact name is enabled.
    pub fn has_plugin(&self, plugin_name: &str) -> bool {
        self.plugins.iter().any(|p| p.plugin_name == plugin_name)
    }

    /// Every routing rule across all listeners, in declaration order.
    pub fn routes(&self) -> impl Iterator<Item = &RoutingRule> {
        self.listeners.iter().flat_map(|l| l.routes.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Plugin {
    pub plugin_name: String,
    pub functional_types: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Listener {
    #[serde(deserialize_with = "nullable")]
    pub routes: Vec<RoutingRule>,
    #[serde(deserialize_with = "nullable")]
    pub domains: Vec<String>,
    #[serde(rename = "EnableTLS")]
    pub enable_tls: bool,
}

/// One HTTP routing rule.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RoutingRule {
    pub prefix: String,
    pub prefix_rewrite: String,
    pub host_rewrite: bool,
    /// Name of the backend set this rule forwards to.
    pub cluster_name: String,
    pub auth: i32,
    #[serde(rename = "GuId")]
    pub guid: String,
    pub verify: String,
    pub version: String,
    pub ab_test: Option<AbTest>,
    pub rate_limits: Option<RateLimit>,
    #[serde(rename = "TimeOut")]
    pub timeout: i32,
    pub verify_param: bool,
    pub hash_route: bool,
    #[serde(deserialize_with = "nullable")]
    pub hash_route_params: Vec<String>,
    pub bind_internal_users: bool,
    pub bind_internal_user_tag: String,
    #[serde(rename = "IsEnableAB")]
    pub is_enable_ab: bool,
    #[serde(rename = "ABTags", deserialize_with = "nullable")]
    pub ab_tags: Vec<AbTag>,
    pub is_enable_canary: bool,
    pub canary_tag: Option<AbTag>,
    /// Open-API method name.
    pub method: String,
    pub if_need_verify_sign: bool,
    pub if_need_encrypt_content: bool,
    /// 0 checks tokens locally, 1 delegates to the auth server.
    pub auth_server_version: i32,
    pub is_city_tag_prefix_enable: CityPrefix,
}

impl RoutingRule {
    /// Whether rate limiting is switched on with at least one action.
    pub fn is_rate_limited(&self) -> bool {
        self.rate_limits
            .as_ref()
            .is_some_and(|r| r.is_enable && r.limit_actions.iter().any(|a| a.is_enable))
    }
}

/// A/B traffic split tag.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AbTag {
    /// Scenario name, e.g. "search".
    #[serde(rename = "sceans")]
    pub scenario: String,
    /// Group within the scenario, e.g. "A".
    #[serde(rename = "sceansName")]
    pub scenario_name: String,
    /// Service tag the group routes to.
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AbTest {
    pub is_enable: bool,
    pub mark: String,
    pub policy: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RateLimit {
    pub is_enable: bool,
    #[serde(deserialize_with = "nullable")]
    pub limit_actions: Vec<LimitAction>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LimitAction {
    pub is_enable: bool,
    #[serde(rename = "Type")]
    pub kind: LimitType,
    pub threshold: i64,
    pub unit: UnitType,
}
