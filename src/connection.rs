//! Connection parameters stored under the connection root.
//!
//! Values live at `<connection_root>/<name>` as plain strings, possibly
//! several levels deep (`kafka/log/brokers`), so they are usually served by
//! fetch-through rather than the startup walk.

use crate::mirror::ConfigMirror;

/// String value of connection parameter `name`; empty when absent or not a
/// plain string.
pub async fn value(mirror: &ConfigMirror, name: &str) -> String {
    let path = format!(
        "{}/{}",
        mirror.settings().connection_root.trim_end_matches('/'),
        name.trim_start_matches('/')
    );
    mirror.get_str(&path).await.unwrap_or_default()
}

/// Broker list for the log pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KafkaSettings {
    pub brokers: Vec<String>,
}

impl KafkaSettings {
    pub const BROKERS: &'static str = "kafka/log/brokers";

    pub async fn load(mirror: &ConfigMirror) -> Self {
        Self::parse(&value(mirror, Self::BROKERS).await)
    }

    /// Comma-separated brokers, trimmed, empty entries skipped.
    pub fn parse(list: &str) -> Self {
        Self {
            brokers: list
                .split(',')
                .map(str::trim)
                .filter(|broker| !broker.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_brokers() {
        let settings = KafkaSettings::parse("k1:9092, k2:9092,,");
        assert_eq!(settings.brokers, vec!["k1:9092", "k2:9092"]);
        assert!(KafkaSettings::parse("").brokers.is_empty());
    }
}
