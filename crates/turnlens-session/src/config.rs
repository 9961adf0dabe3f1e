//! Observer configuration

use serde::{Deserialize, Serialize};
use turnlens_routing::registry::default_rules;
use turnlens_routing::{ProducerRegistry, ProducerRule};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// How long after a turn closes (seconds, measured from its end timestamp)
    /// a measurement with no open turn is still attributed to it
    #[serde(default = "default_grace_window_secs")]
    pub grace_window_secs: f64,

    /// Also process frames travelling upstream
    #[serde(default)]
    pub accept_upstream: bool,

    /// Number of recent frame ids remembered for de-duplication (0 = off)
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// Measurements held for the next turn when nothing can take them (0 = drop)
    #[serde(default)]
    pub pending_capacity: usize,

    /// Producer name patterns, evaluated by priority
    #[serde(default = "default_rules")]
    pub producers: Vec<ProducerRule>,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            grace_window_secs: default_grace_window_secs(),
            accept_upstream: false,
            dedup_capacity: default_dedup_capacity(),
            pending_capacity: 0,
            producers: default_rules(),
        }
    }
}

fn default_grace_window_secs() -> f64 {
    5.0
}

fn default_dedup_capacity() -> usize {
    4096
}

impl ObserverConfig {
    /// Build the producer registry described by this configuration
    pub fn registry(&self) -> ProducerRegistry {
        ProducerRegistry::with_rules(self.producers.clone())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.grace_window_secs.is_finite() || self.grace_window_secs < 0.0 {
            return Err("grace_window_secs must be a non-negative number".to_string());
        }

        if self.producers.is_empty() {
            return Err("at least one producer rule is required".to_string());
        }

        self.producers.iter().try_for_each(ProducerRule::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnlens_core::ProducerKind;

    #[test]
    fn test_default_config() {
        let config = ObserverConfig::default();
        assert_eq!(config.grace_window_secs, 5.0);
        assert!(!config.accept_upstream);
        assert_eq!(config.dedup_capacity, 4096);
        assert_eq!(config.pending_capacity, 0);
        assert_eq!(config.producers.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config: ObserverConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.grace_window_secs, 5.0);
        assert_eq!(config.registry().classify("STTServiceX"), Some(ProducerKind::Stt));
    }

    #[test]
    fn test_custom_producers_replace_defaults() {
        let yaml = r#"
grace_window_secs: 1.5
pending_capacity: 8
producers:
  - pattern: "^acme-asr"
    kind: stt
"#;
        let config: ObserverConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.grace_window_secs, 1.5);
        assert_eq!(config.pending_capacity, 8);

        let registry = config.registry();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.classify("acme-asr-v2"), Some(ProducerKind::Stt));
        assert_eq!(registry.classify("STTServiceX"), None);
    }

    #[test]
    fn test_validation_rejects_bad_grace_window() {
        let mut config = ObserverConfig::default();
        config.grace_window_secs = -1.0;
        assert!(config.validate().is_err());

        config.grace_window_secs = f64::INFINITY;
        assert!(config.validate().is_err());

        config.grace_window_secs = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_producer_table() {
        let mut config = ObserverConfig::default();
        config.producers.clear();
        assert_eq!(
            config.validate().unwrap_err(),
            "at least one producer rule is required"
        );

        config.producers = vec![ProducerRule::new("(", ProducerKind::Llm)];
        assert!(config.validate().is_err());
    }
}
