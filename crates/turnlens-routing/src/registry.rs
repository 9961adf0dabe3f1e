//! Producer registry
//!
//! Maps producer names (e.g. `DeepgramSTTService#0`) to producer kinds using
//! an ordered table of case-insensitive regex patterns. The table is plain
//! configuration, so new vendors are supported by adding a rule rather than
//! by changing the engine.

use once_cell::sync::OnceCell;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use turnlens_core::ProducerKind;

/// A rule mapping a producer name pattern to a producer kind
#[derive(Debug, Serialize, Deserialize)]
pub struct ProducerRule {
    /// Priority of this rule (higher = evaluated first)
    #[serde(default)]
    pub priority: i32,
    /// Optional name for the rule (for debugging/logging)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Regex matched case-insensitively against the producer name
    pub pattern: String,
    /// Kind assigned to matching producers
    pub kind: ProducerKind,
    /// Compiled regex (lazily initialized, not serialized)
    #[serde(skip)]
    compiled: OnceCell<Option<Regex>>,
}

// Implement Clone manually because OnceCell doesn't implement Clone
impl Clone for ProducerRule {
    fn clone(&self) -> Self {
        Self {
            priority: self.priority,
            name: self.name.clone(),
            pattern: self.pattern.clone(),
            kind: self.kind,
            compiled: OnceCell::new(), // New cell for the clone
        }
    }
}

impl ProducerRule {
    pub fn new(pattern: impl Into<String>, kind: ProducerKind) -> Self {
        Self {
            priority: 0,
            name: None,
            pattern: pattern.into(),
            kind,
            compiled: OnceCell::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name used in logs
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.kind, self.pattern))
    }

    fn build(pattern: &str) -> Result<Regex, regex::Error> {
        RegexBuilder::new(pattern).case_insensitive(true).build()
    }

    /// Check that the pattern compiles
    pub fn validate(&self) -> Result<(), String> {
        Self::build(&self.pattern)
            .map(|_| ())
            .map_err(|e| format!("invalid producer pattern '{}': {}", self.pattern, e))
    }

    /// Check if this rule matches the given producer name
    pub fn matches(&self, producer_name: &str) -> bool {
        // Get or compile regex (cached for performance)
        let regex_opt = self.compiled.get_or_init(|| match Self::build(&self.pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(
                    "Invalid regex pattern '{}' in producer rule: {}",
                    self.pattern,
                    e
                );
                None
            }
        });

        regex_opt
            .as_ref()
            .is_some_and(|regex| regex.is_match(producer_name))
    }
}

/// Built-in producer table
///
/// Speech service rules are anchored on the name suffix (`STT`/`TTS`, then an
/// optional `Service`, then an optional instance number) since vendor names
/// such as `ElevenLabsTTS#0` or `AWSTTS_1` also contain the letters `stt`.
pub fn default_rules() -> Vec<ProducerRule> {
    vec![
        ProducerRule::new(r"smart_?turn|turn_?(analyzer|detect)", ProducerKind::TurnDetector)
            .with_priority(40)
            .with_name("turn_detector"),
        ProducerRule::new(
            r"stt[-_]?(service\w?)?([#_-]?\d+)?$|speech_?to_?text|transcri",
            ProducerKind::Stt,
        )
        .with_priority(30)
        .with_name("stt"),
        ProducerRule::new(
            r"tts[-_]?(service\w?)?([#_-]?\d+)?$|text_?to_?speech",
            ProducerKind::Tts,
        )
        .with_priority(20)
        .with_name("tts"),
        ProducerRule::new(r"llm", ProducerKind::Llm)
            .with_priority(10)
            .with_name("llm"),
    ]
}

/// Ordered producer table
#[derive(Debug, Clone)]
pub struct ProducerRegistry {
    /// Rules sorted by priority, highest first
    rules: Vec<ProducerRule>,
}

impl ProducerRegistry {
    /// Create an empty registry (classifies nothing)
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a registry with the given rules
    pub fn with_rules(mut rules: Vec<ProducerRule>) -> Self {
        // Stable sort keeps declaration order among equal priorities
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules }
    }

    /// Add a rule to the registry
    pub fn add_rule(&mut self, rule: ProducerRule) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Find the first rule matching the producer name
    pub fn find_rule(&self, producer_name: &str) -> Option<&ProducerRule> {
        self.rules.iter().find(|rule| rule.matches(producer_name))
    }

    /// Classify a producer name
    pub fn classify(&self, producer_name: &str) -> Option<ProducerKind> {
        match self.find_rule(producer_name) {
            Some(rule) => {
                tracing::trace!(
                    producer = producer_name,
                    rule = %rule.display_name(),
                    kind = %rule.kind,
                    "Classified producer"
                );
                Some(rule.kind)
            }
            None => None,
        }
    }

    /// Validate every pattern in the table
    pub fn validate(&self) -> Result<(), String> {
        self.rules.iter().try_for_each(ProducerRule::validate)
    }

    /// Get all rules (sorted by priority)
    pub fn rules(&self) -> &[ProducerRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for ProducerRegistry {
    fn default() -> Self {
        Self::with_rules(default_rules())
    }
}
