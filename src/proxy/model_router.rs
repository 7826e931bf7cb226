//! Resolution of model names to provider names
//!
//! An exact rule always wins. Otherwise the longest matching `*` prefix wins,
//! ties going to the rule listed first. With no match the default applies.

use crate::domain::ModelName;
use crate::providers::ProviderName;
use tracing::debug;

/// Trailing marker that turns a rule into a prefix match
pub const WILDCARD: char = '*';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulePattern {
    Exact(String),
    Prefix(String),
}

impl RulePattern {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_suffix(WILDCARD) {
            Some(prefix) => Self::Prefix(prefix.to_string()),
            None => Self::Exact(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRule {
    pub pattern: RulePattern,
    pub provider: ProviderName,
}

impl ProviderRule {
    pub fn new(pattern: &str, provider: ProviderName) -> Self {
        Self {
            pattern: RulePattern::parse(pattern),
            provider,
        }
    }
}

/// Ordered rule table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderRules(Vec<ProviderRule>);

impl ProviderRules {
    pub fn new(rules: Vec<ProviderRule>) -> Self {
        Self(rules)
    }

    /// Parse `"gpt-4=ollama,local-*=stub"`
    ///
    /// Entries that are blank, lack `=`, or name an empty pattern or provider
    /// are ignored.
    pub fn parse(raw: &str) -> Self {
        let rules = raw
            .split(',')
            .filter_map(|entry| {
                let (pattern, provider) = entry.split_once('=')?;
                let pattern = pattern.trim();
                if pattern.is_empty() {
                    return None;
                }
                let provider = ProviderName::try_new(provider.to_string()).ok()?;
                Some(ProviderRule::new(pattern, provider))
            })
            .collect();
        Self(rules)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderRule> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Pick the provider for `model`
pub fn resolve<'a>(
    model: &str,
    rules: &'a ProviderRules,
    default_provider: &'a ProviderName,
) -> &'a ProviderName {
    let exact = rules.iter().find(|rule| match &rule.pattern {
        RulePattern::Exact(name) => name == model,
        RulePattern::Prefix(_) => false,
    });
    if let Some(rule) = exact {
        return &rule.provider;
    }

    let mut best: Option<(usize, &ProviderRule)> = None;
    for rule in rules.iter() {
        if let RulePattern::Prefix(prefix) = &rule.pattern {
            let longer = match best {
                Some((len, _)) => prefix.len() > len,
                None => true,
            };
            if model.starts_with(prefix.as_str()) && longer {
                best = Some((prefix.len(), rule));
            }
        }
    }

    best.map_or(default_provider, |(_, rule)| &rule.provider)
}

/// Rule table paired with its default, shared read-only after startup
#[derive(Debug, Clone)]
pub struct ModelRouter {
    rules: ProviderRules,
    default_provider: ProviderName,
}

impl ModelRouter {
    pub fn new(rules: ProviderRules, default_provider: ProviderName) -> Self {
        Self {
            rules,
            default_provider,
        }
    }

    pub fn route(&self, model: &ModelName) -> &ProviderName {
        let provider = resolve(model.as_ref(), &self.rules, &self.default_provider);
        debug!(model = %model, provider = %provider, "Resolved provider for model");
        provider
    }

    pub fn default_provider(&self) -> &ProviderName {
        &self.default_provider
    }

    pub fn rules(&self) -> &ProviderRules {
        &self.rules
    }
}
