//! Property-based tests for dispatch invariants
//!
//! These tests verify that routing, validation and rate limiting hold their
//! invariants across generated inputs rather than hand-picked cases.

use proptest::prelude::*;
use switchboard::domain::{ChatCompletionPayload, ClientIdentity, RawMessage};
use switchboard::providers::ProviderName;
use switchboard::proxy::model_router::{resolve, ProviderRule, ProviderRules, RulePattern};
use switchboard::proxy::rate_limiter::{MaxRequests, RateDecision, RateLimitConfig, RateLimiter, WindowSeconds};
use switchboard::proxy::{validate, ValidationError};

// Property test generators
pub mod generators {
    use super::*;
    use proptest::collection::vec;
    use proptest::string::string_regex;

    pub fn model_name() -> impl Strategy<Value = String> {
        string_regex("[a-z][a-z0-9.-]{0,15}").unwrap()
    }

    pub fn provider_name() -> impl Strategy<Value = ProviderName> {
        string_regex("[a-z][a-z_]{0,9}")
            .unwrap()
            .prop_map(|name| ProviderName::try_new(name).unwrap())
    }

    pub fn rule() -> impl Strategy<Value = ProviderRule> {
        (model_name(), any::<bool>(), provider_name()).prop_map(|(pattern, wildcard, provider)| {
            let pattern = if wildcard {
                format!("{pattern}*")
            } else {
                pattern
            };
            ProviderRule::new(&pattern, provider)
        })
    }

    pub fn rules() -> impl Strategy<Value = ProviderRules> {
        vec(rule(), 0..8).prop_map(ProviderRules::new)
    }

    pub fn role() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("system"), Just("user"), Just("assistant")]
    }

    pub fn message() -> impl Strategy<Value = RawMessage> {
        (role(), string_regex("[a-zA-Z0-9 ]{0,20}[a-zA-Z0-9]").unwrap())
            .prop_map(|(role, content)| RawMessage::new(role, content))
    }

    pub fn conversation() -> impl Strategy<Value = Vec<RawMessage>> {
        vec(message(), 1..10)
    }
}

use generators::*;

proptest! {
    #[test]
    fn resolution_picks_a_listed_provider_or_the_default(
        rules in rules(),
        model in model_name(),
        default in provider_name(),
    ) {
        let resolved = resolve(&model, &rules, &default);
        prop_assert!(resolved == &default || rules.iter().any(|rule| &rule.provider == resolved));
    }

    #[test]
    fn exact_rule_wins_wherever_it_is_listed(
        mut before in proptest::collection::vec(rule(), 0..5),
        after in proptest::collection::vec(rule(), 0..5),
        model in model_name(),
        target in provider_name(),
        default in provider_name(),
    ) {
        // An earlier exact rule for the same model would legitimately win
        before.retain(|rule| rule.pattern != RulePattern::Exact(model.clone()));
        let mut table = before;
        table.push(ProviderRule::new(&model, target.clone()));
        table.extend(after);

        let rules = ProviderRules::new(table);
        prop_assert_eq!(resolve(&model, &rules, &default), &target);
    }

    #[test]
    fn resolution_is_deterministic(rules in rules(), model in model_name(), default in provider_name()) {
        prop_assert_eq!(resolve(&model, &rules, &default), resolve(&model, &rules, &default));
    }

    #[test]
    fn rule_parsing_never_panics(raw in ".{0,64}") {
        let rules = ProviderRules::parse(&raw);
        prop_assert!(rules.len() <= raw.matches('=').count());
    }

    #[test]
    fn well_formed_conversations_validate(model in model_name(), mut messages in conversation()) {
        if let Some(last) = messages.last_mut() {
            if last.role == "assistant" {
                last.role = "user".to_string();
            }
        }
        let count = messages.len();

        let request = validate(ChatCompletionPayload::new(model.clone(), messages));

        prop_assert!(request.is_ok());
        let request = request.unwrap();
        prop_assert_eq!(request.messages().len(), count);
        prop_assert_eq!(request.model().as_ref(), model.as_str());
    }

    #[test]
    fn trailing_assistant_is_always_rejected(model in model_name(), mut messages in conversation()) {
        if let Some(last) = messages.last_mut() {
            last.role = "assistant".to_string();
        }

        prop_assert_eq!(
            validate(ChatCompletionPayload::new(model, messages)),
            Err(ValidationError::TrailingAssistant)
        );
    }

    #[test]
    fn limiter_admits_exactly_the_budget_within_a_window(max in 1u64..20, attempts in 0usize..60) {
        let limiter = RateLimiter::new(RateLimitConfig::new(
            true,
            WindowSeconds::try_new(3600).unwrap(),
            MaxRequests::try_new(max).unwrap(),
        ));
        let identity = ClientIdentity::try_new("prop-client".to_string()).unwrap();

        let admitted = (0..attempts)
            .map(|_| limiter.check(&identity))
            .filter(RateDecision::is_admitted)
            .count();

        prop_assert_eq!(admitted as u64, (attempts as u64).min(max));
    }
}
