//! `rules:` evaluation

use glhub_core::domain::job::When;
use glhub_core::domain::pipeline::Rule;

use crate::expression::{Variables, evaluate};

/// Resolve the `when` selected by a rules list
///
/// The first rule whose `if` holds (or that has no `if`) decides; a
/// matching rule without `when` means `on_success`. When nothing matches
/// the job must not run, so the result is `never`.
pub fn evaluate_rules<V: Variables + ?Sized>(rules: &[Rule], vars: &V) -> When {
    rules
        .iter()
        .find(|rule| match &rule.condition {
            Some(condition) => evaluate(condition, vars),
            None => true,
        })
        .map(|rule| rule.when.unwrap_or(When::OnSuccess))
        .unwrap_or(When::Never)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn push_rules() -> Vec<Rule> {
        vec![
            Rule {
                condition: Some(r#"$CI_PIPELINE_SOURCE == "push""#.to_string()),
                when: Some(When::OnSuccess),
            },
            Rule {
                condition: None,
                when: Some(When::Never),
            },
        ]
    }

    fn ctx(source: &str) -> HashMap<String, String> {
        HashMap::from([("CI_PIPELINE_SOURCE".to_string(), source.to_string())])
    }

    #[test]
    fn test_first_matching_rule_wins() {
        assert_eq!(evaluate_rules(&push_rules(), &ctx("push")), When::OnSuccess);
        assert_eq!(
            evaluate_rules(&push_rules(), &ctx("merge_request_event")),
            When::Never
        );
    }

    #[test]
    fn test_matching_rule_without_when_defaults_to_on_success() {
        let rules = vec![Rule {
            condition: Some("$CI_PIPELINE_SOURCE".to_string()),
            when: None,
        }];
        assert_eq!(evaluate_rules(&rules, &ctx("push")), When::OnSuccess);
    }

    #[test]
    fn test_no_match_means_never() {
        let rules = vec![Rule {
            condition: Some("$UNSET".to_string()),
            when: Some(When::Always),
        }];
        assert_eq!(evaluate_rules(&rules, &ctx("push")), When::Never);
    }
}
