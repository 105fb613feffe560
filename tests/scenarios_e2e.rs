mod common;

use std::sync::Arc;

use agentgate::{
    Action, Context, PolicyError, Predicate, Reasoner, ReasonerConfig, ReasoningMode, RuleSpec,
    RuleType,
};

use common::{
    delete_without_backup, sealed_registry, BrokenAdvisor, FixedAdvisor, HangingAdvisor,
};

const ALL_MODES: [ReasoningMode; 3] = [
    ReasoningMode::SymbolicOnly,
    ReasoningMode::NeuralThenSymbolic,
    ReasoningMode::Hybrid,
];

#[test]
fn delete_without_backup_is_rejected() {
    let reasoner = Reasoner::new(sealed_registry(), ReasonerConfig::default());
    let result = reasoner.reason(&delete_without_backup(), ReasoningMode::SymbolicOnly);

    assert_eq!(result.decision(), &Action::Reject);
    assert!(!result.constraints_satisfied());
    assert_eq!(result.triggered_rules(), ["no_delete_without_backup".to_string()]);
    assert!((result.confidence() - 1.0).abs() < f64::EPSILON);
    assert_eq!(
        result.proof()[0],
        "EVAL rule=no_delete_without_backup type=SAFETY priority=90 triggered=true action=REJECT"
    );
}

#[test]
fn delete_with_backup_proceeds() {
    let reasoner = Reasoner::new(sealed_registry(), ReasonerConfig::default());
    let ctx = Context::builder()
        .fact("action_type", "delete")
        .fact("has_backup", true)
        .build();
    let result = reasoner.reason(&ctx, ReasoningMode::SymbolicOnly);

    assert_eq!(result.decision(), &Action::Proceed);
    assert!(result.constraints_satisfied());
    assert!(result.triggered_rules().is_empty());
    assert!((result.confidence() - 0.5).abs() < f64::EPSILON);
}

#[test]
fn custom_rule_in_reserved_band_is_refused() {
    let registry = sealed_registry();
    let before = registry.get_rule_stats();

    let spec = RuleSpec::new("allow_all_deletes", RuleType::Constraint, 95, &Action::Proceed)
        .condition("delete", Predicate::equals("action_type", "delete"));
    let err = registry.add_custom_rule(&spec).unwrap_err();

    assert!(matches!(err, PolicyError::PriorityOutOfRange { priority: 95, .. }));
    assert_eq!(registry.get_rule_stats(), before);
}

#[test]
fn disabling_a_system_rule_fails_and_it_keeps_firing() {
    let registry = sealed_registry();
    let err = registry.disable_rule("no_delete_without_backup").unwrap_err();
    assert!(matches!(err, PolicyError::ImmutableRuleError { .. }));
    assert!(registry.get_rule("no_delete_without_backup").unwrap().is_enabled());

    let reasoner = Reasoner::new(registry, ReasonerConfig::default());
    let result = reasoner.reason(&delete_without_backup(), ReasoningMode::SymbolicOnly);
    assert_eq!(result.decision(), &Action::Reject);
}

#[test]
fn hybrid_constraint_overrides_confident_advisor() {
    let registry = sealed_registry();
    registry
        .add_custom_rule(
            &RuleSpec::new("wait_for_migration", RuleType::Constraint, 40, &Action::Defer)
                .condition("migration pending", Predicate::is_true("migration_pending")),
        )
        .unwrap();

    let advisor = FixedAdvisor::new(Action::Proceed, 0.9);
    let reasoner = Reasoner::new(registry, ReasonerConfig::default()).with_advisor(advisor.clone());
    let ctx = Context::builder()
        .task("apply schema change")
        .fact("migration_pending", true)
        .build();

    let result = reasoner.reason(&ctx, ReasoningMode::Hybrid);

    assert_eq!(result.decision(), &Action::Defer);
    assert!(!result.constraints_satisfied());
    assert_eq!(advisor.calls(), 1);
    assert!((result.confidence() - 0.95).abs() < 1e-12);
    let override_line = result
        .proof()
        .iter()
        .find(|l| l.starts_with("OVERRIDE"))
        .expect("override line");
    assert!(override_line.contains("rule=wait_for_migration"));
    assert!(override_line.contains("replaces advisor suggestion PROCEED"));
}

#[test]
fn advisor_timeout_matches_symbolic_only() {
    let config = ReasonerConfig {
        advisor_timeout_ms: 40,
        ..ReasonerConfig::default()
    };
    let reasoner =
        Reasoner::new(sealed_registry(), config).with_advisor(Arc::new(HangingAdvisor));
    let ctx = delete_without_backup();

    let symbolic = reasoner.reason(&ctx, ReasoningMode::SymbolicOnly);
    for mode in [ReasoningMode::NeuralThenSymbolic, ReasoningMode::Hybrid] {
        let timed_out = reasoner.reason(&ctx, mode);

        assert_eq!(timed_out.decision(), symbolic.decision());
        assert_eq!(timed_out.constraints_satisfied(), symbolic.constraints_satisfied());
        assert_eq!(timed_out.triggered_rules(), symbolic.triggered_rules());
        assert_eq!(timed_out.confidence().to_bits(), symbolic.confidence().to_bits());
        assert_eq!(timed_out.reasoning_mode(), ReasoningMode::SymbolicOnly);
        assert_eq!(timed_out.requested_mode(), mode);
        assert!(timed_out.neural_output().is_none());

        let fallback: Vec<&String> = timed_out
            .proof()
            .iter()
            .filter(|l| l.starts_with("neural-fallback"))
            .collect();
        assert_eq!(fallback.len(), 1);
        assert!(fallback[0].contains("timed out after 40ms"));

        let without_fallback: Vec<&String> = timed_out
            .proof()
            .iter()
            .filter(|l| !l.starts_with("neural-fallback"))
            .collect();
        let expected: Vec<&String> = symbolic.proof().iter().collect();
        assert_eq!(without_fallback, expected);
    }
}

#[test]
fn transport_failure_falls_back_too() {
    let reasoner = Reasoner::new(sealed_registry(), ReasonerConfig::default())
        .with_advisor(Arc::new(BrokenAdvisor));
    let result = reasoner.reason(&Context::default(), ReasoningMode::NeuralThenSymbolic);
    assert!(result.fell_back());
    assert_eq!(result.decision(), &Action::Proceed);
    assert!(result
        .proof()
        .iter()
        .any(|l| l.starts_with("neural-fallback") && l.contains("503 service unavailable")));
}

#[test]
fn safety_reject_wins_in_every_mode_regardless_of_advisor() {
    for suggestion in [Action::Proceed, Action::Warn, Action::Suggest, Action::Split] {
        let reasoner = Reasoner::new(sealed_registry(), ReasonerConfig::default())
            .with_advisor(FixedAdvisor::new(suggestion.clone(), 1.0));
        for mode in ALL_MODES {
            let result = reasoner.reason(&delete_without_backup(), mode);
            assert_eq!(result.decision(), &Action::Reject, "mode={mode} suggestion={suggestion}");
            assert!(!result.constraints_satisfied());
        }
    }
}

#[test]
fn reasoning_is_deterministic() {
    let registry = sealed_registry();
    for (id, priority) in [("z_warn", 30), ("a_warn", 30), ("m_suggest", 30)] {
        registry
            .add_custom_rule(
                &RuleSpec::new(id, RuleType::BestPractice, priority, &Action::Warn)
                    .condition("delete", Predicate::equals("action_type", "delete")),
            )
            .unwrap();
    }
    let reasoner = Reasoner::new(registry, ReasonerConfig::default())
        .with_advisor(FixedAdvisor::new(Action::Proceed, 0.7));
    let ctx = Context::builder()
        .fact("action_type", "delete")
        .fact("has_backup", true)
        .build();

    for mode in ALL_MODES {
        let first = reasoner.reason(&ctx, mode);
        let second = reasoner.reason(&ctx, mode);
        assert_eq!(first, second, "mode={mode}");
        assert_eq!(first.confidence().to_bits(), second.confidence().to_bits());
    }

    let result = reasoner.reason(&ctx, ReasoningMode::SymbolicOnly);
    assert_eq!(result.winning_rule(), Some("a_warn"));
    assert_eq!(
        result.triggered_rules(),
        ["a_warn".to_string(), "m_suggest".to_string(), "z_warn".to_string()]
    );
}

#[test]
fn advisor_suggestion_stands_with_annotations() {
    let registry = sealed_registry();
    registry
        .add_custom_rule(
            &RuleSpec::new("suggest_changelog", RuleType::BestPractice, 10, &Action::Suggest)
                .condition("public api", Predicate::is_true("modifies_public_api")),
        )
        .unwrap();
    let reasoner = Reasoner::new(registry, ReasonerConfig::default())
        .with_advisor(FixedAdvisor::new(Action::Proceed, 0.8));
    let ctx = Context::builder().fact("modifies_public_api", true).build();

    let result = reasoner.reason(&ctx, ReasoningMode::NeuralThenSymbolic);
    assert_eq!(result.decision(), &Action::Proceed);
    assert!((result.confidence() - 0.8).abs() < f64::EPSILON);

    let proof = result.proof();
    let neural = proof.iter().position(|l| l.starts_with("NEURAL")).unwrap();
    let annotate = proof.iter().position(|l| l.starts_with("ANNOTATE rule=suggest_changelog")).unwrap();
    let decision = proof.iter().position(|l| l.starts_with("DECISION")).unwrap();
    assert!(neural < annotate && annotate < decision);
    assert_eq!(decision, proof.len() - 1);
}

#[test]
fn dependency_defers_but_does_not_bind_the_advisor() {
    let registry = sealed_registry();
    registry
        .add_custom_rule(
            &RuleSpec::new("needs_build", RuleType::Dependency, 50, &Action::Defer)
                .condition("build missing", Predicate::is_false("build_succeeded")),
        )
        .unwrap();
    let reasoner = Reasoner::new(registry, ReasonerConfig::default())
        .with_advisor(FixedAdvisor::new(Action::Proceed, 0.6));
    let ctx = Context::builder().fact("build_succeeded", false).build();

    let symbolic = reasoner.reason(&ctx, ReasoningMode::SymbolicOnly);
    assert_eq!(symbolic.decision(), &Action::Defer);
    assert!(symbolic.constraints_satisfied());

    let neural = reasoner.reason(&ctx, ReasoningMode::NeuralThenSymbolic);
    assert_eq!(neural.decision(), &Action::Proceed);
    assert!(!neural.proof().iter().any(|l| l.starts_with("OVERRIDE")));
}

#[test]
fn missing_context_is_recorded_in_proof() {
    let reasoner = Reasoner::new(sealed_registry(), ReasonerConfig::default());
    let ctx = Context::builder().fact("action_type", "delete").build();
    let result = reasoner.reason(&ctx, ReasoningMode::SymbolicOnly);

    assert_eq!(result.decision(), &Action::Proceed);
    assert!(result.proof().iter().any(|l| l.starts_with("NOTE rule=no_delete_without_backup")
        && l.contains("missing-context: key 'has_backup' is absent")));
}

#[test]
fn mismatched_fact_type_never_triggers_and_is_noted() {
    let registry = sealed_registry();
    registry
        .add_custom_rule(
            &RuleSpec::new("non_prod_split", RuleType::Constraint, 50, &Action::Split)
                .condition("not production", Predicate::not_equals("deployment_target", "production")),
        )
        .unwrap();
    let reasoner = Reasoner::new(registry, ReasonerConfig::default());
    let ctx = Context::builder().fact("deployment_target", 3_i64).build();

    let result = reasoner.reason(&ctx, ReasoningMode::SymbolicOnly);

    assert_eq!(result.decision(), &Action::Proceed);
    assert!(result.triggered_rules().is_empty());
    assert!(result.proof().iter().any(|l| l.starts_with("NOTE rule=non_prod_split")
        && l.contains("key 'deployment_target' type-mismatch (expected string, found int)")));
}
