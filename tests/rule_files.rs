use std::fs;
use std::sync::Arc;

use agentgate::{
    Action, Context, GateError, PolicyError, Reasoner, ReasonerConfig, ReasoningMode,
    RuleRegistry, RuleTable, RuleType,
};
use tempfile::TempDir;

const CUSTOM_TABLE: &str = r#"{
  "version": 3,
  "rules": [
    {
      "rule_id": "team.migrations:wait",
      "rule_type": "CONSTRAINT",
      "priority": 60,
      "conditions": [
        {"description": "a migration is pending", "predicate_ref": {"op": "is_true", "key": "migration_pending"}}
      ],
      "action": {"type": "defer"}
    },
    {
      "rule_id": "team.docs:suggest",
      "rule_type": "BEST_PRACTICE",
      "priority": 15,
      "conditions": [
        {"description": "large diff", "predicate_ref": {"op": "greater_than", "key": "lines_changed", "bound": 200}}
      ],
      "action": {"type": "require_changelog"}
    }
  ]
}"#;

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn custom_table_loads_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "custom.json", CUSTOM_TABLE);

    let table = RuleTable::from_path(&path).unwrap();
    assert_eq!(table.version, 3);

    let registry = Arc::new(RuleRegistry::with_default_system_rules().unwrap());
    let system_count = registry.len();
    let added = registry.load_custom_rules(&table).unwrap();
    assert_eq!(added, ["team.migrations:wait", "team.docs:suggest"]);
    assert_eq!(registry.len(), system_count + 2);

    let docs = registry.get_rule("team.docs:suggest").unwrap();
    assert_eq!(docs.action(), &Action::require("changelog"));
    assert_eq!(docs.rule_type(), RuleType::BestPractice);
    assert!(!docs.is_immutable());

    let reasoner = Reasoner::new(registry, ReasonerConfig::default());
    let ctx = Context::builder().fact("migration_pending", true).build();
    let result = reasoner.reason(&ctx, ReasoningMode::SymbolicOnly);
    assert_eq!(result.decision(), &Action::Defer);
    assert_eq!(result.winning_rule(), Some("team.migrations:wait"));
}

#[test]
fn one_bad_rule_rejects_the_whole_table() {
    let dir = TempDir::new().unwrap();
    let mut table: RuleTable = serde_json::from_str(CUSTOM_TABLE).unwrap();
    table.rules[1].priority = 85;
    let path = write(&dir, "custom.json", &serde_json::to_string_pretty(&table).unwrap());

    let registry = RuleRegistry::with_default_system_rules().unwrap();
    let before = registry.get_rule_stats();

    let table = RuleTable::from_path(&path).unwrap();
    let err = registry.load_custom_rules(&table).unwrap_err();
    assert!(matches!(
        err,
        PolicyError::PriorityOutOfRange { ref rule_id, priority: 85, .. } if rule_id == "team.docs:suggest"
    ));
    assert!(registry.get_rule("team.migrations:wait").is_none());
    assert_eq!(registry.get_rule_stats(), before);
}

#[test]
fn system_table_bootstraps_and_seals() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "system.json",
        r#"{"version": 1, "rules": [{
            "rule_id": "no_force_push",
            "rule_type": "SAFETY",
            "priority": 99,
            "conditions": [{"predicate_ref": {"op": "equals", "key": "git_command", "value": "push --force"}}],
            "action": {"type": "REJECT"}
        }]}"#,
    );

    let registry = RuleRegistry::bootstrap(&RuleTable::from_path(&path).unwrap()).unwrap();
    assert!(registry.is_sealed());
    let rule = registry.get_rule("no_force_push").unwrap();
    assert!(rule.is_immutable());
    assert_eq!(rule.priority(), 99);
}

#[test]
fn unreadable_or_malformed_files_are_rule_table_errors() {
    let dir = TempDir::new().unwrap();

    let missing = RuleTable::from_path(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(missing, GateError::RuleTable { .. }));

    let path = write(&dir, "broken.json", "{\"version\": 1, \"rules\": [");
    let broken = RuleTable::from_path(&path).unwrap_err();
    assert!(matches!(broken, GateError::RuleTable { .. }));
}

#[test]
fn default_system_rules_are_sealed_and_reserved() {
    let registry = RuleRegistry::with_default_system_rules().unwrap();
    let stats = registry.get_rule_stats();
    assert!(registry.is_sealed());
    assert_eq!(stats.custom_rules, 0);
    assert_eq!(stats.system_rules, stats.total_rules);
    assert!(registry
        .snapshot()
        .rules()
        .iter()
        .all(|r| r.is_immutable() && r.priority() >= agentgate::RESERVED_MIN));

    let reasoner = Reasoner::new(Arc::new(registry), ReasonerConfig::default());
    let ctx = Context::builder()
        .fact("action_type", "deploy")
        .fact("deployment_target", "production")
        .fact("tests_passed", false)
        .fact("build_succeeded", false)
        .build();
    let result = reasoner.reason(&ctx, ReasoningMode::SymbolicOnly);
    assert_eq!(result.decision(), &Action::Reject);
    assert_eq!(result.winning_rule(), Some("no_production_deploy_without_tests"));
    assert!(result
        .triggered_rules()
        .contains(&"deploy_requires_successful_build".to_string()));
}
