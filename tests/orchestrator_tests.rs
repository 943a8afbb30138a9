//! Orchestrator lifecycle and the built-in compliance templates end to end.

mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use strands_core::compliance::{ControlMonitor, EvidenceItem, EvidenceStore, EvidenceType};
use strands_core::constants::context_keys;
use strands_core::orchestration::{Collaborators, StrandsOrchestrator, TemplateArgs};
use strands_core::run_store::{RunStatus, RunStore};
use strands_core::{StepState, StrandState, StrandsError};

fn compliance_orchestrator(store: Arc<dyn RunStore>) -> StrandsOrchestrator {
    let collaborators = Collaborators::default()
        .with_catalog(moderate_catalog())
        .with_monitor(Arc::new(ControlMonitor::new()));
    let orchestrator = StrandsOrchestrator::with_config(store, collaborators, fast_config());
    orchestrator.register_default_templates();
    orchestrator
}

#[tokio::test]
async fn test_compliance_assessment_end_to_end() {
    let store = memory_store();
    let orchestrator = compliance_orchestrator(store.clone());

    let mut args = TemplateArgs::new();
    args.insert("baseline".to_string(), json!("moderate"));
    let mut strand = orchestrator
        .create_strand("compliance_assessment", controls(&["AC-1", "AC-2"]), args)
        .unwrap();
    assert_eq!(strand.name(), "Compliance Assessment Workflow");

    let result = orchestrator.execute_async(&mut strand).await.unwrap();

    assert_eq!(result.status, StrandState::Completed);
    assert_eq!(result.steps_in_state(StepState::Completed).len(), 4);
    for key in [
        context_keys::EVIDENCE_RESULTS,
        context_keys::GAP_ANALYSIS_RESULT,
        context_keys::MONITORING_RESULTS,
        context_keys::REMEDIATION_PLAN,
    ] {
        assert!(result.context.contains_key(key), "missing context key {key}");
    }

    let gap = &result.context[context_keys::GAP_ANALYSIS_RESULT];
    assert_eq!(gap["target_baseline"], "moderate");
    assert_eq!(gap["total_required"], 5);

    // The plan names exactly the controls the gap analysis reported missing
    let missing: Vec<String> = serde_json::from_value(gap["missing_controls"]["controls"].clone()).unwrap();
    let planned: Vec<String> = result.context[context_keys::REMEDIATION_PLAN]
        .as_array()
        .unwrap()
        .iter()
        .map(|action| action["control_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(planned, missing);
    assert!(planned.contains(&"AU-2".to_string()));

    assert_eq!(
        result.context[context_keys::MONITORING_RESULTS]["AC-1"]["status"],
        "pass"
    );
    assert!(orchestrator.get_status(strand.id()).is_none());

    let runs = store.read_runs(strand.id(), 10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn test_explicit_implemented_controls_close_the_gap() {
    let orchestrator = compliance_orchestrator(memory_store());
    orchestrator.register_template("audit_only", "Audit Only", "gap analysis with known inventory", |_, _| {
        vec![strands_core::Step::new(
            "gap",
            "analysis",
            "gap analysis",
            strands_core::steps::gap_analysis(),
        )
        .with_parameter("baseline", json!("low"))
        .with_parameter("implemented_controls", json!(["AC-1", "AU-1", "SC-7"]))]
    });

    let mut strand = orchestrator
        .create_strand("audit_only", controls(&["AC-1"]), TemplateArgs::new())
        .unwrap();
    let result = orchestrator.execute_async(&mut strand).await.unwrap();

    let gap = &result.context[context_keys::GAP_ANALYSIS_RESULT];
    assert_eq!(gap["compliance_percentage"], json!(100.0));
    assert_eq!(gap["missing_controls"]["count"], 0);
    assert_eq!(gap["extra_controls"]["controls"], json!(["SC-7"]));
}

#[tokio::test]
async fn test_family_assessment_checks_only_family_controls() {
    let evidence = Arc::new(EvidenceStore::new());
    evidence.add_evidence(EvidenceItem::new("AU-2", EvidenceType::Log, json!({"path": "audit.log"})));
    let collaborators = Collaborators::default()
        .with_catalog(moderate_catalog())
        .with_monitor(Arc::new(ControlMonitor::new()))
        .with_evidence(evidence);
    let orchestrator = StrandsOrchestrator::with_config(memory_store(), collaborators, fast_config());
    orchestrator.register_default_templates();

    let mut args = TemplateArgs::new();
    args.insert("family".to_string(), json!("AU"));
    let mut strand = orchestrator
        .create_strand("family_assessment", controls(&["AC-1", "AU-1", "AU-2", "CM-2"]), args)
        .unwrap();
    let result = orchestrator.execute_async(&mut strand).await.unwrap();

    let monitored = result.context[context_keys::MONITORING_RESULTS].as_object().unwrap();
    let mut checked: Vec<&str> = monitored.keys().map(String::as_str).collect();
    checked.sort();
    assert_eq!(checked, vec!["AU-1", "AU-2"]);

    let evidence_results = &result.context[context_keys::EVIDENCE_RESULTS];
    assert_eq!(evidence_results["AU-2"]["evidence_found"], true);
    assert_eq!(evidence_results["AU-1"]["evidence_found"], false);
    assert!(evidence_results.get("AC-1").is_none());
    assert!(result.context.contains_key(context_keys::GAP_ANALYSIS_RESULT));
}

#[tokio::test]
async fn test_missing_catalog_fails_gap_analysis() {
    let orchestrator = StrandsOrchestrator::with_config(memory_store(), Collaborators::default(), fast_config());
    orchestrator.register_default_templates();

    let mut strand = orchestrator
        .create_strand("compliance_assessment", controls(&["AC-1"]), TemplateArgs::new())
        .unwrap();
    let error = orchestrator.execute_async(&mut strand).await.unwrap_err();

    assert_eq!(error.implicated_steps(), ["gap_analysis".to_string()]);
    assert_eq!(
        strand.step("gap_analysis").unwrap().error(),
        Some("Control catalog not provided in workflow context")
    );
    assert_eq!(strand.step("evidence_collection").unwrap().state(), StepState::Completed);
    assert_eq!(strand.step("remediation_planning").unwrap().state(), StepState::Pending);
    assert!(orchestrator.list_active().is_empty());
}

#[tokio::test]
async fn test_unknown_template_is_rejected() {
    let orchestrator = compliance_orchestrator(memory_store());

    let error = orchestrator
        .create_strand("does_not_exist", controls(&["AC-1"]), TemplateArgs::new())
        .unwrap_err();

    assert!(matches!(error, StrandsError::UnknownTemplate(ref name) if name == "does_not_exist"));
    assert!(orchestrator.list_active().is_empty());
}

#[tokio::test]
async fn test_reregistration_replaces_template() {
    let orchestrator = compliance_orchestrator(memory_store());
    orchestrator.register_template("compliance_assessment", "Replaced", "single step", |_, _| {
        vec![noop_step("only")]
    });

    let mut strand = orchestrator
        .create_strand("compliance_assessment", controls(&["AC-1"]), TemplateArgs::new())
        .unwrap();

    assert_eq!(strand.name(), "Replaced");
    assert_eq!(strand.steps().len(), 1);
    assert_eq!(orchestrator.list_templates().len(), 2);
    orchestrator.execute_async(&mut strand).await.unwrap();
}

#[tokio::test]
async fn test_status_and_progress_while_running() {
    let orchestrator = StrandsOrchestrator::with_config(memory_store(), Collaborators::default(), fast_config());
    orchestrator.register_template("two_phase", "Two Phase", "", |_, _| {
        vec![
            noop_step("quick"),
            sleeping_step("slow", Duration::from_millis(300)).depends_on(["quick"]),
        ]
    });

    let mut first = orchestrator
        .create_strand("two_phase", controls(&["AC-1"]), TemplateArgs::new())
        .unwrap();
    let second = orchestrator
        .create_strand("two_phase", controls(&["AC-2"]), TemplateArgs::new())
        .unwrap();
    let first_id = first.id().to_string();
    assert_eq!(orchestrator.list_active().len(), 2);

    let observe = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        orchestrator.get_status(&first_id)
    };
    let (result, observed) = tokio::join!(orchestrator.execute_async(&mut first), observe);

    let observed = observed.unwrap();
    assert_eq!(observed.status, StrandState::Running);
    assert_eq!(observed.progress, 0.5);
    assert_eq!(observed.target_controls, controls(&["AC-1"]));
    assert_eq!(result.unwrap().status, StrandState::Completed);

    let remaining = orchestrator.list_active();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].strand_id, second.id());
    assert_eq!(remaining[0].status, StrandState::Pending);
}

#[tokio::test]
async fn test_cancel_active_strand() {
    let store = memory_store();
    let orchestrator = StrandsOrchestrator::with_config(store.clone(), Collaborators::default(), fast_config());
    orchestrator.register_template("long", "Long", "", |_, _| {
        vec![
            sleeping_step("wait", Duration::from_secs(10)),
            noop_step("never").depends_on(["wait"]),
        ]
    });

    let mut strand = orchestrator
        .create_strand("long", controls(&["AC-1"]), TemplateArgs::new())
        .unwrap();
    let strand_id = strand.id().to_string();

    let cancel = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        orchestrator.cancel(&strand_id)
    };
    let (result, cancelled) = tokio::join!(orchestrator.execute_async(&mut strand), cancel);

    assert!(cancelled);
    assert_eq!(result.unwrap_err(), StrandsError::Cancelled(strand_id.clone()));
    assert_eq!(strand.status(), StrandState::Cancelled);
    assert_eq!(strand.step("never").unwrap().state(), StepState::Pending);
    assert!(orchestrator.get_status(&strand_id).is_none());

    let runs = store.read_runs(&strand_id, 10).await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Cancelled);
    assert_eq!(
        runs[0].error_message.as_deref(),
        Some(format!("Workflow cancelled: strand {strand_id}").as_str())
    );
}

#[tokio::test]
async fn test_failed_run_is_recorded_with_reason() {
    let store = memory_store();
    let orchestrator = StrandsOrchestrator::with_config(store.clone(), Collaborators::default(), fast_config());
    orchestrator.register_template("broken", "Broken", "", |_, _| vec![failing_step("bad", "upstream unavailable")]);

    let mut strand = orchestrator
        .create_strand("broken", controls(&[]), TemplateArgs::new())
        .unwrap();
    orchestrator.execute_async(&mut strand).await.unwrap_err();

    let history = orchestrator.run_history(strand.id(), 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, RunStatus::Failed);
    let message = history[0].error_message.as_deref().unwrap();
    assert!(message.starts_with("Workflow failed:"));
    assert!(message.contains("bad"));
    assert!(history[0].completed_at.is_some());
}
