//! Default strand templates built from the step library.

use super::{evidence_collection, gap_analysis, monitoring_check, remediation_planning};
use crate::constants::system::{DEFAULT_BASELINE, DEFAULT_FAMILY};
use crate::constants::{step_ids, step_types, templates};
use crate::orchestration::orchestrator::StrandsOrchestrator;
use crate::orchestration::step::Step;
use crate::orchestration::types::TemplateArgs;
use serde_json::{json, Value};

fn baseline_arg(args: &TemplateArgs) -> String {
    args.get("baseline")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_BASELINE)
        .to_string()
}

/// evidence_collection → gap_analysis → monitoring_check → remediation_planning
pub fn compliance_assessment_steps(target_controls: &[String], args: &TemplateArgs) -> Vec<Step> {
    vec![
        Step::new(
            step_ids::EVIDENCE_COLLECTION,
            step_types::EVIDENCE,
            "Collect evidence for target controls",
            evidence_collection(),
        ),
        Step::new(
            step_ids::GAP_ANALYSIS,
            step_types::ANALYSIS,
            "Perform gap analysis against baseline",
            gap_analysis(),
        )
        .with_parameter("baseline", json!(baseline_arg(args)))
        .depends_on([step_ids::EVIDENCE_COLLECTION]),
        Step::new(
            step_ids::MONITORING_CHECK,
            step_types::MONITORING,
            "Run monitoring checks on controls",
            monitoring_check(),
        )
        .with_parameter("controls_to_check", json!(target_controls))
        .depends_on([step_ids::GAP_ANALYSIS]),
        Step::new(
            step_ids::REMEDIATION_PLANNING,
            step_types::PLANNING,
            "Create remediation plans for gaps",
            remediation_planning(),
        )
        .depends_on([step_ids::GAP_ANALYSIS, step_ids::MONITORING_CHECK]),
    ]
}

/// Three-step chain over the target controls of one family (`family` arg, default `AC`)
pub fn family_assessment_steps(target_controls: &[String], args: &TemplateArgs) -> Vec<Step> {
    let family = args
        .get("family")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_FAMILY)
        .to_uppercase();
    let prefix = format!("{family}-");
    let family_controls: Vec<&String> = target_controls
        .iter()
        .filter(|control_id| control_id.starts_with(&prefix))
        .collect();

    vec![
        Step::new(
            step_ids::FAMILY_EVIDENCE_COLLECTION,
            step_types::EVIDENCE,
            format!("Collect evidence for {family} family controls"),
            evidence_collection(),
        )
        .with_parameter("controls", json!(family_controls)),
        Step::new(
            step_ids::FAMILY_MONITORING,
            step_types::MONITORING,
            format!("Monitor {family} family controls"),
            monitoring_check(),
        )
        .with_parameter("controls_to_check", json!(family_controls))
        .depends_on([step_ids::FAMILY_EVIDENCE_COLLECTION]),
        Step::new(
            step_ids::FAMILY_GAP_ANALYSIS,
            step_types::ANALYSIS,
            format!("Analyze gaps in {family} family"),
            gap_analysis(),
        )
        .with_parameter("baseline", json!(baseline_arg(args)))
        .depends_on([step_ids::FAMILY_MONITORING]),
    ]
}

/// Register `compliance_assessment` and `family_assessment`
pub fn register_default_templates(orchestrator: &StrandsOrchestrator) {
    orchestrator.register_template(
        templates::COMPLIANCE_ASSESSMENT,
        "Compliance Assessment Workflow",
        "Comprehensive compliance assessment with evidence collection, gap analysis, and remediation planning",
        compliance_assessment_steps,
    );
    orchestrator.register_template(
        templates::FAMILY_ASSESSMENT,
        "Family Assessment Workflow",
        "Assessment focused on a specific control family",
        family_assessment_steps,
    );
}
