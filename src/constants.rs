//! # System Constants
//!
//! Well-known context keys, template names and built-in step ids. The built-in
//! step library reads and writes the shared strand context only through the keys
//! declared here, which makes this module the context's mini-schema.

/// Keys written into every strand context when execution starts
pub mod context_keys {
    pub const STRAND_ID: &str = "strand_id";
    pub const TARGET_CONTROLS: &str = "target_controls";
    pub const START_TIME: &str = "start_time";
    /// Map of step id to the payload the step returned
    pub const RESULTS: &str = "results";
    pub const ERRORS: &str = "errors";

    // Built-in step library
    pub const EVIDENCE_RESULTS: &str = "evidence_results";
    pub const GAP_ANALYSIS_RESULT: &str = "gap_analysis_result";
    pub const MONITORING_RESULTS: &str = "monitoring_results";
    pub const REMEDIATION_PLAN: &str = "remediation_plan";
}

/// Names of the templates registered by `register_default_templates`
pub mod templates {
    pub const COMPLIANCE_ASSESSMENT: &str = "compliance_assessment";
    pub const FAMILY_ASSESSMENT: &str = "family_assessment";
}

/// Step ids used by the built-in templates
pub mod step_ids {
    pub const EVIDENCE_COLLECTION: &str = "evidence_collection";
    pub const GAP_ANALYSIS: &str = "gap_analysis";
    pub const MONITORING_CHECK: &str = "monitoring_check";
    pub const REMEDIATION_PLANNING: &str = "remediation_planning";

    pub const FAMILY_EVIDENCE_COLLECTION: &str = "family_evidence_collection";
    pub const FAMILY_MONITORING: &str = "family_monitoring";
    pub const FAMILY_GAP_ANALYSIS: &str = "family_gap_analysis";
}

/// Step type tags
pub mod step_types {
    pub const EVIDENCE: &str = "evidence";
    pub const ANALYSIS: &str = "analysis";
    pub const MONITORING: &str = "monitoring";
    pub const PLANNING: &str = "planning";
}

/// System-wide constants
pub mod system {
    /// Baseline used when a template is built without one
    pub const DEFAULT_BASELINE: &str = "moderate";

    /// Control family used by the family assessment when none is given
    pub const DEFAULT_FAMILY: &str = "AC";

    /// Accepted baseline names
    pub const BASELINES: &[&str] = &["low", "moderate", "high"];

    /// Default upper bound for one step attempt
    pub const DEFAULT_STEP_TIMEOUT_SECONDS: u64 = 300;

    /// Maximum number of steps in a single strand
    pub const MAX_WORKFLOW_STEPS: usize = 1000;

    /// Foundational policy controls flagged first in gap recommendations
    pub const FOUNDATIONAL_CONTROLS: &[&str] = &[
        "AC-1", "AU-1", "CA-1", "CM-1", "CP-1", "IA-1", "IR-1", "PL-1", "RA-1", "SA-1", "SC-1",
        "SI-1",
    ];
}
