//! # Compliance Collaborators
//!
//! The data source, monitor and evidence store that the built-in step library
//! consults through the strand context. The orchestration engine never touches
//! these directly.

pub mod catalog;
pub mod evidence;
pub mod gap_analysis;
pub mod monitor;

use thiserror::Error;

pub use catalog::{ControlCatalog, StaticCatalog};
pub use evidence::{EvidenceItem, EvidenceStatus, EvidenceStore, EvidenceSummary, EvidenceType};
pub use gap_analysis::{analyze_gaps, ControlSet, FamilyCoverage, GapAnalysis};
pub use monitor::{CheckResult, CheckStatus, ComplianceConnector, ControlMonitor};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComplianceError {
    #[error("Unknown baseline '{0}': expected one of low, moderate, high")]
    UnknownBaseline(String),
    #[error("Catalog error: {0}")]
    Catalog(String),
    #[error("Connector {connector_id} failed: {reason}")]
    Connector { connector_id: String, reason: String },
}

pub type ComplianceResult<T> = Result<T, ComplianceError>;

/// Control family prefix (`"AC"` for `"AC-2"`, `"AC"` for `"AC-2(1)"`)
pub fn control_family(control_id: &str) -> &str {
    control_id.split('-').next().unwrap_or(control_id)
}

/// FNV-1a; stable across processes so simulated checks are reproducible
pub(crate) fn stable_hash(value: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    value.bytes().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}
