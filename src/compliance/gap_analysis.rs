//! Gap analysis between implemented controls and a baseline.

use super::control_family;
use crate::constants::system::FOUNDATIONAL_CONTROLS;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlSet {
    pub count: usize,
    pub controls: Vec<String>,
}

impl ControlSet {
    fn from_set(set: BTreeSet<&str>) -> Self {
        Self {
            count: set.len(),
            controls: set.into_iter().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FamilyCoverage {
    pub required: usize,
    pub implemented: usize,
    pub missing: Vec<String>,
}

impl FamilyCoverage {
    pub fn coverage_percentage(&self) -> f64 {
        if self.required == 0 {
            return 0.0;
        }
        self.implemented as f64 / self.required as f64 * 100.0
    }
}

/// Result stored under the `gap_analysis_result` context key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapAnalysis {
    pub target_baseline: String,
    pub compliance_percentage: f64,
    pub total_required: usize,
    pub total_implemented: usize,
    pub compliant_controls: usize,
    pub missing_controls: ControlSet,
    pub extra_controls: ControlSet,
    pub family_analysis: BTreeMap<String, FamilyCoverage>,
    pub recommendations: Vec<String>,
}

/// Compare implemented controls against the controls a baseline requires
pub fn analyze_gaps(
    implemented_controls: &[String],
    baseline_controls: &[String],
    target_baseline: &str,
) -> GapAnalysis {
    let baseline: BTreeSet<&str> = baseline_controls.iter().map(String::as_str).collect();
    let implemented: BTreeSet<&str> = implemented_controls.iter().map(String::as_str).collect();

    let missing: BTreeSet<&str> = baseline.difference(&implemented).copied().collect();
    let extra: BTreeSet<&str> = implemented.difference(&baseline).copied().collect();
    let compliant = baseline.intersection(&implemented).count();

    let mut family_analysis: BTreeMap<String, FamilyCoverage> = BTreeMap::new();
    for control_id in &baseline {
        let entry = family_analysis
            .entry(control_family(control_id).to_string())
            .or_default();
        entry.required += 1;
        if implemented.contains(control_id) {
            entry.implemented += 1;
        } else {
            entry.missing.push((*control_id).to_string());
        }
    }

    let compliance_percentage = if baseline.is_empty() {
        0.0
    } else {
        round2(compliant as f64 / baseline.len() as f64 * 100.0)
    };

    let recommendations = recommendations(&family_analysis, &missing);

    GapAnalysis {
        target_baseline: target_baseline.to_string(),
        compliance_percentage,
        total_required: baseline.len(),
        total_implemented: implemented.len(),
        compliant_controls: compliant,
        missing_controls: ControlSet::from_set(missing),
        extra_controls: ControlSet::from_set(extra),
        family_analysis,
        recommendations,
    }
}

fn recommendations(
    family_analysis: &BTreeMap<String, FamilyCoverage>,
    missing: &BTreeSet<&str>,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    for (family, coverage) in family_analysis {
        if coverage.required == 0 {
            continue;
        }
        let percentage = coverage.coverage_percentage();
        if percentage < 50.0 {
            recommendations.push(format!(
                "Priority: Implement {family} family controls - only {percentage:.1}% coverage"
            ));
        } else if percentage < 80.0 {
            recommendations.push(format!(
                "Improve {family} family controls - {percentage:.1}% coverage"
            ));
        }
    }

    let missing_foundational: Vec<&str> = FOUNDATIONAL_CONTROLS
        .iter()
        .copied()
        .filter(|control| missing.contains(control))
        .collect();
    if !missing_foundational.is_empty() {
        let mut sorted = missing_foundational;
        sorted.sort_unstable();
        recommendations.insert(
            0,
            format!(
                "CRITICAL: Implement foundational controls: {}",
                sorted.join(", ")
            ),
        );
    }

    recommendations
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
