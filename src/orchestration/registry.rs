//! # Strand Template Registry
//!
//! Named, reusable step-graph factories. A template maps a target-control list
//! plus free-form [`TemplateArgs`] to an ordered list of steps.
//!
//! Registering a name twice replaces the earlier definition: the registry keeps
//! no residue of the first builder.
//!
//! ## Usage
//!
//! ```rust
//! use strands_core::orchestration::registry::TemplateRegistry;
//! use strands_core::orchestration::step::{action_fn, Step};
//! use serde_json::json;
//!
//! let registry = TemplateRegistry::new();
//! registry.register("ping", "Ping", "Single no-op step", |_controls, _args| {
//!     vec![Step::new("ping", "test", "no-op", action_fn(|_, _| async { Ok(json!("pong")) }))]
//! });
//!
//! assert!(registry.contains("ping"));
//! assert_eq!(registry.list()[0].display_name, "Ping");
//! ```

use crate::orchestration::step::Step;
use crate::orchestration::types::{TemplateArgs, TemplateInfo};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds a strand's steps from target controls and template arguments
pub type StepBuilder = Arc<dyn Fn(&[String], &TemplateArgs) -> Vec<Step> + Send + Sync>;

/// A registered template
#[derive(Clone)]
pub struct StrandTemplate {
    pub info: TemplateInfo,
    pub builder: StepBuilder,
}

impl fmt::Debug for StrandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrandTemplate")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl StrandTemplate {
    pub fn build_steps(&self, target_controls: &[String], args: &TemplateArgs) -> Vec<Step> {
        (self.builder)(target_controls, args)
    }
}

/// Thread-safe template registry
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: RwLock<BTreeMap<String, StrandTemplate>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing any existing definition with the same name
    pub fn register<F>(&self, name: &str, display_name: &str, description: &str, builder: F)
    where
        F: Fn(&[String], &TemplateArgs) -> Vec<Step> + Send + Sync + 'static,
    {
        let template = StrandTemplate {
            info: TemplateInfo {
                name: name.to_string(),
                display_name: display_name.to_string(),
                description: description.to_string(),
            },
            builder: Arc::new(builder),
        };

        if self
            .templates
            .write()
            .insert(name.to_string(), template)
            .is_some()
        {
            warn!(template = name, "Template already registered, replacing");
        } else {
            info!(template = name, display_name, "Registered strand template");
        }
    }

    pub fn get(&self, name: &str) -> Option<StrandTemplate> {
        self.templates.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.read().contains_key(name)
    }

    /// Registered templates sorted by name
    pub fn list(&self) -> Vec<TemplateInfo> {
        self.templates
            .read()
            .values()
            .map(|t| t.info.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::step::action_fn;
    use serde_json::Value;

    fn steps(ids: &[&str]) -> Vec<Step> {
        ids.iter()
            .map(|id| Step::new(*id, "test", *id, action_fn(|_, _| async { Ok(Value::Null) })))
            .collect()
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = TemplateRegistry::new();
        registry.register("t", "First", "", |_, _| steps(&["one"]));
        registry.register("t", "Second", "", |_, _| steps(&["two", "three"]));

        let template = registry.get("t").unwrap();
        let built = template.build_steps(&[], &TemplateArgs::new());

        assert_eq!(registry.len(), 1);
        assert_eq!(template.info.display_name, "Second");
        assert_eq!(
            built.iter().map(Step::id).collect::<Vec<_>>(),
            vec!["two", "three"]
        );
    }

    #[test]
    fn test_builder_receives_controls_and_args() {
        let registry = TemplateRegistry::new();
        registry.register("echo", "Echo", "", |controls, args| {
            let mut ids: Vec<String> = controls.to_vec();
            ids.extend(args.keys().cloned());
            ids.iter()
                .map(|id| Step::new(id.clone(), "test", "", action_fn(|_, _| async { Ok(Value::Null) })))
                .collect()
        });

        let mut args = TemplateArgs::new();
        args.insert("extra".to_string(), Value::Bool(true));
        let built = registry
            .get("echo")
            .unwrap()
            .build_steps(&["AC-1".to_string()], &args);

        assert_eq!(
            built.iter().map(Step::id).collect::<Vec<_>>(),
            vec!["AC-1", "extra"]
        );
        assert!(registry.get("missing").is_none());
    }
}
