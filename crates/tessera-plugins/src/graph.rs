//! Load-order planning over the registry's plugin dependency graph

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use crate::descriptor::PluginDescriptor;
use crate::resolver::{DependencyResolver, ResolutionResult};
use crate::{PluginError, PluginResult};

/// Dependency-ordered view of every enabled plugin
#[derive(Debug, Clone, Default)]
pub struct LoadPlan {
    /// Enabled plugins, each after all of its required plugin dependencies
    pub order: Vec<String>,
    /// Plugins whose own dependencies are not satisfied
    pub unresolved: BTreeMap<String, ResolutionResult>,
    /// Plugins that resolve but require an unresolved or blocked plugin,
    /// mapped to the offending dependencies
    pub blocked: BTreeMap<String, Vec<String>>,
}

impl LoadPlan {
    /// Plugins that can be loaded, in order
    pub fn loadable(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter(|id| !self.unresolved.contains_key(*id) && !self.blocked.contains_key(*id))
            .map(String::as_str)
    }

    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty() && self.blocked.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Order the resolver's enabled plugins so dependencies come first
///
/// Each plugin is resolved once. A cycle among required plugin
/// dependencies fails the whole plan with [`PluginError::DependencyCycle`].
pub async fn load_order(resolver: &DependencyResolver) -> PluginResult<LoadPlan> {
    let descriptors: BTreeMap<String, PluginDescriptor> = resolver
        .registry()
        .descriptors()
        .await
        .into_iter()
        .filter(|d| d.enabled)
        .map(|d| (d.id.clone(), d))
        .collect();

    let order = topological_order(&descriptors)?;

    let mut plan = LoadPlan {
        order,
        ..LoadPlan::default()
    };
    for id in &plan.order {
        let resolution = resolver.resolve(id).await?;
        if !resolution.satisfied {
            plan.unresolved.insert(id.clone(), resolution);
            continue;
        }

        let Some(descriptor) = descriptors.get(id) else {
            continue;
        };
        let blockers: Vec<String> = descriptor
            .dependencies
            .plugins
            .keys()
            .filter(|dep| plan.unresolved.contains_key(*dep) || plan.blocked.contains_key(*dep))
            .cloned()
            .collect();
        if !blockers.is_empty() {
            debug!(plugin = %id, blockers = ?blockers, "Plugin blocked by its dependencies");
            plan.blocked.insert(id.clone(), blockers);
        }
    }

    info!(
        plugins = plan.order.len(),
        unresolved = plan.unresolved.len(),
        blocked = plan.blocked.len(),
        "Computed plugin load order"
    );
    Ok(plan)
}

fn topological_order(descriptors: &BTreeMap<String, PluginDescriptor>) -> PluginResult<Vec<String>> {
    let mut marks = HashMap::new();
    let mut path = Vec::new();
    let mut order = Vec::with_capacity(descriptors.len());

    for id in descriptors.keys() {
        visit(id, descriptors, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    id: &'a str,
    descriptors: &'a BTreeMap<String, PluginDescriptor>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> PluginResult<()> {
    match marks.get(id) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|p| *p == id).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|p| p.to_string()).collect();
            cycle.push(id.to_string());
            return Err(PluginError::DependencyCycle(cycle));
        }
        None => {}
    }

    marks.insert(id, Mark::Visiting);
    path.push(id);

    if let Some(descriptor) = descriptors.get(id) {
        // Edges to plugins outside the enabled set are left to the resolver.
        for dep in descriptor.dependencies.plugins.keys() {
            if descriptors.contains_key(dep) {
                visit(dep, descriptors, marks, path, order)?;
            }
        }
    }

    path.pop();
    marks.insert(id, Mark::Done);
    order.push(id.to_string());
    Ok(())
}
