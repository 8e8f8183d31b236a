//! Plugin ordering.
//!
//! Constraints become edges `A -> B` ("A runs before B"):
//! `A.post` names B, `B.pre` names A, or `B.required` names A. The order is
//! a stable topological sort: whenever several plugins are ready, the one
//! registered first goes next.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use tracing::{debug, warn};

use crate::{error::ConfigurationError, plugin::Plugin};

/// Compute the execution order of `plugins`.
///
/// A name registered twice keeps its first registration. Fails on an
/// unregistered `pre`/`post`/`required` reference, on two registered rivals,
/// and on cycles.
pub fn resolve_order(
    plugins: &[Arc<dyn Plugin>],
) -> Result<Vec<Arc<dyn Plugin>>, ConfigurationError> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut nodes: Vec<&Arc<dyn Plugin>> = Vec::with_capacity(plugins.len());
    for plugin in plugins {
        let name = plugin.name();
        if index.contains_key(name) {
            warn!(plugin = name, "plugin registered twice, keeping the first registration");
            continue;
        }
        index.insert(name, nodes.len());
        nodes.push(plugin);
    }

    check_references(&nodes, &index)?;
    check_rivals(&nodes, &index)?;

    let successors = build_edges(&nodes, &index);
    let mut in_degree = vec![0usize; nodes.len()];
    for targets in &successors {
        for &to in targets {
            in_degree[to] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &to in &successors[next] {
            in_degree[to] -= 1;
            if in_degree[to] == 0 {
                ready.insert(to);
            }
        }
    }

    if order.len() < nodes.len() {
        let placed: BTreeSet<usize> = order.iter().copied().collect();
        let remaining: BTreeSet<usize> =
            (0..nodes.len()).filter(|i| !placed.contains(i)).collect();
        let plugins = remaining
            .iter()
            .filter(|&&start| on_cycle(start, &successors, &remaining))
            .map(|&i| nodes[i].name().to_string())
            .collect();
        return Err(ConfigurationError::CyclicDependency { plugins });
    }

    let resolved: Vec<Arc<dyn Plugin>> = order.into_iter().map(|i| Arc::clone(nodes[i])).collect();
    debug!(
        order = ?resolved.iter().map(|p| p.name()).collect::<Vec<_>>(),
        "resolved plugin order"
    );
    Ok(resolved)
}

fn check_references(
    nodes: &[&Arc<dyn Plugin>],
    index: &HashMap<&str, usize>,
) -> Result<(), ConfigurationError> {
    for plugin in nodes {
        let d = plugin.descriptor();
        if let Some(missing) = d
            .pre
            .iter()
            .chain(&d.post)
            .chain(&d.required)
            .find(|dep| !index.contains_key(dep.as_str()))
        {
            return Err(ConfigurationError::UnknownDependency {
                plugin: d.name.clone(),
                dependency: missing.clone(),
            });
        }
    }
    Ok(())
}

fn check_rivals(
    nodes: &[&Arc<dyn Plugin>],
    index: &HashMap<&str, usize>,
) -> Result<(), ConfigurationError> {
    let mut clash: Option<(usize, usize)> = None;
    for (i, plugin) in nodes.iter().enumerate() {
        for rival in &plugin.descriptor().rivals {
            let Some(&j) = index.get(rival.as_str()) else {
                continue;
            };
            if i == j {
                continue;
            }
            let pair = (i.min(j), i.max(j));
            if clash.is_none_or(|c| pair < c) {
                clash = Some(pair);
            }
        }
    }
    match clash {
        Some((a, b)) => Err(ConfigurationError::RivalPlugins {
            first: nodes[a].name().to_string(),
            second: nodes[b].name().to_string(),
        }),
        None => Ok(()),
    }
}

fn build_edges(nodes: &[&Arc<dyn Plugin>], index: &HashMap<&str, usize>) -> Vec<BTreeSet<usize>> {
    let mut successors = vec![BTreeSet::new(); nodes.len()];
    for (i, plugin) in nodes.iter().enumerate() {
        let d = plugin.descriptor();
        for after in &d.post {
            if let Some(&j) = index.get(after.as_str()) {
                successors[i].insert(j);
            }
        }
        for before in d.pre.iter().chain(&d.required) {
            if let Some(&j) = index.get(before.as_str()) {
                successors[j].insert(i);
            }
        }
    }
    successors
}

/// Whether `start` can reach itself through nodes in `within`.
fn on_cycle(start: usize, successors: &[BTreeSet<usize>], within: &BTreeSet<usize>) -> bool {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<usize> = successors[start].iter().copied().collect();
    while let Some(node) = stack.pop() {
        if node == start {
            return true;
        }
        if !within.contains(&node) || !seen.insert(node) {
            continue;
        }
        stack.extend(successors[node].iter().copied());
    }
    false
}
