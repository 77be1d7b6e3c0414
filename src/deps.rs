//! Dependency resolution: recipe-closure collection and topological ordering.
//!
//! `resolve` walks the recipe graph depth-first from a root, then emits a
//! build plan in which every dependency precedes its dependents and the root
//! comes last. Ordering is deterministic: among packages whose dependencies
//! are all satisfied, lexicographic order wins.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::recipe::Recipe;
use std::collections::{BTreeMap, BTreeSet};

/// A dependency graph over package names.
#[derive(Debug, Default)]
pub struct DepGraph {
    /// package -> direct dependencies
    edges: BTreeMap<String, Vec<String>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package and its direct dependencies.
    pub fn add_package(&mut self, name: String, deps: Vec<String>) {
        self.edges.insert(name, deps);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Topological order: dependencies before dependents, lexicographic
    /// among ready packages. Edges to names outside the graph are ignored
    /// (used when restricting to the installed set). Fails with
    /// [`Error::DependencyCycle`] naming every package stuck in a cycle.
    pub fn topo_order(&self) -> Result<Vec<String>> {
        let mut unmet: BTreeMap<&str, usize> = BTreeMap::new();
        let mut waiting: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (name, deps) in &self.edges {
            let in_graph: Vec<&str> = deps
                .iter()
                .map(String::as_str)
                .filter(|d| self.edges.contains_key(*d))
                .collect();
            unmet.insert(name.as_str(), in_graph.len());
            for dep in in_graph {
                waiting.entry(dep).or_default().push(name.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = unmet
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order: Vec<String> = Vec::with_capacity(self.edges.len());

        while let Some(name) = ready.pop_first() {
            if let Some(dependents) = waiting.get(name) {
                for dependent in dependents {
                    if let Some(n) = unmet.get_mut(dependent) {
                        *n -= 1;
                        if *n == 0 {
                            ready.insert(*dependent);
                        }
                    }
                }
            }
            order.push(name.to_string());
        }

        if order.len() != self.edges.len() {
            let emitted: BTreeSet<&str> = order.iter().map(String::as_str).collect();
            let stuck: Vec<String> = self
                .edges
                .keys()
                .filter(|name| !emitted.contains(name.as_str()))
                .cloned()
                .collect();
            return Err(Error::DependencyCycle(stuck));
        }

        Ok(order)
    }
}

/// Resolve the build plan for `root`: every reachable recipe in dependency
/// order, the root last. A dependency without a recipe file fails with
/// [`Error::RecipeNotFound`] before anything is fetched or built.
pub fn resolve(cfg: &Config, root: &str) -> Result<Vec<Recipe>> {
    let mut recipes: BTreeMap<String, Recipe> = BTreeMap::new();
    let mut stack = vec![root.to_string()];

    while let Some(name) = stack.pop() {
        if recipes.contains_key(&name) {
            continue;
        }
        let recipe = Recipe::load(cfg, &name)?;
        for dep in &recipe.depends {
            if !recipes.contains_key(dep) {
                stack.push(dep.clone());
            }
        }
        recipes.insert(name, recipe);
    }

    let mut graph = DepGraph::new();
    for (name, recipe) in &recipes {
        graph.add_package(name.clone(), recipe.depends.clone());
    }

    let mut plan = Vec::with_capacity(recipes.len());
    for name in graph.topo_order()? {
        if let Some(recipe) = recipes.remove(&name) {
            plan.push(recipe);
        }
    }
    Ok(plan)
}

/// Topological order of the installed set only; dependencies on packages
/// that are not installed are ignored. Used by whole-system rebuilds.
pub fn installed_order(cfg: &Config, installed: &[String]) -> Result<Vec<String>> {
    let mut graph = DepGraph::new();
    for name in installed {
        let recipe = Recipe::load(cfg, name)?;
        graph.add_package(name.clone(), recipe.depends);
    }
    graph.topo_order()
}
