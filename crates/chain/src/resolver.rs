//! Constraint resolution: turn engine descriptors into an execution plan.
//!
//! Rules enforced:
//! 1. There is at least one engine, and names are non-empty and unique.
//! 2. No engine depends on itself.
//! 3. Every dependency names a present, optional or known-missing engine.
//! 4. The dependency graph is acyclic (layered topological sort must succeed).
//!
//! Dependencies are hard constraints and decide the phase of an engine.
//! Ordering hints only order engines inside a phase.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::PlanError;
use crate::models::{EngineDescriptor, ExecutionNode, ExecutionPlan, MissingEngine, Phase};

/// Compute the execution plan for `chain`.
///
/// `optional` names engines whose failure or absence must not abort the
/// chain. `missing` names engines the caller already knows to be absent;
/// dependencies on optional or missing engines that are not in `engines`
/// impose no ordering. Enhancement properties are left empty; the
/// [`Chain`](crate::Chain) attaches the configured ones.
///
/// # Errors
/// - [`PlanError::EmptyEngineSet`] if `engines` is empty.
/// - [`PlanError::EmptyEngineName`], [`PlanError::DuplicateEngine`],
///   [`PlanError::SelfDependency`] for malformed descriptors.
/// - [`PlanError::UnresolvableDependency`] for an unacknowledged dependency.
/// - [`PlanError::CyclicDependency`] if the graph is not acyclic.
pub fn resolve_plan(
    chain: &str,
    engines: &[EngineDescriptor],
    optional: &BTreeSet<String>,
    missing: &BTreeSet<String>,
) -> Result<ExecutionPlan, PlanError> {
    if engines.is_empty() {
        return Err(PlanError::EmptyEngineSet);
    }

    // -----------------------------------------------------------------------
    // 1. Validate descriptors
    // -----------------------------------------------------------------------
    let mut by_name: HashMap<&str, &EngineDescriptor> = HashMap::with_capacity(engines.len());
    for engine in engines {
        if engine.name.is_empty() {
            return Err(PlanError::EmptyEngineName);
        }
        if engine.dependencies.contains(&engine.name) {
            return Err(PlanError::SelfDependency(engine.name.clone()));
        }
        if by_name.insert(engine.name.as_str(), engine).is_some() {
            return Err(PlanError::DuplicateEngine(engine.name.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Build the dependency graph (u -> v: u runs before v)
    // -----------------------------------------------------------------------
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(engines.len());
    let mut resolved_deps: HashMap<&str, BTreeSet<String>> = HashMap::with_capacity(engines.len());

    for engine in engines {
        let name = engine.name.as_str();
        in_degree.entry(name).or_insert(0);
        let resolved = resolved_deps.entry(name).or_default();

        for dep in &engine.dependencies {
            if by_name.contains_key(dep.as_str()) {
                dependents.entry(dep.as_str()).or_default().push(name);
                *in_degree.entry(name).or_insert(0) += 1;
                resolved.insert(dep.clone());
            } else if !optional.contains(dep) && !missing.contains(dep) {
                return Err(PlanError::UnresolvableDependency {
                    engine: engine.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // 3. Layered topological sort (Kahn's algorithm, one frontier per phase)
    // -----------------------------------------------------------------------
    let mut frontier: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&name, _)| name)
        .collect();

    let mut phases: Vec<Phase> = Vec::new();
    let mut assigned: HashSet<&str> = HashSet::with_capacity(engines.len());

    while !frontier.is_empty() {
        let mut next: Vec<&str> = Vec::new();
        for &name in &frontier {
            assigned.insert(name);
            if let Some(children) = dependents.get(name) {
                for &child in children {
                    let deg = in_degree.entry(child).or_insert(0);
                    *deg -= 1;
                    if *deg == 0 {
                        next.push(child);
                    }
                }
            }
        }

        let mut nodes: Vec<ExecutionNode> = frontier
            .iter()
            .map(|&name| {
                let descriptor = by_name[name];
                ExecutionNode {
                    engine: descriptor.name.clone(),
                    optional: optional.contains(name),
                    ordering: descriptor.ordering,
                    depends_on: resolved_deps.remove(name).unwrap_or_default(),
                    properties: Default::default(),
                }
            })
            .collect();
        nodes.sort_by(|a, b| a.ordering.cmp(&b.ordering).then_with(|| a.engine.cmp(&b.engine)));

        phases.push(Phase { index: phases.len(), nodes });
        frontier = next;
    }

    // Nodes never released by the sort sit on (or behind) a cycle.
    if assigned.len() != engines.len() {
        let mut stuck: Vec<String> = engines
            .iter()
            .filter(|e| !assigned.contains(e.name.as_str()))
            .map(|e| e.name.clone())
            .collect();
        stuck.sort();
        return Err(PlanError::CyclicDependency { engines: stuck });
    }

    // Missing engines that are also present are not missing.
    let missing: Vec<MissingEngine> = missing
        .iter()
        .filter(|name| !by_name.contains_key(name.as_str()))
        .map(|name| MissingEngine {
            engine: name.clone(),
            optional: optional.contains(name),
        })
        .collect();

    Ok(ExecutionPlan {
        chain: chain.to_owned(),
        phases,
        missing,
        properties: Default::default(),
    })
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn engine(name: &str, ordering: i32, deps: &[&str]) -> EngineDescriptor {
        EngineDescriptor::new(name)
            .with_ordering(ordering)
            .depends_on(deps.iter().copied())
    }

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn resolve(engines: &[EngineDescriptor]) -> Result<ExecutionPlan, PlanError> {
        resolve_plan("test", engines, &BTreeSet::new(), &BTreeSet::new())
    }

    fn phase_names(plan: &ExecutionPlan) -> Vec<Vec<&str>> {
        plan.phases
            .iter()
            .map(|p| p.nodes.iter().map(|n| n.engine.as_str()).collect())
            .collect()
    }

    #[test]
    fn hints_order_independent_engines_and_dependencies_open_new_phases() {
        let plan = resolve(&[
            engine("A", 10, &[]),
            engine("B", 5, &["A"]),
            engine("C", 1, &[]),
        ])
        .expect("should resolve");

        assert_eq!(phase_names(&plan), vec![vec!["C", "A"], vec!["B"]]);
        assert_eq!(plan.flatten(), vec!["C", "A", "B"]);
        assert_eq!(plan.node("B").unwrap().depends_on, names(&["A"]));
    }

    #[test]
    fn equal_hints_fall_back_to_name_order() {
        let plan = resolve(&[engine("zeta", 0, &[]), engine("alpha", 0, &[]), engine("mid", 0, &[])])
            .expect("should resolve");
        assert_eq!(plan.flatten(), vec!["alpha", "mid", "zeta"]);
        assert_eq!(plan.phases.len(), 1);
    }

    #[test]
    fn diamond_places_join_after_both_branches() {
        //   a
        //  / \
        // b   c
        //  \ /
        //   d
        let plan = resolve(&[
            engine("d", 0, &["b", "c"]),
            engine("c", 0, &["a"]),
            engine("b", 0, &["a"]),
            engine("a", 0, &[]),
        ])
        .expect("should resolve");

        assert_eq!(phase_names(&plan), vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
    }

    #[test]
    fn phase_is_one_past_the_latest_dependency() {
        // x -> y -> z, and w depends on x and z.
        let plan = resolve(&[
            engine("x", 0, &[]),
            engine("y", 0, &["x"]),
            engine("z", 0, &["y"]),
            engine("w", 0, &["x", "z"]),
        ])
        .expect("should resolve");

        assert_eq!(plan.phase_of("w"), Some(3));
    }

    #[test]
    fn every_dependency_lands_in_an_earlier_phase() {
        let engines = vec![
            engine("tika", -100, &[]),
            engine("langid", 0, &["tika"]),
            engine("sentences", 5, &["langid"]),
            engine("tokens", 5, &["sentences"]),
            engine("pos", 3, &["tokens"]),
            engine("ner", 1, &["sentences"]),
            engine("linking", 0, &["ner", "pos"]),
            engine("dates", 7, &["tika"]),
        ];
        let plan = resolve(&engines).expect("should resolve");

        for e in &engines {
            let phase = plan.phase_of(&e.name).unwrap();
            for dep in &e.dependencies {
                assert!(plan.phase_of(dep).unwrap() < phase, "{dep} must precede {}", e.name);
            }
        }
        assert_eq!(plan.len(), engines.len());
    }

    #[test]
    fn resolution_is_deterministic_regardless_of_input_order() {
        let mut engines = vec![
            engine("a", 3, &[]),
            engine("b", 1, &["a"]),
            engine("c", 1, &[]),
            engine("d", 2, &["c"]),
            engine("e", 0, &[]),
        ];
        let first = resolve(&engines).unwrap();
        let second = resolve(&engines).unwrap();
        engines.reverse();
        let reversed = resolve(&engines).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, reversed);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&reversed).unwrap()
        );
    }

    #[test]
    fn empty_engine_set_is_rejected() {
        assert_eq!(resolve(&[]), Err(PlanError::EmptyEngineSet));
    }

    #[test]
    fn two_engine_cycle_is_detected() {
        let result = resolve(&[engine("A", 0, &["B"]), engine("B", 0, &["A"])]);
        assert_eq!(
            result,
            Err(PlanError::CyclicDependency { engines: vec!["A".into(), "B".into()] })
        );
    }

    #[test]
    fn cycle_reports_engines_stuck_behind_it() {
        // root is fine; a <-> b cycle; tail waits on b forever.
        let result = resolve(&[
            engine("root", 0, &[]),
            engine("a", 0, &["root", "b"]),
            engine("b", 0, &["a"]),
            engine("tail", 0, &["b"]),
        ]);
        assert!(matches!(
            result,
            Err(PlanError::CyclicDependency { engines }) if engines == vec!["a", "b", "tail"]
        ));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let result = resolve(&[engine("A", 0, &["ghost"])]);
        assert_eq!(
            result,
            Err(PlanError::UnresolvableDependency { engine: "A".into(), dependency: "ghost".into() })
        );
    }

    #[test]
    fn acknowledged_absent_dependencies_impose_no_order() {
        let plan = resolve_plan(
            "test",
            &[engine("ner", 0, &["langid", "tika"])],
            &names(&["langid"]),
            &names(&["langid", "tika"]),
        )
        .expect("acknowledged dependencies should resolve");

        assert_eq!(plan.phase_of("ner"), Some(0));
        assert!(plan.node("ner").unwrap().depends_on.is_empty());
        assert_eq!(
            plan.missing,
            vec![
                MissingEngine { engine: "langid".into(), optional: true },
                MissingEngine { engine: "tika".into(), optional: false },
            ]
        );
    }

    #[test]
    fn optional_names_mark_nodes() {
        let plan = resolve_plan(
            "test",
            &[engine("a", 0, &[]), engine("b", 0, &["a"])],
            &names(&["b"]),
            &BTreeSet::new(),
        )
        .unwrap();

        assert!(!plan.node("a").unwrap().optional);
        assert!(plan.node("b").unwrap().optional);
    }

    #[test]
    fn duplicate_engine_is_rejected() {
        assert_eq!(
            resolve(&[engine("a", 0, &[]), engine("a", 1, &[])]),
            Err(PlanError::DuplicateEngine("a".into()))
        );
    }

    #[test]
    fn self_dependency_is_rejected() {
        assert_eq!(
            resolve(&[engine("a", 0, &["a"])]),
            Err(PlanError::SelfDependency("a".into()))
        );
    }

    #[test]
    fn empty_name_is_rejected() {
        assert_eq!(resolve(&[engine("", 0, &[])]), Err(PlanError::EmptyEngineName));
    }

    #[test]
    fn single_engine_is_one_phase() {
        let plan = resolve(&[engine("solo", 0, &[])]).expect("single engine should resolve");
        assert_eq!(phase_names(&plan), vec![vec!["solo"]]);
        assert!(plan.missing.is_empty());
    }
}
