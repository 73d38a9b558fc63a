use std::collections::{BTreeMap as Map, BTreeSet as Set};

use crate::{
    error::TranslateError,
    models::{DependencyDepths, ServiceName, ServiceSpec},
};

/// Computes the dependency depth of every service: 0 without dependencies,
/// otherwise one more than the deepest dependency. The traversal is an
/// explicit depth-first walk with an in-progress marker, so a cyclic graph
/// is reported instead of recursed into.
pub fn dependency_depths(services: &[ServiceSpec]) -> Result<DependencyDepths, TranslateError> {
    let index: Map<&ServiceName, &ServiceSpec> =
        services.iter().map(|spec| (&spec.name, spec)).collect();

    let mut depths = DependencyDepths::new();
    for spec in services.iter() {
        if !depths.contains_key(&spec.name) {
            visit(spec, &index, &mut depths)?;
        }
    }

    Ok(depths)
}

fn visit<'a>(
    root: &'a ServiceSpec,
    index: &Map<&'a ServiceName, &'a ServiceSpec>,
    depths: &mut DependencyDepths,
) -> Result<(), TranslateError> {
    // Each frame is a service and the index of the next dependency to walk.
    let mut stack: Vec<(&'a ServiceSpec, usize)> = vec![(root, 0)];
    let mut in_progress: Set<&'a ServiceName> = Set::new();
    in_progress.insert(&root.name);

    while let Some((spec, cursor)) = stack.pop() {
        match spec.depends_on.get(cursor) {
            Some(dependency) => {
                stack.push((spec, cursor + 1));

                if depths.contains_key(dependency) {
                    continue;
                }

                if in_progress.contains(dependency) {
                    return Err(cycle_error(&stack, dependency));
                }

                let dependency_spec = index.get(dependency).copied().ok_or_else(|| {
                    TranslateError::manifest(format!(
                        "service {} depends on unknown service {}",
                        spec.name.0, dependency.0
                    ))
                })?;
                in_progress.insert(&dependency_spec.name);
                stack.push((dependency_spec, 0));
            }
            None => {
                // Every dependency of this service is done.
                let depth = spec
                    .depends_on
                    .iter()
                    .filter_map(|dependency| depths.get(dependency))
                    .map(|depth| depth + 1)
                    .max()
                    .unwrap_or(0);
                depths.insert(spec.name.clone(), depth);
                in_progress.remove(&spec.name);
            }
        }
    }

    Ok(())
}

fn cycle_error(stack: &[(&ServiceSpec, usize)], dependency: &ServiceName) -> TranslateError {
    let names: Vec<String> = stack.iter().map(|(spec, _)| spec.name.0.clone()).collect();
    let start = names
        .iter()
        .position(|name| *name == dependency.0)
        .unwrap_or(0);

    let mut path = names[start..].to_vec();
    path.push(dependency.0.clone());

    TranslateError::Cycle { path }
}
