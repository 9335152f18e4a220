use crate::{
    analyzer::{StrategyMap, VersionStrategy},
    errors::Result,
    types::{BumpLevel, StrategyOrigin},
    workspace::Workspace,
};

/// Dependency propagator (C6): breadth-first expansion of `explicit` along
/// reverse edges. A dependent of a changed provider receives at least a
/// patch bump; existing higher levels are kept (max-combination). Peer edges
/// propagate, optional edges do not. Terminates at a fixed point: a package
/// is only re-queued when its level actually increases, so no node is ever
/// visited in a way that lowers it, and the total order on `BumpLevel` bounds
/// the number of times any single node can be re-queued.
pub fn propagate(workspace: &Workspace, explicit: &StrategyMap) -> Result<StrategyMap> {
    let mut map = explicit.clone();
    let mut queue = explicit.keys().cloned().collect::<Vec<_>>();

    while let Some(provider) = queue.pop() {
        for (consumer, edge) in workspace.consumers_of(&provider) {
            if !edge.kind.propagates() {
                continue;
            }

            let name = consumer.name.clone();

            let update = match map.get(&name) {
                Some(existing) => {
                    let combined = existing.bump_level.max(BumpLevel::Patch);
                    if combined == existing.bump_level {
                        None
                    } else {
                        Some(VersionStrategy {
                            bump_level: combined,
                            driving_commits: existing.driving_commits.clone(),
                            origin: existing.origin,
                        })
                    }
                }
                None => Some(VersionStrategy {
                    bump_level: BumpLevel::Patch,
                    driving_commits: Vec::new(),
                    origin: StrategyOrigin::Propagated,
                }),
            };

            if let Some(entry) = update {
                map.insert(name.clone(), entry);
                queue.push(name);
            }
        }
    }

    Ok(map)
}
