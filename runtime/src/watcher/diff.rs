//! Cycle-to-cycle comparison of observed containers.

use std::collections::{HashMap, HashSet};

use shipwatch_core::model::{Container, ContainerReport, CycleStats};

/// Reports for one cycle and the snapshot that replaces the previous one.
#[derive(Debug, Clone, Default)]
pub struct CycleDiff {
    pub reports: Vec<ContainerReport>,
    pub snapshot: Vec<Container>,
}

impl CycleDiff {
    /// Counts over the observed (not removed) containers.
    pub fn stats(&self) -> CycleStats {
        let observed = self.reports.iter().filter(|r| !r.removed);
        let mut stats = CycleStats::default();
        for report in observed {
            stats.watched += 1;
            if report.container.is_errored() {
                stats.errors += 1;
            } else if report.container.update_available {
                stats.updates += 1;
            }
        }
        stats
    }
}

/// Compare the containers observed this cycle with the previous snapshot.
///
/// - a container seen for the first time is `changed`
/// - a known container is `changed` when its result moved and an update is
///   available
/// - an errored container keeps its previous entry, marked with the error,
///   so its recovery is not mistaken for a change
/// - a container missing from `observed` is reported `removed`
pub fn diff(previous: &[Container], observed: Vec<Container>) -> CycleDiff {
    let by_id: HashMap<&str, &Container> = previous.iter().map(|c| (c.id.as_str(), c)).collect();
    let seen: HashSet<String> = observed.iter().map(|c| c.id.clone()).collect();
    let mut out = CycleDiff::default();

    for current in observed {
        let report = match by_id.get(current.id.as_str()) {
            None => ContainerReport {
                changed: true,
                container: current,
                removed: false,
            },
            Some(prior) if current.is_errored() => {
                let mut carried = (*prior).clone();
                carried.error = current.error;
                carried.status = current.status;
                ContainerReport {
                    changed: false,
                    container: carried,
                    removed: false,
                }
            }
            Some(prior) => ContainerReport {
                changed: prior.has_result_changed(&current) && current.update_available,
                container: current,
                removed: false,
            },
        };
        out.snapshot.push(report.container.clone());
        out.reports.push(report);
    }

    for gone in previous.iter().filter(|c| !seen.contains(&c.id)) {
        out.reports.push(ContainerReport {
            changed: true,
            container: gone.clone(),
            removed: true,
        });
    }
    out
}
