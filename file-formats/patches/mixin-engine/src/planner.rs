//! Application planning
//!
//! The planner turns a selection of mixins into an [`ApplicationPlan`]: one
//! entry per target module, each holding the module's mixins in application
//! order. Mixins that cannot be planned are reported as failures and left
//! out; planning always continues for the rest.
//!
//! Ordering within a module:
//!
//! 1. Normal mixins in input order
//! 2. Finalizer mixins in input order
//!
//! Modules appear in [`ModuleId`] order, so the same input always yields the
//! same plan.
//!
//! ```
//! use mixin_engine::payload::Payload;
//! use mixin_engine::{plan, MixinDescriptor, OrderingClass, PayloadStore};
//!
//! # fn main() -> Result<(), mixin_engine::Error> {
//! let a = MixinDescriptor::new("A", "moduleX", "a.mxpt");
//! let b = MixinDescriptor::new("B", "moduleX", "b.mxpt").with_ordering(OrderingClass::Finalizer);
//! let c = MixinDescriptor::new("C", "moduleY", "c.mxpt");
//!
//! let mut store = PayloadStore::new();
//! for d in [&a, &b, &c] {
//!     store.insert(d.id.clone(), Payload::new(d.ordering, Vec::new())?);
//! }
//!
//! // Finalizer listed first still runs last
//! let report = plan(&[&b, &a, &c], &store);
//! assert!(report.failures.is_empty());
//! assert_eq!(report.plan.len(), 2);
//! assert_eq!(report.plan.entries()[0].ids(), ["A", "B"]);
//! assert_eq!(report.plan.entries()[1].ids(), ["C"]);
//! # Ok(())
//! # }
//! ```

use crate::catalog::MixinDescriptor;
use crate::failure::{Failure, FailureCause, FailureSink, NullSink, Tee};
use crate::store::PayloadStore;
use crate::{MixinId, ModuleId};
use std::collections::{BTreeMap, HashMap, HashSet};

/// One module's ordered mixin list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry<'a> {
    /// Target module
    pub module: ModuleId,
    /// Mixins in application order
    pub mixins: Vec<&'a MixinDescriptor>,
}

impl<'a> PlanEntry<'a> {
    /// Create an entry
    pub fn new(module: ModuleId, mixins: Vec<&'a MixinDescriptor>) -> Self {
        Self { module, mixins }
    }

    /// Mixin ids in application order
    pub fn ids(&self) -> Vec<&str> {
        self.mixins.iter().map(|d| d.id.as_str()).collect()
    }

    /// Number of mixins
    pub fn len(&self) -> usize {
        self.mixins.len()
    }

    /// Whether the entry has no mixins
    pub fn is_empty(&self) -> bool {
        self.mixins.is_empty()
    }

    /// Number of finalizer mixins
    pub fn finalizer_count(&self) -> usize {
        self.mixins.iter().filter(|d| d.is_finalizer()).count()
    }
}

/// Per-module application schedule
///
/// No module appears twice, and within every entry all finalizers follow
/// all normal mixins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationPlan<'a> {
    entries: Vec<PlanEntry<'a>>,
}

impl<'a> ApplicationPlan<'a> {
    /// Entries in module order
    pub fn entries(&self) -> &[PlanEntry<'a>] {
        &self.entries
    }

    /// Iterate entries in module order
    pub fn iter(&self) -> std::slice::Iter<'_, PlanEntry<'a>> {
        self.entries.iter()
    }

    /// Entry for `module`
    pub fn get(&self, module: &ModuleId) -> Option<&PlanEntry<'a>> {
        self.entries
            .binary_search_by(|entry| entry.module.cmp(module))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Number of modules
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no module is planned
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of planned mixins
    pub fn mixin_count(&self) -> usize {
        self.entries.iter().map(PlanEntry::len).sum()
    }

    /// Planned modules in order
    pub fn modules(&self) -> impl Iterator<Item = &ModuleId> {
        self.entries.iter().map(|entry| &entry.module)
    }
}

impl<'p, 'a> IntoIterator for &'p ApplicationPlan<'a> {
    type Item = &'p PlanEntry<'a>;
    type IntoIter = std::slice::Iter<'p, PlanEntry<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A plan and the failures found while building it
#[derive(Debug, Clone, Default)]
pub struct PlanReport<'a> {
    /// The plan
    pub plan: ApplicationPlan<'a>,
    /// Mixins left out of the plan, one failure each
    pub failures: Vec<Failure>,
}

/// Plan a selection of mixins
pub fn plan<'a>(mixins: &[&'a MixinDescriptor], store: &PayloadStore) -> PlanReport<'a> {
    plan_with_sink(mixins, store, &NullSink)
}

/// Plan a selection of mixins, forwarding failures to `sink` as they are found
pub fn plan_with_sink<'a>(
    mixins: &[&'a MixinDescriptor],
    store: &PayloadStore,
    sink: &dyn FailureSink,
) -> PlanReport<'a> {
    let tee = Tee::new(sink);

    let mut partitions: BTreeMap<ModuleId, Vec<&'a MixinDescriptor>> = BTreeMap::new();
    let mut seen: HashSet<(&ModuleId, &MixinId)> = HashSet::new();
    let mut rejected: HashSet<(&ModuleId, &MixinId)> = HashSet::new();

    for &descriptor in mixins {
        let key = (&descriptor.target, &descriptor.id);
        if !seen.insert(key) {
            // Repeats of an already rejected mixin were reported with it
            if !rejected.contains(&key) {
                tee.push(failure(descriptor, FailureCause::DuplicateMixin));
            }
            continue;
        }

        if let Some(cause) = validate(descriptor, store) {
            rejected.insert(key);
            tee.push(failure(descriptor, cause));
            continue;
        }

        partitions
            .entry(descriptor.target.clone())
            .or_default()
            .push(descriptor);
    }

    // Stable: input order survives within each class
    for list in partitions.values_mut() {
        list.sort_by_key(|d| d.ordering);
    }

    check_prerequisites(mixins, &mut partitions, &tee);

    let entries: Vec<_> = partitions
        .into_iter()
        .filter(|(_, list)| !list.is_empty())
        .map(|(module, list)| PlanEntry::new(module, list))
        .collect();
    let plan = ApplicationPlan { entries };

    log::info!(
        "Planned {} mixins across {} modules ({} rejected)",
        plan.mixin_count(),
        plan.len(),
        tee.log.len()
    );

    PlanReport {
        plan,
        failures: tee.log.into_failures(),
    }
}

fn failure(descriptor: &MixinDescriptor, cause: FailureCause) -> Failure {
    Failure::new(&descriptor.id, &descriptor.target, cause)
}

fn validate(descriptor: &MixinDescriptor, store: &PayloadStore) -> Option<FailureCause> {
    if descriptor.target.is_empty() {
        return Some(FailureCause::EmptyTarget);
    }
    if let Err(e) = descriptor.target.relative_path() {
        return Some(FailureCause::UnresolvedTarget(e.to_string()));
    }
    if !store.contains(&descriptor.id) {
        return Some(FailureCause::PayloadUnavailable);
    }
    None
}

/// Reject mixins whose prerequisites are not satisfied within their module
///
/// Runs until no more mixins are removed, so dependents of a rejected mixin
/// are rejected too.
fn check_prerequisites<'a>(
    input: &[&'a MixinDescriptor],
    partitions: &mut BTreeMap<ModuleId, Vec<&'a MixinDescriptor>>,
    tee: &Tee<'_>,
) {
    // First occurrence wins, matching the duplicate rule
    let mut targets: HashMap<&MixinId, &ModuleId> = HashMap::new();
    for descriptor in input {
        targets
            .entry(&descriptor.id)
            .or_insert(&descriptor.target);
    }

    loop {
        let mut removed = 0;

        for (module, list) in partitions.iter_mut() {
            let positions: HashMap<&MixinId, usize> = list
                .iter()
                .enumerate()
                .map(|(i, d)| (&d.id, i))
                .collect();

            let mut failed = vec![false; list.len()];
            for (i, descriptor) in list.iter().enumerate() {
                let cause = descriptor.prerequisites.iter().find_map(|prerequisite| {
                    match targets.get(prerequisite) {
                        Some(&target) if target != module => {
                            return Some(FailureCause::CrossModulePrerequisite {
                                prerequisite: prerequisite.clone(),
                                module: target.clone(),
                            });
                        }
                        _ => {}
                    }
                    match positions.get(prerequisite) {
                        None => Some(FailureCause::MissingPrerequisite {
                            prerequisite: prerequisite.clone(),
                        }),
                        Some(&j) if j >= i => Some(FailureCause::PrerequisiteOrder {
                            prerequisite: prerequisite.clone(),
                        }),
                        Some(_) => None,
                    }
                });

                if let Some(cause) = cause {
                    tee.push(failure(descriptor, cause));
                    failed[i] = true;
                }
            }

            let before = list.len();
            let mut index = 0;
            list.retain(|_| {
                let keep = !failed[index];
                index += 1;
                keep
            });
            removed += before - list.len();
        }

        if removed == 0 {
            break;
        }
    }
}
