//! Property tests over planning and application

use mixin_engine::payload::PayloadBuilder;
use mixin_engine::{
    MemoryBaseline, MixinDescriptor, ModuleApplier, OrderingClass, PayloadStore, plan,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Case {
    module: u8,
    finalizer: bool,
    offset: u8,
    value: u8,
}

fn case_strategy() -> impl Strategy<Value = Case> {
    (0u8..3, any::<bool>(), 0u8..32, any::<u8>()).prop_map(|(module, finalizer, offset, value)| {
        Case {
            module,
            finalizer,
            offset,
            value,
        }
    })
}

fn selection_strategy() -> impl Strategy<Value = Vec<Case>> {
    prop::collection::vec(case_strategy(), 0..24)
}

fn descriptors(cases: &[Case]) -> Vec<MixinDescriptor> {
    cases
        .iter()
        .enumerate()
        .map(|(i, case)| {
            let descriptor = MixinDescriptor::new(
                format!("m{i}"),
                &format!("module{}.bin", case.module),
                format!("m{i}.mxpt"),
            );
            if case.finalizer {
                descriptor.with_ordering(OrderingClass::Finalizer)
            } else {
                descriptor
            }
        })
        .collect()
}

fn store(cases: &[Case], descriptors: &[MixinDescriptor]) -> PayloadStore {
    let mut store = PayloadStore::new();
    for (case, descriptor) in cases.iter().zip(descriptors) {
        let builder = if case.finalizer {
            PayloadBuilder::finalizer().length_field(0, 4)
        } else {
            PayloadBuilder::new().write(u64::from(case.offset), &[case.value])
        };
        store.insert(descriptor.id.clone(), builder.build().unwrap());
    }
    store
}

proptest! {
    #[test]
    fn finalizers_always_follow_normal_mixins(cases in selection_strategy()) {
        let descriptors = descriptors(&cases);
        let store = store(&cases, &descriptors);
        let selection: Vec<_> = descriptors.iter().collect();

        let report = plan(&selection, &store);
        prop_assert!(report.failures.is_empty());
        prop_assert_eq!(report.plan.mixin_count(), cases.len());

        for entry in &report.plan {
            let classes: Vec<_> = entry.mixins.iter().map(|d| d.ordering).collect();
            let mut sorted = classes.clone();
            sorted.sort();
            prop_assert_eq!(classes, sorted);
            prop_assert!(entry.mixins.iter().all(|d| d.target == entry.module));
        }
    }

    #[test]
    fn planning_preserves_selection_order_within_class(cases in selection_strategy()) {
        let descriptors = descriptors(&cases);
        let store = store(&cases, &descriptors);
        let selection: Vec<_> = descriptors.iter().collect();

        let report = plan(&selection, &store);
        for entry in &report.plan {
            let positions: Vec<(OrderingClass, usize)> = entry
                .mixins
                .iter()
                .map(|d| {
                    let index = descriptors.iter().position(|x| x.id == d.id).unwrap();
                    (d.ordering, index)
                })
                .collect();
            let mut sorted = positions.clone();
            sorted.sort();
            prop_assert_eq!(positions, sorted);
        }
    }

    #[test]
    fn application_is_deterministic(cases in selection_strategy()) {
        let descriptors = descriptors(&cases);
        let store = store(&cases, &descriptors);
        let selection: Vec<_> = descriptors.iter().collect();
        let report = plan(&selection, &store);

        let baseline = MemoryBaseline::new();
        let applier = ModuleApplier::new(&store, &baseline);
        for entry in &report.plan {
            let first = applier.patch(entry, vec![0; 40]);
            let second = applier.patch(entry, vec![0; 40]);
            prop_assert_eq!(&first.bytes, &second.bytes);
            prop_assert_eq!(first.applied.len(), entry.len());
            prop_assert!(first.failures.is_empty());
            if entry.finalizer_count() > 0 {
                prop_assert_eq!(&first.bytes[..4], &40u32.to_le_bytes()[..]);
            }
        }
    }
}
