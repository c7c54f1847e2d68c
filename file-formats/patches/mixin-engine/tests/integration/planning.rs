//! Planning integration tests

use crate::common::{finalizer, normal, store_with};
use mixin_engine::payload::PayloadBuilder;
use mixin_engine::{FailureCause, FailureLog, ModuleId, MixinDescriptor, plan, plan_with_sink};
use pretty_assertions::assert_eq;

fn noop() -> PayloadBuilder {
    PayloadBuilder::new().write(0, &[0])
}

#[test]
fn test_plan_groups_and_orders_by_module() {
    let a = normal("a", "maps/zone.bin");
    let fix = finalizer("fix", "maps/zone.bin");
    let b = normal("b", "audio/bank.bin");
    let c = normal("c", "maps/zone.bin");

    let store = store_with(&[
        (&a, noop()),
        (&fix, PayloadBuilder::finalizer().align(4, 0)),
        (&b, noop()),
        (&c, noop()),
    ]);

    let report = plan(&[&fix, &a, &b, &c], &store);
    assert!(report.failures.is_empty());

    let modules: Vec<_> = report.plan.modules().map(ModuleId::as_str).collect();
    assert_eq!(modules, ["audio/bank.bin", "maps/zone.bin"]);

    let zone = report.plan.get(&ModuleId::new("maps/zone.bin")).unwrap();
    assert_eq!(zone.ids(), ["a", "c", "fix"]);
    assert_eq!(zone.finalizer_count(), 1);
    assert_eq!(report.plan.mixin_count(), 4);
}

#[test]
fn test_failures_are_streamed_to_sink() {
    let a = normal("a", "x.bin");
    let missing = normal("missing", "x.bin");
    let empty = normal("empty", "");

    let store = store_with(&[(&a, noop()), (&empty, noop())]);
    let log = FailureLog::new();
    let report = plan_with_sink(&[&a, &missing, &empty, &a], &store, &log);

    assert_eq!(report.failures, log.snapshot());
    let causes: Vec<_> = report.failures.iter().map(|f| &f.cause).collect();
    assert_eq!(
        causes,
        [
            &FailureCause::PayloadUnavailable,
            &FailureCause::EmptyTarget,
            &FailureCause::DuplicateMixin,
        ]
    );

    // The surviving mixin is planned once
    assert_eq!(report.plan.mixin_count(), 1);
}

#[test]
fn test_prerequisite_chain_rejection_cascades() {
    let base = normal("base", "x.bin");
    let mid = normal("mid", "x.bin").requires("base");
    let top = normal("top", "x.bin").requires("mid");
    let other = normal("other", "x.bin");

    // base has no payload, so mid and top fall with it
    let store = store_with(&[(&mid, noop()), (&top, noop()), (&other, noop())]);
    let report = plan(&[&base, &mid, &top, &other], &store);

    let failed: Vec<_> = report
        .failures
        .iter()
        .map(|f| f.mixin.as_ref().unwrap().as_str())
        .collect();
    assert_eq!(failed, ["base", "mid", "top"]);
    assert_eq!(report.plan.entries()[0].ids(), ["other"]);
}

#[test]
fn test_prerequisite_across_modules_rejected() {
    let a = normal("a", "x.bin");
    let b = normal("b", "y.bin").requires("a");
    let store = store_with(&[(&a, noop()), (&b, noop())]);

    let report = plan(&[&a, &b], &store);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        &report.failures[0].cause,
        FailureCause::CrossModulePrerequisite { module, .. } if module.as_str() == "x.bin"
    ));
    assert_eq!(report.plan.len(), 1);
}

#[test]
fn test_finalizer_may_require_normal_mixin() {
    let a = normal("a", "x.bin");
    let fix = finalizer("fix", "x.bin").requires("a");
    let store = store_with(&[(&a, noop()), (&fix, PayloadBuilder::finalizer().align(2, 0))]);

    // Selected first, still ordered after its prerequisite
    let report = plan(&[&fix, &a], &store);
    assert!(report.failures.is_empty());
    assert_eq!(report.plan.entries()[0].ids(), ["a", "fix"]);
}

#[test]
fn test_planning_is_repeatable() {
    let descriptors: Vec<MixinDescriptor> = (0..20)
        .map(|i| {
            let module = format!("m{}.bin", i % 3);
            if i % 5 == 0 {
                finalizer(&format!("f{i}"), &module)
            } else {
                normal(&format!("n{i}"), &module)
            }
        })
        .collect();
    let builders: Vec<_> = descriptors
        .iter()
        .map(|d| {
            let builder = if d.is_finalizer() {
                PayloadBuilder::finalizer().align(2, 0)
            } else {
                noop()
            };
            (d, builder)
        })
        .collect();
    let store = store_with(&builders);
    let selection: Vec<&MixinDescriptor> = descriptors.iter().collect();

    let first = plan(&selection, &store);
    let second = plan(&selection, &store);
    let ids = |report: &mixin_engine::PlanReport<'_>| {
        report
            .plan
            .iter()
            .map(|e| (e.module.to_string(), e.ids().join(",")))
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
}
