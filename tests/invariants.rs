//! Property tests for the scheduler's core invariants

mod common;

use std::collections::BTreeMap;

use common::{Op, ScriptedHost};
use proptest::prelude::*;
use serde_json::json;
use troupe::runtime::Project;
use troupe::runtime::actor::ActorId;
use troupe::runtime::instance::InstanceStore;
use troupe::runtime::script::BodyId;

const COUNT: BodyId = BodyId(0);

fn counter_project() -> Project {
    let host = ScriptedHost::new().body(COUNT, vec![Op::IncrAttr("count")]);
    let mut project = Project::with_defaults(Box::new(host));
    project
        .register_actor(troupe::runtime::actor::Actor::new("Counter").on_broadcast("ping", COUNT))
        .unwrap();
    project
        .create_instance("Counter", [("count".to_string(), json!(0))])
        .unwrap();
    project
}

proptest! {
    /// Work enqueued before a tick runs during it; work enqueued during
    /// or after a tick never runs before the next one.
    #[test]
    fn admission_delay_holds_for_any_broadcast_schedule(
        rounds in proptest::collection::vec(0u64..4, 1..8),
    ) {
        let mut project = counter_project();
        let counter = project.instances_of("Counter").unwrap()[0];
        let mut total: u64 = 0;

        for &n in &rounds {
            for _ in 0..n {
                project.broadcast("ping");
            }
            // Broadcasting alone never runs anything.
            prop_assert_eq!(
                project.attribute(counter, "count").unwrap(),
                json!(total)
            );

            project.tick();
            total += n;
            prop_assert_eq!(
                project.attribute(counter, "count").unwrap(),
                json!(total)
            );
        }
    }

    /// Instance ids are strictly increasing and never reassigned, no
    /// matter how creations and removals interleave.
    #[test]
    fn instance_ids_stay_monotonic_under_churn(
        ops in proptest::collection::vec(any::<(bool, u8)>(), 1..32),
    ) {
        let mut store = InstanceStore::new();
        let actor = ActorId(0);
        let mut created = Vec::new();
        let mut high_water = None;

        for (create, pick) in ops {
            if create || created.is_empty() {
                let id = store.create(actor, BTreeMap::new(), None);
                prop_assert!(high_water.is_none_or(|top| id > top));
                high_water = Some(id);
                created.push(id);
            } else {
                let victim = created[pick as usize % created.len()];
                let was_live = store.remove(victim);
                // Second removal is a no-op either way.
                prop_assert!(!store.remove(victim));
                prop_assert!(!store.contains(victim));
                let _ = was_live;
            }
        }
    }

    /// However many clones a tick produces, every live thread's instance
    /// is live too once the tick has finished.
    #[test]
    fn removal_leaves_no_threads_behind(extra_ticks in 0u8..4) {
        let host = ScriptedHost::new().body(COUNT, vec![Op::WaitTicks(10)]);
        let mut project = Project::with_defaults(Box::new(host));
        project
            .register_actor(
                troupe::runtime::actor::Actor::new("Sleeper").on_broadcast("nap", COUNT),
            )
            .unwrap();
        let sleeper = project.create_instance("Sleeper", std::iter::empty()).unwrap();

        project.broadcast("nap");
        project.tick();
        prop_assert_eq!(project.group_count(), 1);

        project.remove_instance(sleeper);
        project.tick();
        prop_assert_eq!(project.group_count(), 0);

        for _ in 0..extra_ticks {
            project.tick();
            prop_assert_eq!(project.group_count(), 0);
        }
    }
}
