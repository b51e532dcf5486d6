//! Property-based invariant tests for `Registry`.
//!
//! Arbitrary sequences of add / drop-target / remove / notify are replayed
//! against a registry and a plain `Vec` model. After every step:
//!
//! 1. `add` increases `count` by exactly one.
//! 2. Dropping a target never changes `count` on its own.
//! 3. `remove` of a registered handle decreases `count` by exactly one.
//! 4. `remove` of an absent handle (removed or pruned) leaves `count` alone.
//! 5. `notify` prunes exactly the entries whose target is gone.
//! 6. `notify` delivers once to every live entry, in insertion order.
//! 7. Dead entries never receive.
//! 8. `describe` does not change `count`.

use std::sync::{Arc, Mutex};

use observer_set::{Registry, Subscription};
use proptest::prelude::*;

const SLOTS: usize = 4;

type DeliveryLog = Arc<Mutex<Vec<(usize, u32)>>>;

struct Target;

#[derive(Debug, Clone)]
enum Op {
    Add(usize),
    DropTarget(usize),
    Remove(usize),
    Notify(u32),
    Describe,
}

// ── Strategies ────────────────────────────────────────────────────────────

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..SLOTS).prop_map(Op::Add),
        2 => (0..SLOTS).prop_map(Op::DropTarget),
        2 => any::<usize>().prop_map(Op::Remove),
        3 => any::<u32>().prop_map(Op::Notify),
        1 => Just(Op::Describe),
    ]
}

fn ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(op_strategy(), 1..=max_len)
}

// ── Model ─────────────────────────────────────────────────────────────────

struct ModelEntry {
    id: usize,
    slot: usize,
    handle: Subscription<u32>,
}

struct Harness {
    registry: Registry<u32>,
    log: DeliveryLog,
    targets: Vec<Option<Arc<Target>>>,
    /// Which target generation each slot's entries were bound to.
    generation: Vec<usize>,
    entries: Vec<(ModelEntry, usize)>,
    issued: Vec<Subscription<u32>>,
    next_id: usize,
}

impl Harness {
    fn new() -> Self {
        Self {
            registry: Registry::new(),
            log: Arc::default(),
            targets: (0..SLOTS).map(|_| None).collect(),
            generation: vec![0; SLOTS],
            entries: Vec::new(),
            issued: Vec::new(),
            next_id: 0,
        }
    }

    fn is_live(&self, entry: &ModelEntry, generation: usize) -> bool {
        self.targets[entry.slot].is_some() && self.generation[entry.slot] == generation
    }

    fn apply(&mut self, op: &Op) -> Result<(), TestCaseError> {
        let before = self.registry.count();
        match *op {
            Op::Add(slot) => {
                let target = self.targets[slot].get_or_insert_with(|| Arc::new(Target));
                let target = Arc::clone(target);
                let id = self.next_id;
                self.next_id += 1;
                let log = Arc::clone(&self.log);
                let handle = self.registry.add(&target, None, move |_: &Target, n| {
                    log.lock().unwrap().push((id, n));
                });
                self.issued.push(handle.clone());
                self.entries
                    .push((ModelEntry { id, slot, handle }, self.generation[slot]));
                prop_assert_eq!(self.registry.count(), before + 1);
            }
            Op::DropTarget(slot) => {
                if self.targets[slot].take().is_some() {
                    self.generation[slot] += 1;
                }
                prop_assert_eq!(self.registry.count(), before);
            }
            Op::Remove(pick) => {
                if self.issued.is_empty() {
                    return Ok(());
                }
                let handle = self.issued[pick % self.issued.len()].clone();
                let present = self.entries.iter().any(|(e, _)| e.handle == handle);
                self.entries.retain(|(e, _)| e.handle != handle);
                self.registry.remove(&handle);
                let expected = if present { before - 1 } else { before };
                prop_assert_eq!(self.registry.count(), expected);
            }
            Op::Notify(n) => {
                let live: Vec<usize> = self
                    .entries
                    .iter()
                    .filter(|(e, generation)| self.is_live(e, *generation))
                    .map(|(e, _)| e.id)
                    .collect();
                self.log.lock().unwrap().clear();

                self.registry.notify(n);

                let delivered = std::mem::take(&mut *self.log.lock().unwrap());
                let expected: Vec<(usize, u32)> = live.iter().map(|&id| (id, n)).collect();
                prop_assert_eq!(delivered, expected);

                let entries = std::mem::take(&mut self.entries);
                self.entries = entries
                    .into_iter()
                    .filter(|(e, generation)| self.is_live(e, *generation))
                    .collect();
                prop_assert_eq!(self.registry.count(), live.len());
            }
            Op::Describe => {
                let _ = self.registry.describe();
                prop_assert_eq!(self.registry.count(), before);
            }
        }
        prop_assert_eq!(self.registry.count(), self.entries.len());
        Ok(())
    }
}

// ── Properties ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn registry_matches_model(ops in ops_strategy(64)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op)?;
        }
    }

    #[test]
    fn remove_twice_is_idempotent(adds in 1usize..16, pick in any::<usize>()) {
        let registry = Registry::<u32>::new();
        let handles: Vec<_> = (0..adds).map(|_| registry.add_fn(None, |_| {})).collect();
        let handle = &handles[pick % handles.len()];

        registry.remove(handle);
        prop_assert_eq!(registry.count(), adds - 1);
        registry.remove(handle);
        prop_assert_eq!(registry.count(), adds - 1);
    }

    #[test]
    fn dead_targets_counted_until_notify(alive in 0usize..8, dead in 0usize..8) {
        let registry = Registry::<()>::new();
        let keep: Vec<Arc<Target>> = (0..alive).map(|_| Arc::new(Target)).collect();
        for target in &keep {
            registry.add(target, None, |_, ()| {});
        }
        for _ in 0..dead {
            let doomed = Arc::new(Target);
            registry.add(&doomed, None, |_, ()| {});
        }

        prop_assert_eq!(registry.count(), alive + dead);
        registry.notify(());
        prop_assert_eq!(registry.count(), alive);
    }
}
