#![cfg(not(target_arch = "wasm32"))]

use std::collections::VecDeque;
use std::time::Duration;

use proptest::prelude::*;
use qxl_queue::{CommandQueue, NoDelay, PushError, RetryPolicy};

#[derive(Debug, Clone)]
enum Op {
    Push,
    Pull,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Push),
        2 => Just(Op::Pull),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn queue_matches_fifo_model(
        capacity in 1usize..=8,
        ops in prop::collection::vec(op_strategy(), 0..200),
    ) {
        let q = CommandQueue::with_delay(capacity, RetryPolicy::new(2, Duration::ZERO), NoDelay)
            .unwrap();
        let mut model: VecDeque<u32> = VecDeque::new();
        let mut next = 0u32;

        for op in ops {
            match op {
                Op::Push => {
                    let id = next;
                    next += 1;
                    match q.push(id) {
                        Ok(()) => {
                            prop_assert!(model.len() < capacity);
                            model.push_back(id);
                        }
                        Err(PushError::Overloaded(rejected)) => {
                            prop_assert_eq!(rejected, id);
                            prop_assert_eq!(model.len(), capacity);
                        }
                        Err(PushError::Closed(_)) => prop_assert!(false, "queue closed unexpectedly"),
                    }
                }
                Op::Pull => {
                    prop_assert_eq!(q.pull(), model.pop_front());
                }
            }

            let (head, tail) = q.cursors();
            prop_assert!(head <= tail);
            prop_assert!(tail - head <= capacity as u64);
            prop_assert_eq!(q.len(), model.len());
        }

        let rest: Vec<u32> = std::iter::from_fn(|| q.pull()).collect();
        prop_assert_eq!(rest, model.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn filling_to_capacity_then_draining_returns_everything(
        capacity in 1usize..=64,
        warmup in 0usize..=64,
    ) {
        let q = CommandQueue::with_delay(capacity, RetryPolicy::fail_fast(), NoDelay).unwrap();
        for i in 0..warmup {
            q.push(i).unwrap();
            q.pull().unwrap();
        }

        for i in 0..capacity {
            q.push(i).unwrap();
        }
        prop_assert_eq!(q.push(usize::MAX), Err(PushError::Overloaded(usize::MAX)));

        let out: Vec<usize> = std::iter::from_fn(|| q.pull()).collect();
        prop_assert_eq!(out, (0..capacity).collect::<Vec<_>>());
    }
}

#[test]
fn overload_boundary_with_capacity_two_and_no_retries() {
    let q = CommandQueue::with_delay(2, RetryPolicy::fail_fast(), NoDelay).unwrap();
    q.push("c1").unwrap();
    q.push("c2").unwrap();

    let rejected = q.push("c3").unwrap_err();
    assert_eq!(rejected.into_inner(), "c3");
    assert_eq!(q.len(), 2);
}
