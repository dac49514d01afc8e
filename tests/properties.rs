//! Property tests for the scheduler and the queue primitives

use std::collections::VecDeque;

use core::task::Poll;

use prio_rtos::{Completion, Error, Kernel, SetMember, TaskId, TaskPriority, TaskState};
use proptest::prelude::*;

fn noop(_: &mut Kernel, _: &mut [u8]) {}

#[derive(Debug, Clone)]
enum Op {
    Send(u8),
    SendToFront(u8),
    Receive,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u8>().prop_map(Op::Send),
        1 => any::<u8>().prop_map(Op::SendToFront),
        3 => Just(Op::Receive),
    ]
}

proptest! {
    #[test]
    fn test_queue_matches_model(capacity in 1usize..8, ops in prop::collection::vec(op(), 0..64)) {
        let mut kernel = Kernel::testing();
        let q = kernel.queue_create(capacity, 1).unwrap();
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                Op::Send(v) | Op::SendToFront(v) => {
                    let front = matches!(op, Op::SendToFront(_));
                    let r = if front {
                        kernel.queue_send_to_front(q, &[v], 0)
                    } else {
                        kernel.queue_send(q, &[v], 0)
                    };
                    if model.len() == capacity {
                        prop_assert_eq!(r, Err(Error::Full));
                    } else {
                        prop_assert_eq!(r, Ok(Poll::Ready(())));
                        if front { model.push_front(v) } else { model.push_back(v) }
                    }
                }
                Op::Receive => {
                    let mut out = [0u8];
                    let r = kernel.queue_receive(q, &mut out, 0);
                    match model.pop_front() {
                        Some(v) => {
                            prop_assert_eq!(r, Ok(Poll::Ready(())));
                            prop_assert_eq!(out[0], v);
                        }
                        None => prop_assert_eq!(r, Err(Error::Empty)),
                    }
                }
            }
            let waiting = kernel.messages_waiting(q).unwrap();
            prop_assert!(waiting <= capacity);
            prop_assert_eq!(waiting, model.len());
            prop_assert_eq!(kernel.spaces_available(q).unwrap(), capacity - waiting);
        }
    }

    #[test]
    fn test_fifo_order(items in prop::collection::vec(any::<u32>(), 1..16)) {
        let mut kernel = Kernel::testing();
        let q = kernel.queue_create(items.len(), 4).unwrap();
        for v in &items {
            prop_assert_eq!(kernel.queue_send(q, &v.to_le_bytes(), 0), Ok(Poll::Ready(())));
        }
        for v in &items {
            let mut out = [0u8; 4];
            prop_assert_eq!(kernel.queue_receive(q, &mut out, 0), Ok(Poll::Ready(())));
            prop_assert_eq!(u32::from_le_bytes(out), *v);
        }
    }

    #[test]
    fn test_most_eligible_task_runs(priorities in prop::collection::vec(1u8..8, 1..10), ticks in 0usize..40) {
        let mut kernel = Kernel::testing();
        let ids: Vec<TaskId> = priorities
            .iter()
            .map(|&p| kernel.create_task(b"t", noop, TaskPriority(p), 64, &[]).unwrap())
            .collect();
        kernel.start();

        let top = *priorities.iter().max().unwrap();
        let leaders: Vec<TaskId> = ids
            .iter()
            .zip(&priorities)
            .filter(|(_, &p)| p == top)
            .map(|(&id, _)| id)
            .collect();

        // Time slicing rotates the top level in arrival order.
        for k in 0..=ticks {
            prop_assert_eq!(kernel.current(), leaders[k % leaders.len()]);
            kernel.tick();
        }
    }

    #[test]
    fn test_timeout_bound(wait in 1u32..200) {
        let mut kernel = Kernel::testing();
        let id = kernel.create_task(b"rx", noop, TaskPriority(1), 64, &[]).unwrap();
        kernel.start();
        let q = kernel.queue_create(1, 1).unwrap();

        prop_assert_eq!(kernel.queue_receive(q, &mut [0], wait), Ok(Poll::Pending));
        for _ in 1..wait {
            kernel.tick();
            prop_assert_eq!(kernel.task_state(id), Ok(TaskState::Blocked));
        }
        kernel.tick();
        prop_assert_eq!(kernel.current(), id);
        prop_assert_eq!(kernel.wait_result(&mut [0]), Some(Err(Error::Timeout)));
    }

    #[test]
    fn test_priority_inheritance(low in 1u8..4, high in 4u8..8) {
        let mut kernel = Kernel::testing();
        let lo = kernel.create_task(b"lo", noop, TaskPriority(low), 64, &[]).unwrap();
        kernel.start();
        let m = kernel.mutex_create().unwrap();
        prop_assert_eq!(kernel.mutex_take(m, 0), Ok(Poll::Ready(())));

        let hi = kernel.create_task(b"hi", noop, TaskPriority(high), 64, &[]).unwrap();
        prop_assert_eq!(kernel.current(), hi);
        prop_assert_eq!(kernel.mutex_take(m, prio_rtos::WAIT_FOREVER), Ok(Poll::Pending));
        prop_assert_eq!(kernel.current(), lo);
        prop_assert_eq!(kernel.priority(lo), Ok(TaskPriority(high)));

        prop_assert_eq!(kernel.mutex_give(m), Ok(()));
        prop_assert_eq!(kernel.priority(lo), Ok(TaskPriority(low)));
        prop_assert_eq!(kernel.current(), hi);
        prop_assert_eq!(kernel.wait_result(&mut []), Some(Ok(Completion::Acquired)));
        prop_assert_eq!(kernel.mutex_holder(m), Ok(Some(hi)));
    }

    #[test]
    fn test_set_reports_written_member(writes in prop::collection::vec(any::<bool>(), 1..6)) {
        let mut kernel = Kernel::testing();
        let rx = kernel.create_task(b"rx", noop, TaskPriority(2), 64, &[]).unwrap();
        let queues = [kernel.queue_create(8, 1).unwrap(), kernel.queue_create(8, 1).unwrap()];
        let set = kernel.queue_set_create(16).unwrap();
        for q in queues {
            kernel.queue_set_add(set, q).unwrap();
        }
        kernel.start();

        prop_assert_eq!(kernel.queue_set_select(set, 100), Ok(Poll::Pending));
        prop_assert!(kernel.scheduler.is_idle_running());

        // Writes come from the idle task; the first wakes the selector.
        let first = queues[writes[0] as usize];
        prop_assert_eq!(kernel.queue_send(first, &[0], 0), Ok(Poll::Ready(())));
        prop_assert_eq!(kernel.current(), rx);
        prop_assert_eq!(
            kernel.wait_result(&mut []),
            Some(Ok(Completion::Selected(SetMember::Queue(first))))
        );
        prop_assert_eq!(kernel.queue_set_pending(set), Ok(0));

        // Later writes queue one notification each, in write order.
        for &w in &writes[1..] {
            prop_assert_eq!(kernel.queue_send(queues[w as usize], &[0], 0), Ok(Poll::Ready(())));
        }
        prop_assert_eq!(kernel.queue_set_pending(set), Ok(writes.len() - 1));
        for &w in &writes[1..] {
            prop_assert_eq!(
                kernel.queue_set_select(set, 0),
                Ok(Poll::Ready(SetMember::Queue(queues[w as usize])))
            );
        }
        prop_assert_eq!(kernel.queue_set_select(set, 0), Err(Error::Empty));
    }

    #[test]
    fn test_deleted_task_is_rejected(
        priorities in prop::collection::vec(1u8..8, 2..8),
        delays in prop::collection::vec(1u32..50, 0..4),
        victim in any::<prop::sample::Index>(),
    ) {
        let mut kernel = Kernel::testing();
        let ids: Vec<TaskId> = priorities
            .iter()
            .map(|&p| kernel.create_task(b"t", noop, TaskPriority(p), 64, &[]).unwrap())
            .collect();
        kernel.start();
        for d in delays {
            if !kernel.scheduler.is_idle_running() {
                kernel.delay(d);
            }
        }

        let victim = ids[victim.index(ids.len())];
        prop_assert_eq!(kernel.delete_task(victim), Ok(()));
        prop_assert_eq!(kernel.delete_task(victim), Err(Error::InvalidTask));
        prop_assert_eq!(kernel.set_priority(victim, TaskPriority(3)), Err(Error::InvalidTask));
        prop_assert_eq!(kernel.suspend(victim), Err(Error::InvalidTask));
        prop_assert_eq!(kernel.resume(victim), Err(Error::InvalidTask));
        prop_assert_eq!(kernel.task_state(victim), Err(Error::InvalidTask));
        prop_assert_eq!(kernel.priority(victim), Err(Error::InvalidTask));
        prop_assert!(!kernel.scheduler.ready().contains(victim));
        prop_assert!(!kernel.scheduler.delayed().contains(victim));

        // Every survivor is in exactly the list its state names.
        let current = kernel.current();
        for (id, task) in kernel.scheduler.tasks() {
            match task.state {
                TaskState::Running => prop_assert_eq!(id, current),
                TaskState::Ready => prop_assert!(kernel.scheduler.ready().contains(id)),
                TaskState::Blocked => prop_assert!(kernel.scheduler.delayed().contains(id)),
                _ => prop_assert!(false, "unexpected state {:?}", task.state),
            }
        }
        prop_assert_eq!(
            kernel.scheduler.ready().len() + kernel.scheduler.delayed().len() + 1,
            kernel.scheduler.task_count() + 1
        );

        // The survivors keep running normally.
        for _ in 0..60 {
            kernel.tick();
        }
        prop_assert!(kernel.scheduler.delayed().is_empty());
    }
}
