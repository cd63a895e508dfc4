//! Bounded pool of execution slots with per-request dedup.
//!
//! The pool caps the number of concurrently executing step invocations and
//! prevents two concurrent executions for the same request id within one
//! process. The queue layer alone permits duplicate delivery (a lease can
//! expire while the handler is still running); the pool is the in-process
//! safeguard against executing the duplicate.
//!
//! Slot liveness is derived from the attached task handle rather than an
//! explicit release call, so a slot frees itself once its task settles even
//! if the task panicked.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::task::JoinHandle;

enum Slot {
    /// Claimed, execution not yet attached
    Reserved,
    /// Bound to a running execution
    Running(JoinHandle<()>),
}

impl Slot {
    fn is_live(&self) -> bool {
        match self {
            Slot::Reserved => true,
            Slot::Running(handle) => !handle.is_finished(),
        }
    }
}

/// Capacity-bounded, mutually exclusive allocator of execution slots keyed
/// by request id.
pub struct TaskPool {
    max_concurrent: usize,
    slots: Mutex<HashMap<String, Slot>>,
}

impl TaskPool {
    /// Create a pool with the given slot capacity.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The configured slot capacity.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrent
    }

    /// Try to claim a slot for the request id.
    ///
    /// Fails fast when no slot is free or the request already holds one;
    /// backpressure is pushed back to the caller's receive loop rather than
    /// queued internally.
    pub fn try_reserve(&self, request_id: &str) -> bool {
        let mut slots = self.slots.lock().unwrap();
        slots.retain(|_, slot| slot.is_live());

        if slots.len() >= self.max_concurrent || slots.contains_key(request_id) {
            return false;
        }
        slots.insert(request_id.to_string(), Slot::Reserved);
        true
    }

    /// Bind the execution handle for a previously reserved slot. The slot is
    /// freed once the handle settles.
    pub fn attach(&self, request_id: &str, handle: JoinHandle<()>) {
        let mut slots = self.slots.lock().unwrap();
        slots.insert(request_id.to_string(), Slot::Running(handle));
    }

    /// Release a reservation without attaching an execution (used when the
    /// dispatch could not be started).
    pub fn release(&self, request_id: &str) {
        let mut slots = self.slots.lock().unwrap();
        slots.remove(request_id);
    }

    /// Whether the request id currently holds a live slot.
    pub fn has_running_task_for(&self, request_id: &str) -> bool {
        let mut slots = self.slots.lock().unwrap();
        slots.retain(|_, slot| slot.is_live());
        slots.contains_key(request_id)
    }

    /// Number of free slots.
    pub fn available_capacity(&self) -> usize {
        let mut slots = self.slots.lock().unwrap();
        slots.retain(|_, slot| slot.is_live());
        self.max_concurrent - slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_reserve_up_to_capacity() {
        let pool = TaskPool::new(2);
        assert_eq!(pool.available_capacity(), 2);

        assert!(pool.try_reserve("job-1"));
        assert!(pool.try_reserve("job-2"));
        assert_eq!(pool.available_capacity(), 0);

        // Over capacity fails fast.
        assert!(!pool.try_reserve("job-3"));
    }

    #[test]
    fn test_reserve_same_id_twice_fails() {
        let pool = TaskPool::new(4);
        assert!(pool.try_reserve("job-1"));
        assert!(!pool.try_reserve("job-1"));
        assert!(pool.has_running_task_for("job-1"));
    }

    #[test]
    fn test_capacity_accounting_invariant() {
        let pool = TaskPool::new(3);
        assert!(pool.try_reserve("job-1"));
        assert!(pool.try_reserve("job-2"));

        // available + reserved == max at all times
        assert_eq!(pool.available_capacity() + 2, pool.max_concurrency());
    }

    #[test]
    fn test_release_frees_slot() {
        let pool = TaskPool::new(1);
        assert!(pool.try_reserve("job-1"));
        pool.release("job-1");
        assert!(!pool.has_running_task_for("job-1"));
        assert_eq!(pool.available_capacity(), 1);
    }

    #[tokio::test]
    async fn test_slot_frees_when_task_finishes() {
        let pool = TaskPool::new(1);
        assert!(pool.try_reserve("job-1"));

        let handle = tokio::spawn(async {});
        pool.attach("job-1", handle);

        // Wait for the spawned task to settle.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pool.has_running_task_for("job-1"));
        assert_eq!(pool.available_capacity(), 1);
    }

    #[tokio::test]
    async fn test_slot_held_while_task_runs() {
        let pool = TaskPool::new(2);
        assert!(pool.try_reserve("job-1"));

        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        pool.attach("job-1", handle);

        assert!(pool.has_running_task_for("job-1"));
        assert_eq!(pool.available_capacity(), 1);
        assert!(!pool.try_reserve("job-1"));
    }

    #[tokio::test]
    async fn test_slot_frees_after_task_panic() {
        let pool = TaskPool::new(1);
        assert!(pool.try_reserve("job-1"));

        let handle = tokio::spawn(async {
            panic!("handler blew up");
        });
        pool.attach("job-1", handle);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pool.has_running_task_for("job-1"));
        assert_eq!(pool.available_capacity(), 1);
    }
}
