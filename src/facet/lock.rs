use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use thiserror::Error;

/// Default bound on how long a cycle waits for a resource lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while acquiring a resource lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock stayed unavailable for the whole wait window.
    #[error("Timed out after {timeout:?} waiting for {mode} lock on resource {resource_id}")]
    Timeout {
        resource_id: i32,
        mode: &'static str,
        timeout: Duration,
    },
}

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
}

/// Reader/writer lock for one managed resource with bounded waits.
#[derive(Debug)]
pub struct ResourceLock {
    resource_id: i32,
    state: Mutex<LockState>,
    released: Condvar,
}

impl ResourceLock {
    pub fn new(resource_id: i32) -> Self {
        Self {
            resource_id,
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
        }
    }

    pub fn resource_id(&self) -> i32 {
        self.resource_id
    }

    /// Acquire shared access, waiting at most `timeout` for a writer to leave.
    pub fn read(self: &Arc<Self>, timeout: Duration) -> Result<ReadGuard, LockError> {
        self.acquire(timeout, "read", |state| !state.writer, |state| state.readers += 1)?;
        Ok(ReadGuard {
            lock: Arc::clone(self),
        })
    }

    /// Acquire exclusive access, waiting at most `timeout` for all holders to leave.
    pub fn write(self: &Arc<Self>, timeout: Duration) -> Result<WriteGuard, LockError> {
        self.acquire(
            timeout,
            "write",
            |state| !state.writer && state.readers == 0,
            |state| state.writer = true,
        )?;
        Ok(WriteGuard {
            lock: Arc::clone(self),
        })
    }

    fn acquire(
        &self,
        timeout: Duration,
        mode: &'static str,
        available: impl Fn(&LockState) -> bool,
        take: impl FnOnce(&mut LockState),
    ) -> Result<(), LockError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().expect("resource lock poisoned");
        while !available(&state) {
            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout {
                    resource_id: self.resource_id,
                    mode,
                    timeout,
                });
            }
            let (next, _) = self
                .released
                .wait_timeout(state, deadline - now)
                .expect("resource lock poisoned");
            state = next;
        }
        take(&mut state);
        Ok(())
    }

    fn release(&self, release: impl FnOnce(&mut LockState)) {
        let mut state = self.state.lock().expect("resource lock poisoned");
        release(&mut state);
        self.released.notify_all();
    }
}

/// Shared hold on a resource; released on drop.
#[derive(Debug)]
pub struct ReadGuard {
    lock: Arc<ResourceLock>,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        self.lock
            .release(|state| state.readers = state.readers.saturating_sub(1));
    }
}

/// Exclusive hold on a resource; released on drop.
#[derive(Debug)]
pub struct WriteGuard {
    lock: Arc<ResourceLock>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.lock.release(|state| state.writer = false);
    }
}

/// Registry handing out one lock per resource id.
#[derive(Debug, Default)]
pub struct ResourceLocks {
    locks: Mutex<HashMap<i32, Arc<ResourceLock>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, resource_id: i32) -> Arc<ResourceLock> {
        let mut locks = self.locks.lock().expect("resource lock registry poisoned");
        Arc::clone(
            locks
                .entry(resource_id)
                .or_insert_with(|| Arc::new(ResourceLock::new(resource_id))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn readers_share_and_writers_wait() {
        let lock = Arc::new(ResourceLock::new(1));
        let first = lock.read(Duration::from_millis(10)).unwrap();
        let second = lock.read(Duration::from_millis(10)).unwrap();
        assert!(lock.write(Duration::from_millis(10)).is_err());
        drop(first);
        drop(second);
        assert!(lock.write(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn read_times_out_while_writer_holds_lock() {
        let lock = Arc::new(ResourceLock::new(42));
        let _writer = lock.write(Duration::from_millis(10)).unwrap();
        let err = lock.read(Duration::from_millis(20)).unwrap_err();
        let LockError::Timeout {
            resource_id, mode, ..
        } = err;
        assert_eq!(resource_id, 42);
        assert_eq!(mode, "read");
    }

    #[test]
    fn reader_proceeds_once_writer_releases() {
        let lock = Arc::new(ResourceLock::new(5));
        let writer = lock.write(Duration::from_millis(10)).unwrap();
        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.read(Duration::from_secs(5)).map(|_| ()))
        };
        thread::sleep(Duration::from_millis(20));
        drop(writer);
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn registry_returns_the_same_lock_per_resource() {
        let locks = ResourceLocks::new();
        let a = locks.lock_for(1);
        let b = locks.lock_for(1);
        let c = locks.lock_for(2);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
