//! Bounded lookahead buffer: single-writer (fill thread), single-reader
//! (tick thread), capacity `2N` for a target depth `N`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

pub struct LookaheadBuffer<T> {
    inner: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> LookaheadBuffer<T> {
    pub fn new(target_depth: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(target_depth * 2)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: target_depth * 2,
        }
    }

    pub fn depth(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut q = self.inner.lock().unwrap();
        if q.len() >= self.capacity {
            return Err(item);
        }
        q.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Block until there is room, or `cancel` is set. Returns `false` if
    /// cancelled without pushing.
    pub fn push_blocking(&self, item: T, cancel: &Arc<AtomicBool>) -> bool {
        let mut q = self.inner.lock().unwrap();
        loop {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            if q.len() < self.capacity {
                q.push_back(item);
                self.not_empty.notify_one();
                return true;
            }
            let (guard, _timeout) = self
                .not_full
                .wait_timeout(q, Duration::from_millis(50))
                .unwrap();
            q = guard;
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        let mut q = self.inner.lock().unwrap();
        let item = q.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    pub fn clear(&self) {
        let mut q = self.inner.lock().unwrap();
        q.clear();
        self.not_full.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equilibrium_bounds() {
        let buf: LookaheadBuffer<u32> = LookaheadBuffer::new(3);
        for i in 0..6 {
            assert!(buf.try_push(i).is_ok());
        }
        assert!(buf.try_push(99).is_err(), "capacity 2N must reject the 7th push");
        assert_eq!(buf.depth(), 6);
        for _ in 0..6 {
            assert!(buf.try_pop().is_some());
        }
        assert_eq!(buf.depth(), 0);
    }

    #[test]
    fn push_blocking_wakes_on_cancel() {
        let buf: Arc<LookaheadBuffer<u32>> = Arc::new(LookaheadBuffer::new(1));
        for i in 0..2 {
            buf.try_push(i).unwrap();
        }
        let cancel = Arc::new(AtomicBool::new(false));
        let buf2 = buf.clone();
        let cancel2 = cancel.clone();
        let handle = std::thread::spawn(move || buf2.push_blocking(42, &cancel2));
        std::thread::sleep(Duration::from_millis(100));
        cancel.store(true, Ordering::Relaxed);
        let pushed = handle.join().unwrap();
        assert!(!pushed, "push_blocking must return false on cancel, not deadlock");
    }
}
