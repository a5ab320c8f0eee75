use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A spawned worker with a completion flag that can be polled or waited
/// on with a timeout, independent of the underlying join handle.
pub struct WorkerThread {
    handle: JoinHandle<()>,
    done: Arc<(Mutex<bool>, Condvar)>,
}

impl WorkerThread {
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce(),
        F: Send + 'static,
    {
        let done = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Arc::clone(&done);
        let handle = thread::spawn(move || {
            f();
            let (mutex, condvar) = &*signal;
            *mutex.lock() = true;
            condvar.notify_all();
        });
        Self { handle, done }
    }

    pub fn is_done(&self) -> bool {
        *self.done.0.lock()
    }

    /// Wait up to `duration` for the worker's body to finish. Returns
    /// whether it did. Does not reap the thread; call [`WorkerThread::join`]
    /// for that.
    pub fn join_timeout(&self, duration: Duration) -> bool {
        let (mutex, condvar) = &*self.done;
        let mut done = mutex.lock();
        if *done {
            return true;
        }
        condvar.wait_for(&mut done, duration);
        *done
    }

    pub fn join(self) {
        let _ = self.handle.join();
    }
}
