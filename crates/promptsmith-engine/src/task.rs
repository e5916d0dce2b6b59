use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(1000);

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cooperative cancellation flag shared between a slot and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Set from spawn until the worker hands over its final event.
///
/// The worker thread is still alive for a moment after that event is sent,
/// so thread liveness alone would report a finished task as active.
#[derive(Debug, Clone)]
pub struct InFlight {
    flag: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// A spawned worker thread plus the token that asks it to stop.
#[derive(Debug)]
pub struct TaskHandle {
    handle: Option<thread::JoinHandle<()>>,
    token: CancelToken,
    in_flight: InFlight,
}

impl TaskHandle {
    pub fn spawn<F>(
        name: &str,
        token: CancelToken,
        in_flight: InFlight,
        body: F,
    ) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_string()).spawn(body)?;
        Ok(Self {
            handle: Some(handle),
            token,
            in_flight,
        })
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// `false` once the worker delivered its final event or its thread exited.
    pub fn is_running(&self) -> bool {
        self.in_flight.is_set()
            && self
                .handle
                .as_ref()
                .map(|handle| !handle.is_finished())
                .unwrap_or(false)
    }

    /// Sets the cancel flag and waits up to `timeout` for the worker to exit.
    ///
    /// Returns `false` if the worker was still running at the deadline; it is
    /// then detached and finishes on its own without emitting further events.
    pub fn cancel_and_join(mut self, timeout: Duration) -> bool {
        self.token.cancel();
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                log::debug!(
                    "worker {:?} still running after {timeout:?}; detaching",
                    handle.thread().name()
                );
                return false;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }
        if handle.join().is_err() {
            log::warn!("worker thread panicked while shutting down");
        }
        true
    }

    /// Joins a worker that already finished; no-op otherwise.
    pub(crate) fn reap(&mut self) {
        let finished = self
            .handle
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Sending half of a task's event channel.
///
/// Once the token is cancelled, [`TaskEmitter::emit`] drops events; only
/// [`TaskEmitter::emit_terminal`] still delivers.
#[derive(Debug)]
pub struct TaskEmitter<E> {
    sender: mpsc::Sender<E>,
    token: CancelToken,
    in_flight: InFlight,
}

impl<E> TaskEmitter<E> {
    pub fn new(sender: mpsc::Sender<E>, token: CancelToken) -> Self {
        Self {
            sender,
            token,
            in_flight: InFlight::new(),
        }
    }

    pub fn channel(token: CancelToken) -> (Self, mpsc::Receiver<E>) {
        let (sender, receiver) = mpsc::channel();
        (Self::new(sender, token), receiver)
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `false` when the event was suppressed or nobody is listening.
    pub fn emit(&self, event: E) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.sender.send(event).is_ok()
    }

    pub fn emit_terminal(&self, event: E) {
        let _ = self.sender.send(event);
    }

    /// Delivers the last event of the task, clearing the in-flight flag first
    /// so a consumer reacting to it can start the next task right away.
    pub fn finish(&self, event: E) {
        self.in_flight.clear();
        self.emit_terminal(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::{CancelToken, InFlight, TaskEmitter, TaskHandle};

    #[test]
    fn emitter_drops_events_after_cancel_except_terminal() {
        let token = CancelToken::new();
        let (emitter, rx) = TaskEmitter::channel(token.clone());
        assert!(emitter.emit("progress"));
        token.cancel();
        assert!(!emitter.emit("chunk"));
        emitter.emit_terminal("cancelled");
        drop(emitter);
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec!["progress", "cancelled"]);
    }

    #[test]
    fn finish_clears_in_flight_before_the_event_arrives() -> anyhow::Result<()> {
        let (emitter, rx) = TaskEmitter::channel(CancelToken::new());
        let in_flight = emitter.in_flight().clone();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let handle = TaskHandle::spawn("finishing-worker", CancelToken::new(), in_flight, move || {
            emitter.finish("finished");
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        })?;

        assert_eq!(rx.recv_timeout(Duration::from_secs(5))?, "finished");
        assert!(!handle.is_running());
        release_tx.send(())?;
        assert!(handle.cancel_and_join(Duration::from_secs(5)));
        Ok(())
    }

    #[test]
    fn cancel_and_join_waits_for_cooperative_worker() -> anyhow::Result<()> {
        let token = CancelToken::new();
        let worker_token = token.clone();
        let (tx, rx) = mpsc::channel();
        let handle = TaskHandle::spawn("test-worker", token, InFlight::new(), move || {
            while !worker_token.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            let _ = tx.send("stopped");
        })?;
        assert!(handle.is_running());
        assert!(handle.cancel_and_join(Duration::from_secs(5)));
        assert_eq!(rx.recv()?, "stopped");
        Ok(())
    }

    #[test]
    fn cancel_and_join_detaches_after_deadline() -> anyhow::Result<()> {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let handle = TaskHandle::spawn("stuck-worker", CancelToken::new(), InFlight::new(), move || {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        })?;
        let token = handle.token().clone();
        assert!(!handle.cancel_and_join(Duration::from_millis(30)));
        assert!(token.is_cancelled());
        drop(release_tx);
        Ok(())
    }
}
