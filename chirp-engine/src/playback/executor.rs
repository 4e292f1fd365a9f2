//! Command thread
//!
//! A single dedicated thread that runs submitted closures strictly in
//! submission order. It is the only thread allowed to touch hardware voices.
//!
//! Stopping the thread discards every closure still queued. A restart builds a
//! fresh queue, so senders cloned before the restart silently drop whatever
//! they submit afterwards.

use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, info, trace};

/// Unit of work for the command thread
pub type Command = Box<dyn FnOnce() + Send + 'static>;

/// Queue shared between the command thread and its senders
struct CommandQueue {
    queue: Mutex<VecDeque<Command>>,
    condvar: Condvar,
    stop_flag: AtomicBool,
}

impl CommandQueue {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            stop_flag: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Command>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable submission endpoint for one generation of the command thread.
#[derive(Clone)]
pub struct CommandSender {
    queue: Arc<CommandQueue>,
}

impl CommandSender {
    /// Enqueue `command`. Returns false if the thread has been stopped, in
    /// which case the command is dropped without running.
    pub fn submit(&self, command: Command) -> bool {
        if self.queue.stop_flag.load(Ordering::Acquire) {
            trace!("Command dropped: command thread stopped");
            return false;
        }
        self.queue.lock().push_back(command);
        self.queue.condvar.notify_one();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.queue.stop_flag.load(Ordering::Acquire)
    }
}

/// Owner of the command thread
pub struct CommandThread {
    name: String,
    queue: Arc<CommandQueue>,
    thread: Option<JoinHandle<()>>,
    thread_id: Option<ThreadId>,
}

impl CommandThread {
    /// Spawn the thread.
    pub fn start(name: &str) -> Result<Self> {
        let mut executor = Self {
            name: name.to_string(),
            queue: Arc::new(CommandQueue::new()),
            thread: None,
            thread_id: None,
        };
        executor.spawn()?;
        Ok(executor)
    }

    fn spawn(&mut self) -> Result<()> {
        let queue = Arc::new(CommandQueue::new());
        let worker_queue = Arc::clone(&queue);

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run_loop(worker_queue))
            .map_err(|e| Error::CommandThread(format!("Failed to spawn command thread: {}", e)))?;

        self.thread_id = Some(handle.thread().id());
        self.thread = Some(handle);
        self.queue = queue;
        debug!("Command thread '{}' started", self.name);
        Ok(())
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn submit(&self, command: Command) -> bool {
        self.sender().submit(command)
    }

    /// True when called from the command thread itself
    pub fn is_current(&self) -> bool {
        self.thread_id == Some(thread::current().id())
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop the thread, discard queued commands and join.
    pub fn stop(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };

        self.queue.stop_flag.store(true, Ordering::Release);
        let discarded = {
            let mut queue = self.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        self.queue.condvar.notify_all();

        if discarded > 0 {
            debug!("Discarded {} queued commands", discarded);
        }

        match handle.join() {
            Ok(()) => debug!("Command thread '{}' joined", self.name),
            Err(e) => error!("Command thread '{}' join failed: {:?}", self.name, e),
        }
        self.thread_id = None;
    }

    /// Stop, drain and start a fresh thread.
    pub fn restart(&mut self) -> Result<()> {
        self.stop();
        self.spawn()?;
        info!("Command thread '{}' restarted", self.name);
        Ok(())
    }
}

impl Drop for CommandThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(queue: Arc<CommandQueue>) {
    loop {
        let command = {
            let mut pending = queue.lock();
            while pending.is_empty() && !queue.stop_flag.load(Ordering::Acquire) {
                pending = queue
                    .condvar
                    .wait(pending)
                    .unwrap_or_else(PoisonError::into_inner);
            }

            if queue.stop_flag.load(Ordering::Acquire) {
                break;
            }

            match pending.pop_front() {
                Some(command) => command,
                None => continue,
            }
        };

        // One failing command must not take the thread down with it
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(command)) {
            error!("Command panicked: {}", panic_message(&payload));
        }
    }
    trace!("Command thread exiting");
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
