//! Channel access layer
//!
//! Bridges the simulation thread and the command thread. Channels are
//! acquired, mutated and released only by closures running on the command
//! thread; the simulation thread holds `ChannelHandle`s and submits work
//! through them.

use super::channel::Channel;
use super::executor::{Command, CommandSender, CommandThread};
use crate::backend::{AudioBackend, PoolKind};
use crate::error::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct HandleInner {
    id: u64,
    channel: Mutex<Option<Channel>>,
    stopped: AtomicBool,
    commands: CommandSender,
}

/// Shared reference to one acquired channel.
///
/// Cloning the handle does not duplicate the channel; release happens once
/// no matter how many clones call it.
#[derive(Clone)]
pub struct ChannelHandle {
    inner: Arc<HandleInner>,
}

impl ChannelHandle {
    fn new(channel: Channel, commands: CommandSender) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
                channel: Mutex::new(Some(channel)),
                stopped: AtomicBool::new(false),
                commands,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Run `f` against the live channel on the command thread.
    ///
    /// Does nothing if the handle has been released by the time `f` runs.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce(&mut Channel) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.inner.commands.submit(Box::new(move || {
            if let Some(channel) = lock(&inner.channel).as_mut() {
                f(channel);
            }
        }));
    }

    /// Stop the channel and return it to its pool. Idempotent.
    pub fn release(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        let channel = lock(&self.inner.channel).take();
        if let Some(channel) = channel {
            trace!("Releasing channel handle {}", self.inner.id);
            channel.destroy();
        }
    }

    /// True once the handle has been released
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Per-tick maintenance. Returns false once the handle is finished.
    fn tick(&self) -> bool {
        if self.is_stopped() {
            return false;
        }

        let finished = {
            let mut guard = lock(&self.inner.channel);
            match guard.as_mut() {
                Some(channel) => {
                    channel.update_stream();
                    channel.stopped()
                }
                None => true,
            }
        };

        if finished {
            self.release();
            return false;
        }
        true
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("id", &self.inner.id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Channel acquisition in flight on the command thread.
pub struct PendingHandle {
    rx: Receiver<Option<ChannelHandle>>,
    abandoned: Arc<AtomicBool>,
}

impl PendingHandle {
    /// Block until the command thread answers.
    ///
    /// `Ok(None)` means the pool was exhausted. If the wait times out the
    /// channel, once acquired, is released rather than leaked.
    pub fn wait(self, timeout: Duration) -> Result<Option<ChannelHandle>> {
        match self.rx.recv_timeout(timeout) {
            Ok(handle) => Ok(handle),
            Err(RecvTimeoutError::Timeout) => {
                // The answer may land between the timeout and this point
                self.abandoned.store(true, Ordering::SeqCst);
                if let Ok(Some(handle)) = self.rx.try_recv() {
                    debug!("Releasing late channel handle {}", handle.id());
                    handle.release();
                }
                Err(Error::CommandThread(format!(
                    "Channel acquisition timed out after {:?}",
                    timeout
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::CommandThread(
                "Command thread dropped the acquisition request".to_string(),
            )),
        }
    }
}

/// Owner of the command thread and every tracked channel handle.
pub struct ChannelAccess {
    backend: Arc<dyn AudioBackend>,
    executor: CommandThread,
    handles: Arc<Mutex<Vec<ChannelHandle>>>,
}

impl ChannelAccess {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Result<Self> {
        Ok(Self {
            backend,
            executor: CommandThread::start("chirp-sound")?,
            handles: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Request a channel from `kind`'s pool.
    pub fn create_handle(&self, kind: PoolKind) -> PendingHandle {
        let (tx, rx) = mpsc::sync_channel(1);
        let abandoned = Arc::new(AtomicBool::new(false));
        let requester_gone = Arc::clone(&abandoned);
        let backend = Arc::clone(&self.backend);
        let handles = Arc::clone(&self.handles);
        let commands = self.executor.sender();

        self.executor.submit(Box::new(move || {
            let handle = backend
                .acquire_voice(kind)
                .map(|voice| ChannelHandle::new(Channel::new(voice, Arc::clone(&backend)), commands));

            if let Some(handle) = &handle {
                lock(&handles).push(handle.clone());
            }

            let sent = handle.clone();
            match tx.try_send(handle) {
                Err(
                    mpsc::TrySendError::Full(Some(handle))
                    | mpsc::TrySendError::Disconnected(Some(handle)),
                ) => {
                    debug!("Channel requester went away, releasing handle {}", handle.id());
                    handle.release();
                }
                Ok(()) if requester_gone.load(Ordering::SeqCst) => {
                    if let Some(handle) = sent {
                        debug!("Channel requester timed out, releasing handle {}", handle.id());
                        handle.release();
                    }
                }
                _ => {}
            }
        }));

        PendingHandle { rx, abandoned }
    }

    /// Submit arbitrary work to the command thread.
    pub fn submit(&self, command: Command) -> bool {
        self.executor.submit(command)
    }

    /// Run `f` on every live channel.
    pub fn execute_on_channels<F>(&self, f: F)
    where
        F: Fn(&mut Channel) + Send + 'static,
    {
        let handles = Arc::clone(&self.handles);
        self.executor.submit(Box::new(move || {
            for handle in lock(&handles).iter() {
                if let Some(channel) = lock(&handle.inner.channel).as_mut() {
                    f(channel);
                }
            }
        }));
    }

    /// Queue the per-tick pass that refills streams and reaps finished
    /// channels.
    pub fn schedule_tick(&self) {
        let handles = Arc::clone(&self.handles);
        self.executor.submit(Box::new(move || {
            lock(&handles).retain(|handle| handle.tick());
        }));
    }

    /// Stop the command thread, discarding queued commands.
    pub fn stop_thread(&mut self) {
        self.executor.stop();
    }

    pub fn restart_thread(&mut self) -> Result<()> {
        self.executor.restart()
    }

    /// Release every tracked handle.
    ///
    /// Only called while the command thread is stopped, so nothing else can
    /// be touching the channels.
    pub fn clear(&self) {
        debug_assert!(!self.executor.is_current());
        let handles = std::mem::take(&mut *lock(&self.handles));
        if !handles.is_empty() {
            debug!("Releasing {} channel handles", handles.len());
        }
        for handle in handles {
            handle.release();
        }
    }

    pub fn tracked_count(&self) -> usize {
        lock(&self.handles).len()
    }
}

impl Drop for ChannelAccess {
    fn drop(&mut self) {
        self.executor.stop();
        self.clear();
    }
}
