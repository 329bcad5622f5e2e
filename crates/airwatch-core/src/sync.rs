//! Device synchronization service.
//!
//! [`DeviceSync`] composes a [`DeviceStore`] watch with the [`SeedPolicy`]
//! into a single stream of [`SyncEvent`]s per subscriber.
//!
//! # State machine
//!
//! ```text
//! Idle --subscribe--> Watching --empty snapshot--> Seeding --seeded--> Watching
//!   \__________________________\_______________________\___unsubscribe__> Unsubscribed
//! ```
//!
//! Errors from the store are delivered as [`SyncEvent::Unavailable`]; they
//! are never turned into an empty list and never trigger seeding.

use std::sync::Arc;

use futures::stream::{self, Stream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use airwatch_types::SensorDevice;

use crate::error::{Error, Result};
use crate::seed::SeedPolicy;
use crate::traits::{DeviceStore, Snapshot};

/// Default capacity of a subscription's event queue.
pub const DEFAULT_EVENT_BUFFER: usize = 16;

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Created; the store watch is not attached yet.
    Idle,
    /// Forwarding store snapshots.
    Watching,
    /// An empty snapshot was observed; the default set is being written.
    Seeding,
    /// Cancelled by the consumer. Terminal.
    Unsubscribed,
}

/// An item delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The full device collection.
    Devices(Vec<SensorDevice>),
    /// The store could not be read.
    Unavailable(Error),
}

/// Synchronization service over a device store.
pub struct DeviceSync<S> {
    store: Arc<S>,
    seeding: Arc<SeedPolicy>,
    buffer: usize,
}

impl<S> Clone for DeviceSync<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            seeding: Arc::clone(&self.seeding),
            buffer: self.buffer,
        }
    }
}

impl<S> std::fmt::Debug for DeviceSync<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSync")
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

impl<S: DeviceStore + 'static> DeviceSync<S> {
    /// Create a service with its own seed policy.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_policy(store, Arc::new(SeedPolicy::new()))
    }

    /// Create a service sharing an existing seed policy.
    pub fn with_policy(store: Arc<S>, seeding: Arc<SeedPolicy>) -> Self {
        Self {
            store,
            seeding,
            buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Set the per-subscription event queue capacity.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// One-shot read of the collection, seeding it if empty.
    pub async fn devices(&self) -> Result<Vec<SensorDevice>> {
        let observed = self.store.get_all().await?;
        self.seeding.ensure_seeded(&*self.store, observed).await
    }

    /// Subscribe to collection snapshots.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self) -> DeviceSubscription {
        let (events_tx, events_rx) = mpsc::channel(self.buffer);
        let state = Arc::new(watch::Sender::new(SyncState::Idle));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(pump(
            Arc::clone(&self.store),
            Arc::clone(&self.seeding),
            events_tx,
            Arc::clone(&state),
            cancel.clone(),
        ));

        DeviceSubscription {
            events: events_rx,
            state,
            cancel,
            task: Some(task),
        }
    }

    /// Subscribe to one device.
    pub fn subscribe_device(&self, id: impl Into<String>) -> DeviceWatch {
        DeviceWatch {
            id: id.into(),
            inner: self.subscribe(),
            last: None,
        }
    }
}

/// Move to `next` unless the subscription is already terminal.
fn transition(state: &watch::Sender<SyncState>, next: SyncState) {
    state.send_if_modified(|current| {
        if *current == SyncState::Unsubscribed || *current == next {
            return false;
        }
        *current = next;
        true
    });
}

async fn pump<S: DeviceStore + ?Sized>(
    store: Arc<S>,
    seeding: Arc<SeedPolicy>,
    events: mpsc::Sender<SyncEvent>,
    state: Arc<watch::Sender<SyncState>>,
    cancel: CancellationToken,
) {
    let attached = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        attached = store.watch() => attached,
    };

    let mut snapshots = match attached {
        Ok(watch) => watch,
        Err(e) => {
            warn!("Failed to attach device watch: {}", e);
            let _ = events.send(SyncEvent::Unavailable(e)).await;
            return;
        }
    };
    transition(&state, SyncState::Watching);

    loop {
        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            snapshot = snapshots.next() => snapshot,
        };

        let event = match snapshot {
            None => {
                debug!("Device watch ended");
                let _ = events.send(SyncEvent::Unavailable(Error::Closed)).await;
                break;
            }
            Some(Snapshot::Failed(err)) => SyncEvent::Unavailable(Error::Transport(err)),
            Some(Snapshot::Devices(devices)) if devices.is_empty() => {
                transition(&state, SyncState::Seeding);
                let seeded = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    seeded = seeding.ensure_seeded(&*store, devices) => seeded,
                };
                transition(&state, SyncState::Watching);
                match seeded {
                    Ok(devices) => SyncEvent::Devices(devices),
                    Err(e) => SyncEvent::Unavailable(e),
                }
            }
            Some(Snapshot::Devices(devices)) => SyncEvent::Devices(devices),
        };

        let delivered = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = events.send(event) => sent.is_ok(),
        };
        if !delivered {
            break;
        }
    }
}

/// Handle to a running subscription.
///
/// Dropping the handle cancels the subscription.
#[derive(Debug)]
pub struct DeviceSubscription {
    events: mpsc::Receiver<SyncEvent>,
    state: Arc<watch::Sender<SyncState>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DeviceSubscription {
    /// Wait for the next event. Returns `None` once the subscription ends.
    pub async fn next(&mut self) -> Option<SyncEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.events.recv().await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Convert into a [`Stream`] of events. Dropping the stream cancels the
    /// subscription.
    pub fn into_stream(self) -> impl Stream<Item = SyncEvent> + Send + 'static {
        stream::unfold(self, |mut sub| async move {
            let event = sub.next().await?;
            Some((event, sub))
        })
    }

    /// Cancel the subscription and release the store watch.
    ///
    /// Idempotent.
    pub async fn unsubscribe(&mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn cancel(&mut self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            self.state.send_replace(SyncState::Unsubscribed);
            self.events.close();
        }
    }
}

impl Drop for DeviceSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Subscription to a single device.
///
/// Yields `Some(device)` whenever the device changes and `None` when it is
/// absent from the collection. Snapshots in which the device is unchanged
/// are skipped.
#[derive(Debug)]
pub struct DeviceWatch {
    id: String,
    inner: DeviceSubscription,
    last: Option<Option<SensorDevice>>,
}

impl DeviceWatch {
    /// The watched device ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next change to the device.
    pub async fn next(&mut self) -> Option<Result<Option<SensorDevice>>> {
        loop {
            match self.inner.next().await? {
                SyncEvent::Unavailable(e) => return Some(Err(e)),
                SyncEvent::Devices(devices) => {
                    let current = devices.into_iter().find(|d| d.id == self.id);
                    if self.last.as_ref() == Some(&current) {
                        continue;
                    }
                    self.last = Some(current.clone());
                    return Some(Ok(current));
                }
            }
        }
    }

    /// Cancel the subscription.
    pub async fn unsubscribe(&mut self) {
        self.inner.unsubscribe().await;
    }
}
