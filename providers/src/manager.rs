//! Provider manager: the single control loop that owns the provider cache.
//!
//! [`ProviderManager`] is a cheap, cloneable handle. Every claim, query and
//! sweep tick is funnelled through one spawned task (`ManagerActor`), so the
//! LRU cache needs no lock and every request observes the effects of all
//! requests serviced before it.
//!
//! Callers may attach a [`CancellationToken`]. A request whose token fires
//! before the loop picks it up is abandoned without touching any state; once
//! the loop has started servicing it the outcome is reported normally.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use provstore_store::{Datastore, StoreError};
use provstore_types::{Clock, ContentId, PeerId, SystemClock, Timestamp};
use provstore_utils::format_duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::cache::ProviderCache;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::record::ProviderSet;
use crate::store::ProviderStore;
use crate::sweeper::{SweepReport, Sweeper};

const PENDING: u8 = 0;
const SERVICED: u8 = 1;
const ABANDONED: u8 = 2;

/// Decides, exactly once, whether the loop or the canceling caller owns a request.
struct Ticket(AtomicU8);

impl Ticket {
    fn new() -> Self {
        Self(AtomicU8::new(PENDING))
    }

    /// Loop side: claim the request for servicing.
    fn begin(&self) -> bool {
        self.0
            .compare_exchange(PENDING, SERVICED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Caller side: give up on a request the loop has not started.
    fn abandon(&self) -> bool {
        self.0
            .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct Request<T> {
    ticket: Arc<Ticket>,
    reply: oneshot::Sender<Result<T, ProviderError>>,
}

impl<T> Request<T> {
    fn respond(self, result: Result<T, ProviderError>) {
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.reply.send(result);
    }
}

enum Command {
    RecordClaim(ContentId, PeerId, Request<()>),
    QueryProviders(ContentId, Request<Vec<PeerId>>),
    Sweep(Request<SweepReport>),
    CacheLen(Request<usize>),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::RecordClaim(..) => "record_claim",
            Command::QueryProviders(..) => "query_providers",
            Command::Sweep(..) => "sweep",
            Command::CacheLen(..) => "cache_len",
        }
    }

    fn ticket(&self) -> &Ticket {
        match self {
            Command::RecordClaim(_, _, req) => &req.ticket,
            Command::QueryProviders(_, req) => &req.ticket,
            Command::Sweep(req) => &req.ticket,
            Command::CacheLen(req) => &req.ticket,
        }
    }
}

/// Handle to a running provider manager.
///
/// Cloning the handle shares the same control loop. The loop stops when
/// [`ProviderManager::shutdown`] is called or the last handle is dropped.
#[derive(Clone)]
pub struct ProviderManager {
    inner: Arc<Inner>,
}

struct Inner {
    local_peer: PeerId,
    cmd_tx: mpsc::Sender<Command>,
    closed: AtomicBool,
    stop: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl ProviderManager {
    /// Start a manager for `local_peer` over `store`, using the wall clock.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        local_peer: PeerId,
        store: Arc<dyn Datastore>,
        config: ProviderConfig,
    ) -> Result<Self, ProviderError> {
        Self::with_clock(local_peer, store, config, Arc::new(SystemClock))
    }

    /// Like [`ProviderManager::new`] but reading time from `clock`.
    pub fn with_clock(
        local_peer: PeerId,
        store: Arc<dyn Datastore>,
        config: ProviderConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ProviderError> {
        config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::channel(config.request_queue_depth);
        let stop = CancellationToken::new();

        let actor = ManagerActor {
            store: ProviderStore::new(store),
            cache: ProviderCache::new(config.cache_capacity()?),
            sweeper: Sweeper::new(config.provide_validity()),
            clock,
            cleanup_interval: config.cleanup_interval(),
            cmd_rx,
        };

        info!(
            peer = %local_peer,
            cache_capacity = config.cache_capacity,
            provide_validity = %format_duration(config.provide_validity()),
            cleanup_interval = %format_duration(config.cleanup_interval()),
            "starting provider manager"
        );
        let task = tokio::spawn(actor.run(stop.clone()));

        Ok(Self {
            inner: Arc::new(Inner {
                local_peer,
                cmd_tx,
                closed: AtomicBool::new(false),
                stop,
                task: Mutex::new(Some(task)),
            }),
        })
    }

    /// The peer this manager was created for.
    pub fn local_peer(&self) -> &PeerId {
        &self.inner.local_peer
    }

    /// Whether shutdown has begun.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Record that `peer_id` provides `content_id` as of now.
    ///
    /// Returns once the claim is durably written.
    pub async fn record_claim(
        &self,
        content_id: &ContentId,
        peer_id: &PeerId,
    ) -> Result<(), ProviderError> {
        self.request(None, |req| {
            Command::RecordClaim(content_id.clone(), peer_id.clone(), req)
        })
        .await
    }

    pub async fn record_claim_with_cancel(
        &self,
        content_id: &ContentId,
        peer_id: &PeerId,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        self.request(Some(cancel), |req| {
            Command::RecordClaim(content_id.clone(), peer_id.clone(), req)
        })
        .await
    }

    /// Every peer with a non-expired claim for `content_id`, in no particular order.
    pub async fn query_providers(
        &self,
        content_id: &ContentId,
    ) -> Result<Vec<PeerId>, ProviderError> {
        self.request(None, |req| Command::QueryProviders(content_id.clone(), req))
            .await
    }

    pub async fn query_providers_with_cancel(
        &self,
        content_id: &ContentId,
        cancel: &CancellationToken,
    ) -> Result<Vec<PeerId>, ProviderError> {
        self.request(Some(cancel), |req| {
            Command::QueryProviders(content_id.clone(), req)
        })
        .await
    }

    /// Run one expiry sweep now instead of waiting for the next tick.
    pub async fn sweep_now(&self) -> Result<SweepReport, ProviderError> {
        self.request(None, Command::Sweep).await
    }

    /// Number of content ids currently held in the in-memory cache.
    pub async fn cache_len(&self) -> Result<usize, ProviderError> {
        self.request(None, Command::CacheLen).await
    }

    /// Stop accepting requests, finish the queued ones, stop sweeping, and
    /// wait for the control loop to exit. Safe to call more than once.
    pub async fn shutdown(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            info!(peer = %self.inner.local_peer, "shutting down provider manager");
        }
        self.inner.stop.cancel();

        // Held across the await so concurrent callers also wait for the exit.
        let mut task = self.inner.task.lock().await;
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "provider manager task ended abnormally");
            }
        }
    }

    async fn request<T>(
        &self,
        cancel: Option<&CancellationToken>,
        make: impl FnOnce(Request<T>) -> Command,
    ) -> Result<T, ProviderError> {
        if self.is_closed() {
            return Err(ProviderError::Closed);
        }

        let ticket = Arc::new(Ticket::new());
        let (reply, mut rx) = oneshot::channel();
        let cmd = make(Request {
            ticket: Arc::clone(&ticket),
            reply,
        });

        let Some(cancel) = cancel else {
            self.inner
                .cmd_tx
                .send(cmd)
                .await
                .map_err(|_| ProviderError::Closed)?;
            return rx.await.map_err(|_| ProviderError::Closed)?;
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Canceled),
            sent = self.inner.cmd_tx.send(cmd) => sent.map_err(|_| ProviderError::Closed)?,
        }

        tokio::select! {
            biased;
            outcome = &mut rx => outcome.map_err(|_| ProviderError::Closed)?,
            _ = cancel.cancelled() => {
                if ticket.abandon() {
                    debug!("provider request canceled before it was serviced");
                    Err(ProviderError::Canceled)
                } else {
                    // Already being serviced; its outcome is committed.
                    rx.await.map_err(|_| ProviderError::Closed)?
                }
            }
        }
    }
}

struct ManagerActor {
    store: ProviderStore,
    cache: ProviderCache,
    sweeper: Sweeper,
    clock: Arc<dyn Clock>,
    cleanup_interval: Duration,
    cmd_rx: mpsc::Receiver<Command>,
}

impl ManagerActor {
    async fn run(mut self, stop: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.cleanup_interval, self.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep();
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
        }

        // Stop intake, then finish whatever was already queued.
        self.cmd_rx.close();
        let mut drained = 0usize;
        while let Some(cmd) = self.cmd_rx.recv().await {
            self.handle(cmd);
            drained += 1;
        }
        info!(drained, cached = self.cache.len(), "provider manager stopped");
    }

    fn handle(&mut self, cmd: Command) {
        if !cmd.ticket().begin() {
            debug!(request = cmd.name(), "dropping request canceled before service");
            return;
        }
        match cmd {
            Command::RecordClaim(content_id, peer_id, req) => {
                let result = self.record_claim(content_id, peer_id);
                req.respond(result);
            }
            Command::QueryProviders(content_id, req) => {
                let result = self.query_providers(&content_id);
                req.respond(result);
            }
            Command::Sweep(req) => {
                let report = self.sweep();
                req.respond(Ok(report));
            }
            Command::CacheLen(req) => req.respond(Ok(self.cache.len())),
        }
    }

    fn record_claim(&mut self, content_id: ContentId, peer_id: PeerId) -> Result<(), ProviderError> {
        let now = self.clock.now();

        if let Some(set) = self.cache.get_mut(&content_id) {
            let last_seen = persist_claim(&self.store, &content_id, &peer_id, set.get(&peer_id), now)?;
            set.insert(peer_id.clone(), last_seen);
            debug!(cid = %content_id, peer = %peer_id, "recorded provider claim");
            return Ok(());
        }

        // Not resident: rebuild from storage so the cached set is the union of
        // everything persisted for this content id, not just this claim.
        let mut set = self.store.load_set(&content_id)?;
        let last_seen = persist_claim(&self.store, &content_id, &peer_id, set.get(&peer_id), now)?;
        set.insert(peer_id.clone(), last_seen);
        set.remove_expired(now, self.sweeper.validity());
        self.cache_put(set);
        debug!(cid = %content_id, peer = %peer_id, "recorded provider claim");
        Ok(())
    }

    fn query_providers(&mut self, content_id: &ContentId) -> Result<Vec<PeerId>, ProviderError> {
        let now = self.clock.now();
        let validity = self.sweeper.validity();

        if let Some(set) = self.cache.get(content_id) {
            trace!(cid = %content_id, "provider cache hit");
            return Ok(set.valid_peers(now, validity));
        }

        trace!(cid = %content_id, "provider cache miss, loading from store");
        let mut set = self.store.load_set(content_id)?;
        set.remove_expired(now, validity);
        let peers = set.valid_peers(now, validity);
        if !set.is_empty() {
            self.cache_put(set);
        }
        Ok(peers)
    }

    fn sweep(&mut self) -> SweepReport {
        let now = self.clock.now();
        self.sweeper.sweep(&self.store, &mut self.cache, now)
    }

    fn cache_put(&mut self, set: ProviderSet) {
        if let Some(evicted) = self.cache.put(set) {
            trace!(cid = %evicted, "evicted provider set from cache");
        }
    }
}

/// Persist a claim without ever moving a stored timestamp backwards.
///
/// Returns the timestamp now recorded for the pair.
fn persist_claim(
    store: &ProviderStore,
    content_id: &ContentId,
    peer_id: &PeerId,
    existing: Option<Timestamp>,
    now: Timestamp,
) -> Result<Timestamp, StoreError> {
    match existing {
        Some(stored) if stored >= now => Ok(stored),
        _ => {
            store.put(content_id, peer_id, now)?;
            Ok(now)
        }
    }
}
