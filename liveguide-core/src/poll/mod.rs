mod fetcher;

pub use fetcher::HttpFetcher;
pub use fetcher::LiveStatusFetcher;

use std::fmt;
use std::sync::Arc;

use actlet::prelude::*;

use crate::error::Error;
use crate::models::flatten_live_statuses;
use crate::models::LiveStatusEntry;
use crate::models::ScheduleId;
use crate::models::WebChannelSchedules;
use crate::schedule::ScheduleIndexUpdated;
use crate::schedule::ScheduleWindowIndex;
use crate::store::LiveStatusSnapshot;
use crate::store::LiveStatusStore;
use crate::store::LiveStatusUpdated;

/// Fetches live statuses and applies them to the store.
///
/// At most one fetch is in flight.  Requests arriving while a fetch is in
/// flight collapse into a single trailing request which starts when the
/// in-flight fetch completes.  The newest request wins.
pub struct PollWorker<F> {
    fetcher: F,
    store: LiveStatusStore,
    index_emitters: EmitterRegistry<ScheduleIndexUpdated>,
    in_flight: Option<RunPoll>,
    trailing: Option<RunPoll>,
    suspended: bool,
    deferred: Option<RunPoll>,
}

impl<F> PollWorker<F> {
    pub fn new(fetcher: F) -> Self {
        PollWorker {
            fetcher,
            store: LiveStatusStore::new(),
            index_emitters: Default::default(),
            in_flight: None,
            trailing: None,
            suspended: false,
            deferred: None,
        }
    }
}

impl<F> PollWorker<F>
where
    F: LiveStatusFetcher + Clone + Send + Sync + 'static,
{
    fn request(&mut self, req: RunPoll, ctx: &mut Context<Self>) {
        if self.in_flight.is_some() {
            if let Some(prev) = self.trailing.replace(req) {
                tracing::debug!(poll.trigger = %prev.trigger, "Coalesced");
            }
            return;
        }
        self.start(req, ctx);
    }

    fn start(&mut self, req: RunPoll, ctx: &mut Context<Self>) {
        tracing::debug!(
            poll.trigger = %req.trigger,
            poll.device_id = ?req.device_id,
            "Fetching..."
        );
        let fetcher = self.fetcher.clone();
        let device_id = req.device_id.clone();
        let emitter: Emitter<PollCompleted> = ctx.emitter();
        ctx.spawn_task(async move {
            let result = fetcher.fetch(device_id).await;
            emitter.emit(PollCompleted { result }).await;
        });
        self.in_flight = Some(req);
    }
}

#[async_trait]
impl<F> Actor for PollWorker<F>
where
    F: LiveStatusFetcher + Clone + Send + Sync + 'static,
{
    async fn started(&mut self, _ctx: &mut Context<Self>) {
        tracing::debug!("Started");
    }

    async fn stopped(&mut self, _ctx: &mut Context<Self>) {
        tracing::debug!("Stopped");
    }
}

// run poll

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollTrigger {
    Timer,
    Push,
    Foreground,
    Manual,
}

impl fmt::Display for PollTrigger {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Timer => write!(f, "timer"),
            Self::Push => write!(f, "push"),
            Self::Foreground => write!(f, "foreground"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Clone, Debug, Message)]
pub struct RunPoll {
    pub trigger: PollTrigger,
    pub device_id: Option<String>,
}

#[async_trait]
impl<F> Handler<RunPoll> for PollWorker<F>
where
    F: LiveStatusFetcher + Clone + Send + Sync + 'static,
{
    async fn handle(&mut self, msg: RunPoll, ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "RunPoll", %msg.trigger);
        if self.suspended {
            tracing::debug!(poll.trigger = %msg.trigger, "Deferred while suspended");
            self.deferred = Some(msg);
            return;
        }
        self.request(msg, ctx);
    }
}

// poll completed

#[derive(Message)]
struct PollCompleted {
    result: Result<Vec<WebChannelSchedules>, Error>,
}

#[async_trait]
impl<F> Handler<PollCompleted> for PollWorker<F>
where
    F: LiveStatusFetcher + Clone + Send + Sync + 'static,
{
    async fn handle(&mut self, msg: PollCompleted, ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "PollCompleted");
        let req = self.in_flight.take();
        match msg.result {
            Ok(channels) => {
                self.store
                    .replace_all(flatten_live_statuses(&channels))
                    .await;
                let index = Arc::new(ScheduleWindowIndex::from(channels.as_slice()));
                tracing::debug!(index.entries = index.len(), "Updated schedule index");
                self.index_emitters
                    .emit(ScheduleIndexUpdated { index })
                    .await;
            }
            Err(err) => {
                // The last snapshot is kept.
                tracing::warn!(
                    %err,
                    poll.trigger = ?req.map(|req| req.trigger),
                    "Failed to fetch live statuses"
                );
            }
        }
        if let Some(next) = self.trailing.take() {
            if self.suspended {
                self.deferred = Some(next);
            } else {
                self.start(next, ctx);
            }
        }
    }
}

// suspend polling

#[derive(Message)]
pub struct SuspendPolling;

#[async_trait]
impl<F> Handler<SuspendPolling> for PollWorker<F>
where
    F: LiveStatusFetcher + Clone + Send + Sync + 'static,
{
    async fn handle(&mut self, _msg: SuspendPolling, _ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "SuspendPolling");
        self.suspended = true;
        if let Some(trailing) = self.trailing.take() {
            self.deferred = Some(trailing);
        }
    }
}

// resume polling

/// Resumes polling and runs exactly one poll.
///
/// Requests deferred while suspended are absorbed into that run.
#[derive(Message)]
pub struct ResumePolling {
    pub device_id: Option<String>,
}

#[async_trait]
impl<F> Handler<ResumePolling> for PollWorker<F>
where
    F: LiveStatusFetcher + Clone + Send + Sync + 'static,
{
    async fn handle(&mut self, msg: ResumePolling, ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "ResumePolling");
        self.suspended = false;
        if let Some(deferred) = self.deferred.take() {
            tracing::debug!(poll.trigger = %deferred.trigger, "Absorbed");
        }
        let req = RunPoll {
            trigger: PollTrigger::Foreground,
            device_id: msg.device_id,
        };
        self.request(req, ctx);
    }
}

// query live status

#[derive(Message)]
#[reply("Option<LiveStatusEntry>")]
pub struct QueryLiveStatus {
    pub schedule_id: ScheduleId,
}

#[async_trait]
impl<F> Handler<QueryLiveStatus> for PollWorker<F>
where
    F: LiveStatusFetcher + Clone + Send + Sync + 'static,
{
    async fn handle(
        &mut self,
        msg: QueryLiveStatus,
        _ctx: &mut Context<Self>,
    ) -> <QueryLiveStatus as Message>::Reply {
        tracing::debug!(msg.name = "QueryLiveStatus", %msg.schedule_id);
        self.store.get(msg.schedule_id.as_str()).cloned()
    }
}

// query live statuses

#[derive(Message)]
#[reply("Arc<LiveStatusSnapshot>")]
pub struct QueryLiveStatuses;

#[async_trait]
impl<F> Handler<QueryLiveStatuses> for PollWorker<F>
where
    F: LiveStatusFetcher + Clone + Send + Sync + 'static,
{
    async fn handle(
        &mut self,
        _msg: QueryLiveStatuses,
        _ctx: &mut Context<Self>,
    ) -> <QueryLiveStatuses as Message>::Reply {
        tracing::debug!(msg.name = "QueryLiveStatuses");
        self.store.snapshot()
    }
}

// query poll state

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PollState {
    pub in_flight: bool,
    pub trailing: bool,
    pub suspended: bool,
    pub entries: usize,
}

#[derive(Message)]
#[reply("PollState")]
pub struct QueryPollState;

#[async_trait]
impl<F> Handler<QueryPollState> for PollWorker<F>
where
    F: LiveStatusFetcher + Clone + Send + Sync + 'static,
{
    async fn handle(
        &mut self,
        _msg: QueryPollState,
        _ctx: &mut Context<Self>,
    ) -> <QueryPollState as Message>::Reply {
        tracing::debug!(msg.name = "QueryPollState");
        PollState {
            in_flight: self.in_flight.is_some(),
            trailing: self.trailing.is_some(),
            suspended: self.suspended,
            entries: self.store.len(),
        }
    }
}

// register emitter

#[derive(Message)]
#[reply("usize")]
pub enum RegisterEmitter {
    LiveStatusUpdated(Emitter<LiveStatusUpdated>),
    ScheduleIndexUpdated(Emitter<ScheduleIndexUpdated>),
}

#[async_trait]
impl<F> Handler<RegisterEmitter> for PollWorker<F>
where
    F: LiveStatusFetcher + Clone + Send + Sync + 'static,
{
    async fn handle(
        &mut self,
        msg: RegisterEmitter,
        _ctx: &mut Context<Self>,
    ) -> <RegisterEmitter as Message>::Reply {
        match msg {
            RegisterEmitter::LiveStatusUpdated(emitter) => {
                let id = self.store.subscribe(emitter);
                tracing::debug!(msg.name = "RegisterEmitter::LiveStatusUpdated", id);
                id
            }
            RegisterEmitter::ScheduleIndexUpdated(emitter) => {
                let id = self.index_emitters.register(emitter);
                tracing::debug!(msg.name = "RegisterEmitter::ScheduleIndexUpdated", id);
                id
            }
        }
    }
}

// unregister emitter

#[derive(Message)]
pub enum UnregisterEmitter {
    LiveStatusUpdated(usize),
    ScheduleIndexUpdated(usize),
}

#[async_trait]
impl<F> Handler<UnregisterEmitter> for PollWorker<F>
where
    F: LiveStatusFetcher + Clone + Send + Sync + 'static,
{
    async fn handle(&mut self, msg: UnregisterEmitter, _ctx: &mut Context<Self>) {
        match msg {
            UnregisterEmitter::LiveStatusUpdated(id) => {
                tracing::debug!(msg.name = "UnregisterEmitter::LiveStatusUpdated", id);
                self.store.unsubscribe(id);
            }
            UnregisterEmitter::ScheduleIndexUpdated(id) => {
                tracing::debug!(msg.name = "UnregisterEmitter::ScheduleIndexUpdated", id);
                self.index_emitters.unregister(id);
            }
        }
    }
}

// <coverage:exclude>
#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub(crate) enum PollWorkerCall {
        RunPoll(PollTrigger),
        Suspend,
        Resume,
    }

    /// Records messages sent to the poll worker.
    #[derive(Clone, Default)]
    pub(crate) struct PollWorkerStub {
        calls: Arc<Mutex<Vec<PollWorkerCall>>>,
    }

    impl PollWorkerStub {
        pub(crate) fn calls(&self) -> Vec<PollWorkerCall> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn run_polls(&self) -> usize {
            self.calls()
                .iter()
                .filter(|call| matches!(call, PollWorkerCall::RunPoll(_)))
                .count()
        }

        fn record(&self, call: PollWorkerCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl Emit<RunPoll> for PollWorkerStub {
        async fn emit(&self, msg: RunPoll) {
            self.record(PollWorkerCall::RunPoll(msg.trigger));
        }
    }

    #[async_trait]
    impl Emit<SuspendPolling> for PollWorkerStub {
        async fn emit(&self, _msg: SuspendPolling) {
            self.record(PollWorkerCall::Suspend);
        }
    }

    #[async_trait]
    impl Emit<ResumePolling> for PollWorkerStub {
        async fn emit(&self, _msg: ResumePolling) {
            self.record(PollWorkerCall::Resume);
        }
    }

    #[async_trait]
    impl Call<RegisterEmitter> for PollWorkerStub {
        async fn call(&self, _msg: RegisterEmitter) -> actlet::Result<usize> {
            Ok(1)
        }
    }

    #[async_trait]
    impl Emit<UnregisterEmitter> for PollWorkerStub {
        async fn emit(&self, _msg: UnregisterEmitter) {}
    }
}

// </coverage:exclude>
