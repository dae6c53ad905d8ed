use std::sync::Arc;
use std::time::Duration;

use actlet::prelude::*;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::poll::PollTrigger;
use crate::poll::RegisterEmitter;
use crate::poll::RunPoll;
use crate::schedule::compute_interval;
use crate::schedule::Clock;
use crate::schedule::IntervalParams;
use crate::schedule::ScheduleIndexUpdated;
use crate::schedule::ScheduleWindowIndex;

/// Emits `RunPoll` periodically.
///
/// The interval is re-computed from the latest schedule index each time the
/// timer is armed.  At most one timer is armed at any time.
pub struct AdaptiveScheduler<P> {
    poller: P,
    clock: Arc<dyn Clock>,
    params: IntervalParams,
    device_id: Option<String>,
    index: Option<Arc<ScheduleWindowIndex>>,
    started: bool,
    generation: u64,
    timer: Option<ArmedTimer>,
}

struct ArmedTimer {
    token: CancellationToken,
    interval: Duration,
    deadline: Instant,
}

impl<P> AdaptiveScheduler<P> {
    pub fn new(
        poller: P,
        clock: Arc<dyn Clock>,
        params: IntervalParams,
        device_id: Option<String>,
    ) -> Self {
        AdaptiveScheduler {
            poller,
            clock,
            params,
            device_id,
            index: None,
            started: false,
            generation: 0,
            timer: None,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.token.cancel();
        }
        // Invalidates `TimerExpired` signals which have already been queued.
        self.generation += 1;
    }

    fn compute_interval(&self) -> Duration {
        compute_interval(self.clock.now(), self.index.as_deref(), &self.params)
    }
}

impl<P> AdaptiveScheduler<P>
where
    P: Send + Sync + 'static,
    P: Emit<RunPoll>,
    P: Call<RegisterEmitter>,
{
    fn set_timer(&mut self, ctx: &Context<Self>) {
        self.cancel_timer();
        let interval = self.compute_interval();
        let deadline = Instant::now() + interval;
        let generation = self.generation;
        tracing::debug!(
            scheduler.interval = %humantime::format_duration(interval),
            scheduler.generation = generation,
            "Set timer"
        );
        let emitter: Emitter<TimerExpired> = ctx.emitter();
        let token = ctx.spawn_task(async move {
            tokio::time::sleep_until(deadline).await;
            emitter.emit(TimerExpired { generation }).await;
        });
        self.timer = Some(ArmedTimer {
            token,
            interval,
            deadline,
        });
    }
}

#[async_trait]
impl<P> Actor for AdaptiveScheduler<P>
where
    P: Send + Sync + 'static,
    P: Emit<RunPoll>,
    P: Call<RegisterEmitter>,
{
    async fn started(&mut self, ctx: &mut Context<Self>) {
        tracing::debug!("Started");
        let result = self
            .poller
            .call(RegisterEmitter::ScheduleIndexUpdated(ctx.emitter()))
            .await;
        if let Err(err) = result {
            tracing::error!(%err, "Failed to register emitter for ScheduleIndexUpdated");
        }
    }

    async fn stopped(&mut self, _ctx: &mut Context<Self>) {
        tracing::debug!("Stopped");
        self.cancel_timer();
    }
}

// start scheduler

#[derive(Message)]
#[reply("()")]
pub struct StartScheduler;

#[async_trait]
impl<P> Handler<StartScheduler> for AdaptiveScheduler<P>
where
    P: Send + Sync + 'static,
    P: Emit<RunPoll>,
    P: Call<RegisterEmitter>,
{
    async fn handle(&mut self, _msg: StartScheduler, ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "StartScheduler");
        if self.started {
            tracing::debug!("Already started");
            return;
        }
        self.started = true;
        self.set_timer(ctx);
    }
}

// stop scheduler

#[derive(Message)]
#[reply("()")]
pub struct StopScheduler;

#[async_trait]
impl<P> Handler<StopScheduler> for AdaptiveScheduler<P>
where
    P: Send + Sync + 'static,
    P: Emit<RunPoll>,
    P: Call<RegisterEmitter>,
{
    async fn handle(&mut self, _msg: StopScheduler, _ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "StopScheduler");
        self.started = false;
        self.cancel_timer();
    }
}

// query scheduler state

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SchedulerState {
    pub started: bool,
    pub interval: Option<Duration>,
}

#[derive(Message)]
#[reply("SchedulerState")]
pub struct QuerySchedulerState;

#[async_trait]
impl<P> Handler<QuerySchedulerState> for AdaptiveScheduler<P>
where
    P: Send + Sync + 'static,
    P: Emit<RunPoll>,
    P: Call<RegisterEmitter>,
{
    async fn handle(
        &mut self,
        _msg: QuerySchedulerState,
        _ctx: &mut Context<Self>,
    ) -> <QuerySchedulerState as Message>::Reply {
        tracing::debug!(msg.name = "QuerySchedulerState");
        SchedulerState {
            started: self.started,
            interval: self.timer.as_ref().map(|timer| timer.interval),
        }
    }
}

// schedule index updated

#[async_trait]
impl<P> Handler<ScheduleIndexUpdated> for AdaptiveScheduler<P>
where
    P: Send + Sync + 'static,
    P: Emit<RunPoll>,
    P: Call<RegisterEmitter>,
{
    async fn handle(&mut self, msg: ScheduleIndexUpdated, ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "ScheduleIndexUpdated", index.entries = msg.index.len());
        self.index = Some(msg.index);
        if !self.started {
            return;
        }
        // A program starting soon must not wait for the baseline timer, but
        // re-arming must never postpone the armed deadline.
        let deadline = Instant::now() + self.compute_interval();
        let armed = self.timer.as_ref().map(|timer| timer.deadline);
        if armed.is_none_or(|armed| deadline < armed) {
            self.set_timer(ctx);
        }
    }
}

// timer expired

#[derive(Message)]
struct TimerExpired {
    generation: u64,
}

#[async_trait]
impl<P> Handler<TimerExpired> for AdaptiveScheduler<P>
where
    P: Send + Sync + 'static,
    P: Emit<RunPoll>,
    P: Call<RegisterEmitter>,
{
    async fn handle(&mut self, msg: TimerExpired, ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "TimerExpired", msg.generation);
        if !self.started || msg.generation != self.generation {
            tracing::debug!("Stale timer");
            return;
        }
        self.timer = None;
        self.poller
            .emit(RunPoll {
                trigger: PollTrigger::Timer,
                device_id: self.device_id.clone(),
            })
            .await;
        self.set_timer(ctx);
    }
}

// </coverage:exclude>
