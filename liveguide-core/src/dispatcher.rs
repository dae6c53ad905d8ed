use actlet::prelude::*;

use crate::poll::PollTrigger;
use crate::poll::RunPoll;
use crate::push;
use crate::push::PushSignal;

/// Turns push signals into out-of-band polls and view refreshes.
pub struct RefreshDispatcher<L, P> {
    listener: L,
    poller: P,
    device_id: Option<String>,
    emitters: EmitterRegistry<RefreshView>,
}

impl<L, P> RefreshDispatcher<L, P> {
    pub fn new(listener: L, poller: P, device_id: Option<String>) -> Self {
        RefreshDispatcher {
            listener,
            poller,
            device_id,
            emitters: Default::default(),
        }
    }
}

#[async_trait]
impl<L, P> Actor for RefreshDispatcher<L, P>
where
    L: Send + Sync + 'static,
    L: Call<push::RegisterEmitter>,
    P: Send + Sync + 'static,
    P: Emit<RunPoll>,
{
    async fn started(&mut self, ctx: &mut Context<Self>) {
        tracing::debug!("Started");
        let result = self
            .listener
            .call(push::RegisterEmitter::PushSignal(ctx.emitter()))
            .await;
        if let Err(err) = result {
            tracing::error!(%err, "Failed to register emitter for PushSignal");
        }
    }

    async fn stopped(&mut self, _ctx: &mut Context<Self>) {
        tracing::debug!("Stopped");
    }
}

// push signal

#[async_trait]
impl<L, P> Handler<PushSignal> for RefreshDispatcher<L, P>
where
    L: Send + Sync + 'static,
    L: Call<push::RegisterEmitter>,
    P: Send + Sync + 'static,
    P: Emit<RunPoll>,
{
    async fn handle(&mut self, _msg: PushSignal, _ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "PushSignal");
        self.poller
            .emit(RunPoll {
                trigger: PollTrigger::Push,
                device_id: self.device_id.clone(),
            })
            .await;
        self.emitters.emit(RefreshView).await;
    }
}

// refresh view

/// Asks views to re-render from the latest live statuses.
#[derive(Clone, Debug, Message)]
pub struct RefreshView;

// register emitter

#[derive(Message)]
#[reply("usize")]
pub enum RegisterEmitter {
    RefreshView(Emitter<RefreshView>),
}

#[async_trait]
impl<L, P> Handler<RegisterEmitter> for RefreshDispatcher<L, P>
where
    L: Send + Sync + 'static,
    L: Call<push::RegisterEmitter>,
    P: Send + Sync + 'static,
    P: Emit<RunPoll>,
{
    async fn handle(
        &mut self,
        msg: RegisterEmitter,
        _ctx: &mut Context<Self>,
    ) -> <RegisterEmitter as Message>::Reply {
        let RegisterEmitter::RefreshView(emitter) = msg;
        let id = self.emitters.register(emitter);
        tracing::debug!(msg.name = "RegisterEmitter::RefreshView", id);
        id
    }
}

// unregister emitter

#[derive(Message)]
pub enum UnregisterEmitter {
    RefreshView(usize),
}

#[async_trait]
impl<L, P> Handler<UnregisterEmitter> for RefreshDispatcher<L, P>
where
    L: Send + Sync + 'static,
    L: Call<push::RegisterEmitter>,
    P: Send + Sync + 'static,
    P: Emit<RunPoll>,
{
    async fn handle(&mut self, msg: UnregisterEmitter, _ctx: &mut Context<Self>) {
        let UnregisterEmitter::RefreshView(id) = msg;
        tracing::debug!(msg.name = "UnregisterEmitter::RefreshView", id);
        self.emitters.unregister(id);
    }
}

// </coverage:exclude>
