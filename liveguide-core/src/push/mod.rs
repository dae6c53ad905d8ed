mod transport;

pub use transport::EventSourceTransport;
pub use transport::PushTransport;
pub use transport::TransportEvent;

#[cfg(test)]
pub(crate) use transport::stub;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use actlet::prelude::*;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Keeps a push connection to the schedule service.
///
/// The connection is re-established after a fixed delay whenever it is lost,
/// forever, until `Disconnect` is sent.
pub struct PushListener<T> {
    transport: Arc<T>,
    reconnect_delay: Duration,
    state: Option<ConnectionState>,
    // Incremented on every connection attempt and on `Disconnect`.  Signals
    // from older attempts are ignored.
    generation: u64,
    connection_token: Option<CancellationToken>,
    reconnect_token: Option<CancellationToken>,
    emitters: EmitterRegistry<PushSignal>,
}

impl<T> PushListener<T> {
    pub fn new(transport: Arc<T>, reconnect_delay: Duration) -> Self {
        PushListener {
            transport,
            reconnect_delay,
            state: None,
            generation: 0,
            connection_token: None,
            reconnect_token: None,
            emitters: Default::default(),
        }
    }

    fn cancel_tasks(&mut self) {
        if let Some(token) = self.connection_token.take() {
            token.cancel();
        }
        if let Some(token) = self.reconnect_token.take() {
            token.cancel();
        }
    }
}

impl<T> PushListener<T>
where
    T: PushTransport + Send + Sync + 'static,
{
    fn connect(&mut self, ctx: &Context<Self>) {
        self.cancel_tasks();
        self.generation += 1;
        self.state = Some(ConnectionState::Connecting);
        tracing::debug!(push.generation = self.generation, "Connecting...");

        let generation = self.generation;
        let transport = self.transport.clone();
        let addr = ctx.address().clone();
        let token = ctx.spawn_task(async move {
            let mut events = transport.open();
            while let Some(event) = events.next().await {
                match event {
                    TransportEvent::Opened => {
                        addr.emit(TransportOpened { generation }).await;
                    }
                    TransportEvent::Message(data) => {
                        addr.emit(TransportMessage { generation, data }).await;
                    }
                    TransportEvent::Failed(reason) => {
                        let reason = Some(reason);
                        addr.emit(TransportLost { generation, reason }).await;
                        return;
                    }
                }
            }
            let reason = None;
            addr.emit(TransportLost { generation, reason }).await;
        });
        self.connection_token = Some(token);
    }

    fn schedule_reconnect(&mut self, ctx: &Context<Self>) {
        let generation = self.generation;
        let delay = self.reconnect_delay;
        tracing::debug!(
            push.generation = generation,
            "Reconnect after {}",
            humantime::format_duration(delay)
        );
        let addr = ctx.address().clone();
        let token = ctx.spawn_task(async move {
            tokio::time::sleep(delay).await;
            addr.emit(ReconnectTimerExpired { generation }).await;
        });
        self.reconnect_token = Some(token);
    }
}

#[async_trait]
impl<T> Actor for PushListener<T>
where
    T: PushTransport + Send + Sync + 'static,
{
    async fn started(&mut self, _ctx: &mut Context<Self>) {
        tracing::debug!("Started");
    }

    async fn stopped(&mut self, _ctx: &mut Context<Self>) {
        tracing::debug!("Stopped");
        self.cancel_tasks();
    }
}

// connect

#[derive(Message)]
#[reply("()")]
pub struct Connect;

#[async_trait]
impl<T> Handler<Connect> for PushListener<T>
where
    T: PushTransport + Send + Sync + 'static,
{
    async fn handle(&mut self, _msg: Connect, ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "Connect");
        match self.state {
            None => self.connect(ctx),
            Some(ConnectionState::Closed) => {
                tracing::warn!("Already closed, never connect again");
            }
            Some(state) => {
                tracing::debug!(%state, "Already connected");
            }
        }
    }
}

// disconnect

#[derive(Message)]
#[reply("()")]
pub struct Disconnect;

#[async_trait]
impl<T> Handler<Disconnect> for PushListener<T>
where
    T: PushTransport + Send + Sync + 'static,
{
    async fn handle(&mut self, _msg: Disconnect, _ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "Disconnect");
        self.cancel_tasks();
        self.generation += 1;
        if self.state != Some(ConnectionState::Closed) {
            tracing::info!("Closed");
        }
        self.state = Some(ConnectionState::Closed);
    }
}

// query connection state

#[derive(Message)]
#[reply("Option<ConnectionState>")]
pub struct QueryConnectionState;

#[async_trait]
impl<T> Handler<QueryConnectionState> for PushListener<T>
where
    T: PushTransport + Send + Sync + 'static,
{
    async fn handle(
        &mut self,
        _msg: QueryConnectionState,
        _ctx: &mut Context<Self>,
    ) -> <QueryConnectionState as Message>::Reply {
        tracing::debug!(msg.name = "QueryConnectionState");
        self.state
    }
}

// register emitter

#[derive(Message)]
#[reply("usize")]
pub enum RegisterEmitter {
    PushSignal(Emitter<PushSignal>),
}

#[async_trait]
impl<T> Handler<RegisterEmitter> for PushListener<T>
where
    T: PushTransport + Send + Sync + 'static,
{
    async fn handle(
        &mut self,
        msg: RegisterEmitter,
        _ctx: &mut Context<Self>,
    ) -> <RegisterEmitter as Message>::Reply {
        let RegisterEmitter::PushSignal(emitter) = msg;
        let id = self.emitters.register(emitter);
        tracing::debug!(msg.name = "RegisterEmitter::PushSignal", id);
        id
    }
}

// unregister emitter

#[derive(Message)]
pub enum UnregisterEmitter {
    PushSignal(usize),
}

#[async_trait]
impl<T> Handler<UnregisterEmitter> for PushListener<T>
where
    T: PushTransport + Send + Sync + 'static,
{
    async fn handle(&mut self, msg: UnregisterEmitter, _ctx: &mut Context<Self>) {
        let UnregisterEmitter::PushSignal(id) = msg;
        tracing::debug!(msg.name = "UnregisterEmitter::PushSignal", id);
        self.emitters.unregister(id);
    }
}

// push signal

/// Emitted for every message received on the push connection.
///
/// The payload is never interpreted.
#[derive(Clone, Debug, Message)]
pub struct PushSignal;

// transport opened

#[derive(Message)]
struct TransportOpened {
    generation: u64,
}

#[async_trait]
impl<T> Handler<TransportOpened> for PushListener<T>
where
    T: PushTransport + Send + Sync + 'static,
{
    async fn handle(&mut self, msg: TransportOpened, _ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "TransportOpened", msg.generation);
        if msg.generation != self.generation {
            return;
        }
        if self.state == Some(ConnectionState::Connecting) {
            tracing::info!("Connected");
            self.state = Some(ConnectionState::Open);
        }
    }
}

// transport message

#[derive(Message)]
struct TransportMessage {
    generation: u64,
    data: String,
}

#[async_trait]
impl<T> Handler<TransportMessage> for PushListener<T>
where
    T: PushTransport + Send + Sync + 'static,
{
    async fn handle(&mut self, msg: TransportMessage, _ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "TransportMessage", msg.generation);
        if msg.generation != self.generation {
            return;
        }
        if let Err(err) = serde_json::from_str::<serde_json::Value>(&msg.data) {
            tracing::debug!(%err, "Not a JSON payload");
        }
        self.emitters.emit(PushSignal).await;
    }
}

// transport lost

#[derive(Message)]
struct TransportLost {
    generation: u64,
    reason: Option<String>,
}

#[async_trait]
impl<T> Handler<TransportLost> for PushListener<T>
where
    T: PushTransport + Send + Sync + 'static,
{
    async fn handle(&mut self, msg: TransportLost, ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "TransportLost", msg.generation);
        if msg.generation != self.generation {
            return;
        }
        match msg.reason {
            Some(reason) => tracing::info!(%reason, "Connection lost"),
            None => tracing::info!("Connection closed by peer"),
        }
        if let Some(token) = self.connection_token.take() {
            token.cancel();
        }
        self.state = Some(ConnectionState::Reconnecting);
        self.schedule_reconnect(ctx);
    }
}

// reconnect timer expired

#[derive(Message)]
struct ReconnectTimerExpired {
    generation: u64,
}

#[async_trait]
impl<T> Handler<ReconnectTimerExpired> for PushListener<T>
where
    T: PushTransport + Send + Sync + 'static,
{
    async fn handle(&mut self, msg: ReconnectTimerExpired, ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "ReconnectTimerExpired", msg.generation);
        if msg.generation != self.generation
            || self.state != Some(ConnectionState::Reconnecting)
        {
            return;
        }
        self.reconnect_token = None;
        self.connect(ctx);
    }
}

// </coverage:exclude>
