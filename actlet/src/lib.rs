use std::any::type_name;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "derive")]
pub use actlet_derive::Message;

// Allows `#[derive(Message)]` to be used inside this crate.
extern crate self as actlet;

pub mod prelude {
    pub use crate::Action;
    pub use crate::Actor;
    pub use crate::Address;
    pub use crate::Call;
    pub use crate::Context;
    pub use crate::Emit;
    pub use crate::Emitter;
    pub use crate::EmitterFactory;
    pub use crate::EmitterRegistry;
    pub use crate::Handler;
    pub use crate::Message;
    pub use crate::Signal;
    pub use crate::Spawn;
    pub use crate::System;
    pub use async_trait::async_trait;
}

/// Errors that may happen in communication with an actor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to send a message")]
    Send,
    #[error("Failed to receive a reply")]
    Recv,
}

pub type Result<T> = std::result::Result<T, Error>;

/// An actor system.
///
/// Every actor and task spawned from the system, or from contexts of actors
/// spawned from it, is stopped when the system stops.
pub struct System {
    stop_token: CancellationToken,
}

impl System {
    /// Create an actor system.
    pub fn new() -> Self {
        System {
            stop_token: CancellationToken::new(),
        }
    }

    /// Invoke gracefully stopping the actor system.
    ///
    /// This function doesn't wait for all tasks spawned by the system getting
    /// stopped.
    pub fn stop(self) {
        self.stop_token.cancel();
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Spawn for System {
    async fn spawn_actor<A>(&self, actor: A) -> Address<A>
    where
        A: Actor,
    {
        launch(actor, self.stop_token.child_token())
    }

    fn spawn_task<F>(&self, fut: F) -> CancellationToken
    where
        F: Future<Output = ()> + Send + 'static,
    {
        launch_task(fut, self.stop_token.child_token())
    }
}

/// An actor execution context.
pub struct Context<A> {
    own_addr: Address<A>,
    stop_token: CancellationToken,
}

impl<A> Context<A> {
    fn new(own_addr: Address<A>, stop_token: CancellationToken) -> Self {
        Context {
            own_addr,
            stop_token,
        }
    }

    /// Returns the address of the actor.
    pub fn address(&self) -> &Address<A> {
        &self.own_addr
    }

    /// Stops the actor.
    ///
    /// Messages already queued are processed before the actor stops.
    pub fn stop(&mut self) {
        self.stop_token.cancel();
    }
}

#[async_trait]
impl<A> Spawn for Context<A>
where
    A: Send + 'static,
{
    async fn spawn_actor<B>(&self, actor: B) -> Address<B>
    where
        B: Actor,
    {
        launch(actor, self.stop_token.child_token())
    }

    fn spawn_task<F>(&self, fut: F) -> CancellationToken
    where
        F: Future<Output = ()> + Send + 'static,
    {
        launch_task(fut, self.stop_token.child_token())
    }
}

impl<A, M> EmitterFactory<M> for Context<A>
where
    A: Handler<M>,
    M: Signal + 'static,
{
    fn emitter(&self) -> Emitter<M> {
        self.own_addr.clone().into()
    }
}

/// An address of an actor.
pub struct Address<A> {
    sender: mpsc::Sender<Box<dyn Dispatch<A> + Send>>,
}

impl<A> Address<A> {
    const MAX_MESSAGES: usize = 256;

    fn pair() -> (Self, mpsc::Receiver<Box<dyn Dispatch<A> + Send>>) {
        let (sender, receiver) = mpsc::channel(Self::MAX_MESSAGES);
        (Address { sender }, receiver)
    }
}

impl<A> Clone for Address<A> {
    fn clone(&self) -> Self {
        Address {
            sender: self.sender.clone(),
        }
    }
}

impl<A, M> From<Address<A>> for Emitter<M>
where
    A: Handler<M>,
    M: Signal + 'static,
{
    fn from(addr: Address<A>) -> Self {
        Emitter::new(addr)
    }
}

impl<A, M> EmitterFactory<M> for Address<A>
where
    A: Handler<M>,
    M: Signal + 'static,
{
    fn emitter(&self) -> Emitter<M> {
        self.clone().into()
    }
}

#[async_trait]
impl<A, M> Call<M> for Address<A>
where
    A: Handler<M>,
    M: Action + 'static,
{
    async fn call(&self, msg: M) -> Result<M::Reply> {
        let (sender, receiver) = oneshot::channel::<M::Reply>();
        let dispatcher = Box::new(ActionDispatcher {
            message: msg,
            sender,
        });
        if self.sender.send(dispatcher).await.is_err() {
            tracing::error!("{} stopped", type_name::<A>());
            return Err(Error::Send);
        }
        receiver.await.map_err(|_| {
            tracing::error!("{} stopped", type_name::<A>());
            Error::Recv
        })
    }
}

#[async_trait]
impl<A, M> Emit<M> for Address<A>
where
    A: Handler<M>,
    M: Signal + 'static,
{
    async fn emit(&self, msg: M) {
        let dispatcher = Box::new(SignalDispatcher { message: msg });
        if self.sender.send(dispatcher).await.is_err() {
            tracing::warn!("{} stopped", type_name::<A>());
        }
    }
}

/// A cloneable type that implements [`Emit<M>`] for a particular message.
pub struct Emitter<M> {
    inner: Arc<dyn Emit<M> + Send + Sync>,
}

impl<M> Emitter<M>
where
    M: Signal,
{
    pub fn new<T>(inner: T) -> Self
    where
        T: Emit<M> + Send + Sync + 'static,
    {
        Emitter {
            inner: Arc::new(inner),
        }
    }
}

impl<M> Clone for Emitter<M> {
    fn clone(&self) -> Self {
        Emitter {
            inner: self.inner.clone(),
        }
    }
}

#[async_trait]
impl<M> Emit<M> for Emitter<M>
where
    M: Signal + 'static,
{
    async fn emit(&self, msg: M) {
        self.inner.emit(msg).await
    }
}

/// A set of emitters for a particular signal.
///
/// Each registered emitter is identified by an ID returned from
/// [`EmitterRegistry::register()`].
pub struct EmitterRegistry<M> {
    next_id: usize,
    emitters: HashMap<usize, Emitter<M>>,
}

impl<M> EmitterRegistry<M>
where
    M: Signal + Clone + 'static,
{
    pub fn new() -> Self {
        EmitterRegistry {
            next_id: 1,
            emitters: HashMap::new(),
        }
    }

    pub fn register(&mut self, emitter: Emitter<M>) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.emitters.insert(id, emitter);
        id
    }

    pub fn unregister(&mut self, id: usize) -> bool {
        self.emitters.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }

    /// Sends a clone of `msg` to every registered emitter.
    pub async fn emit(&self, msg: M) {
        for emitter in self.emitters.values() {
            emitter.emit(msg.clone()).await;
        }
    }
}

impl<M> Default for EmitterRegistry<M>
where
    M: Signal + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A message to stop an actor.
pub struct Stop;
impl Message for Stop {
    type Reply = ();
}
impl Signal for Stop {}

#[async_trait]
impl<A: Actor> Handler<Stop> for A {
    async fn handle(&mut self, _msg: Stop, ctx: &mut Context<Self>) {
        ctx.stop();
    }
}

// traits

/// A trait that every actor must implement.
#[async_trait]
pub trait Actor
where
    Self: Send + Sized,
    // An actor will be moved to a dedicated task created by `tokio::spawn()`.
    Self: 'static,
{
    /// Called when the actor gets started running on a dedicated task.
    #[allow(unused_variables)]
    async fn started(&mut self, ctx: &mut Context<Self>) {}

    /// Called when the actor stopped.
    #[allow(unused_variables)]
    async fn stopped(&mut self, ctx: &mut Context<Self>) {}
}

/// A trait to spawn a new asynchronous task.
#[async_trait]
pub trait Spawn {
    /// Spawns a new asynchronous task dedicated for an actor.
    async fn spawn_actor<A>(&self, actor: A) -> Address<A>
    where
        A: Actor;

    /// Spawns a new asynchronous task dedicated for a `Future`.
    ///
    /// The task is aborted when the returned token is cancelled or when the
    /// owner of `self` stops.
    fn spawn_task<F>(&self, fut: F) -> CancellationToken
    where
        F: Future<Output = ()> + Send + 'static;
}

/// A trait to create an [`Emitter<M>`] sending signals to an actor.
pub trait EmitterFactory<M: Signal> {
    fn emitter(&self) -> Emitter<M>;
}

/// A trait that every message must implement.
pub trait Message: Send {
    /// The type of reply for this message.
    type Reply: Send;
}

/// A trait that every message sent by [`Call<M>`] must implement.
pub trait Action: Message {}

/// A trait to send a message and wait for its reply.
#[async_trait]
pub trait Call<M: Action> {
    /// Sends a message and waits for its reply.
    ///
    /// The `msg` will be lost if the actor has already stopped.
    async fn call(&self, msg: M) -> Result<M::Reply>;
}

/// A trait that every message sent by [`Emit<M>`] must implement.
pub trait Signal: Message<Reply = ()> {}

/// A trait to send a message without waiting for its processing.
#[async_trait]
pub trait Emit<M: Signal> {
    /// Sends a message.
    ///
    /// The `msg` will be lost if the actor has already stopped.
    async fn emit(&self, msg: M);
}

/// A trait to handle a message.
#[async_trait]
pub trait Handler<M>
where
    Self: Actor,
    M: Message,
{
    /// Performs a computation specified by a message and optionally returns a
    /// result of the computation.
    async fn handle(&mut self, msg: M, ctx: &mut Context<Self>) -> M::Reply;
}

// private types and functions

fn launch<A: Actor>(actor: A, stop_token: CancellationToken) -> Address<A> {
    let (addr, receiver) = Address::pair();
    let context = Context::new(addr.clone(), stop_token);
    tokio::spawn(MessageLoop::new(actor, receiver, context).run());
    addr
}

fn launch_task<F>(fut: F, token: CancellationToken) -> CancellationToken
where
    F: Future<Output = ()> + Send + 'static,
{
    let cancelled = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = fut => (),
            _ = cancelled.cancelled() => (),
        }
    });
    token
}

struct MessageLoop<A> {
    actor: A,
    receiver: mpsc::Receiver<Box<dyn Dispatch<A> + Send>>,
    context: Context<A>,
}

impl<A: Actor> MessageLoop<A> {
    fn new(
        actor: A,
        receiver: mpsc::Receiver<Box<dyn Dispatch<A> + Send>>,
        context: Context<A>,
    ) -> Self {
        MessageLoop {
            actor,
            receiver,
            context,
        }
    }

    async fn run(mut self) {
        self.actor.started(&mut self.context).await;
        let stop_token = self.context.stop_token.clone();
        loop {
            tokio::select! {
                Some(dispatch) = self.receiver.recv() => {
                    dispatch.dispatch(&mut self.actor, &mut self.context).await;
                }
                _ = stop_token.cancelled() => {
                    self.receiver.close();
                    break;
                }
                else => break,
            }
        }
        // Ensure that the remaining messages are processed before the stop.
        while let Some(dispatch) = self.receiver.recv().await {
            dispatch.dispatch(&mut self.actor, &mut self.context).await;
        }
        self.actor.stopped(&mut self.context).await;
    }
}

#[async_trait]
trait Dispatch<A> {
    async fn dispatch(self: Box<Self>, actor: &mut A, ctx: &mut Context<A>);
}

struct ActionDispatcher<M>
where
    M: Action,
{
    message: M,
    sender: oneshot::Sender<M::Reply>,
}

#[async_trait]
impl<A, M> Dispatch<A> for ActionDispatcher<M>
where
    A: Handler<M>,
    M: Action,
{
    async fn dispatch(self: Box<Self>, actor: &mut A, ctx: &mut Context<A>) {
        let ActionDispatcher { message, sender } = *self;
        let reply = actor.handle(message, ctx).await;
        if sender.send(reply).is_err() {
            tracing::error!("Failed to send a reply from {}", type_name::<A>());
        }
    }
}

struct SignalDispatcher<M>
where
    M: Signal,
{
    message: M,
}

#[async_trait]
impl<A, M> Dispatch<A> for SignalDispatcher<M>
where
    A: Handler<M>,
    M: Signal,
{
    async fn dispatch(self: Box<Self>, actor: &mut A, ctx: &mut Context<A>) {
        actor.handle(self.message, ctx).await;
    }
}

// </coverage:exclude>
