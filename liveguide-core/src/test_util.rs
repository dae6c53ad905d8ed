use actlet::prelude::*;
use tokio::sync::mpsc;

/// Serves `router` on a random local port and returns the base URL of `/api/`.
pub(crate) async fn serve(router: axum::Router) -> url::Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/api/", addr).parse().unwrap()
}

/// Creates an emitter which forwards signals to the returned receiver.
pub(crate) fn channel_emitter<M>() -> (Emitter<M>, mpsc::UnboundedReceiver<M>)
where
    M: Signal + 'static,
{
    let (sender, receiver) = mpsc::unbounded_channel();
    (Emitter::new(ChannelEmitter(sender)), receiver)
}

struct ChannelEmitter<M>(mpsc::UnboundedSender<M>);

#[async_trait]
impl<M> Emit<M> for ChannelEmitter<M>
where
    M: Signal + 'static,
{
    async fn emit(&self, msg: M) {
        let _ = self.0.send(msg);
    }
}
