use futures::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest_eventsource::Event;
use reqwest_eventsource::EventSource;
use url::Url;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Failed(String),
}

/// Opens a push connection.
///
/// The returned stream ends when the connection is lost.  `Failed` is always
/// the last event if it appears.
pub trait PushTransport {
    fn open(&self) -> BoxStream<'static, TransportEvent>;
}

/// Server-sent events over reqwest.
///
/// `EventSource` retries on errors by itself.  The source is closed on the
/// first error instead so that `PushListener` controls reconnection.
pub struct EventSourceTransport {
    url: Url,
}

impl EventSourceTransport {
    pub fn new(url: Url) -> Self {
        EventSourceTransport { url }
    }
}

impl PushTransport for EventSourceTransport {
    fn open(&self) -> BoxStream<'static, TransportEvent> {
        tracing::debug!(push.url = %self.url, "Open EventSource");
        let es = EventSource::get(self.url.clone());
        stream::unfold(Some(es), |es| async move {
            let mut es = es?;
            match es.next().await? {
                Ok(Event::Open) => Some((TransportEvent::Opened, Some(es))),
                Ok(Event::Message(message)) => {
                    Some((TransportEvent::Message(message.data), Some(es)))
                }
                Err(err) => {
                    es.close();
                    Some((TransportEvent::Failed(err.to_string()), None))
                }
            }
        })
        .boxed()
    }
}

// <coverage:exclude>
#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    /// Each `open()` creates a connection driven by the test.
    ///
    /// Dropping the sender of a connection closes it.
    #[derive(Default)]
    pub(crate) struct StubTransport {
        connections: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
    }

    impl StubTransport {
        pub(crate) fn opened(&self) -> usize {
            self.connections.lock().unwrap().len()
        }

        pub(crate) fn send(&self, index: usize, event: TransportEvent) {
            let connections = self.connections.lock().unwrap();
            let _ = connections[index].send(event);
        }

        pub(crate) fn close(&self, index: usize) {
            let mut connections = self.connections.lock().unwrap();
            // Replaces the sender with one of a closed channel.
            let (sender, _) = mpsc::unbounded_channel();
            connections[index] = sender;
        }
    }

    impl PushTransport for StubTransport {
        fn open(&self) -> BoxStream<'static, TransportEvent> {
            let (sender, receiver) = mpsc::unbounded_channel();
            self.connections.lock().unwrap().push(sender);
            UnboundedReceiverStream::new(receiver).boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::serve;
    use assert_matches::assert_matches;
    use axum::http::StatusCode;
    use axum::response::sse;
    use axum::response::Sse;
    use axum::routing::get;
    use axum::Router;
    use std::convert::Infallible;
    use test_log::test;

    #[test(tokio::test)]
    async fn test_event_source_transport() {
        let router = Router::new().route(
            "/api/live-events",
            get(|| async {
                Sse::new(stream::iter(vec![
                    Ok::<_, Infallible>(sse::Event::default().data("hello")),
                    Ok(sse::Event::default().data(r#"{"channel":7}"#)),
                ]))
            }),
        );
        let base_url = serve(router).await;
        let transport = EventSourceTransport::new(base_url.join("live-events").unwrap());

        let events: Vec<_> = transport.open().collect().await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], TransportEvent::Opened);
        assert_eq!(events[1], TransportEvent::Message("hello".to_string()));
        assert_eq!(
            events[2],
            TransportEvent::Message(r#"{"channel":7}"#.to_string())
        );
        // Closed by the server.
        assert_matches!(events[3], TransportEvent::Failed(_));
    }

    #[test(tokio::test)]
    async fn test_event_source_transport_unexpected_status() {
        let router = Router::new().route(
            "/api/live-events",
            get(|| async { StatusCode::NOT_FOUND }),
        );
        let base_url = serve(router).await;
        let transport = EventSourceTransport::new(base_url.join("live-events").unwrap());

        let events: Vec<_> = transport.open().collect().await;
        assert_eq!(events.len(), 1);
        assert_matches!(events[0], TransportEvent::Failed(_));
    }
}
// </coverage:exclude>
