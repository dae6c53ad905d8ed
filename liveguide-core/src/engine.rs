use std::sync::Arc;

use actlet::prelude::*;

use crate::config::Config;
use crate::dispatcher::RefreshDispatcher;
use crate::error::Error;
use crate::poll::HttpFetcher;
use crate::poll::LiveStatusFetcher;
use crate::poll::PollWorker;
use crate::push::Disconnect;
use crate::push::EventSourceTransport;
use crate::push::PushListener;
use crate::push::PushTransport;
use crate::schedule::Clock;
use crate::schedule::IntervalParams;
use crate::schedule::SystemClock;
use crate::scheduler::AdaptiveScheduler;
use crate::visibility::Visibility;
use crate::visibility::VisibilityChanged;
use crate::visibility::VisibilityGate;

pub type PollWorkerAddr<F> = Address<PollWorker<F>>;
pub type SchedulerAddr<F> = Address<AdaptiveScheduler<PollWorkerAddr<F>>>;
pub type PushListenerAddr<T> = Address<PushListener<T>>;
pub type DispatcherAddr<F, T> =
    Address<RefreshDispatcher<PushListenerAddr<T>, PollWorkerAddr<F>>>;
pub type VisibilityGateAddr<F> =
    Address<VisibilityGate<SchedulerAddr<F>, PollWorkerAddr<F>>>;

pub type HttpEngine = Engine<Arc<HttpFetcher>, EventSourceTransport>;

/// Addresses of the actors making up the live-status sync engine.
pub struct Engine<F, T> {
    pub poll_worker: PollWorkerAddr<F>,
    pub scheduler: SchedulerAddr<F>,
    pub push_listener: PushListenerAddr<T>,
    pub dispatcher: DispatcherAddr<F, T>,
    pub visibility_gate: VisibilityGateAddr<F>,
}

impl<F, T> Engine<F, T>
where
    F: LiveStatusFetcher + Clone + Send + Sync + 'static,
    T: PushTransport + Send + Sync + 'static,
{
    /// Spawns actors in the dependency order.
    ///
    /// Polling does not start until the engine is foregrounded and the push
    /// connection is not opened until `Connect` is sent to `push_listener`.
    pub async fn spawn<S>(
        spawner: &S,
        config: &Config,
        fetcher: F,
        transport: Arc<T>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: Spawn,
    {
        let device_id = config.schedule_service.device_id.clone();

        let poll_worker = spawner.spawn_actor(PollWorker::new(fetcher)).await;

        let scheduler = spawner
            .spawn_actor(AdaptiveScheduler::new(
                poll_worker.clone(),
                clock,
                IntervalParams::from(&config.scheduler),
                device_id.clone(),
            ))
            .await;

        let push_listener = spawner
            .spawn_actor(PushListener::new(transport, config.push.reconnect_delay))
            .await;

        let dispatcher = spawner
            .spawn_actor(RefreshDispatcher::new(
                push_listener.clone(),
                poll_worker.clone(),
                device_id.clone(),
            ))
            .await;

        let visibility_gate = spawner
            .spawn_actor(VisibilityGate::new(
                scheduler.clone(),
                poll_worker.clone(),
                device_id,
            ))
            .await;

        Engine {
            poll_worker,
            scheduler,
            push_listener,
            dispatcher,
            visibility_gate,
        }
    }

    pub async fn set_visibility(&self, visibility: Visibility) -> Result<(), Error> {
        self.visibility_gate
            .call(VisibilityChanged { visibility })
            .await?;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), Error> {
        self.push_listener.call(Disconnect).await?;
        Ok(())
    }
}

impl HttpEngine {
    /// Spawns an engine talking to the schedule service over HTTP.
    pub async fn spawn_http<S>(spawner: &S, config: &Config) -> Result<Self, Error>
    where
        S: Spawn,
    {
        let service = Arc::new(config.schedule_service.clone());
        let fetcher = Arc::new(HttpFetcher::new(service.clone())?);
        let transport = Arc::new(EventSourceTransport::new(service.events_url()));
        Ok(Self::spawn(spawner, config, fetcher, transport, Arc::new(SystemClock)).await)
    }
}

// <coverage:exclude>
#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher;
    use crate::dispatcher::RefreshView;
    use crate::models::WebChannelSchedules;
    use crate::poll::QueryLiveStatus;
    use crate::push::stub::StubTransport;
    use crate::push::Connect;
    use crate::push::TransportEvent;
    use crate::schedule::stub::TokioClock;
    use crate::scheduler::QuerySchedulerState;
    use crate::test_util::channel_emitter;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use test_log::test;

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn new() -> Arc<Self> {
            Arc::new(CountingFetcher {
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LiveStatusFetcher for CountingFetcher {
        async fn fetch(
            &self,
            device_id: Option<String>,
        ) -> Result<Vec<WebChannelSchedules>, Error> {
            assert_eq!(device_id.as_deref(), Some("dev"));
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            // Alternates the live status in order to observe each fetch.
            let json = format!(
                r#"[{{"channel":{{"id":1}},"schedules":[{{"id":"A","program":{{"is_live":{}}}}}]}}]"#,
                n % 2 == 0
            );
            Ok(serde_json::from_str(&json).unwrap())
        }
    }

    fn config() -> Config {
        serde_yaml::from_str(
            r#"
            schedule-service:
              base-url: http://schedule.test/api/
              device-id: dev
            "#,
        )
        .unwrap()
    }

    async fn spawn(
        system: &System,
    ) -> (
        Engine<Arc<CountingFetcher>, StubTransport>,
        Arc<CountingFetcher>,
        Arc<StubTransport>,
    ) {
        let fetcher = CountingFetcher::new();
        let transport = Arc::new(StubTransport::default());
        let engine = Engine::spawn(
            system,
            &config(),
            fetcher.clone(),
            transport.clone(),
            Arc::new(TokioClock::starting_at("2024-01-01T10:00:00Z")),
        )
        .await;
        (engine, fetcher, transport)
    }

    async fn advance(duration: Duration) {
        tokio::time::sleep(duration).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[test(tokio::test(start_paused = true))]
    async fn test_visibility_gating() {
        let system = System::new();
        let (engine, fetcher, transport) = spawn(&system).await;
        engine.push_listener.call(Connect).await.unwrap();
        advance(Duration::ZERO).await;
        transport.send(0, TransportEvent::Opened);

        engine.set_visibility(Visibility::Foreground).await.unwrap();
        advance(Duration::ZERO).await;
        assert_eq!(fetcher.calls(), 1);

        engine.set_visibility(Visibility::Background).await.unwrap();
        advance(Duration::from_secs(3600)).await;
        assert_eq!(fetcher.calls(), 1);

        let state = engine.scheduler.call(QuerySchedulerState).await.unwrap();
        assert!(!state.started);

        // Push signals while hidden are deferred.
        transport.send(0, TransportEvent::Message("{}".to_string()));
        transport.send(0, TransportEvent::Message("{}".to_string()));
        advance(Duration::ZERO).await;
        assert_eq!(fetcher.calls(), 1);

        // Exactly one immediate run when foregrounded again.
        engine.set_visibility(Visibility::Foreground).await.unwrap();
        advance(Duration::ZERO).await;
        assert_eq!(fetcher.calls(), 2);

        let state = engine.scheduler.call(QuerySchedulerState).await.unwrap();
        assert!(state.started);
        assert_eq!(state.interval, Some(Duration::from_secs(300)));

        engine.disconnect().await.unwrap();
        system.stop();
    }

    #[test(tokio::test(start_paused = true))]
    async fn test_push_during_baseline_wait() {
        let system = System::new();
        let (engine, fetcher, transport) = spawn(&system).await;

        let (emitter, mut views) = channel_emitter::<RefreshView>();
        engine
            .dispatcher
            .call(dispatcher::RegisterEmitter::RefreshView(emitter))
            .await
            .unwrap();

        engine.push_listener.call(Connect).await.unwrap();
        advance(Duration::ZERO).await;
        transport.send(0, TransportEvent::Opened);

        engine.set_visibility(Visibility::Foreground).await.unwrap();
        advance(Duration::ZERO).await;
        assert_eq!(fetcher.calls(), 1);
        let entry = engine
            .poll_worker
            .call(QueryLiveStatus {
                schedule_id: "A".into(),
            })
            .await
            .unwrap();
        assert_matches!(entry, Some(entry) => assert!(!entry.is_live));

        advance(Duration::from_secs(60)).await;
        assert_eq!(fetcher.calls(), 1);

        // An out-of-band poll without waiting for the baseline timer.
        transport.send(0, TransportEvent::Message(r#"{"id":"A"}"#.to_string()));
        advance(Duration::ZERO).await;
        assert_eq!(fetcher.calls(), 2);
        assert_matches!(views.try_recv(), Ok(RefreshView));
        let entry = engine
            .poll_worker
            .call(QueryLiveStatus {
                schedule_id: "A".into(),
            })
            .await
            .unwrap();
        assert_matches!(entry, Some(entry) => assert!(entry.is_live));

        // The baseline timer still fires.
        advance(Duration::from_secs(240)).await;
        assert_eq!(fetcher.calls(), 3);

        engine.disconnect().await.unwrap();
        system.stop();
    }
}
// </coverage:exclude>
