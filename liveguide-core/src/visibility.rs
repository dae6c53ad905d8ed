use std::fmt;

use actlet::prelude::*;

use crate::poll::ResumePolling;
use crate::poll::SuspendPolling;
use crate::scheduler::StartScheduler;
use crate::scheduler::StopScheduler;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Visibility {
    Foreground,
    Background,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Foreground => write!(f, "foreground"),
            Self::Background => write!(f, "background"),
        }
    }
}

/// Starts polling while the host is in the foreground and stops it while in
/// the background.
///
/// The push connection is not affected.
pub struct VisibilityGate<S, P> {
    scheduler: S,
    poller: P,
    device_id: Option<String>,
    visibility: Option<Visibility>,
}

impl<S, P> VisibilityGate<S, P> {
    pub fn new(scheduler: S, poller: P, device_id: Option<String>) -> Self {
        VisibilityGate {
            scheduler,
            poller,
            device_id,
            visibility: None,
        }
    }
}

#[async_trait]
impl<S, P> Actor for VisibilityGate<S, P>
where
    S: Send + Sync + 'static,
    S: Call<StartScheduler>,
    S: Call<StopScheduler>,
    P: Send + Sync + 'static,
    P: Emit<SuspendPolling>,
    P: Emit<ResumePolling>,
{
    async fn started(&mut self, _ctx: &mut Context<Self>) {
        tracing::debug!("Started");
    }

    async fn stopped(&mut self, _ctx: &mut Context<Self>) {
        tracing::debug!("Stopped");
    }
}

// visibility changed

#[derive(Message)]
#[reply("()")]
pub struct VisibilityChanged {
    pub visibility: Visibility,
}

#[async_trait]
impl<S, P> Handler<VisibilityChanged> for VisibilityGate<S, P>
where
    S: Send + Sync + 'static,
    S: Call<StartScheduler>,
    S: Call<StopScheduler>,
    P: Send + Sync + 'static,
    P: Emit<SuspendPolling>,
    P: Emit<ResumePolling>,
{
    async fn handle(&mut self, msg: VisibilityChanged, _ctx: &mut Context<Self>) {
        tracing::debug!(msg.name = "VisibilityChanged", %msg.visibility);
        if self.visibility == Some(msg.visibility) {
            return;
        }
        self.visibility = Some(msg.visibility);
        tracing::info!(%msg.visibility, "Visibility changed");
        match msg.visibility {
            Visibility::Foreground => {
                if let Err(err) = self.scheduler.call(StartScheduler).await {
                    tracing::error!(%err, "Failed to start the scheduler");
                }
                self.poller
                    .emit(ResumePolling {
                        device_id: self.device_id.clone(),
                    })
                    .await;
            }
            Visibility::Background => {
                if let Err(err) = self.scheduler.call(StopScheduler).await {
                    tracing::error!(%err, "Failed to stop the scheduler");
                }
                self.poller.emit(SuspendPolling).await;
            }
        }
    }
}

// query visibility

#[derive(Message)]
#[reply("Option<Visibility>")]
pub struct QueryVisibility;

#[async_trait]
impl<S, P> Handler<QueryVisibility> for VisibilityGate<S, P>
where
    S: Send + Sync + 'static,
    S: Call<StartScheduler>,
    S: Call<StopScheduler>,
    P: Send + Sync + 'static,
    P: Emit<SuspendPolling>,
    P: Emit<ResumePolling>,
{
    async fn handle(
        &mut self,
        _msg: QueryVisibility,
        _ctx: &mut Context<Self>,
    ) -> <QueryVisibility as Message>::Reply {
        tracing::debug!(msg.name = "QueryVisibility");
        self.visibility
    }
}

// <coverage:exclude>
#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::stub::PollWorkerCall;
    use crate::poll::stub::PollWorkerStub;
    use std::sync::Arc;
    use std::sync::Mutex;
    use test_log::test;

    #[derive(Clone, Default)]
    struct SchedulerStub {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl SchedulerStub {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Call<StartScheduler> for SchedulerStub {
        async fn call(&self, _msg: StartScheduler) -> actlet::Result<()> {
            self.calls.lock().unwrap().push("start");
            Ok(())
        }
    }

    #[async_trait]
    impl Call<StopScheduler> for SchedulerStub {
        async fn call(&self, _msg: StopScheduler) -> actlet::Result<()> {
            self.calls.lock().unwrap().push("stop");
            Ok(())
        }
    }

    macro_rules! changed {
        ($visibility:ident) => {
            VisibilityChanged {
                visibility: Visibility::$visibility,
            }
        };
    }

    #[test(tokio::test)]
    async fn test_visibility_changed() {
        let system = System::new();
        let scheduler = SchedulerStub::default();
        let poller = PollWorkerStub::default();
        let gate = system
            .spawn_actor(VisibilityGate::new(scheduler.clone(), poller.clone(), None))
            .await;
        assert_eq!(gate.call(QueryVisibility).await.unwrap(), None);

        gate.call(changed!(Foreground)).await.unwrap();
        assert_eq!(scheduler.calls(), vec!["start"]);
        assert_eq!(poller.calls(), vec![PollWorkerCall::Resume]);
        assert_eq!(
            gate.call(QueryVisibility).await.unwrap(),
            Some(Visibility::Foreground)
        );

        gate.call(changed!(Background)).await.unwrap();
        assert_eq!(scheduler.calls(), vec!["start", "stop"]);
        assert_eq!(
            poller.calls(),
            vec![PollWorkerCall::Resume, PollWorkerCall::Suspend]
        );

        gate.call(changed!(Foreground)).await.unwrap();
        assert_eq!(scheduler.calls(), vec!["start", "stop", "start"]);
        assert_eq!(
            poller.calls(),
            vec![
                PollWorkerCall::Resume,
                PollWorkerCall::Suspend,
                PollWorkerCall::Resume,
            ]
        );

        system.stop();
    }

    #[test(tokio::test)]
    async fn test_visibility_changed_repeated() {
        let system = System::new();
        let scheduler = SchedulerStub::default();
        let poller = PollWorkerStub::default();
        let gate = system
            .spawn_actor(VisibilityGate::new(scheduler.clone(), poller.clone(), None))
            .await;

        gate.call(changed!(Background)).await.unwrap();
        gate.call(changed!(Background)).await.unwrap();
        assert_eq!(scheduler.calls(), vec!["stop"]);
        assert_eq!(poller.calls(), vec![PollWorkerCall::Suspend]);

        gate.call(changed!(Foreground)).await.unwrap();
        gate.call(changed!(Foreground)).await.unwrap();
        assert_eq!(scheduler.calls(), vec!["stop", "start"]);
        assert_eq!(
            poller.calls(),
            vec![PollWorkerCall::Suspend, PollWorkerCall::Resume]
        );

        system.stop();
    }
}
// </coverage:exclude>
