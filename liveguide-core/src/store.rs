use std::collections::HashMap;
use std::sync::Arc;

use actlet::prelude::*;

use crate::models::LiveStatusEntry;
use crate::models::ScheduleId;

pub type LiveStatusSnapshot = HashMap<ScheduleId, LiveStatusEntry>;

/// In-memory live-status facts keyed by schedule ID.
///
/// The whole map is replaced on each update so that readers never observe a
/// mix of two poll results.  A missing key means "unknown", not "not live".
pub struct LiveStatusStore {
    snapshot: Arc<LiveStatusSnapshot>,
    emitters: EmitterRegistry<LiveStatusUpdated>,
}

impl LiveStatusStore {
    pub fn new() -> Self {
        LiveStatusStore {
            snapshot: Default::default(),
            emitters: Default::default(),
        }
    }

    pub fn get(&self, schedule_id: &str) -> Option<&LiveStatusEntry> {
        self.snapshot.get(schedule_id)
    }

    pub fn snapshot(&self) -> Arc<LiveStatusSnapshot> {
        self.snapshot.clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn subscribe(&mut self, emitter: Emitter<LiveStatusUpdated>) -> usize {
        self.emitters.register(emitter)
    }

    pub fn unsubscribe(&mut self, id: usize) -> bool {
        self.emitters.unregister(id)
    }

    /// Replaces all entries with `entries`.
    ///
    /// The last one wins if `entries` contains duplicate schedule IDs.
    /// Subscribers have received the new snapshot when this function returns.
    pub async fn replace_all<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = LiveStatusEntry>,
    {
        let snapshot: LiveStatusSnapshot = entries
            .into_iter()
            .map(|entry| (entry.schedule_id.clone(), entry))
            .collect();
        let live = snapshot.values().filter(|entry| entry.is_live).count();
        tracing::debug!(store.entries = snapshot.len(), store.live = live, "Replaced");
        self.snapshot = Arc::new(snapshot);
        let msg = LiveStatusUpdated {
            snapshot: self.snapshot.clone(),
        };
        self.emitters.emit(msg).await;
    }
}

impl Default for LiveStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

// live status updated

#[derive(Clone, Debug, Message)]
pub struct LiveStatusUpdated {
    pub snapshot: Arc<LiveStatusSnapshot>,
}

// <coverage:exclude>
#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use maplit::hashmap;
    use pretty_assertions::assert_eq;
    use test_log::test;

    macro_rules! entry {
        ($id:expr, $is_live:expr) => {
            LiveStatusEntry {
                schedule_id: $id.into(),
                is_live: $is_live,
                stream_url: None,
            }
        };
        ($id:expr, $is_live:expr, $url:expr) => {
            LiveStatusEntry {
                schedule_id: $id.into(),
                is_live: $is_live,
                stream_url: Some($url.to_string()),
            }
        };
    }

    #[test(tokio::test)]
    async fn test_replace_all_idempotent() {
        let mut store = LiveStatusStore::new();
        let entries = vec![entry!("A", true, "u"), entry!("B", false)];

        store.replace_all(entries.clone()).await;
        let once = store.snapshot();
        store.replace_all(entries).await;
        let twice = store.snapshot();

        assert_eq!(*once, *twice);
        assert_eq!(store.get("A"), Some(&entry!("A", true, "u")));
        assert_eq!(store.get("B"), Some(&entry!("B", false)));
    }

    #[test(tokio::test)]
    async fn test_replace_all_last_wins() {
        let mut store = LiveStatusStore::new();
        store
            .replace_all(vec![entry!("A", false), entry!("A", true, "u")])
            .await;
        assert_eq!(
            *store.snapshot(),
            hashmap! {
                ScheduleId::from("A") => entry!("A", true, "u"),
            }
        );
    }

    #[test(tokio::test)]
    async fn test_replace_all_discards_missing_entries() {
        let mut store = LiveStatusStore::new();
        assert!(store.is_empty());

        store
            .replace_all(vec![entry!("A", false), entry!("B", true)])
            .await;
        assert_eq!(store.len(), 2);

        store.replace_all(vec![entry!("A", true, "u")]).await;
        assert_eq!(store.get("A"), Some(&entry!("A", true, "u")));
        assert_matches!(store.get("B"), None);
        assert_matches!(store.get("C"), None);
    }

    #[test(tokio::test)]
    async fn test_subscribe() {
        let mut store = LiveStatusStore::new();

        let mut mock = MockUpdatedEmitter::new();
        mock.expect_emit().times(1).returning(|msg| {
            assert_eq!(msg.snapshot.len(), 1);
            assert_matches!(msg.snapshot.get("A"), Some(entry) => {
                assert!(entry.is_live);
            });
        });
        let id = store.subscribe(Emitter::new(mock));

        store.replace_all(vec![entry!("A", true)]).await;

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));

        // No subscriber gets notified.
        store.replace_all(vec![]).await;
        assert!(store.is_empty());
    }

    mockall::mock! {
        UpdatedEmitter {}

        #[async_trait]
        impl Emit<LiveStatusUpdated> for UpdatedEmitter {
            async fn emit(&self, msg: LiveStatusUpdated);
        }
    }
}
// </coverage:exclude>
