//! In-memory relay implementation for local simulation and testing

use super::{async_trait, Relay};
use crate::{Error, PartyIndex, Result, SessionId};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Default)]
struct Mailbox {
    messages: BTreeMap<PartyIndex, Vec<u8>>,
    /// Parties that have collected from this mailbox
    readers: BTreeSet<PartyIndex>,
}

impl Mailbox {
    /// Every sender has collected the round as well
    fn drained(&self) -> bool {
        self.messages.keys().all(|sender| self.readers.contains(sender))
    }
}

/// In-memory message relay shared by all parties of a local run
#[derive(Clone)]
pub struct MemoryRelay {
    /// Broadcast messages: (session_id, round) -> sender -> bytes
    broadcasts: Arc<DashMap<(SessionId, u32), Mailbox>>,
    /// Direct messages: (session_id, round, to) -> sender -> bytes
    directs: Arc<DashMap<(SessionId, u32, PartyIndex), Mailbox>>,
    /// Notification channel
    notify: broadcast::Sender<()>,
    /// How long a collect call waits before giving up
    timeout: Duration,
}

impl MemoryRelay {
    /// Create a new in-memory relay
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(100);
        Self {
            broadcasts: Arc::new(DashMap::new()),
            directs: Arc::new(DashMap::new()),
            notify,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set collect timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn wait_for<K, T>(
        &self,
        map: &DashMap<K, Mailbox>,
        key: K,
        reader: PartyIndex,
        from: &[PartyIndex],
        shared: bool,
        what: String,
    ) -> Result<BTreeMap<PartyIndex, T>>
    where
        K: Hash + Eq,
        T: DeserializeOwned,
    {
        let mut rx = self.notify.subscribe();
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            if let Some(ready) = take_ready(map, &key, reader, from, shared) {
                return ready
                    .iter()
                    .map(|(&sender, bytes)| Ok((sender, deserialize(bytes)?)))
                    .collect();
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout(what));
            }

            tokio::select! {
                _ = rx.recv() => continue,
                _ = tokio::time::sleep(Duration::from_millis(100)) => continue,
            }
        }
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}

/// Snapshot the messages from `from` once all of them have arrived.
///
/// A direct mailbox has a single reader and is dropped once collected. A
/// shared (broadcast) mailbox is dropped once every sender has collected it.
fn take_ready<K: Hash + Eq>(
    map: &DashMap<K, Mailbox>,
    key: &K,
    reader: PartyIndex,
    from: &[PartyIndex],
    shared: bool,
) -> Option<BTreeMap<PartyIndex, Vec<u8>>> {
    let ready = {
        let mut mailbox = map.get_mut(key)?;
        let ready: Option<BTreeMap<PartyIndex, Vec<u8>>> = from
            .iter()
            .map(|sender| {
                mailbox
                    .messages
                    .get(sender)
                    .map(|bytes| (*sender, bytes.clone()))
            })
            .collect();
        if ready.is_some() {
            mailbox.readers.insert(reader);
        }
        ready
    }?;

    if map.remove_if(key, |_, mailbox| !shared || mailbox.drained()).is_some() {
        trace!(reader, "Mailbox drained");
    }
    Some(ready)
}

fn deposit<K: Hash + Eq>(
    map: &DashMap<K, Mailbox>,
    key: K,
    from: PartyIndex,
    round: u32,
    bytes: Vec<u8>,
) -> Result<()> {
    let mut mailbox = map.entry(key).or_default();
    if mailbox.messages.contains_key(&from) {
        return Err(Error::Relay(format!(
            "duplicate message from party {} in round {}",
            from, round
        )));
    }
    mailbox.messages.insert(from, bytes);
    Ok(())
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: PartyIndex,
        message: &T,
    ) -> Result<()> {
        let bytes = serialize(message)?;
        deposit(&self.broadcasts, (*session_id, round), from, round, bytes)?;
        trace!(round, from, "Broadcast stored");

        let _ = self.notify.send(());
        Ok(())
    }

    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: PartyIndex,
        to: PartyIndex,
        message: &T,
    ) -> Result<()> {
        let bytes = serialize(message)?;
        deposit(&self.directs, (*session_id, round, to), from, round, bytes)?;
        trace!(round, from, to, "Direct message stored");

        let _ = self.notify.send(());
        Ok(())
    }

    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        to: PartyIndex,
        from: &[PartyIndex],
    ) -> Result<BTreeMap<PartyIndex, T>> {
        self.wait_for(
            &self.broadcasts,
            (*session_id, round),
            to,
            from,
            true,
            format!("round {} broadcasts from {:?}", round, from),
        )
        .await
    }

    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        to: PartyIndex,
        from: &[PartyIndex],
    ) -> Result<BTreeMap<PartyIndex, T>> {
        self.wait_for(
            &self.directs,
            (*session_id, round, to),
            to,
            from,
            false,
            format!("round {} messages to party {} from {:?}", round, to, from),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestMessage {
        value: u32,
    }

    #[tokio::test]
    async fn test_broadcast() {
        let relay = MemoryRelay::new();
        let session_id = [0u8; 32];

        relay.broadcast(&session_id, 1, 2, &TestMessage { value: 43 }).await.unwrap();
        relay.broadcast(&session_id, 1, 1, &TestMessage { value: 42 }).await.unwrap();

        let messages: BTreeMap<PartyIndex, TestMessage> =
            relay.collect_broadcasts(&session_id, 1, 3, &[1, 2]).await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[&1].value, 42);
        assert_eq!(messages[&2].value, 43);
    }

    #[tokio::test]
    async fn test_direct() {
        let relay = MemoryRelay::new();
        let session_id = [0u8; 32];

        relay.send_direct(&session_id, 1, 2, 1, &TestMessage { value: 100 }).await.unwrap();

        let messages: BTreeMap<PartyIndex, TestMessage> =
            relay.collect_direct(&session_id, 1, 1, &[2]).await.unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[&2].value, 100);
        assert!(relay.directs.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_mailbox_dropped_once_every_sender_collected() {
        let relay = MemoryRelay::new();
        let session_id = [6u8; 32];

        for party in 1..=3 {
            relay.broadcast(&session_id, 1, party, &TestMessage { value: party as u32 }).await.unwrap();
        }

        let _: BTreeMap<PartyIndex, TestMessage> =
            relay.collect_broadcasts(&session_id, 1, 1, &[2, 3]).await.unwrap();
        let _: BTreeMap<PartyIndex, TestMessage> =
            relay.collect_broadcasts(&session_id, 1, 2, &[1, 3]).await.unwrap();
        assert_eq!(relay.broadcasts.len(), 1);

        let last: BTreeMap<PartyIndex, TestMessage> =
            relay.collect_broadcasts(&session_id, 1, 3, &[1, 2]).await.unwrap();
        assert_eq!(last[&1].value, 1);
        assert!(relay.broadcasts.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_sender_rejected() {
        let relay = MemoryRelay::new();
        let session_id = [0u8; 32];

        relay.broadcast(&session_id, 1, 1, &TestMessage { value: 1 }).await.unwrap();
        let second = relay.broadcast(&session_id, 1, 1, &TestMessage { value: 2 }).await;
        assert!(matches!(second, Err(Error::Relay(_))));
    }

    #[tokio::test]
    async fn test_collect_waits_for_late_sender() {
        let relay = MemoryRelay::new();
        let session_id = [5u8; 32];

        let sender = relay.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender.broadcast(&session_id, 1, 3, &TestMessage { value: 7 }).await.unwrap();
        });

        let messages: BTreeMap<PartyIndex, TestMessage> =
            relay.collect_broadcasts(&session_id, 1, 1, &[3]).await.unwrap();
        assert_eq!(messages[&3].value, 7);
    }

    #[tokio::test]
    async fn test_missing_sender_times_out() {
        let relay = MemoryRelay::new().with_timeout(Duration::from_millis(50));
        let session_id = [0u8; 32];

        relay.broadcast(&session_id, 1, 1, &TestMessage { value: 1 }).await.unwrap();
        let result: Result<BTreeMap<PartyIndex, TestMessage>> =
            relay.collect_broadcasts(&session_id, 1, 3, &[1, 2]).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }
}
