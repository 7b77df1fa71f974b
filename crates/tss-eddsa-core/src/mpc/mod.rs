//! MPC coordination utilities

use crate::{PartyIndex, Result, SessionId};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;

pub use ::async_trait::async_trait;

/// Progress of one party through a three-round protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    /// Nothing sent yet
    Uninitialized,
    /// Own round-1 material sent, waiting for everyone else's broadcast
    AwaitingBroadcast,
    /// All broadcasts in, waiting for direct shares
    AwaitingShares,
    /// Output produced
    Complete,
}

/// Message relay trait for MPC communication.
///
/// Every message is keyed by its sender's [`PartyIndex`]; collecting blocks
/// until exactly one message from each expected sender is available.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Broadcast a message to all parties
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: PartyIndex,
        message: &T,
    ) -> Result<()>;

    /// Send a direct message to a specific party
    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: PartyIndex,
        to: PartyIndex,
        message: &T,
    ) -> Result<()>;

    /// Collect, as party `to`, the broadcast of every party in `from`
    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        to: PartyIndex,
        from: &[PartyIndex],
    ) -> Result<BTreeMap<PartyIndex, T>>;

    /// Collect the direct message sent to `to` by every party in `from`
    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        to: PartyIndex,
        from: &[PartyIndex],
    ) -> Result<BTreeMap<PartyIndex, T>>;
}

/// In-memory relay for testing
pub mod memory;

pub use memory::MemoryRelay;
