//! The reference ascending (English) auction specialization (§4.3).
//!
//! Illustrative, not load-bearing: the core (lifecycle + scheduler) must
//! support this shape generically, but nothing elsewhere depends on the
//! particular bidding rule implemented here.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use auction_shared::Message;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::context::TaskContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logic::AuctionLogic;

const MAX_TIMEOUT: Duration = Duration::from_secs(30);
const MIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct BidState {
    highest_bidder: Option<String>,
    highest_bid: i64,
    end_at: Instant,
}

/// A single-lot ascending auction: any strictly higher bid becomes the new
/// high bid; a qualifying bid arriving within [`MIN_TIMEOUT`] of the
/// scheduled end extends the clock (soft close).
#[derive(Debug)]
pub struct AscendingAuction {
    state: Mutex<BidState>,
}

impl AscendingAuction {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BidState {
                highest_bidder: None,
                highest_bid: 0,
                // Placeholder until `initialize` runs; no handler observes
                // this value before then.
                end_at: Instant::now(),
            }),
        }
    }
}

impl Default for AscendingAuction {
    fn default() -> Self {
        Self::new()
    }
}

fn remaining_secs(end_at: Instant, now: Instant) -> u64 {
    end_at.saturating_duration_since(now).as_secs()
}

#[async_trait]
impl AuctionLogic for AscendingAuction {
    async fn initialize(&self, ctx: &TaskContext<'_>) {
        let end_at = Instant::now() + MAX_TIMEOUT;
        self.state.lock().await.end_at = end_at;
        ctx.broadcast(Message::new("start").with_field("timer", MAX_TIMEOUT.as_secs().to_string()))
            .await;
    }

    async fn idle(&self, ctx: &TaskContext<'_>) {
        let end_at = self.state.lock().await.end_at;
        if Instant::now() >= end_at {
            ctx.mark_endable();
        }
    }

    async fn resolve(&self, ctx: &TaskContext<'_>) {
        let state = self.state.lock().await;
        let mut message = Message::new("stop");
        if let Some(bidder) = &state.highest_bidder {
            message = message
                .with_field("bidder", bidder.clone())
                .with_field("bid", state.highest_bid.to_string());
        }
        ctx.broadcast(message).await;
    }

    fn handles(&self, msg_type: &str) -> bool {
        msg_type == "bid"
    }

    async fn handle(
        &self,
        _msg_type: &str,
        args: &BTreeMap<String, String>,
        ctx: &TaskContext<'_>,
    ) -> WorkerResult<()> {
        let bidder = args.get("bidder").ok_or(WorkerError::MissingField("bidder"))?;
        let bid_raw = args.get("bid").ok_or(WorkerError::MissingField("bid"))?;
        let bid: i64 = bid_raw
            .parse()
            .map_err(|_| WorkerError::InvalidInt { field: "bid", value: bid_raw.clone() })?;

        let mut state = self.state.lock().await;
        if bid <= state.highest_bid {
            debug!(task_id = ctx.task_id(), bid, highest = state.highest_bid, "bid too low, dropping");
            return Ok(());
        }

        state.highest_bidder = Some(bidder.clone());
        state.highest_bid = bid;

        let now = Instant::now();
        if remaining_secs(state.end_at, now) < MIN_TIMEOUT.as_secs() {
            state.end_at = now + MIN_TIMEOUT;
            ctx.resume();
        }
        let remaining = remaining_secs(state.end_at, now);
        let bidder = bidder.clone();
        drop(state);

        ctx.broadcast(
            Message::new("status")
                .with_field("timer", remaining.to_string())
                .with_field("bidder", bidder)
                .with_field("bid", bid.to_string()),
        )
        .await;
        Ok(())
    }
}
