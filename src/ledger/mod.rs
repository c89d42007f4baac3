//! The session ledger: turns association observations into non-overlapping
//! accounting intervals credited to calendar-day buckets.
//!
//! ## Accounting rules
//!
//! - Every call reloads the session from storage before mutating it, inside
//!   one exclusive store transaction, so any number of independent triggers
//!   (in this process or another one sharing the database) may call
//!   [`SessionLedger::check`] in any order.
//! - A flush (on disconnect) or an accumulation (while associated) credits
//!   only the time and traffic since `last_sample_at`, then advances it by
//!   the whole seconds credited. Earlier time has already been credited by a
//!   previous call, which makes repeated calls idempotent, and sub-second
//!   remainders carry over instead of being lost to rapid polling.
//! - Counter deltas are clamped at zero so a counter reset never produces a
//!   negative total.
//! - All elapsed time is credited to the day that is current at flush time.
//!   A session spanning midnight without an intermediate check is therefore
//!   attributed entirely to the later day.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    clock::{Clock, day_key, day_key_of_millis, millis_to_local},
    models::{SessionState, TrafficTotals, UsageTotals},
    observer::{Association, ConnectivityObserver},
    persistence::{
        error::PersistenceError,
        keys,
        traits::{KeyValueStore, StateBatch, StateTransaction},
    },
};

/// Errors that can occur within the SessionLedger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Error occurred in the state repository
    #[error("State repository error: {0}")]
    StateRepositoryError(#[from] PersistenceError),
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckTransition {
    /// The target network was associated before this check and is not now.
    pub just_disconnected: bool,
    /// The stored association flag before this check.
    pub previously_associated: bool,
    /// The effective association flag after this check.
    pub associated: bool,
}

/// Read-only view of the ledger, for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStatus {
    /// Whether a session is open.
    pub session_open: bool,
    /// The stored association flag.
    pub was_target_connected: bool,
    /// When the last session was opened.
    pub last_connected_at: Option<DateTime<FixedOffset>>,
    /// When the last disconnect was detected.
    pub last_disconnected_at: Option<DateTime<FixedOffset>>,
    /// First association of today, if any happened today.
    pub first_connected_today: Option<DateTime<FixedOffset>>,
    /// Stored totals of today.
    pub today: UsageTotals,
    /// Today's duration including the not yet flushed tail of the session.
    pub live_today_seconds: u64,
}

/// The sole writer of session state and day buckets.
pub struct SessionLedger<T: KeyValueStore> {
    /// The state repository holding the session and the day buckets.
    store: Arc<T>,

    /// Source of the wall clock.
    clock: Arc<dyn Clock>,

    /// Source of the cumulative traffic counters.
    observer: Arc<dyn ConnectivityObserver>,

    /// Serializes whole check operations within this process. Other
    /// processes are kept out by the store's exclusive transaction.
    lock: Mutex<()>,
}

impl<T: KeyValueStore> SessionLedger<T> {
    /// Creates a ledger over the given store.
    pub fn new(
        store: Arc<T>,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn ConnectivityObserver>,
    ) -> Self {
        Self { store, clock, observer, lock: Mutex::new(()) }
    }

    /// Records the observed association flag and returns whether the target
    /// network was just lost.
    pub async fn check(&self, observed_associated: bool) -> Result<bool, LedgerError> {
        let association = if observed_associated {
            Association::Associated
        } else {
            Association::NotAssociated
        };
        Ok(self.check_association(association).await?.just_disconnected)
    }

    /// Records an observation. An indeterminate observation is replaced by
    /// the stored association flag, so a temporarily unknown network name
    /// never opens or closes a session.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn check_association(
        &self,
        association: Association,
    ) -> Result<CheckTransition, LedgerError> {
        let _guard = self.lock.lock().await;
        let mut tx = self.store.begin_exclusive().await?;

        let mut state = load_session(&mut tx).await?;
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();
        let today = day_key(&now);

        let previously_associated = state.was_target_connected;
        let associated = match association {
            Association::Associated => true,
            Association::NotAssociated => false,
            Association::Indeterminate => {
                tracing::debug!(
                    previously_associated,
                    "Network name indeterminate, keeping last known association."
                );
                previously_associated
            }
        };
        let just_disconnected = previously_associated && !associated;

        let mut batch = StateBatch::new();

        if just_disconnected {
            batch.set_json(keys::INFO_LAST_DISCONNECTED_AT, &now_ms)?;
            if state.is_open() {
                let counters = self.observer.traffic_totals();
                let credit = credit_since_last_sample(&state, now_ms, counters);
                merge_into_day(&mut tx, &mut batch, &today, credit).await?;
                tracing::info!(
                    day = %today,
                    duration_seconds = credit.duration_seconds,
                    rx_bytes = credit.rx_bytes,
                    tx_bytes = credit.tx_bytes,
                    "Session closed and flushed."
                );
            }
            clear_session(&mut batch);
            state = SessionState::default();
        }

        if associated {
            let counters = self.observer.traffic_totals();

            if !state.is_open() {
                if !previously_associated {
                    batch.set_json(keys::INFO_LAST_CONNECTED_AT, &now_ms)?;
                    mark_first_connection_today(&mut tx, &mut batch, &now, now_ms).await?;
                }
                state.connected_at = Some(now_ms);
                state.last_sample_at = now_ms;
                state.last_snapshot = counters;
                batch.set_json(keys::SESSION_CONNECTED_AT, &now_ms)?;
                tracing::info!(day = %today, "Session opened.");
            }

            let credit = credit_since_last_sample(&state, now_ms, counters);
            merge_into_day(&mut tx, &mut batch, &today, credit).await?;

            let sampled_at = advance_sample_time(state.last_sample_at, credit.duration_seconds);
            batch
                .set_json(keys::SESSION_LAST_SAMPLE_AT, &sampled_at)?
                .set_json(keys::SESSION_LAST_RX, &counters.rx_bytes)?
                .set_json(keys::SESSION_LAST_TX, &counters.tx_bytes)?;
        }

        batch.set_json(keys::SESSION_WAS_TARGET_CONNECTED, &associated)?;
        tx.commit(batch).await?;

        Ok(CheckTransition { just_disconnected, previously_associated, associated })
    }

    /// The stored association flag.
    pub async fn was_target_connected(&self) -> Result<bool, LedgerError> {
        let mut reader = StoreReader(self.store.as_ref());
        Ok(read_field::<bool, _>(&mut reader, keys::SESSION_WAS_TARGET_CONNECTED)
            .await?
            .unwrap_or(false))
    }

    /// Today's stored duration plus the unflushed tail of an open session.
    /// Never writes.
    pub async fn live_today_seconds(&self) -> Result<u64, LedgerError> {
        let mut reader = StoreReader(self.store.as_ref());
        let state = load_session(&mut reader).await?;
        let now = self.clock.now();
        let stored = load_day(&mut reader, &day_key(&now)).await?;
        Ok(stored.duration_seconds.saturating_add(state.unflushed_seconds(now.timestamp_millis())))
    }

    /// Snapshot of the ledger for display. Never writes.
    pub async fn status(&self) -> Result<LedgerStatus, LedgerError> {
        let mut reader = StoreReader(self.store.as_ref());
        let state = load_session(&mut reader).await?;
        let now = self.clock.now();
        let today_key = day_key(&now);
        let today = load_day(&mut reader, &today_key).await?;

        let last_connected_at =
            read_field::<i64, _>(&mut reader, keys::INFO_LAST_CONNECTED_AT).await?;
        let last_disconnected_at =
            read_field::<i64, _>(&mut reader, keys::INFO_LAST_DISCONNECTED_AT).await?;
        let first_connected_today =
            read_field::<i64, _>(&mut reader, keys::INFO_FIRST_CONNECTED_TODAY)
                .await?
                .filter(|ms| day_key_of_millis(*ms, &now).as_deref() == Some(today_key.as_str()));

        Ok(LedgerStatus {
            session_open: state.is_open(),
            was_target_connected: state.was_target_connected,
            last_connected_at: last_connected_at.and_then(|ms| millis_to_local(ms, &now)),
            last_disconnected_at: last_disconnected_at.and_then(|ms| millis_to_local(ms, &now)),
            first_connected_today: first_connected_today.and_then(|ms| millis_to_local(ms, &now)),
            today,
            live_today_seconds: today
                .duration_seconds
                .saturating_add(state.unflushed_seconds(now.timestamp_millis())),
        })
    }

    /// Deletes today's bucket and the open session. The stored association
    /// flag is kept, so a still-associated device re-opens a fresh session
    /// on the next check.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn reset_today(&self) -> Result<(), LedgerError> {
        let _guard = self.lock.lock().await;
        let tx = self.store.begin_exclusive().await?;
        let today = day_key(&self.clock.now());

        let mut batch = StateBatch::new();
        batch.remove(&keys::daily_key(&today));
        clear_session(&mut batch);
        tx.commit(batch).await?;

        tracing::warn!(day = %today, "Today's totals and the open session were reset.");
        Ok(())
    }
}

/// Raw reads the ledger state is rebuilt from: the store itself for pure
/// reads, the open transaction during a check.
#[async_trait]
trait LedgerReader: Send {
    async fn raw(&mut self, key: &str) -> Result<Option<String>, PersistenceError>;
}

struct StoreReader<'a, T: KeyValueStore>(&'a T);

#[async_trait]
impl<'a, T: KeyValueStore> LedgerReader for StoreReader<'a, T> {
    async fn raw(&mut self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.0.get_raw_state(key).await
    }
}

#[async_trait]
impl LedgerReader for Box<dyn StateTransaction> {
    async fn raw(&mut self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.get_raw_state(key).await
    }
}

async fn load_session<R: LedgerReader>(reader: &mut R) -> Result<SessionState, LedgerError> {
    let connected_at = read_field::<i64, _>(reader, keys::SESSION_CONNECTED_AT).await?;
    let last_sample_at = read_field::<i64, _>(reader, keys::SESSION_LAST_SAMPLE_AT).await?;
    let last_rx = read_field::<u64, _>(reader, keys::SESSION_LAST_RX).await?;
    let last_tx = read_field::<u64, _>(reader, keys::SESSION_LAST_TX).await?;
    let was_target_connected =
        read_field::<bool, _>(reader, keys::SESSION_WAS_TARGET_CONNECTED).await?.unwrap_or(false);

    Ok(SessionState {
        connected_at,
        // A session without a sample time starts accounting from its own start.
        last_sample_at: last_sample_at.or(connected_at).unwrap_or(0),
        last_snapshot: TrafficTotals::new(last_rx.unwrap_or(0), last_tx.unwrap_or(0)),
        was_target_connected,
    })
}

async fn load_day<R: LedgerReader>(reader: &mut R, day: &str) -> Result<UsageTotals, LedgerError> {
    Ok(reader
        .raw(&keys::daily_key(day))
        .await?
        .map(|raw| UsageTotals::decode(&raw))
        .unwrap_or_default())
}

/// Reads a ledger field. A malformed value is logged and treated as absent.
async fn read_field<V: DeserializeOwned, R: LedgerReader>(
    reader: &mut R,
    key: &str,
) -> Result<Option<V>, LedgerError> {
    let Some(raw) = reader.raw(key).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(key, error = %e, "Malformed ledger field, ignoring.");
            Ok(None)
        }
    }
}

async fn merge_into_day<R: LedgerReader>(
    reader: &mut R,
    batch: &mut StateBatch,
    day: &str,
    credit: UsageTotals,
) -> Result<(), LedgerError> {
    if credit.is_zero() {
        return Ok(());
    }
    let mut totals = load_day(reader, day).await?;
    totals += credit;
    batch.set_raw(&keys::daily_key(day), totals.encode());
    tracing::debug!(
        day,
        duration_seconds = credit.duration_seconds,
        rx_bytes = credit.rx_bytes,
        tx_bytes = credit.tx_bytes,
        "Credited usage to day."
    );
    Ok(())
}

async fn mark_first_connection_today<R: LedgerReader>(
    reader: &mut R,
    batch: &mut StateBatch,
    now: &DateTime<FixedOffset>,
    now_ms: i64,
) -> Result<(), LedgerError> {
    let today = day_key(now);
    let first = read_field::<i64, _>(reader, keys::INFO_FIRST_CONNECTED_TODAY).await?;
    let already_today =
        first.and_then(|ms| day_key_of_millis(ms, now)).is_some_and(|day| day == today);
    if !already_today {
        batch.set_json(keys::INFO_FIRST_CONNECTED_TODAY, &now_ms)?;
    }
    Ok(())
}

/// Usage accrued since the last flush of `state`.
fn credit_since_last_sample(
    state: &SessionState,
    now_ms: i64,
    counters: TrafficTotals,
) -> UsageTotals {
    let delta = state.traffic_delta(counters);
    UsageTotals::new(state.unflushed_seconds(now_ms), delta.rx_bytes, delta.tx_bytes)
}

/// Moves the sample time forward by the whole seconds just credited. The
/// sub-second remainder stays unflushed and is credited by a later call.
fn advance_sample_time(last_sample_at: i64, credited_seconds: u64) -> i64 {
    let credited_ms = i64::try_from(credited_seconds).unwrap_or(i64::MAX).saturating_mul(1000);
    last_sample_at.saturating_add(credited_ms)
}

fn clear_session(batch: &mut StateBatch) {
    batch
        .remove(keys::SESSION_CONNECTED_AT)
        .remove(keys::SESSION_LAST_SAMPLE_AT)
        .remove(keys::SESSION_LAST_RX)
        .remove(keys::SESSION_LAST_TX);
}
