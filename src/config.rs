//! Run-level configuration for lockstep.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `LOCKSTEP_`), through the program text, or by constructing a
//! custom `LockstepConfig`.

use crate::types::CollectiveKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Which collective kinds may be lowered to a Start/Done pair.
///
/// Expressed as the set of kinds forced synchronous, matching the
/// `{"disable_async": [...]}` form of the program text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncPolicy {
    #[serde(default)]
    pub disable_async: BTreeSet<CollectiveKind>,
}

impl AsyncPolicy {
    /// Every kind is eligible for async lowering.
    pub fn all_async() -> Self {
        Self::default()
    }

    /// Every kind is forced synchronous.
    pub fn all_sync() -> Self {
        Self {
            disable_async: CollectiveKind::ALL.into_iter().collect(),
        }
    }

    /// Builder-style: force `kind` synchronous.
    pub fn disable(mut self, kind: CollectiveKind) -> Self {
        self.disable_async.insert(kind);
        self
    }

    pub fn is_async(&self, kind: CollectiveKind) -> bool {
        !self.disable_async.contains(&kind)
    }

    /// Union of both policies' disabled sets.
    pub fn merged(&self, other: &AsyncPolicy) -> AsyncPolicy {
        AsyncPolicy {
            disable_async: self
                .disable_async
                .union(&other.disable_async)
                .copied()
                .collect(),
        }
    }

    fn parse_list(list: &str) -> Self {
        let list = list.trim();
        if list.eq_ignore_ascii_case("all") {
            return Self::all_sync();
        }
        let mut policy = Self::default();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.parse::<CollectiveKind>() {
                Ok(kind) => {
                    policy.disable_async.insert(kind);
                }
                Err(e) => tracing::warn!("ignoring LOCKSTEP_DISABLE_ASYNC entry: {e}"),
            }
        }
        policy
    }
}

/// Tuning parameters for one run.
#[derive(Debug, Clone)]
pub struct LockstepConfig {
    /// How long a replica waits at a rendezvous before reporting
    /// `RendezvousTimeout`.
    pub rendezvous_timeout: Duration,

    /// Kinds forced synchronous by the scheduler.
    pub async_policy: AsyncPolicy,

    /// Run the loop-invariant collective hoister before scheduling.
    pub enable_loop_hoisting: bool,

    /// Capacity of each per-peer mailbox lane in the local transport.
    pub mailbox_capacity: usize,
}

impl Default for LockstepConfig {
    fn default() -> Self {
        Self {
            rendezvous_timeout: Duration::from_secs(30),
            async_policy: AsyncPolicy::all_async(),
            enable_loop_hoisting: false,
            mailbox_capacity: 64,
        }
    }
}

impl LockstepConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `LOCKSTEP_RENDEZVOUS_TIMEOUT_MS`
    /// - `LOCKSTEP_DISABLE_ASYNC` (comma-separated kind names, or `all`)
    /// - `LOCKSTEP_ENABLE_LOOP_HOISTING` (`1`/`true` or `0`/`false`)
    /// - `LOCKSTEP_MAILBOX_CAPACITY`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through
    /// `lookup`. Malformed values are logged and the default is kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("LOCKSTEP_RENDEZVOUS_TIMEOUT_MS") {
            match v.trim().parse::<u64>() {
                Ok(ms) => cfg.rendezvous_timeout = Duration::from_millis(ms),
                Err(e) => tracing::warn!(value = %v, "ignoring LOCKSTEP_RENDEZVOUS_TIMEOUT_MS: {e}"),
            }
        }
        if let Some(v) = lookup("LOCKSTEP_DISABLE_ASYNC") {
            cfg.async_policy = AsyncPolicy::parse_list(&v);
        }
        if let Some(v) = lookup("LOCKSTEP_ENABLE_LOOP_HOISTING") {
            match v.trim() {
                "1" | "true" => cfg.enable_loop_hoisting = true,
                "0" | "false" => cfg.enable_loop_hoisting = false,
                _ => tracing::warn!(value = %v, "ignoring LOCKSTEP_ENABLE_LOOP_HOISTING"),
            }
        }
        if let Some(v) = lookup("LOCKSTEP_MAILBOX_CAPACITY") {
            match v.trim().parse::<usize>() {
                Ok(n) => cfg.mailbox_capacity = n.max(1),
                Err(e) => tracing::warn!(value = %v, "ignoring LOCKSTEP_MAILBOX_CAPACITY: {e}"),
            }
        }

        cfg
    }

    pub fn with_rendezvous_timeout(mut self, timeout: Duration) -> Self {
        self.rendezvous_timeout = timeout;
        self
    }

    pub fn with_async_policy(mut self, policy: AsyncPolicy) -> Self {
        self.async_policy = policy;
        self
    }

    pub fn with_loop_hoisting(mut self, enabled: bool) -> Self {
        self.enable_loop_hoisting = enabled;
        self
    }
}
