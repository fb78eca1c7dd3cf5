// SPDX-License-Identifier: MIT OR Apache-2.0
//! Identifier generation.
//!
//! All generated ids follow `<prefix>_<compact-utc-timestamp>_<hex8>`.
//! The random suffix only needs to make same-tick
//! collisions implausible, not to be cryptographically unpredictable, so
//! we take it from a v4 UUID's bytes rather than pull in a `rand`
//! dependency nothing else in the workspace needs.

use crate::clock::Clock;
use crate::time::compact_utc;

/// Generates ids by borrowing a [`Clock`] for the timestamp component.
pub struct IdGenerator<'a> {
    clock: &'a dyn Clock,
}

impl<'a> IdGenerator<'a> {
    /// Build a generator backed by `clock`.
    #[must_use]
    pub fn new(clock: &'a dyn Clock) -> Self {
        Self { clock }
    }

    fn hex8() -> String {
        let bytes = uuid::Uuid::new_v4();
        let b = bytes.as_bytes();
        format!(
            "{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3]
        )
    }

    fn make(&self, prefix: &str) -> String {
        format!("{prefix}_{}_{}", compact_utc(self.clock.now()), Self::hex8())
    }

    /// `msg_<ts>_<hex8>` — an envelope message id.
    #[must_use]
    pub fn message_id(&self) -> String {
        self.make("msg")
    }

    /// `alert_<ts>_<hex8>`.
    #[must_use]
    pub fn alert_id(&self) -> String {
        self.make("alert")
    }

    /// `dlq_<ts>_<hex8>`.
    #[must_use]
    pub fn deadletter_id(&self) -> String {
        self.make("dlq")
    }

    /// `del_<ts>_<hex8>` — a delivery-log entry id.
    #[must_use]
    pub fn delivery_id(&self) -> String {
        self.make("del")
    }

    /// `human_req_<ts>_<hex8>`.
    #[must_use]
    pub fn human_request_id(&self) -> String {
        self.make("human_req")
    }

    /// `dec_<ts>_<hex8>` — a release decision record id.
    #[must_use]
    pub fn decision_id(&self) -> String {
        self.make("dec")
    }

    /// `rel_<ts>_<hex8>` — a release manifest id.
    #[must_use]
    pub fn release_id(&self) -> String {
        self.make("rel")
    }
}
