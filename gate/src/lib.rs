// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # docgate — One-Time-Code Statement Access
//!
//! Grants time-limited access to a protected statement once the requester
//! proves they received a one-time code over a side channel (email).
//!
//! ## Architecture
//!
//! The crate is split along the actual concerns of the access flow:
//!
//! - **config** — Constants and the runtime [`GateConfig`](config::GateConfig).
//! - **clock** — Injectable time source so expiry is testable.
//! - **otp** — Six-digit code generation and constant-time matching.
//! - **credential** — The immutable issued-credential record.
//! - **catalog** — The statement registry consumed by issuer and verifier.
//! - **storage** — Credential persistence (sled on disk, DashMap in memory).
//! - **notify** — Out-of-band delivery of codes to requesters.
//! - **mail** — The HTTP email gateway behind the production notifier.
//! - **issuer** — Creates, persists and dispatches credentials, singly or in
//!   batches.
//! - **verifier** — Checks a submitted code and discloses the location.
//! - **error** — The caller-facing error taxonomy.
//!
//! ## Flow
//!
//! ```text
//! list statements ──► OtpIssuer::issue ──► CredentialStore::append
//!                     (or issue_many)  │
//!                                      ├──► status: sent
//!                                      └──► Notifier::send (spawned, best-effort)
//!
//! submit code ──► OtpVerifier::verify ──► latest credential ──► Location
//!                                                         └──► status: downloaded
//! ```
//!
//! Store handles, catalog, notifier and clock are passed in explicitly.
//! Nothing in this crate holds process-global state.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod issuer;
pub mod mail;
pub mod notify;
pub mod otp;
pub mod storage;
pub mod verifier;

pub use catalog::{Location, MemoryCatalog, Resource, ResourceCatalog, ResourceId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, GateConfig};
pub use credential::{
    Credential, CredentialDraft, CredentialHandle, DeliveryState, DeliveryStatus,
};
pub use error::{GateError, GateResult};
pub use issuer::{BatchOutcome, OtpIssuer};
pub use mail::{MailConfig, MailNotifier};
pub use notify::{ChannelNotifier, Delivery, LogNotifier, Notifier, NotifyError};
pub use otp::OtpCode;
pub use storage::{CredentialStore, GateDB, MemoryStore, StoreError};
pub use verifier::OtpVerifier;
