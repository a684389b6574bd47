//! Audit Ledger System
//!
//! Tamper-evident, append-only record of security and governance events,
//! linked into a SHA-256 hash chain.

pub mod entry;
pub mod ledger;
pub mod query;
pub mod verify;
pub mod writer;

pub use entry::{compute_hash, AuditEntry, EventData, NewAuditEvent};
pub use ledger::{AuditLedger, ChainHead};
pub use query::{ActorDirectory, AuditQuery, AuditRecord, NoDirectory, ProfileDirectory, QueryEngine, StaticDirectory};
pub use verify::{ChainVerifier, DateRange, EntryVerification, VerificationReport};
pub use writer::ChainWriter;
