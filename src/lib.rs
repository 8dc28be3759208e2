//! # Development Trail
//!
//! Resilient capture of development sessions, periodic integrity auditing
//! of the stored records, and a searchable knowledge index built from
//! finalized sessions and mined project history.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ File/Git    │──▶│  Recorder    │──▶│ Session file │
//! │ feeds       │   │ + Serializer │   │  (JSON)      │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                        ┌────────────────────┤
//!                        ▼                    ▼
//!                 ┌──────────────┐     ┌──────────────┐     ┌──────────┐
//!                 │  Integrity   │     │   Summary    │──▶──│  SQLite  │
//!                 │  verifier    │     │              │     │ + FTS5   │
//!                 └──────────────┘     └──────────────┘     └────▲─────┘
//!                                                                │
//!                                       ┌──────────────┐         │
//!                                       │   History    │─────────┘
//!                                       │   mining     │
//!                                       └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! trail init
//! trail capture --title "checkout flow" --index
//! trail integrity batch
//! trail history backfill
//! trail search "payment"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Domain error taxonomy and reported issues |
//! | [`models`] | Session records and summaries |
//! | [`truncate`] | Oversized string replacement |
//! | [`serializer`] | Depth/size-bounded JSON serialization |
//! | [`circuit`] | Circuit breaker |
//! | [`session_files`] | Session file naming and listing |
//! | [`recorder`] | Live session capture |
//! | [`capture`] | File and git feeds for `trail capture` |
//! | [`integrity`] | Validation, quality scoring, recovery, batch audits |
//! | [`history`] | Git mining and cross-source history |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`index`] | Knowledge index writes and full-text rebuilds |
//! | [`search`] | Full-text plus exact search |
//! | [`query`] | Type-scoped queries |
//! | [`export`] | JSON and Markdown export |

pub mod capture;
pub mod circuit;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod history;
pub mod index;
pub mod integrity;
pub mod migrate;
pub mod models;
pub mod query;
pub mod recorder;
pub mod search;
pub mod serializer;
pub mod session_files;
pub mod truncate;
