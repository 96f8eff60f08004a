//! Full-pipeline integration tests.
//!
//! The unit tests living alongside each module (`date_math`, `rate_book`,
//! `tracker`, `calculator`, `pushpull`, `dependency_graph`, `cache`, ...)
//! cover that module's own logic in isolation. These tests instead build
//! whole documents and drive them through `engine::run`/`engine::monte_carlo`,
//! checking the behaviour a caller actually observes:
//! - `scenarios` — the concrete worked examples (bill inflation, token
//!   transfers, interest, RMD, push/pull).
//! - `invariants` — the cross-cutting properties every calculation must
//!   hold (conservation, ordering, idempotence, determinism).
//! - `orchestration` — cache reuse and Monte-Carlo batch behaviour.

mod invariants;
mod support;
