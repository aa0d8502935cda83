// ── Phantom State Atoms Layer ──────────────────────────────────────────────
// Pure constants, types, and errors — zero side effects, no I/O.
// Dependency rule: atoms may only depend on std and external pure crates.
// Nothing here may import from engine/ or embedding/.

pub mod constants;
pub mod error;
pub mod types;
