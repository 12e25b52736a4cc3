//! Domain entities for PairLink.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies: the linking attempt's freshness and wait-budget rules, the
//! error taxonomy, and the result records the public operations return.
//!
//! Code in outer layers (application, infrastructure) depends on the domain,
//! but the domain never depends on them.

/// Device-linking rules, constants, and result records.
///
/// See [`linking::LinkError`] for the error taxonomy.
pub mod linking;
