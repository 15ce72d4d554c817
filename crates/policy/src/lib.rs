//! # Rebalancer Policy
//!
//! The two pure decisions made for every portfolio on every scan:
//!
//! - [`DriftEvaluator`] measures how far a portfolio has drifted from its target
//!   and classifies how urgent the drift is.
//! - [`CostBenefitGate`] refuses rebalances whose expected improvement does not
//!   clear their estimated cost by a safety margin.
//!
//! Neither performs I/O or holds mutable state, so identical inputs always give
//! identical outputs.

pub mod drift;
pub mod error;
pub mod gate;

pub use drift::{CostModel, DriftEvaluator, UrgencyBands};
pub use error::PolicyError;
pub use gate::{CostBenefitGate, DEFAULT_BENEFIT_MARGIN};
