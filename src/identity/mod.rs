//! Identity types carried from the external session provider into the
//! security core. Keep the public surface thin and split implementation
//! across sub-modules.

mod principal;

pub use principal::Principal;
