//! Business rules on top of the storage seams.
//!
//! Every function takes the current time as `now` so callers and tests
//! control the clock.

pub mod catalog;
pub mod circulation;
pub mod fines;
pub mod ledger;

pub use circulation::CirculationPolicy;
