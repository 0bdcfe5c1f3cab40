//! Billing ledger and medical specials.
//!
//! Every dollar amount on a billing page becomes a cited ledger line; the
//! specials summary totals those lines after dropping reprinted duplicates.

mod ledger;
mod specials;

pub use ledger::*;
pub use specials::*;
