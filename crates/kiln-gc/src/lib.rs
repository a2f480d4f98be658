//! Garbage collection for Kiln block stores.
//!
//! A [`Collector`] decides which blocks are garbage, deletes them and reports
//! one [`GcEvent`] per deleted (or undeletable) block through a bounded
//! channel. [`PinnedSetCollector`] treats every block not named by its
//! [`PinSource`] as garbage; reachability through block links is the
//! business of richer collectors.

pub mod collector;
pub mod event;
pub mod pins;

pub use collector::{Collector, PinnedSetCollector, Sweep, SweepSummary};
pub use event::GcEvent;
pub use pins::{DatastorePins, PinSource, StaticPins};
