//! Rebuilds a match from the event stream of a demo decoder.
//!
//! A [`driver::Driver`] steps an [`source::EventSource`] on a worker thread
//! and feeds every event into a [`aggregator::MatchAggregator`], which keeps
//! the [`model::Game`] up to date. Once the match ended the
//! [`scoreboard`] is built from the finished game.

pub mod aggregator;
pub mod driver;
pub mod events;
pub mod model;
pub mod rate;
pub mod registry;
pub mod scoreboard;
pub mod source;

pub use aggregator::MatchAggregator;
pub use driver::{Driver, DriverConfig, DriverHandle, DriverState, Outcome, Progress};
pub use model::Game;
pub use source::{EventSource, RecordedSource};
