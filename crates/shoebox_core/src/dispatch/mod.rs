//! Thread-backed execution queues and cancellable work tracking.
//!
//! [`Dispatcher`] owns the threads. [`AsyncState`] wraps it for one
//! component so that everything the component dispatched can be cancelled
//! with a single [`kill`](AsyncState::kill). [`Epoch`] guards completions
//! that must not outlive a session.

mod epoch;
mod queue;
mod state;

pub use epoch::{Epoch, EpochToken};
pub use queue::{Dispatcher, Job, Queue};
pub use state::{AsyncBlock, AsyncState};
