//! Thread-safe containers used on the hub's routing hot paths.
//!
//! Dispatch and enqueue are read-dominated, so the map keeps a plain
//! RwLock'd table, the set layers an ordered node chain on top of the map,
//! and the queue pairs a deque with a FIFO wakeup so fan-out latency stays
//! flat as consumer counts grow.

mod node;
mod safe_map;
mod safe_queue;
mod safe_set;

pub use node::Node;
pub use safe_map::{Emptiable, SafeMap};
pub use safe_queue::SafeQueue;
pub use safe_set::SafeSet;
