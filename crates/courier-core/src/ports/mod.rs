//! Ports - seams to the outside world.
//!
//! - clock: wall-clock time for timestamps
//! - store: object storage per bucket
//! - lifecycle: session/recording events coming from the tunnel

pub mod clock;
pub mod lifecycle;
pub mod store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::lifecycle::{LifecycleEvent, LifecycleHandler};
pub use self::store::StoreProvider;
