//! Domain model of the rotation engine: pools and their members, per-round
//! contributions, the collection state machine, payout events, and the ports
//! the application layer depends on.

pub mod collection;
pub mod contribution;
pub mod payout;
pub mod pool;
pub mod ports;
