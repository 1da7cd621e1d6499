//! Decision and execution engine.
//!
//! `strategist` builds the day's watchlist, `trader` acts on it. The
//! smaller pieces (period governor, risk gate, position sizer, and
//! the execution wrapper) live in their own modules so they can be
//! tested in isolation.

pub mod executor;
pub mod governor;
pub mod risk;
pub mod sizer;
pub mod strategist;
pub mod trader;
