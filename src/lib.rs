#![warn(clippy::undocumented_unsafe_blocks)]

//! A dynamic variant of Leslie Lamport's barrier from "Implementing
//! Dataflow With Threads" (Distributed Computing 21, 3 (2008),
//! 163-181), extended so participants can join and leave while the
//! barrier is live.
//!
//! # Rendezvous vs. a plain barrier
//!
//! [`std::sync::Barrier`] needs to know the number of threads up
//! front, and once every thread has synchronized once it is spent.
//! [`Rendezvous`] is different:
//!
//! * Threads join at any time, even after other threads are already
//!   meeting, by calling [`Rendezvous::join`]; they leave by dropping
//!   their [`Place`].
//! * A `Rendezvous` is met over and over: each [`Place::attend`] call
//!   is one meeting, not a one-shot synchronization.
//! * Each meeting is not just a synchronization point but a reduction:
//!   every participant publishes a datum, and `attend` runs an
//!   Init/Fold/Compute protocol over every participant's datum before
//!   anyone is released.
//!
//! # Examples
//!
//! ```
//! use rendezvous::{Config, Rendezvous};
//!
//! let rdv: Rendezvous<i32> = Rendezvous::new();
//! std::thread::scope(|scope| {
//!     for n in [1, 2, 3] {
//!         let rdv = &rdv;
//!         scope.spawn(move || {
//!             let place = rdv.join(Config::new());
//!             // Every participant observes the same sum.
//!             let sum = place.attend(&n, |_passed| 0i32, |acc, d| *acc += *d, |acc| acc);
//!             assert_eq!(sum, 6);
//!         });
//!     }
//! });
//! ```
//!
//! For a one-shot waitgroup with no reduction and no re-use, see
//! [`crossbeam::sync::WaitGroup`](https://docs.rs/crossbeam/latest/crossbeam/sync/struct.WaitGroup.html).

mod config;
mod list;
mod mod_counter;
mod place;
mod rendezvous;

pub use config::{AtomicCas, BusyWait, Cas, Config, Spin, YieldAfter};
pub use place::Place;
pub use rendezvous::Rendezvous;
