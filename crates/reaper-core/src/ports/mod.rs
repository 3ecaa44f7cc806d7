//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。
//! The engine talks to the outside world only through these traits:
//! - **Catalog**: replica/endpoint records (source of truth)
//! - **DeletionDriver**: per-scheme storage transport
//! - **Clock**: time
//! - **IdGenerator**: replica and batch ids

pub mod catalog;
pub mod clock;
pub mod driver;
pub mod id_generator;

pub use self::catalog::{CandidateQuery, Catalog};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::driver::{DeletionDriver, DriverError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
