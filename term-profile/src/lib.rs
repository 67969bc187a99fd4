//! # Term Profile - Mergeable Column Profiles for Rust
//!
//! Term Profile computes streaming statistical summaries ("profiles") of data columns,
//! merges independently computed profiles without re-reading raw data, and persists them
//! in a compact, self-describing binary format. Profiles let you monitor data and model
//! behavior over time without retaining raw records.
//!
//! ## Quick Start
//!
//! ```rust
//! use term_profile::prelude::*;
//!
//! # fn example() -> term_profile::Result<()> {
//! let schema = DatasetSchema::new().with_column("age", ColumnType::Integral);
//!
//! // Two workers profile disjoint parts of the data...
//! let mut morning = DatasetProfile::new(schema.clone())?;
//! morning.track("age", &[Value::Int(31), Value::Int(45), Value::Null])?;
//!
//! let mut evening = DatasetProfile::new(schema)?;
//! evening.track("age", &[Value::Int(27)])?;
//!
//! // ...and their snapshots merge into one profile.
//! let merged = morning.view().merge(&evening.view())?;
//! let age = merged.get_column("age").unwrap();
//! assert_eq!(age.counts().unwrap().n.value(), 4);
//! assert_eq!(age.ints().unwrap().min.value(), 27);
//!
//! // Views round-trip through the binary format.
//! let bytes = merged.serialize()?;
//! assert_eq!(DatasetProfileView::deserialize(&bytes)?, merged);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Architecture
//!
//! - **`preprocessing`**: classifies a batch (a slice of [`Value`](preprocessing::Value)s or
//!   an arrow array) into typed lanes: null, boolean, integral, fractional, string, tensor
//!   and object. Booleans are never integral; `NaN` is null.
//! - **`metrics`**: mergeable metrics (`counts`, `types`, `distribution`, `ints`) built from
//!   components (counters, extrema, floats, KLL sketches). Merging is commutative and
//!   associative; counters report overflow instead of wrapping.
//! - **`profile`**: live, single-writer accumulators. `view()` snapshots them.
//! - **`view`**: immutable column and dataset views, their merge, and the chunked file
//!   format with a shared metric-name index.
//! - **`schema`**: declared column types and the resolvers that pick metrics per column.
//! - **`cache`**, **`session`**, **`writer`**: orchestration: profiles keyed by schema
//!   fingerprint, `log`/`close`, and destinations for finished profiles.
//!
//! ## Reading a Single Column
//!
//! ```rust
//! use std::io::Cursor;
//! use term_profile::prelude::*;
//!
//! # fn example() -> term_profile::Result<()> {
//! let mut profile = DatasetProfile::new(DatasetSchema::new())?;
//! profile.track("a", &[Value::from("x")])?;
//! profile.track("b", &[Value::Float(1.5)])?;
//! let bytes = profile.view().serialize()?;
//!
//! let mut reader = DatasetProfileReader::open(Cursor::new(bytes))?;
//! let b = reader.read_column("b")?.unwrap();
//! assert_eq!(b.types().unwrap().fractional.value(), 1);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod prelude;
pub mod preprocessing;
pub mod profile;
pub mod schema;
pub mod session;
pub mod view;
pub mod wire;
pub mod writer;

pub use error::{ProfileError, Result};
