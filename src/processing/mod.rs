//! In-memory record transformations applied after parsing.
//!
//! Currently implemented:
//!
//! - [`augment()`]: set run-scoped constant properties on every record
//! - [`inject_derived_properties()`]: add composite properties used for secondary indexes
//!
//! ## Example: derive → augment
//!
//! ```rust
//! use export_ingest::processing::{
//!     augment, default_derived_properties, inject_derived_properties, ConstantProperties,
//! };
//! use export_ingest::types::Record;
//!
//! let records = vec![Record::from_iter([
//!     ("AnimalId", "A123"),
//!     ("BehaviorCategory", "Handling"),
//!     ("BehaviorTest", "Leash"),
//! ])];
//!
//! let derived = inject_derived_properties(&default_derived_properties(), records);
//! let constants = ConstantProperties::from([(
//!     "LastIngestedDateTime".to_string(),
//!     "2017-08-13T01:58:56.622Z".to_string(),
//! )]);
//! let out = augment(&constants, derived);
//!
//! assert_eq!(out[0].get_text("BehaviorCategory-BehaviorTest"), Some("Handling-Leash"));
//! assert_eq!(out[0].get_text("LastIngestedDateTime"), Some("2017-08-13T01:58:56.622Z"));
//! ```

pub mod augment;
pub mod derive;

pub use augment::{ConstantProperties, augment};
pub use derive::{DerivedProperty, default_derived_properties, inject_derived_properties};
