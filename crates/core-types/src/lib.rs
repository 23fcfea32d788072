pub mod enums;
pub mod error;
pub mod measure;
pub mod structs;
pub mod weights;

// Re-export the core types to provide a clean public API.
pub use enums::{AlignmentPolicy, ConstraintKind, ObjectiveKind, ReturnKind, SeriesBasis, SolverKind};
pub use error::CoreError;
pub use measure::Measure;
pub use structs::{DateRange, PricePoint, PriceSeries};
pub use weights::WeightVector;
