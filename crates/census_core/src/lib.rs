pub mod api;
pub mod citizen;
pub mod error;
pub mod graph;
pub mod ids;
pub mod stats;

pub use api::*;
pub use citizen::*;
pub use error::{CensusError, CensusResult};
pub use graph::{EdgeDiff, RelationViolation};
pub use ids::*;
pub use stats::{BirthdayPresents, PresentsCount, TownAgeStats};
