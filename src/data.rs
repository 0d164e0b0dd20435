//! Map data as defined in the .osm file, and the normalized document shape
//! each node/way is reshaped into before loading.

pub mod document;
pub mod osm;

pub use document::NormalizedDocument;
pub use osm::RawElement;
