//! # Street Graph Model
//!
//! Clean DTOs for the enriched street network.
//! These types cross every boundary: sources ↔ joins ↔ analyses ↔ tables.
//!
//! Design rule: this module is pure data. No I/O, no caching, no async.

pub mod node;
pub mod edge;
pub mod graph;
pub mod value;
pub mod property_map;

pub use node::{NodeAttribute, NodeId, StreetNode};
pub use edge::{EdgeId, StreetEdge};
pub use graph::StreetGraph;
pub use value::Value;
pub use property_map::{props, PropertyMap};
