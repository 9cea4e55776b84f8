//! Core graph data structures

mod edge;
mod label;
mod node;

pub use edge::{Endpoint, RelType, Relationship, RelationshipType};
pub use label::{map_type, Label, UnknownLabel};
pub use node::{Citation, Node, Properties, PropertyValue};
