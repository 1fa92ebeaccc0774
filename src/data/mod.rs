//! Input records and the graph tensor builder

pub mod records;
pub mod tensor;

pub use records::{
    load_entities, load_relationships, read_entities, read_relationships, EntityRecord, EntityType,
    RelationshipRecord,
};
pub use tensor::{GraphBundle, GraphCounts, GraphMapping, GraphTensorBuilder, MappedNode, NodeMeta, FEATURE_NAMES};
