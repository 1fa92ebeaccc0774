//! Typed entity and relationship records
//!
//! Rows come from the extraction stage as CSV. Column names follow that
//! stage's output (`entity_id`, `entity_text`, `entity_type`, `frequency`,
//! `num_papers`); extra columns are ignored.

use crate::error::{DataError, DataResult, MedKgResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Node type tag. Drugs always precede diseases in the index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Drug,
    Disease,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Drug => "drug",
            EntityType::Disease => "disease",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = DataError;

    /// Accepts the ontology names and the NER labels, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drug" | "chemical" => Ok(EntityType::Drug),
            "disease" => Ok(EntityType::Disease),
            _ => Err(DataError::InvalidEntityType(s.to_string())),
        }
    }
}

/// One drug or disease entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub text: String,
    pub entity_type: EntityType,
    /// Mention count across the corpus
    pub frequency: f64,
    pub num_papers: f64,
}

impl EntityRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>, entity_type: EntityType, frequency: f64, num_papers: f64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            entity_type,
            frequency,
            num_papers,
        }
    }
}

/// One asserted drug TREATS disease relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub drug_id: String,
    pub disease_id: String,
    pub confidence: f64,
    pub num_papers: f64,
}

impl RelationshipRecord {
    pub fn new(drug_id: impl Into<String>, disease_id: impl Into<String>, confidence: f64, num_papers: f64) -> Self {
        Self {
            drug_id: drug_id.into(),
            disease_id: disease_id.into(),
            confidence,
            num_papers,
        }
    }

    pub fn validate(&self) -> DataResult<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(DataError::InvalidConfidence {
                drug_id: self.drug_id.clone(),
                disease_id: self.disease_id.clone(),
                confidence: self.confidence,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct EntityRow {
    entity_id: String,
    #[serde(default)]
    entity_text: String,
    entity_type: String,
    #[serde(default)]
    frequency: f64,
    #[serde(default, alias = "paper_count")]
    num_papers: f64,
}

#[derive(Debug, Deserialize)]
struct RelationshipRow {
    drug_id: String,
    disease_id: String,
    confidence: f64,
    #[serde(default, alias = "paper_count")]
    num_papers: f64,
}

/// Parse an entity table from any reader
pub fn read_entities<R: Read>(reader: R) -> MedKgResult<Vec<EntityRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut entities = Vec::new();
    for row in csv_reader.deserialize() {
        let row: EntityRow = row?;
        let entity_type = row.entity_type.parse::<EntityType>()?;
        entities.push(EntityRecord {
            id: row.entity_id,
            text: row.entity_text,
            entity_type,
            frequency: row.frequency,
            num_papers: row.num_papers,
        });
    }
    Ok(entities)
}

/// Parse a relationship table from any reader
pub fn read_relationships<R: Read>(reader: R) -> MedKgResult<Vec<RelationshipRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut relationships = Vec::new();
    for row in csv_reader.deserialize() {
        let row: RelationshipRow = row?;
        let record = RelationshipRecord {
            drug_id: row.drug_id,
            disease_id: row.disease_id,
            confidence: row.confidence,
            num_papers: row.num_papers,
        };
        record.validate()?;
        relationships.push(record);
    }
    Ok(relationships)
}

pub fn load_entities(path: impl AsRef<Path>) -> MedKgResult<Vec<EntityRecord>> {
    let file = std::fs::File::open(path.as_ref())?;
    let entities = read_entities(file)?;
    tracing::info!("Loaded {} entities from {:?}", entities.len(), path.as_ref());
    Ok(entities)
}

pub fn load_relationships(path: impl AsRef<Path>) -> MedKgResult<Vec<RelationshipRecord>> {
    let file = std::fs::File::open(path.as_ref())?;
    let relationships = read_relationships(file)?;
    tracing::info!("Loaded {} relationships from {:?}", relationships.len(), path.as_ref());
    Ok(relationships)
}
