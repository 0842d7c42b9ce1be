//! Entity schemas: tables, keys, relation slots and matching rules

use serde::{Deserialize, Serialize};

use crate::core::EntityKind;

/// Columns compared case-insensitively (hex addresses)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingRules {
    /// Column names matched exactly
    pub exact: Vec<String>,
    /// Column name suffixes
    pub suffixes: Vec<String>,
}

impl Default for MatchingRules {
    fn default() -> Self {
        Self {
            exact: vec!["address".to_string()],
            suffixes: vec!["address".to_string()],
        }
    }
}

impl MatchingRules {
    /// Rules under which every comparison is exact
    pub fn none() -> Self {
        Self {
            exact: Vec::new(),
            suffixes: Vec::new(),
        }
    }

    pub fn is_case_insensitive(&self, column: &str) -> bool {
        self.exact.iter().any(|c| c == column) || self.suffixes.iter().any(|s| column.ends_with(s.as_str()))
    }
}

/// One foreign-key-shaped relation slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    /// Field under which the related row is attached
    pub name: String,
    /// Field on this entity holding the related key
    pub foreign_key: String,
    pub target: EntityKind,
    /// Field on the target entity the foreign key refers to
    pub target_key: String,
}

impl RelationDef {
    pub fn new(name: &str, foreign_key: &str, target: EntityKind) -> Self {
        Self {
            name: name.to_string(),
            foreign_key: foreign_key.to_string(),
            target,
            target_key: "id".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: String,
    /// Primary key field; also the keyset cursor field
    pub primary_key: String,
    pub relations: Vec<RelationDef>,
    pub matching: MatchingRules,
}

impl EntitySchema {
    pub fn new(kind: EntityKind, table: &str) -> Self {
        Self {
            kind,
            table: table.to_string(),
            primary_key: "id".to_string(),
            relations: Vec::new(),
            matching: MatchingRules::default(),
        }
    }

    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_matching(mut self, matching: MatchingRules) -> Self {
        self.matching = matching;
        self
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }
}

/// Schemas for every entity kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub token: EntitySchema,
    pub pair: EntitySchema,
    pub transaction: EntitySchema,
    pub position: EntitySchema,
}

impl Schema {
    /// Default DEX layout
    pub fn dex() -> Self {
        Self {
            token: EntitySchema::new(EntityKind::Token, "tokens"),
            pair: EntitySchema::new(EntityKind::Pair, "pairs")
                .with_relation(RelationDef::new("token0", "token0Id", EntityKind::Token))
                .with_relation(RelationDef::new("token1", "token1Id", EntityKind::Token)),
            transaction: EntitySchema::new(EntityKind::Transaction, "transactions")
                .with_relation(RelationDef::new("pair", "pairId", EntityKind::Pair)),
            position: EntitySchema::new(EntityKind::Position, "positions")
                .with_relation(RelationDef::new("pair", "pairId", EntityKind::Pair)),
        }
    }

    /// Apply the same matching rules to every entity
    pub fn with_matching(mut self, matching: &MatchingRules) -> Self {
        for entity in [
            &mut self.token,
            &mut self.pair,
            &mut self.transaction,
            &mut self.position,
        ] {
            entity.matching = matching.clone();
        }
        self
    }

    pub fn get(&self, kind: EntityKind) -> &EntitySchema {
        match kind {
            EntityKind::Token => &self.token,
            EntityKind::Pair => &self.pair,
            EntityKind::Transaction => &self.transaction,
            EntityKind::Position => &self.position,
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::dex()
    }
}
