//! Provider-declared schemas for resource types and data sources.

use crate::address::ResourceMode;
use crate::types::ProviderType;
use crate::value::Type;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub sensitive: bool,
}

impl Attribute {
    pub fn required(ty: Type) -> Self {
        Self {
            ty,
            required: true,
            optional: false,
            computed: false,
            sensitive: false,
        }
    }

    pub fn optional(ty: Type) -> Self {
        Self {
            ty,
            required: false,
            optional: true,
            computed: false,
            sensitive: false,
        }
    }

    pub fn computed(ty: Type) -> Self {
        Self {
            ty,
            required: false,
            optional: false,
            computed: true,
            sensitive: false,
        }
    }

    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestingMode {
    Single,
    List,
    Set,
    Map,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedBlock {
    pub nesting: NestingMode,
    pub block: Block,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
    #[serde(default)]
    pub block_types: BTreeMap<String, NestedBlock>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_attribute(mut self, name: &str, attr: Attribute) -> Self {
        self.attributes.insert(name.to_owned(), attr);
        self
    }

    #[must_use]
    pub fn with_block(mut self, name: &str, nesting: NestingMode, block: Block) -> Self {
        self.block_types
            .insert(name.to_owned(), NestedBlock { nesting, block });
        self
    }

    /// The object type that values conforming to this block must have.
    /// Nested blocks become attributes of object, list, set, or map type.
    pub fn implied_type(&self) -> Type {
        let mut attrs: BTreeMap<String, Type> = self
            .attributes
            .iter()
            .map(|(name, attr)| (name.clone(), attr.ty.clone()))
            .collect();
        for (name, nested) in &self.block_types {
            let inner = nested.block.implied_type();
            let ty = match nested.nesting {
                NestingMode::Single => inner,
                NestingMode::List => Type::List(Box::new(inner)),
                NestingMode::Set => Type::Set(Box::new(inner)),
                NestingMode::Map => Type::Map(Box::new(inner)),
            };
            attrs.insert(name.clone(), ty);
        }
        Type::Object(attrs)
    }
}

/// Schema for one resource type, with the version its encoded state carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub version: u64,
    pub block: Block,
}

impl Schema {
    pub fn new(version: u64, block: Block) -> Self {
        Self { version, block }
    }

    pub fn implied_type(&self) -> Type {
        self.block.implied_type()
    }
}

/// All schemas published by one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSchema {
    pub provider: ProviderType,
    #[serde(default)]
    pub resource_types: BTreeMap<String, Schema>,
    #[serde(default)]
    pub data_sources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: ProviderType::new(provider),
            resource_types: BTreeMap::new(),
            data_sources: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_resource_type(mut self, type_name: &str, schema: Schema) -> Self {
        self.resource_types.insert(type_name.to_owned(), schema);
        self
    }

    #[must_use]
    pub fn with_data_source(mut self, type_name: &str, schema: Schema) -> Self {
        self.data_sources.insert(type_name.to_owned(), schema);
        self
    }

    /// Look up the schema for a managed resource type or data source.
    pub fn schema_for(&self, mode: ResourceMode, type_name: &str) -> Option<&Schema> {
        match mode {
            ResourceMode::Managed => self.resource_types.get(type_name),
            ResourceMode::Data => self.data_sources.get(type_name),
        }
    }
}
