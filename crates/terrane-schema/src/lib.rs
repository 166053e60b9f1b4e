//! Addresses, structural types, values, and provider schemas for terrane.
//!
//! This crate defines the schema layer: absolute addresses for resource
//! instances and provider configurations (`AbsResourceInstance`,
//! `AbsProviderConfig`), the structural `Type`/`Value` model, provider-declared
//! block schemas with their implied types (`ProviderSchema`, `Schema`), and the
//! type-guided JSON conversion that the state codec builds on.

pub mod address;
pub mod block;
pub mod json;
pub mod types;
pub mod value;

pub use address::{
    AbsProviderConfig, AbsResourceInstance, InstanceKey, ModuleInstance, ModuleInstanceStep,
    Resource, ResourceInstance, ResourceMode,
};
pub use block::{Attribute, Block, NestedBlock, NestingMode, ProviderSchema, Schema};
pub use types::{ProviderType, ResourceType};
pub use value::{Type, Value};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid address '{input}': {reason}")]
    InvalidAddress { input: String, reason: String },
    #[error("{path}: {message}")]
    Nonconforming { path: String, message: String },
    #[error("{path}: value is not yet known")]
    UnknownValue { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_display_invalid_address() {
        let e = SchemaError::InvalidAddress {
            input: "x.".to_owned(),
            reason: "expected identifier".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("x."));
        assert!(msg.contains("expected identifier"));
    }

    #[test]
    fn schema_error_display_nonconforming() {
        let e = SchemaError::Nonconforming {
            path: ".id".to_owned(),
            message: "string required".to_owned(),
        };
        assert_eq!(e.to_string(), ".id: string required");
    }

    #[test]
    fn schema_error_display_unknown() {
        let e = SchemaError::UnknownValue {
            path: "value".to_owned(),
        };
        assert!(e.to_string().contains("not yet known"));
    }
}
