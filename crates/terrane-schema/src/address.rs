//! Addresses for modules, resources, resource instances, and provider configurations.
//!
//! Every absolute address has a canonical string form which is also its serde
//! representation, so addresses can be used as JSON values in state files:
//!
//! - `aws_instance.web`
//! - `module.net[0].aws_subnet.private["a"]`
//! - `module.dns.data.http.zone`
//! - `provider.aws`, `module.net.provider.aws.east`

use crate::types::{ProviderType, ResourceType};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The key that selects one instance of a resource or module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum InstanceKey {
    #[default]
    NoKey,
    Int(i64),
    Str(String),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::NoKey => Ok(()),
            InstanceKey::Int(i) => write!(f, "[{i}]"),
            InstanceKey::Str(s) => {
                let quoted = serde_json::to_string(s).map_err(|_| fmt::Error)?;
                write!(f, "[{quoted}]")
            }
        }
    }
}

/// One `module.<name>[key]` segment of a module instance path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleInstanceStep {
    pub name: String,
    pub key: InstanceKey,
}

/// Path from the root module to a particular module instance. The empty path
/// is the root module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ModuleInstance(Vec<ModuleInstanceStep>);

impl ModuleInstance {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn steps(&self) -> &[ModuleInstanceStep] {
        &self.0
    }

    /// Address of a child module instance of this one.
    #[must_use]
    pub fn child(&self, name: &str, key: InstanceKey) -> Self {
        let mut steps = self.0.clone();
        steps.push(ModuleInstanceStep {
            name: name.to_owned(),
            key,
        });
        Self(steps)
    }

    /// The parent module instance, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }
}

impl fmt::Display for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "module.{}{}", step.name, step.key)?;
        }
        Ok(())
    }
}

impl FromStr for ModuleInstance {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut p = AddrParser::new(s);
        let module = p.module_path()?;
        p.finish()?;
        Ok(module)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceMode {
    Managed,
    Data,
}

impl fmt::Display for ResourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceMode::Managed => write!(f, "managed"),
            ResourceMode::Data => write!(f, "data"),
        }
    }
}

/// A resource declared in some module, without instance key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Resource {
    pub mode: ResourceMode,
    pub type_name: ResourceType,
    pub name: String,
}

impl Resource {
    pub fn managed(type_name: &str, name: &str) -> Self {
        Self {
            mode: ResourceMode::Managed,
            type_name: ResourceType::new(type_name),
            name: name.to_owned(),
        }
    }

    pub fn data(type_name: &str, name: &str) -> Self {
        Self {
            mode: ResourceMode::Data,
            type_name: ResourceType::new(type_name),
            name: name.to_owned(),
        }
    }

    pub fn instance(&self, key: InstanceKey) -> ResourceInstance {
        ResourceInstance {
            resource: self.clone(),
            key,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(f, "{}.{}", self.type_name, self.name),
            ResourceMode::Data => write!(f, "data.{}.{}", self.type_name, self.name),
        }
    }
}

/// A resource instance relative to its containing module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceInstance {
    pub resource: Resource,
    pub key: InstanceKey,
}

impl ResourceInstance {
    /// Resolve this relative address against a module instance path.
    pub fn absolute(&self, module: &ModuleInstance) -> AbsResourceInstance {
        AbsResourceInstance {
            module: module.clone(),
            resource: self.clone(),
        }
    }
}

impl fmt::Display for ResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.resource, self.key)
    }
}

/// Absolute address of one resource instance: the state store's primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AbsResourceInstance {
    pub module: ModuleInstance,
    pub resource: ResourceInstance,
}

impl AbsResourceInstance {
    pub fn type_name(&self) -> &ResourceType {
        &self.resource.resource.type_name
    }

    pub fn mode(&self) -> ResourceMode {
        self.resource.resource.mode
    }
}

impl fmt::Display for AbsResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_root() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.module, self.resource)
        }
    }
}

impl FromStr for AbsResourceInstance {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut p = AddrParser::new(s);
        let module = p.module_path()?;
        let first = p.ident()?;
        let (mode, type_name) = if first == "data" {
            p.expect('.')?;
            (ResourceMode::Data, p.ident()?)
        } else {
            (ResourceMode::Managed, first)
        };
        p.expect('.')?;
        let name = p.ident()?;
        let key = p.key()?;
        p.finish()?;
        Ok(Self {
            module,
            resource: ResourceInstance {
                resource: Resource {
                    mode,
                    type_name: ResourceType::new(type_name),
                    name: name.to_owned(),
                },
                key,
            },
        })
    }
}

impl From<AbsResourceInstance> for String {
    fn from(addr: AbsResourceInstance) -> Self {
        addr.to_string()
    }
}

impl TryFrom<String> for AbsResourceInstance {
    type Error = SchemaError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Absolute address of a provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AbsProviderConfig {
    pub module: ModuleInstance,
    pub provider_type: ProviderType,
    pub alias: Option<String>,
}

impl AbsProviderConfig {
    /// The default (unaliased) configuration of a provider in the root module.
    pub fn root(provider_type: &str) -> Self {
        Self {
            module: ModuleInstance::root(),
            provider_type: ProviderType::new(provider_type),
            alias: None,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_owned());
        self
    }
}

impl fmt::Display for AbsProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.module.is_root() {
            write!(f, "{}.", self.module)?;
        }
        write!(f, "provider.{}", self.provider_type)?;
        if let Some(alias) = &self.alias {
            write!(f, ".{alias}")?;
        }
        Ok(())
    }
}

impl FromStr for AbsProviderConfig {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut p = AddrParser::new(s);
        let module = p.module_path()?;
        let keyword = p.ident()?;
        if keyword != "provider" {
            return Err(p.error("expected 'provider'"));
        }
        p.expect('.')?;
        let provider_type = p.ident()?;
        let alias = if p.eat('.') {
            Some(p.ident()?.to_owned())
        } else {
            None
        };
        p.finish()?;
        Ok(Self {
            module,
            provider_type: ProviderType::new(provider_type),
            alias,
        })
    }
}

impl From<AbsProviderConfig> for String {
    fn from(addr: AbsProviderConfig) -> Self {
        addr.to_string()
    }
}

impl TryFrom<String> for AbsProviderConfig {
    type Error = SchemaError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

struct AddrParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> AddrParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn error(&self, reason: &str) -> SchemaError {
        SchemaError::InvalidAddress {
            input: self.input.to_owned(),
            reason: format!("{reason} at offset {}", self.pos),
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), SchemaError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    fn ident(&mut self) -> Result<&'a str, SchemaError> {
        let rest = self.rest();
        let len = rest
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
            .count();
        if len == 0 {
            return Err(self.error("expected identifier"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn key(&mut self) -> Result<InstanceKey, SchemaError> {
        if !self.eat('[') {
            return Ok(InstanceKey::NoKey);
        }
        let rest = self.rest();
        let key = if rest.starts_with('"') {
            let mut escaped = false;
            let mut end = None;
            for (i, c) in rest.char_indices().skip(1) {
                match c {
                    '\\' if !escaped => escaped = true,
                    '"' if !escaped => {
                        end = Some(i);
                        break;
                    }
                    _ => escaped = false,
                }
            }
            let end = end.ok_or_else(|| self.error("unterminated string key"))?;
            let s: String = serde_json::from_str(&rest[..=end])
                .map_err(|e| self.error(&format!("invalid string key: {e}")))?;
            self.pos += end + 1;
            InstanceKey::Str(s)
        } else {
            let len = rest
                .bytes()
                .enumerate()
                .take_while(|(i, b)| b.is_ascii_digit() || (*i == 0 && *b == b'-'))
                .count();
            let n: i64 = rest[..len]
                .parse()
                .map_err(|_| self.error("expected integer or string key"))?;
            self.pos += len;
            InstanceKey::Int(n)
        };
        self.expect(']')?;
        Ok(key)
    }

    /// Consume any leading `module.<name>[key].` segments.
    fn module_path(&mut self) -> Result<ModuleInstance, SchemaError> {
        let mut steps = Vec::new();
        while self.rest().starts_with("module.") {
            self.pos += "module.".len();
            let name = self.ident()?.to_owned();
            let key = self.key()?;
            steps.push(ModuleInstanceStep { name, key });
            if self.rest().is_empty() {
                break;
            }
            self.expect('.')?;
            if self.rest().is_empty() {
                return Err(self.error("unexpected end after '.'"));
            }
        }
        Ok(ModuleInstance(steps))
    }

    fn finish(&self) -> Result<(), SchemaError> {
        if self.rest().is_empty() {
            Ok(())
        } else {
            Err(self.error("unexpected trailing characters"))
        }
    }
}
