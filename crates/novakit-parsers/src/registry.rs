//! Parser registry for resolving which codec handles a file
//!
//! Codecs are registered by id with their extensions and a priority. The
//! registry hands out shared, type-erased instances that can decode a
//! buffer into text/JSON or run a decode/encode round trip. It holds no
//! decoding state itself.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::batch::RoundTrip;
use crate::traits::{HumanReadable, ParseOptions, ParseResult, Parser};
use crate::validation::ValidationReport;

/// Decoded file rendered for display
#[derive(Debug, Clone)]
pub struct Inspection {
    pub readable: String,
    pub json: serde_json::Value,
    pub report: ValidationReport,
}

/// Object-safe view of a [`Parser`] whose output can be rendered
pub trait AnyParser: Send + Sync {
    /// Get the parser name
    fn name(&self) -> &str;

    fn extensions(&self) -> &[&str];

    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Extension match, or a magic prefix match on the file contents
    fn can_parse(&self, path: &Path) -> bool;

    /// Decode and render a buffer
    fn inspect(&self, data: &[u8], options: &ParseOptions) -> ParseResult<Inspection>;

    /// Decode, re-encode and compare with the input
    fn round_trip(&self, data: &[u8], options: &ParseOptions) -> ParseResult<RoundTrip>;
}

impl<T> AnyParser for T
where
    T: Parser + 'static,
    T::Output: HumanReadable,
{
    fn name(&self) -> &str {
        Parser::name(self)
    }

    fn extensions(&self) -> &[&str] {
        Parser::extensions(self)
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Parser::magic_bytes(self)
    }

    fn can_parse(&self, path: &Path) -> bool {
        Parser::can_parse(self, path)
    }

    fn inspect(&self, data: &[u8], options: &ParseOptions) -> ParseResult<Inspection> {
        let decoded = self.decode(data, options)?;
        Ok(Inspection {
            readable: decoded.value.to_readable_string(),
            json: decoded.value.to_json(),
            report: decoded.report,
        })
    }

    fn round_trip(&self, data: &[u8], options: &ParseOptions) -> ParseResult<RoundTrip> {
        let decoded = self.decode(data, options)?;
        let encoded = self.serialize(&decoded.value)?;
        Ok(RoundTrip::compare(data, &encoded, decoded.report.len()))
    }
}

/// Factory function type for creating parser instances
pub type ParserFactory = Box<dyn Fn() -> Arc<dyn AnyParser> + Send + Sync>;

/// One codec known to a registry
pub struct ParserRegistration {
    /// Stable id such as `mission` or `pack`
    pub id: String,
    /// Human-readable name
    pub name: String,
    pub description: String,
    /// Lowercase, without the dot
    pub extensions: Vec<String>,
    /// Priority for extension conflicts (higher = preferred)
    pub priority: i32,
    /// Builds the codec on first use
    pub factory: ParserFactory,
}

/// Parser registry
pub struct ParserRegistry {
    /// Registrations by id
    parsers: RwLock<HashMap<String, ParserRegistration>>,
    /// Extension to ids, highest priority first
    extension_map: RwLock<HashMap<String, Vec<String>>>,
    /// Codecs built so far
    instances: RwLock<HashMap<String, Arc<dyn AnyParser>>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: RwLock::new(HashMap::new()),
            extension_map: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new parser
    pub fn register(&self, registration: ParserRegistration) -> Result<(), RegistryError> {
        let id = registration.id.clone();

        let mut parsers = self.parsers.write();
        if parsers.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }

        let priority = registration.priority;
        let mut ext_map = self.extension_map.write();
        for ext in &registration.extensions {
            let ids = ext_map.entry(ext.to_lowercase()).or_default();
            ids.push(id.clone());

            ids.sort_by_key(|other| {
                let p = if *other == id {
                    priority
                } else {
                    parsers.get(other).map(|p| p.priority).unwrap_or(0)
                };
                std::cmp::Reverse(p)
            });
        }

        parsers.insert(id, registration);
        Ok(())
    }

    /// Drop a registration and any cached instance
    pub fn unregister(&self, id: &str) -> Result<(), RegistryError> {
        let mut parsers = self.parsers.write();
        let registration = parsers.remove(id).ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        let mut ext_map = self.extension_map.write();
        for ext in &registration.extensions {
            if let Some(ids) = ext_map.get_mut(&ext.to_lowercase()) {
                ids.retain(|i| i != id);
            }
        }
        self.instances.write().remove(id);
        Ok(())
    }

    /// Codec by id, built on first request
    pub fn get(&self, id: &str) -> Result<Arc<dyn AnyParser>, RegistryError> {
        if let Some(instance) = self.instances.read().get(id) {
            return Ok(Arc::clone(instance));
        }

        let instance = {
            let parsers = self.parsers.read();
            let registration = parsers.get(id).ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            (registration.factory)()
        };

        self.instances.write().insert(id.to_string(), Arc::clone(&instance));
        Ok(instance)
    }

    /// Highest priority codec for `ext` (case-insensitive)
    pub fn get_for_extension(&self, ext: &str) -> Result<Arc<dyn AnyParser>, RegistryError> {
        let ext_lower = ext.trim_start_matches('.').to_lowercase();

        let id = self
            .extension_map
            .read()
            .get(&ext_lower)
            .and_then(|ids| ids.first())
            .cloned()
            .ok_or(RegistryError::NoParserForExtension(ext_lower))?;

        self.get(&id)
    }

    /// Get a parser for a file path, by extension and then by magic bytes
    pub fn get_for_path(&self, path: &Path) -> Result<Arc<dyn AnyParser>, RegistryError> {
        if let Some(ext) = path.extension() {
            if let Ok(parser) = self.get_for_extension(&ext.to_string_lossy()) {
                return Ok(parser);
            }
        }

        let mut ids: Vec<(String, i32)> = self
            .parsers
            .read()
            .values()
            .map(|p| (p.id.clone(), p.priority))
            .collect();
        ids.sort_by_key(|(_, priority)| std::cmp::Reverse(*priority));

        for (id, _) in ids {
            let parser = self.get(&id)?;
            if parser.can_parse(path) {
                return Ok(parser);
            }
        }

        Err(RegistryError::NoParserForPath(path.to_path_buf()))
    }

    /// List all registered parsers, highest priority first
    pub fn list(&self) -> Vec<ParserInfo> {
        let parsers = self.parsers.read();
        let mut infos: Vec<ParserInfo> = parsers
            .values()
            .map(|p| ParserInfo {
                id: p.id.clone(),
                name: p.name.clone(),
                description: p.description.clone(),
                extensions: p.extensions.clone(),
                priority: p.priority,
            })
            .collect();
        infos.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        infos
    }

    pub fn len(&self) -> usize {
        self.parsers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.read().is_empty()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration summary for listings
#[derive(Debug, Clone, serde::Serialize)]
pub struct ParserInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub extensions: Vec<String>,
    pub priority: i32,
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Parser with ID '{0}' already registered")]
    DuplicateId(String),

    #[error("Parser with ID '{0}' not found")]
    NotFound(String),

    #[error("No parser available for extension '.{0}'")]
    NoParserForExtension(String),

    #[error("No parser available for path: {0}")]
    NoParserForPath(std::path::PathBuf),

    #[error("Incomplete registration: {0}")]
    Incomplete(&'static str),
}

/// Global registry instance, filled by `init_registry`
pub static GLOBAL_REGISTRY: Lazy<ParserRegistry> = Lazy::new(ParserRegistry::new);

/// Builder for [`ParserRegistration`]
pub struct ParserRegistrationBuilder {
    id: Option<String>,
    name: Option<String>,
    description: String,
    extensions: Vec<String>,
    priority: i32,
    factory: Option<ParserFactory>,
}

impl ParserRegistrationBuilder {
    pub fn new() -> Self {
        Self {
            id: None,
            name: None,
            description: String::new(),
            extensions: Vec::new(),
            priority: 0,
            factory: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn extensions(mut self, exts: &[&str]) -> Self {
        self.extensions = exts.iter().map(|s| s.to_lowercase()).collect();
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn factory<F, P>(mut self, factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Parser + 'static,
        P::Output: HumanReadable,
    {
        self.factory = Some(Box::new(move || Arc::new(factory())));
        self
    }

    pub fn build(self) -> Result<ParserRegistration, RegistryError> {
        let id = self.id.ok_or(RegistryError::Incomplete("id is required"))?;
        let factory = self.factory.ok_or(RegistryError::Incomplete("factory is required"))?;

        Ok(ParserRegistration {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            description: self.description,
            extensions: self.extensions,
            priority: self.priority,
            factory,
        })
    }
}

impl Default for ParserRegistrationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{encrypt, GameKey, ScriptParser};
    use crate::pack::PackParser;

    fn script_registration(id: &str, priority: i32) -> ParserRegistration {
        ParserRegistrationBuilder::new()
            .id(id)
            .name("Script")
            .extensions(&["scr", "SCX"])
            .priority(priority)
            .factory(ScriptParser::new)
            .build()
            .unwrap()
    }

    #[test]
    fn test_registry_registration() {
        let registry = ParserRegistry::new();
        registry.register(script_registration("script", 10)).unwrap();

        let parser = registry.get("script").unwrap();
        assert_eq!(parser.name(), "SCR Script Cipher");
        assert!(matches!(
            registry.register(script_registration("script", 1)),
            Err(RegistryError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_extension_lookup() {
        let registry = ParserRegistry::new();
        registry.register(script_registration("script", 0)).unwrap();

        assert!(registry.get_for_extension("scr").is_ok());
        assert!(registry.get_for_extension(".scx").is_ok());
        assert!(matches!(
            registry.get_for_extension("bms"),
            Err(RegistryError::NoParserForExtension(_))
        ));
    }

    #[test]
    fn test_priority_ordering() {
        let registry = ParserRegistry::new();
        registry
            .register(
                ParserRegistrationBuilder::new()
                    .id("pack")
                    .extensions(&["scr"])
                    .priority(1)
                    .factory(PackParser::new)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry.register(script_registration("script", 50)).unwrap();

        let parser = registry.get_for_extension("scr").unwrap();
        assert_eq!(parser.name(), "SCR Script Cipher");
        assert_eq!(registry.list()[0].id, "script");

        registry.unregister("script").unwrap();
        assert_eq!(registry.get_for_extension("scr").unwrap().name(), "PFF Pack Archive Parser");
    }

    #[test]
    fn test_builder_requires_factory() {
        let result = ParserRegistrationBuilder::new().id("x").build();
        assert!(matches!(result, Err(RegistryError::Incomplete(_))));
    }

    #[test]
    fn test_type_erased_round_trip() {
        let registry = ParserRegistry::new();
        registry.register(script_registration("script", 0)).unwrap();
        let parser = registry.get("script").unwrap();

        let data = encrypt(b"hello", GameKey::JointOps);
        let trip = parser.round_trip(&data, &ParseOptions::default()).unwrap();
        assert!(trip.identical);

        let inspection = parser.inspect(&data, &ParseOptions::default()).unwrap();
        assert!(inspection.readable.contains("hello"));
    }
}
