//! novakit-parsers
//!
//! Codecs for the binary formats of the Novalogic engine titles.
//!
//! # Supported Formats
//!
//! | Format  | Extension | Description |
//! |---------|-----------|-------------|
//! | BMS     | `.bms`    | Binary mission: entities, waypoints, event scripts |
//! | 3DI     | `.3di`    | Model container built on a recursive chunk tree |
//! | CPT     | `.cpt`    | Quadtree terrain with bit-packed elevation and strips |
//! | PFF     | `.pff`    | Pack archive with optional BFC1 (zlib) payloads |
//! | SCR     | `.scr`    | Keystream-encrypted script text |
//!
//! Every codec decodes from a complete byte buffer and serializes back to
//! the same layout. Soft structural checks are reported through
//! [`validation::ValidationReport`]; see [`traits::ParseOptions`] for the
//! strictness switches.
//!
//! # Example
//!
//! ```rust,ignore
//! use novakit_parsers::{MissionParser, NoLookup, Parser};
//!
//! let parser = MissionParser::new();
//! let mission = parser.parse_file("M01.bms".as_ref())?;
//!
//! println!("{}", mission.entity_listing(&NoLookup));
//! ```

pub mod batch;
pub mod chunk;
pub mod io;
pub mod logging;
pub mod mission;
pub mod pack;
pub mod registry;
pub mod script;
pub mod terrain;
pub mod traits;
pub mod validation;

// Re-export main types
pub use traits::{Decoded, ErrorKind, HumanReadable, ParseError, ParseOptions, ParseResult, Parser};
pub use validation::{Diagnostic, InvariantCheck, ValidationReport, Validator};

pub use registry::{
    AnyParser, Inspection, ParserInfo, ParserRegistration, ParserRegistrationBuilder, ParserRegistry, RegistryError,
    GLOBAL_REGISTRY,
};

pub use batch::{check_file, check_files, FileCheck, RoundTrip};
pub use chunk::{ChunkContent, ChunkNode, ChunkTree, ModelFile, ModelParser};
pub use io::{BitReader, BitWriter, ByteReader, FixedString, WriteFieldsExt};
pub use mission::{ItemLookup, MissionFile, MissionParser, NoLookup};
pub use pack::{PackArchive, PackCompression, PackEntry, PackEntryInfo, PackParser};
pub use script::{GameKey, ScriptFile, ScriptParser};
pub use terrain::{DepthMap, QuadTree, TerrainFile, TerrainParser};

/// Initialize the global parser registry with all built-in parsers
///
/// Calling this more than once leaves the registry unchanged.
pub fn init_registry() {
    register_builtin_parsers(&GLOBAL_REGISTRY);
}

/// Register every codec of this crate into `registry`
pub fn register_builtin_parsers(registry: &ParserRegistry) {
    let registrations = [
        ParserRegistrationBuilder::new()
            .id("mission")
            .name("BMS Mission Parser")
            .description("Binary mission files: entities, waypoints and event scripts")
            .extensions(&["bms"])
            .priority(100)
            .factory(MissionParser::new)
            .build(),
        ParserRegistrationBuilder::new()
            .id("model")
            .name("3DI Model Parser")
            .description("Chunk-tree model containers")
            .extensions(&["3di"])
            .priority(100)
            .factory(ModelParser::new)
            .build(),
        ParserRegistrationBuilder::new()
            .id("terrain")
            .name("CPT Terrain Parser")
            .description("Quadtree terrain with bit-packed elevation")
            .extensions(&["cpt"])
            .priority(100)
            .factory(TerrainParser::new)
            .build(),
        ParserRegistrationBuilder::new()
            .id("pack")
            .name("PFF Pack Archive Parser")
            .description("PFF3/PFF4 pack archives")
            .extensions(&["pff"])
            .priority(100)
            .factory(PackParser::new)
            .build(),
        ParserRegistrationBuilder::new()
            .id("script")
            .name("SCR Script Cipher")
            .description("Encrypted script payloads (Joint Operations key)")
            .extensions(&["scr"])
            .priority(50)
            .factory(ScriptParser::new)
            .build(),
    ];

    for registration in registrations {
        match registration.and_then(|r| registry.register(r)) {
            Ok(()) | Err(RegistryError::DuplicateId(_)) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to register built-in parser"),
        }
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registration() {
        let registry = ParserRegistry::new();
        register_builtin_parsers(&registry);
        register_builtin_parsers(&registry);

        assert_eq!(registry.len(), 5);
        for ext in ["bms", "3di", "cpt", "pff", "scr"] {
            assert!(registry.get_for_extension(ext).is_ok(), "no parser for {ext}");
        }
    }
}
