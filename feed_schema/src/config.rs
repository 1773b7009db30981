//! Schema loading.
//!
//! The builtin schema ships inside the binary; `FEED_SCHEMA_PATH` points at an
//! override file.

use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{DefinitionError, SchemaError},
    indicator::{IndicatorRecord, IndicatorTable},
    stream::{StreamDef, StreamRegistry},
};

pub use crate::indicator::LikertBucket;

pub const BUILTIN_SCHEMA: &str = include_str!("data/schema.json");

/// Raw schema document, shared verbatim between server and client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaFile {
    pub streams: Vec<StreamDef>,
    pub indicators: Vec<IndicatorRecord>,
    pub label_tables: BTreeMap<String, Vec<String>>,
    pub likert_scales: BTreeMap<String, Vec<LikertBucket>>,
}

impl SchemaFile {
    pub fn builtin() -> Self {
        serde_json::from_str(BUILTIN_SCHEMA).expect("builtin schema should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let contents = fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file = SchemaFile::from_json_str(&contents)?;
        Ok(file)
    }
}

/// Validated schema: every stream and indicator has been checked and decoded.
#[derive(Debug, Clone)]
pub struct Schema {
    pub streams: StreamRegistry,
    pub indicators: IndicatorTable,
    source: SchemaFile,
}

impl Schema {
    pub fn load(file: SchemaFile) -> Result<Self, DefinitionError> {
        let streams = StreamRegistry::new(file.streams.clone())?;
        let indicators =
            IndicatorTable::new(&file.indicators, &file.label_tables, &file.likert_scales)?;
        Ok(Self {
            streams,
            indicators,
            source: file,
        })
    }

    pub fn builtin() -> Result<Self, DefinitionError> {
        Self::load(SchemaFile::builtin())
    }

    /// The raw document this schema was built from, for delivery to clients.
    pub fn source(&self) -> &SchemaFile {
        &self.source
    }
}

/// Where the active schema came from.
#[derive(Debug, Clone)]
pub struct SchemaMetadata {
    path: Option<PathBuf>,
}

impl SchemaMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

/// Load the schema named by `FEED_SCHEMA_PATH`, or the builtin one.
///
/// A missing override file falls back to the builtin schema. A file that
/// exists but does not parse or validate is an error.
pub fn load_schema_from_env() -> Result<(Arc<Schema>, SchemaMetadata), SchemaError> {
    if let Some(path) = env::var("FEED_SCHEMA_PATH").ok().map(PathBuf::from) {
        match SchemaFile::from_file(&path) {
            Ok(file) => {
                let schema = Schema::load(file)?;
                tracing::info!(
                    target: "tile_feed::schema",
                    path = %path.display(),
                    streams = schema.streams.len(),
                    indicators = schema.indicators.len(),
                    "schema.loaded=file"
                );
                return Ok((Arc::new(schema), SchemaMetadata::new(Some(path))));
            }
            Err(SchemaError::Read { path, source }) => {
                tracing::warn!(
                    target: "tile_feed::schema",
                    path = %path.display(),
                    error = %source,
                    "schema.load_failed"
                );
            }
            Err(err) => return Err(err),
        }
    }

    let schema = Schema::builtin()?;
    tracing::info!(
        target: "tile_feed::schema",
        streams = schema.streams.len(),
        indicators = schema.indicators.len(),
        "schema.loaded=builtin"
    );
    Ok((Arc::new(schema), SchemaMetadata::new(None)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StreamFlags, TextFormat};

    #[test]
    fn builtin_schema_parses() {
        let schema = Schema::builtin().expect("builtin schema should validate");
        assert!(!schema.streams.is_empty());
        assert!(!schema.indicators.is_empty());
    }

    #[test]
    fn builtin_schema_has_an_auto_map() {
        let schema = Schema::builtin().unwrap();
        let map = schema.streams.find("dungeon").expect("dungeon stream");
        assert!(map.flags.contains(StreamFlags::AUTO));
        assert!(map.keeps_baseline());
    }

    #[test]
    fn builtin_schema_resolves_tables() {
        let schema = Schema::builtin().unwrap();
        let hunger = schema
            .indicators
            .iter()
            .find(|def| def.name == "hunger")
            .expect("hunger indicator");
        assert!(matches!(hunger.config.format, TextFormat::Label(_)));
    }

    #[test]
    fn definition_errors_surface_through_load() {
        let mut file = SchemaFile::builtin();
        let duplicate = file.streams[0].clone();
        file.streams.push(duplicate);
        assert!(matches!(
            Schema::load(file),
            Err(DefinitionError::DuplicateStream(_))
        ));
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let file = SchemaFile::from_json_str("{}").unwrap();
        let schema = Schema::load(file).unwrap();
        assert!(schema.streams.is_empty());
        assert!(schema.indicators.is_empty());
    }
}
