//! Runtime configuration (bind.toml)
//!
//! ```toml
//! schemas = ["schemas/stamina.toml"]
//!
//! [world]
//! editor = false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BindError, BindResult};
use crate::factory::{ComponentFactory, ComponentSchema};
use crate::runtime::WorldConfig;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindConfig {
    /// Component schema files, relative to the config file
    #[serde(default)]
    pub schemas: Vec<PathBuf>,
    #[serde(default)]
    pub world: WorldConfig,
}

impl BindConfig {
    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> BindResult<Self> {
        toml::from_str(content).map_err(|e| BindError::ParseError(e.to_string()))
    }

    /// Load a config file, resolving schema paths against its directory
    pub fn load(path: &Path) -> BindResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for schema in &mut config.schemas {
            if schema.is_relative() {
                *schema = base.join(&*schema);
            }
        }
        debug!(path = %path.display(), schemas = config.schemas.len(), "Loaded config");
        Ok(config)
    }

    /// Read and register every configured schema
    pub fn register_schemas(&self, factory: &mut ComponentFactory) -> BindResult<()> {
        for path in &self.schemas {
            let content = std::fs::read_to_string(path)?;
            let schema = ComponentSchema::from_toml(&content)
                .map_err(|e| BindError::ParseError(format!("{}: {}", path.display(), e)))?;
            factory.register_schema(schema)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_when_empty() {
        let config = BindConfig::from_toml("").unwrap();
        assert!(config.schemas.is_empty());
        assert!(!config.world.editor);
    }

    #[test]
    fn test_parse_world_section() {
        let config = BindConfig::from_toml("schemas = [\"a.toml\"]\n\n[world]\neditor = true\n").unwrap();
        assert_eq!(config.schemas, vec![PathBuf::from("a.toml")]);
        assert!(config.world.editor);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            BindConfig::from_toml("[world]\neditor = \"maybe\""),
            Err(BindError::ParseError(_))
        ));
    }

    #[test]
    fn test_load_resolves_and_registers_schemas() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("schemas")).unwrap();
        fs::write(
            dir.path().join("schemas/door.toml"),
            "name = \"DoorState\"\n\n[[field]]\nname = \"open\"\nkind = \"bool\"\n",
        )
        .unwrap();
        let config_path = dir.path().join("bind.toml");
        fs::write(&config_path, "schemas = [\"schemas/door.toml\"]\n").unwrap();

        let config = BindConfig::load(&config_path).unwrap();
        assert_eq!(config.schemas, vec![dir.path().join("schemas/door.toml")]);

        let mut factory = ComponentFactory::new();
        config.register_schemas(&mut factory).unwrap();
        assert!(factory.contains("DoorState"));
    }

    #[test]
    fn test_missing_schema_file() {
        let config = BindConfig {
            schemas: vec![PathBuf::from("/nonexistent/schema.toml")],
            ..Default::default()
        };
        let mut factory = ComponentFactory::new();
        assert!(matches!(
            config.register_schemas(&mut factory),
            Err(BindError::Io(_))
        ));
    }
}
