//! Polymorphic component (de)serialization.
//!
//! Components are persisted as `{ name, type, data }` records. The
//! [`ComponentFactory`] maps the `type` tag to a loader and the runtime type
//! of a live component back to its tag and saver. Schema-described
//! [`DynamicComponent`]s are registered from TOML files and need no Rust
//! type of their own.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::component::{Component, ComponentBase};
use crate::error::{BindError, BindResult};
use crate::snapshot::ComponentRecord;

// ─────────────────────────────────────────────────────────────────────────────
// Schemas
// ─────────────────────────────────────────────────────────────────────────────

/// JSON shape a schema field holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Any JSON number
    Number,
    /// Signed integer that fits an `i64`
    Integer,
    /// Integer that fits a `u64`
    Unsigned,
    Bool,
    Text,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64(),
            Self::Unsigned => value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::Text => value.is_string(),
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Self::Number | Self::Integer | Self::Unsigned)
    }

    /// Value a field takes when stored data and schema both leave it unset
    pub fn empty_value(self) -> Value {
        match self {
            Self::Number => Value::from(0.0),
            Self::Integer | Self::Unsigned => Value::from(0),
            Self::Bool => Value::Bool(false),
            Self::Text => Value::String(String::new()),
        }
    }
}

/// One `[[field]]` table of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Inclusive `[low, high]` bounds for numeric kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSpec {
    fn check(&self, component: &str, value: &Value) -> BindResult<()> {
        let reject = |reason: String| BindError::InvalidField {
            component: component.to_string(),
            field: self.name.clone(),
            reason,
        };

        if !self.kind.matches(value) {
            return Err(reject(format!("{} is not {:?}", value, self.kind)));
        }
        if let (Some([low, high]), Some(number)) = (self.range, value.as_f64()) {
            if number < low || number > high {
                return Err(reject(format!("{} is outside [{}, {}]", number, low, high)));
            }
        }
        Ok(())
    }
}

/// Field layout of a [`DynamicComponent`] type.
///
/// ```toml
/// name = "DoorState"
/// description = "Open flag and leaf width"
///
/// [[field]]
/// name = "open"
/// kind = "bool"
///
/// [[field]]
/// name = "width"
/// kind = "number"
/// range = [0.5, 3.0]
/// default = 1.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSchema {
    /// Type tag the component is persisted under
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fields in declaration order
    #[serde(rename = "field", default)]
    pub fields: Vec<FieldSpec>,
}

impl ComponentSchema {
    /// Parse and check a schema document
    pub fn from_toml(content: &str) -> BindResult<Self> {
        let schema: Self =
            toml::from_str(content).map_err(|e| BindError::ParseError(e.to_string()))?;
        schema.check()?;
        Ok(schema)
    }

    fn check(&self) -> BindResult<()> {
        if self.name.is_empty() {
            return Err(BindError::ParseError("schema name is empty".to_string()));
        }
        for (index, field) in self.fields.iter().enumerate() {
            let malformed = |reason: &str| {
                BindError::ParseError(format!("{}.{}: {}", self.name, field.name, reason))
            };
            if self.fields[..index].iter().any(|f| f.name == field.name) {
                return Err(malformed("declared twice"));
            }
            match field.range {
                Some(_) if !field.kind.is_numeric() => {
                    return Err(malformed("range on a non-numeric field"));
                }
                Some([low, high]) if low > high => return Err(malformed("empty range")),
                _ => {}
            }
            if let Some(default) = &field.default {
                field.check(&self.name, default)?;
            }
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check stored data and complete it with defaults
    pub fn instantiate(&self, data: Value) -> BindResult<Map<String, Value>> {
        let mut values = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(BindError::ParseError(format!(
                    "{}: expected an object, got {}",
                    self.name, other
                )));
            }
        };

        if let Some(unknown) = values.keys().find(|key| self.field(key).is_none()) {
            return Err(BindError::InvalidField {
                component: self.name.clone(),
                field: unknown.clone(),
                reason: "not in schema".to_string(),
            });
        }

        for field in &self.fields {
            match values.get(&field.name) {
                Some(value) => field.check(&self.name, value)?,
                None => {
                    let value = field
                        .default
                        .clone()
                        .unwrap_or_else(|| field.kind.empty_value());
                    values.insert(field.name.clone(), value);
                }
            }
        }
        Ok(values)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dynamic Component
// ─────────────────────────────────────────────────────────────────────────────

/// A component whose fields are described by a [`ComponentSchema`].
pub struct DynamicComponent {
    base: ComponentBase,
    schema: Arc<ComponentSchema>,
    fields: RwLock<Map<String, Value>>,
}

impl DynamicComponent {
    /// Create an instance from stored data, validating it against the schema
    pub fn new(schema: Arc<ComponentSchema>, data: Value) -> BindResult<Self> {
        let fields = schema.instantiate(data)?;
        Ok(Self {
            base: ComponentBase::new(),
            schema,
            fields: RwLock::new(fields),
        })
    }

    /// The schema's type tag
    pub fn type_tag(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &ComponentSchema {
        &self.schema
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.fields.read().get(field).cloned()
    }

    /// Write one field, validated against its definition
    pub fn set(&self, field: &str, value: Value) -> BindResult<()> {
        let spec = self.schema.field(field).ok_or_else(|| BindError::InvalidField {
            component: self.schema.name.clone(),
            field: field.to_string(),
            reason: "not in schema".to_string(),
        })?;
        spec.check(&self.schema.name, &value)?;
        self.fields.write().insert(field.to_string(), value);
        Ok(())
    }

    /// All fields as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.read().clone())
    }
}

impl Component for DynamicComponent {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
}

impl fmt::Debug for DynamicComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicComponent")
            .field("type", &self.schema.name)
            .field("fields", &*self.fields.read())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────────────────────────────────────

type Loader = Box<dyn Fn(Value) -> BindResult<Arc<dyn Component>> + Send + Sync>;
type Saver = Box<dyn Fn(&dyn Component) -> BindResult<Value> + Send + Sync>;

/// Maps persisted type tags to component constructors and back.
#[derive(Default)]
pub struct ComponentFactory {
    loaders: HashMap<String, Loader>,
    savers: HashMap<TypeId, (String, Saver)>,
    schemas: HashMap<String, Arc<ComponentSchema>>,
}

impl ComponentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Rust component type under a persisted tag.
    ///
    /// Stored data deserializes into `T`; a `null` payload yields
    /// `T::default()`.
    pub fn register<T>(&mut self, tag: &str) -> BindResult<()>
    where
        T: Component + Default + Serialize + DeserializeOwned,
    {
        if self.loaders.contains_key(tag) {
            return Err(BindError::AlreadyRegistered(tag.to_string()));
        }

        let loader: Loader = Box::new(|data: Value| {
            let component = if data.is_null() {
                T::default()
            } else {
                serde_json::from_value::<T>(data)?
            };
            Ok(Arc::new(component) as Arc<dyn Component>)
        });
        let saver: Saver = Box::new(|component: &dyn Component| {
            let concrete = component
                .as_any()
                .downcast_ref::<T>()
                .ok_or_else(|| BindError::UnregisteredComponent(component.type_name().to_string()))?;
            Ok(serde_json::to_value(concrete)?)
        });
        self.loaders.insert(tag.to_string(), loader);
        self.savers.insert(TypeId::of::<T>(), (tag.to_string(), saver));
        debug!(tag, rust_type = std::any::type_name::<T>(), "Registered component type");
        Ok(())
    }

    /// Register a schema-described component type
    pub fn register_schema(&mut self, schema: ComponentSchema) -> BindResult<()> {
        if self.loaders.contains_key(&schema.name) {
            return Err(BindError::AlreadyRegistered(schema.name));
        }

        let schema = Arc::new(schema);
        let loader_schema = Arc::clone(&schema);
        let loader: Loader = Box::new(move |data: Value| {
            let component = DynamicComponent::new(Arc::clone(&loader_schema), data)?;
            Ok(Arc::new(component) as Arc<dyn Component>)
        });
        self.loaders.insert(schema.name.clone(), loader);
        debug!(tag = %schema.name, fields = schema.fields.len(), "Registered component schema");
        self.schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Build a component from a stored record
    pub fn create(&self, record: &ComponentRecord) -> BindResult<Arc<dyn Component>> {
        let loader = self
            .loaders
            .get(&record.type_name)
            .ok_or_else(|| BindError::UnknownComponentType(record.type_name.clone()))?;
        loader(record.data.clone())
    }

    /// Persist a live component under `name`
    pub fn save(&self, name: &str, component: &dyn Component) -> BindResult<ComponentRecord> {
        if let Some(dynamic) = component.as_any().downcast_ref::<DynamicComponent>() {
            return Ok(ComponentRecord {
                name: name.to_string(),
                type_name: dynamic.type_tag().to_string(),
                data: dynamic.to_value(),
            });
        }

        let (tag, saver) = self
            .savers
            .get(&Any::type_id(component.as_any()))
            .ok_or_else(|| BindError::UnregisteredComponent(component.type_name().to_string()))?;
        Ok(ComponentRecord {
            name: name.to_string(),
            type_name: tag.clone(),
            data: saver(component)?,
        })
    }

    /// Check if a type tag is registered.
    pub fn contains(&self, tag: &str) -> bool {
        self.loaders.contains_key(tag)
    }

    /// Get a registered schema by tag
    pub fn schema(&self, tag: &str) -> Option<&ComponentSchema> {
        self.schemas.get(tag).map(|s| s.as_ref())
    }

    /// All registered type tags, sorted
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.loaders.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ComponentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentFactory")
            .field("types", &self.type_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::testing::*;
    use serde_json::json;

    const STAMINA_SCHEMA: &str = r#"
name = "Stamina"
description = "Sprint budget"

[[field]]
name = "current"
kind = "number"
range = [0.0, 100.0]
default = 100.0

[[field]]
name = "regen"
kind = "number"
description = "Points per second"

[[field]]
name = "exhausted"
kind = "bool"
default = false

[[field]]
name = "label"
kind = "text"
"#;

    fn record(name: &str, type_name: &str, data: Value) -> ComponentRecord {
        ComponentRecord {
            name: name.to_string(),
            type_name: type_name.to_string(),
            data,
        }
    }

    #[test]
    fn test_parse_schema_from_toml() {
        let schema = ComponentSchema::from_toml(STAMINA_SCHEMA).unwrap();
        assert_eq!(schema.name, "Stamina");
        assert_eq!(schema.description.as_deref(), Some("Sprint budget"));

        let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["current", "regen", "exhausted", "label"]);

        let current = schema.field("current").unwrap();
        assert_eq!(current.kind, FieldKind::Number);
        assert_eq!(current.range, Some([0.0, 100.0]));
        assert_eq!(schema.field("regen").unwrap().description.as_deref(), Some("Points per second"));
    }

    #[test]
    fn test_schema_without_fields() {
        let schema = ComponentSchema::from_toml("name = \"Marker\"\n").unwrap();
        assert!(schema.fields.is_empty());
        assert!(schema.instantiate(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_schema_rejects_malformed_fields() {
        let cases = [
            // unknown kind
            "name = \"A\"\n[[field]]\nname = \"v\"\nkind = \"vector\"\n",
            // unknown key
            "name = \"A\"\n[[field]]\nname = \"v\"\nkind = \"number\"\nunit = \"m\"\n",
            // declared twice
            "name = \"A\"\n[[field]]\nname = \"v\"\nkind = \"bool\"\n[[field]]\nname = \"v\"\nkind = \"text\"\n",
            // range on a bool
            "name = \"A\"\n[[field]]\nname = \"v\"\nkind = \"bool\"\nrange = [0.0, 1.0]\n",
            // inverted range
            "name = \"A\"\n[[field]]\nname = \"v\"\nkind = \"number\"\nrange = [2.0, 1.0]\n",
            // empty name
            "name = \"\"\n",
        ];
        for toml in cases {
            assert!(
                matches!(ComponentSchema::from_toml(toml), Err(BindError::ParseError(_))),
                "accepted: {}",
                toml
            );
        }
    }

    #[test]
    fn test_schema_rejects_bad_default() {
        let toml = r#"
name = "Broken"

[[field]]
name = "level"
kind = "unsigned"
default = -1
"#;
        assert!(matches!(
            ComponentSchema::from_toml(toml),
            Err(BindError::InvalidField { field, .. }) if field == "level"
        ));
    }

    #[test]
    fn test_instantiate_fills_defaults() {
        let schema = ComponentSchema::from_toml(STAMINA_SCHEMA).unwrap();
        let values = schema.instantiate(json!({ "regen": 2.5 })).unwrap();

        assert_eq!(values["current"], json!(100.0));
        assert_eq!(values["regen"], json!(2.5));
        assert_eq!(values["exhausted"], json!(false));
        assert_eq!(values["label"], json!(""));
    }

    #[test]
    fn test_instantiate_validates() {
        let schema = ComponentSchema::from_toml(STAMINA_SCHEMA).unwrap();

        let unknown = schema.instantiate(json!({ "mana": 1 }));
        assert!(matches!(unknown, Err(BindError::InvalidField { field, .. }) if field == "mana"));

        let wrong_type = schema.instantiate(json!({ "exhausted": "yes" }));
        assert!(matches!(wrong_type, Err(BindError::InvalidField { .. })));

        let out_of_range = schema.instantiate(json!({ "current": 150.0 }));
        assert!(matches!(out_of_range, Err(BindError::InvalidField { .. })));

        assert!(schema.instantiate(json!([1, 2])).is_err());
    }

    #[test]
    fn test_dynamic_component_set() {
        let schema = Arc::new(ComponentSchema::from_toml(STAMINA_SCHEMA).unwrap());
        let stamina = DynamicComponent::new(schema, Value::Null).unwrap();

        stamina.set("current", json!(40.0)).unwrap();
        assert_eq!(stamina.get("current"), Some(json!(40.0)));
        assert!(stamina.set("current", json!(-1.0)).is_err());
        assert!(stamina.set("missing", json!(1)).is_err());
        assert_eq!(stamina.get("current"), Some(json!(40.0)));
    }

    #[test]
    fn test_register_and_round_trip_typed_component() {
        let mut factory = ComponentFactory::new();
        factory.register::<BasicHealth>("BasicHealth").unwrap();

        let created = factory
            .create(&record("hp", "BasicHealth", json!({ "hit_points": 12 })))
            .unwrap();
        let health = created.as_ref().as_any().downcast_ref::<BasicHealth>().unwrap();
        assert_eq!(health.hit_points, 12);

        let saved = factory.save("hp", created.as_ref()).unwrap();
        assert_eq!(saved, record("hp", "BasicHealth", json!({ "hit_points": 12 })));
    }

    #[test]
    fn test_null_payload_uses_default() {
        let mut factory = ComponentFactory::new();
        factory.register::<Label>("Label").unwrap();

        let created = factory.create(&record("l", "Label", Value::Null)).unwrap();
        assert_eq!(created.as_ref().as_any().downcast_ref::<Label>().unwrap().text, "");
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let mut factory = ComponentFactory::new();
        factory.register::<Label>("Label").unwrap();
        assert!(matches!(
            factory.register::<BasicHealth>("Label"),
            Err(BindError::AlreadyRegistered(_))
        ));

        let toml = "name = \"Label\"\n";
        let schema = ComponentSchema::from_toml(toml).unwrap();
        assert!(factory.register_schema(schema).is_err());
    }

    #[test]
    fn test_unknown_and_unregistered_types() {
        let factory = ComponentFactory::new();
        assert!(matches!(
            factory.create(&record("x", "Nope", Value::Null)),
            Err(BindError::UnknownComponentType(_))
        ));

        let label = Label::new("x");
        assert!(matches!(
            factory.save("x", label.as_ref()),
            Err(BindError::UnregisteredComponent(_))
        ));
    }

    #[test]
    fn test_schema_component_saves_under_schema_tag() {
        let mut factory = ComponentFactory::new();
        factory
            .register_schema(ComponentSchema::from_toml(STAMINA_SCHEMA).unwrap())
            .unwrap();
        assert!(factory.contains("Stamina"));
        assert!(factory.schema("Stamina").is_some());

        let created = factory
            .create(&record("stamina", "Stamina", json!({ "current": 5.0 })))
            .unwrap();
        let saved = factory.save("stamina", created.as_ref()).unwrap();

        assert_eq!(saved.type_name, "Stamina");
        assert_eq!(saved.data["current"], json!(5.0));
        assert_eq!(saved.data["exhausted"], json!(false));
    }
}
