//! User script definitions

use crate::error::{EngineError, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Characters that may not appear in a script name, besides whitespace
pub const RESERVED_NAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Check whether `name` can be used as a script name.
///
/// Script names double as directory names, so they must be non-empty and
/// free of path separators, shell wildcards and whitespace. Names made only
/// of dots would resolve to the scripts directory or its parent.
pub fn is_valid_script_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(EngineError::invalid_usage("Script name cannot be empty"));
    }
    if name.chars().all(|c| c == '.') {
        return Err(EngineError::invalid_usage(format!(
            "Script name '{}' cannot consist only of dots",
            name
        )));
    }
    if let Some(c) = name.chars().find(|c| c.is_whitespace()) {
        return Err(EngineError::invalid_usage(format!(
            "Script name '{}' cannot contain whitespace ({:?})",
            name, c
        )));
    }
    if let Some(c) = name.chars().find(|c| RESERVED_NAME_CHARS.contains(c)) {
        return Err(EngineError::invalid_usage(format!(
            "Script name '{}' cannot contain the character '{}'",
            name, c
        )));
    }
    Ok(())
}

/// Source language of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLang {
    #[default]
    Js,
    Ts,
}

impl ScriptLang {
    pub fn extension(&self) -> &'static str {
        match self {
            ScriptLang::Js => "js",
            ScriptLang::Ts => "ts",
        }
    }
}

impl fmt::Display for ScriptLang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One selectable value of an enum argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumOption {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Declared parameter of a script's `main` function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArgumentField {
    String {
        #[serde(rename = "defaultValue", default)]
        default_value: String,
    },
    Number {
        #[serde(rename = "defaultValue", default)]
        default_value: f64,
    },
    Boolean {
        #[serde(rename = "defaultValue", default)]
        default_value: bool,
    },
    Enum {
        #[serde(rename = "defaultValue")]
        default_value: String,
        #[serde(rename = "enumOptions")]
        enum_options: Vec<EnumOption>,
    },
}

impl ArgumentField {
    pub fn default_json(&self) -> JsonValue {
        match self {
            ArgumentField::String { default_value } => JsonValue::String(default_value.clone()),
            ArgumentField::Number { default_value } => serde_json::Number::from_f64(*default_value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ArgumentField::Boolean { default_value } => JsonValue::Bool(*default_value),
            ArgumentField::Enum { default_value, .. } => JsonValue::String(default_value.clone()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            ArgumentField::String { .. } => "string",
            ArgumentField::Number { .. } => "number",
            ArgumentField::Boolean { .. } => "boolean",
            ArgumentField::Enum { .. } => "enum",
        }
    }

    fn accepts(&self, value: &JsonValue) -> bool {
        match (self, value) {
            (ArgumentField::String { .. }, JsonValue::String(_)) => true,
            (ArgumentField::Number { .. }, JsonValue::Number(_)) => true,
            (ArgumentField::Boolean { .. }, JsonValue::Bool(_)) => true,
            (ArgumentField::Enum { enum_options, .. }, JsonValue::String(s)) => {
                enum_options.iter().any(|option| &option.value == s)
            }
            _ => false,
        }
    }
}

/// Ordered mapping from parameter name to its declaration.
///
/// Serialized as a JSON object; keys are unique and keep declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgumentConfig(Vec<(String, ArgumentField)>);

impl ArgumentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, rejecting duplicate names
    pub fn insert(&mut self, name: impl Into<String>, field: ArgumentField) -> Result<()> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(EngineError::invalid_usage(format!(
                "Duplicate argument name '{}'",
                name
            )));
        }
        self.0.push((name, field));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ArgumentField> {
        self.0.iter().find(|(key, _)| key == name).map(|(_, field)| field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgumentField)> {
        self.0.iter().map(|(key, field)| (key.as_str(), field))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ArgumentConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, field) in &self.0 {
            map.serialize_entry(key, field)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ArgumentConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ArgumentConfigVisitor;

        impl<'de> Visitor<'de> for ArgumentConfigVisitor {
            type Value = ArgumentConfig;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of argument names to argument fields")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut config = ArgumentConfig::new();
                while let Some((key, field)) = access.next_entry::<String, ArgumentField>()? {
                    config.insert(key, field).map_err(serde::de::Error::custom)?;
                }
                Ok(config)
            }
        }

        deserializer.deserialize_map(ArgumentConfigVisitor)
    }
}

/// A user-authored script as stored by the script library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserScript {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lang: ScriptLang,
    #[serde(default)]
    pub argument_config: ArgumentConfig,
}

impl UserScript {
    pub fn new(name: impl Into<String>, lang: ScriptLang) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            lang,
            argument_config: ArgumentConfig::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// File name of the script's source inside its directory
    pub fn source_file_name(&self) -> String {
        format!("index.{}", self.lang.extension())
    }

    /// Argument object built from every declared default value
    pub fn default_arguments(&self) -> JsonValue {
        let map: Map<String, JsonValue> = self
            .argument_config
            .iter()
            .map(|(name, field)| (name.to_string(), field.default_json()))
            .collect();
        JsonValue::Object(map)
    }

    /// Merge caller-supplied parameters over the declared defaults.
    ///
    /// `null` means "all defaults". Unknown keys and values of the wrong type
    /// are rejected.
    pub fn resolve_arguments(&self, params: &JsonValue) -> Result<JsonValue> {
        let supplied = match params {
            JsonValue::Null => return Ok(self.default_arguments()),
            JsonValue::Object(map) => map,
            other => {
                return Err(EngineError::invalid_usage(format!(
                    "Arguments for script '{}' must be an object, got {}",
                    self.name, other
                )))
            }
        };

        if let Some(unknown) = supplied.keys().find(|key| self.argument_config.get(key).is_none()) {
            return Err(EngineError::invalid_usage(format!(
                "Script '{}' has no argument named '{}'",
                self.name, unknown
            )));
        }

        let mut resolved = Map::new();
        for (name, field) in self.argument_config.iter() {
            let value = match supplied.get(name) {
                Some(value) if field.accepts(value) => value.clone(),
                Some(value) => {
                    return Err(EngineError::invalid_usage(format!(
                        "Argument '{}' of script '{}' expects a {} value, got {}",
                        name,
                        self.name,
                        field.type_name(),
                        value
                    )))
                }
                None => field.default_json(),
            };
            resolved.insert(name.to_string(), value);
        }
        Ok(JsonValue::Object(resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn greeting_script() -> UserScript {
        let mut script = UserScript::new("greet", ScriptLang::Ts);
        script
            .argument_config
            .insert("who", ArgumentField::String { default_value: "world".into() })
            .unwrap();
        script
            .argument_config
            .insert("times", ArgumentField::Number { default_value: 1.0 })
            .unwrap();
        script
            .argument_config
            .insert(
                "tone",
                ArgumentField::Enum {
                    default_value: "calm".into(),
                    enum_options: vec![
                        EnumOption { value: "calm".into(), label: None },
                        EnumOption { value: "loud".into(), label: Some("Loud".into()) },
                    ],
                },
            )
            .unwrap();
        script
    }

    #[test]
    fn test_valid_script_names() {
        for name in ["hello", "my-script", "a_b.c", "脚本", "x1", ".hidden", "v1..2"] {
            assert!(is_valid_script_name(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_script_names() {
        let mut names = vec![
            String::new(),
            "has space".into(),
            "tab\there".into(),
            ".".into(),
            "..".into(),
            "...".into(),
        ];
        names.extend(RESERVED_NAME_CHARS.iter().map(|c| format!("bad{}name", c)));

        for name in names {
            let err = is_valid_script_name(&name).unwrap_err();
            assert!(matches!(err, EngineError::InvalidUsage(_)));
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn test_argument_config_preserves_order() {
        let script = greeting_script();
        let json = serde_json::to_string(&script.argument_config).unwrap();
        let who = json.find("\"who\"").unwrap();
        let times = json.find("\"times\"").unwrap();
        let tone = json.find("\"tone\"").unwrap();
        assert!(who < times && times < tone);

        let parsed: ArgumentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, script.argument_config);
    }

    #[test]
    fn test_argument_config_rejects_duplicate_keys() {
        let raw = r#"{"a": {"type": "boolean", "defaultValue": true},
                      "a": {"type": "boolean", "defaultValue": false}}"#;
        assert!(serde_json::from_str::<ArgumentConfig>(raw).is_err());
    }

    #[test]
    fn test_enum_field_requires_options() {
        let raw = r#"{"type": "enum", "defaultValue": "x"}"#;
        assert!(serde_json::from_str::<ArgumentField>(raw).is_err());

        let raw = r#"{"type": "string", "defaultValue": "x"}"#;
        let field: ArgumentField = serde_json::from_str(raw).unwrap();
        assert_eq!(field, ArgumentField::String { default_value: "x".into() });
    }

    #[test]
    fn test_default_arguments() {
        let script = greeting_script();
        assert_eq!(
            script.default_arguments(),
            json!({"who": "world", "times": 1.0, "tone": "calm"})
        );
    }

    #[test]
    fn test_resolve_arguments_merges_defaults() {
        let script = greeting_script();
        let resolved = script.resolve_arguments(&json!({"who": "rust", "tone": "loud"})).unwrap();
        assert_eq!(resolved, json!({"who": "rust", "times": 1.0, "tone": "loud"}));
        assert_eq!(script.resolve_arguments(&JsonValue::Null).unwrap(), script.default_arguments());
    }

    #[test]
    fn test_resolve_arguments_rejects_bad_input() {
        let script = greeting_script();
        assert!(script.resolve_arguments(&json!({"nope": 1})).is_err());
        assert!(script.resolve_arguments(&json!({"times": "two"})).is_err());
        assert!(script.resolve_arguments(&json!({"tone": "angry"})).is_err());
        assert!(script.resolve_arguments(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_user_script_json_shape() {
        let script = greeting_script().with_description("says hi");
        let value = serde_json::to_value(&script).unwrap();
        assert_eq!(value["lang"], "ts");
        assert_eq!(value["argumentConfig"]["tone"]["enumOptions"][1]["label"], "Loud");
        assert_eq!(script.source_file_name(), "index.ts");
    }
}
