//! Plugin configuration schema types.

use serde::Serialize;

/// Value type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free-form string.
    String,
    /// URL string.
    Url,
    /// Boolean flag.
    Boolean,
    /// Integer.
    Integer,
    /// List of strings.
    List,
}

/// Description of one configuration field, as listed to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigField {
    /// Field name as it appears in the configuration file.
    pub name: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Help text.
    pub help: &'static str,
    /// Value type.
    pub kind: FieldKind,
    /// Whether the field must be set.
    pub required: bool,
    /// Default value, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Whether the value is a secret.
    pub secret: bool,
}

impl ConfigField {
    /// A required field with no default.
    pub fn required(
        name: &'static str,
        label: &'static str,
        kind: FieldKind,
        help: &'static str,
    ) -> Self {
        Self {
            name,
            label,
            help,
            kind,
            required: true,
            default: None,
            secret: false,
        }
    }

    /// An optional field with a default value.
    pub fn optional(
        name: &'static str,
        label: &'static str,
        kind: FieldKind,
        default: serde_json::Value,
        help: &'static str,
    ) -> Self {
        Self {
            name,
            label,
            help,
            kind,
            required: false,
            default: Some(default),
            secret: false,
        }
    }

    /// Marks the field as holding a secret.
    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}
