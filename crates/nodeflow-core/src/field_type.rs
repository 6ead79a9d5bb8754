//! Field-type catalog
//!
//! A closed set of field types keyed by the host's string tag. Each type knows:
//! - Which widget a form layer should render for it
//! - How a raw form value is serialized into a field update
//! - How a stored node value is turned back into an initial form value
//! - How to validate a raw form value

use crate::error::FieldValueError;
use crate::types::FieldUpdate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Field keys that were migrated to roles and must not be offered as fields
pub const LEGACY_FIELD_KEYS: [&str; 2] = ["issue_operator", "issue_reporter"];

/// Field type, keyed by catalog tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    MultiPureText,
    Link,
    Date,
    Schedule,
    PreciseDate,
    Number,
    WorkItemRelatedSelect,
    WorkItemRelatedMultiSelect,
    Signal,
    Bool,
    Radio,
    Select,
    MultiSelect,
    TreeSelect,
    TreeMultiSelect,
    User,
    MultiUser,
    CompoundField,
    MultiText,
    File,
    MultiFile,
    Aborted,
    Deleted,
    RoleOwners,
    LinkedWorkItem,
    Business,
    ChatGroup,
    GroupId,
    GroupType,
    WorkItemTemplate,
    WorkItemStatus,
    VoteOption,
    VoteOptionMulti,
    /// Tag not present in the catalog
    Unknown,
}

const CATALOG: [(FieldType, &str, &str); 34] = [
    (FieldType::Text, "text", "Text"),
    (FieldType::MultiPureText, "multi_pure_text", "Multi-line text"),
    (FieldType::Link, "link", "Link"),
    (FieldType::Date, "date", "Date"),
    (FieldType::Schedule, "schedule", "Date range"),
    (FieldType::PreciseDate, "precise_date", "Date and time"),
    (FieldType::Number, "number", "Number"),
    (FieldType::WorkItemRelatedSelect, "work_item_related_select", "Related work item"),
    (
        FieldType::WorkItemRelatedMultiSelect,
        "work_item_related_multi_select",
        "Related work items",
    ),
    (FieldType::Signal, "signal", "Signal"),
    (FieldType::Bool, "bool", "Switch"),
    (FieldType::Radio, "radio", "Radio buttons"),
    (FieldType::Select, "select", "Single select"),
    (FieldType::MultiSelect, "multi_select", "Multi select"),
    (FieldType::TreeSelect, "tree_select", "Cascading select"),
    (FieldType::TreeMultiSelect, "tree_multi_select", "Cascading multi select"),
    (FieldType::User, "user", "User"),
    (FieldType::MultiUser, "multi_user", "Users"),
    (FieldType::CompoundField, "compound_field", "Compound field"),
    (FieldType::MultiText, "multi_text", "Rich text"),
    (FieldType::File, "file", "File"),
    (FieldType::MultiFile, "multi_file", "Attachments"),
    (FieldType::Aborted, "aborted", "Terminated"),
    (FieldType::Deleted, "deleted", "Deleted"),
    (FieldType::RoleOwners, "role_owners", "Role owners"),
    (FieldType::LinkedWorkItem, "linked_work_item", "Linked work item"),
    (FieldType::Business, "business", "Business line"),
    (FieldType::ChatGroup, "chat_group", "Chat group id"),
    (FieldType::GroupId, "group_id", "Chat group id"),
    (FieldType::GroupType, "group_type", "Group creation mode"),
    (FieldType::WorkItemTemplate, "work_item_template", "Template type"),
    (FieldType::WorkItemStatus, "work_item_status", "Work item status"),
    (FieldType::VoteOption, "vote_option", "Vote"),
    (FieldType::VoteOptionMulti, "vote_option_multi", "Multi-choice vote"),
];

/// Widget a form layer renders for a field type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Widget {
    /// Single-line input
    Input,
    /// Auto-sized text area
    TextArea,
    /// Option picker
    Select {
        /// Allows several options
        multiple: bool,
    },
    /// Radio group over the field options
    RadioGroup,
    /// Yes/no radio group
    YesNo,
    /// User picker
    UserSelect {
        /// Allows several users
        multiple: bool,
    },
    /// Rich text editor
    RichText,
    /// Not editable in batch; edit in the host instead
    ReadOnly,
}

impl FieldType {
    /// Every catalogued type
    pub const ALL: [FieldType; 34] = {
        let mut all = [FieldType::Unknown; 34];
        let mut i = 0;
        while i < CATALOG.len() {
            all[i] = CATALOG[i].0;
            i += 1;
        }
        all
    };

    /// Look up a catalog tag
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        CATALOG
            .iter()
            .find(|(_, t, _)| *t == tag)
            .map_or(Self::Unknown, |(ty, _, _)| *ty)
    }

    /// Catalog tag
    #[must_use]
    pub fn tag(&self) -> &'static str {
        self.entry().map_or("unknown", |(_, tag, _)| tag)
    }

    /// Display name
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        self.entry().map_or("Unknown", |(_, _, name)| name)
    }

    fn entry(&self) -> Option<&'static (FieldType, &'static str, &'static str)> {
        CATALOG.iter().find(|(ty, _, _)| ty == self)
    }

    /// Widget used to edit this type
    #[must_use]
    pub fn widget(&self) -> Widget {
        match self {
            Self::Text => Widget::Input,
            Self::MultiPureText => Widget::TextArea,
            Self::Select => Widget::Select { multiple: false },
            Self::MultiSelect => Widget::Select { multiple: true },
            Self::User => Widget::UserSelect { multiple: false },
            Self::MultiUser => Widget::UserSelect { multiple: true },
            Self::Radio => Widget::RadioGroup,
            Self::Bool => Widget::YesNo,
            Self::MultiText => Widget::RichText,
            _ => Widget::ReadOnly,
        }
    }

    /// Whether batch edits are supported
    #[inline]
    #[must_use]
    pub fn is_editable(&self) -> bool {
        self.widget() != Widget::ReadOnly
    }

    /// Serialize a raw form value into the wire value
    ///
    /// # Errors
    /// - `FieldValueError::InvalidShape` when the value does not fit the type
    pub fn serialize(&self, def: &FieldDefinition, raw: &Value) -> Result<Value, FieldValueError> {
        match self {
            Self::Select | Self::Radio => {
                if raw.is_null() {
                    return Ok(Value::Null);
                }
                let mut picked = Map::new();
                picked.insert("value".to_string(), raw.clone());
                if let Some(label) = def.option_label(raw) {
                    picked.insert("label".to_string(), Value::String(label.clone()));
                }
                Ok(Value::Object(picked))
            }
            Self::MultiSelect => {
                let selected = match raw {
                    Value::Null => return Ok(Value::Array(Vec::new())),
                    Value::Array(values) => values,
                    _ => {
                        return Err(FieldValueError::InvalidShape {
                            field: def.field_key.clone(),
                            expected: "an array of option values",
                        })
                    }
                };
                let picked = def
                    .options
                    .iter()
                    .filter(|option| selected.contains(&option.value))
                    .map(|option| json!({ "value": option.value, "label": option.label }))
                    .collect();
                Ok(Value::Array(picked))
            }
            Self::User => Ok(match raw {
                Value::Array(users) => users.first().cloned().unwrap_or(Value::Null),
                other => other.clone(),
            }),
            Self::Number => match raw {
                Value::Null | Value::Number(_) => Ok(raw.clone()),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(|n| serde_json::Number::from_f64(n).map(Value::Number))
                    .ok_or_else(|| FieldValueError::InvalidShape {
                        field: def.field_key.clone(),
                        expected: "a number",
                    }),
                _ => Err(FieldValueError::InvalidShape {
                    field: def.field_key.clone(),
                    expected: "a number",
                }),
            },
            Self::Bool => match raw {
                Value::Null | Value::Bool(_) => Ok(raw.clone()),
                _ => Err(FieldValueError::InvalidShape {
                    field: def.field_key.clone(),
                    expected: "a boolean",
                }),
            },
            _ => Ok(raw.clone()),
        }
    }

    /// Initial form value from a stored node value
    #[must_use]
    pub fn prefill(&self, stored: &Value) -> Value {
        match self {
            Self::MultiSelect => match stored {
                Value::Array(options) => Value::Array(
                    options
                        .iter()
                        .map(|o| o.get("value").cloned().unwrap_or(Value::Null))
                        .collect(),
                ),
                _ => Value::Array(Vec::new()),
            },
            Self::Select | Self::Radio => stored.get("value").cloned().unwrap_or(Value::Null),
            Self::User => Value::Array(vec![stored.clone()]),
            _ => stored.clone(),
        }
    }

    /// Validate a raw form value
    ///
    /// # Errors
    /// - `FieldValueError::Required` for an empty required value
    pub fn validate(&self, def: &FieldDefinition, raw: &Value, required: bool) -> Result<(), FieldValueError> {
        if required && is_blank(raw) {
            return Err(FieldValueError::Required(def.field_key.clone()));
        }
        Ok(())
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Selectable option of a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    /// Display label
    pub label: String,
    /// Stored value
    pub value: Value,
    /// Nested options of cascading fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FieldOption>,
}

impl FieldOption {
    /// Create new option
    #[inline]
    #[must_use]
    pub fn new(label: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            children: Vec::new(),
        }
    }
}

/// Field definition of a work-item type
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field key
    pub field_key: String,
    /// Field alias
    #[serde(default)]
    pub field_alias: Option<String>,
    /// Display name
    #[serde(default)]
    pub field_name: String,
    /// Catalog tag
    pub field_type_key: String,
    /// Custom field flag
    #[serde(default)]
    pub is_custom_field: bool,
    /// Obsolete field flag
    #[serde(default)]
    pub is_obsoleted: bool,
    /// Options of select-like fields
    #[serde(default)]
    pub options: Vec<FieldOption>,
    /// Sub-fields of compound fields
    #[serde(default)]
    pub compound_fields: Vec<FieldDefinition>,
    /// Required flag
    #[serde(default)]
    pub required: bool,
}

impl FieldDefinition {
    /// Create new definition
    #[inline]
    #[must_use]
    pub fn new(field_key: impl Into<String>, field_type_key: impl Into<String>) -> Self {
        let field_key = field_key.into();
        Self {
            field_name: field_key.clone(),
            field_key,
            field_type_key: field_type_key.into(),
            ..Self::default()
        }
    }

    /// With options
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: Vec<FieldOption>) -> Self {
        self.options = options;
        self
    }

    /// With alias
    #[inline]
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.field_alias = Some(alias.into());
        self
    }

    /// Catalog type
    #[inline]
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        FieldType::from_tag(&self.field_type_key)
    }

    /// Label of the option holding `value`
    #[must_use]
    pub fn option_label(&self, value: &Value) -> Option<&String> {
        self.options
            .iter()
            .find(|option| &option.value == value)
            .map(|option| &option.label)
    }
}

/// Field definitions of one work-item type, indexed by key
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: IndexMap<String, FieldDefinition>,
}

impl FieldCatalog {
    /// Build catalog, dropping legacy keys
    #[must_use]
    pub fn new(definitions: impl IntoIterator<Item = FieldDefinition>) -> Self {
        let fields = definitions
            .into_iter()
            .filter(|def| !LEGACY_FIELD_KEYS.contains(&def.field_key.as_str()))
            .map(|def| (def.field_key.clone(), def))
            .collect();
        Self { fields }
    }

    /// Definition by key
    #[inline]
    #[must_use]
    pub fn get(&self, field_key: &str) -> Option<&FieldDefinition> {
        self.fields.get(field_key)
    }

    /// Number of definitions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the catalog is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Definitions in catalog order
    pub fn iter(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    /// Turn raw form values into field updates
    ///
    /// # Errors
    /// - `FieldValueError::UnknownField` for keys missing from the catalog
    /// - `FieldValueError::InvalidShape` for values that do not fit their type
    pub fn serialize_values(&self, values: &Map<String, Value>) -> Result<Vec<FieldUpdate>, FieldValueError> {
        values
            .iter()
            .map(|(key, raw)| {
                let def = self
                    .get(key)
                    .ok_or_else(|| FieldValueError::UnknownField(key.clone()))?;
                Ok(FieldUpdate {
                    field_key: key.clone(),
                    field_alias: def.field_alias.clone(),
                    field_type_key: def.field_type_key.clone(),
                    field_value: def.field_type().serialize(def, raw)?,
                })
            })
            .collect()
    }

    /// Check required keys are filled
    ///
    /// # Errors
    /// - `FieldValueError::Required` for the first empty required key
    pub fn validate_values(&self, values: &Map<String, Value>, required: &[String]) -> Result<(), FieldValueError> {
        for key in required {
            let raw = values.get(key).unwrap_or(&Value::Null);
            match self.get(key) {
                Some(def) => def.field_type().validate(def, raw, true)?,
                None if is_blank(raw) => return Err(FieldValueError::Required(key.clone())),
                None => {}
            }
        }
        Ok(())
    }
}
