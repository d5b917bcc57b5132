//! Class registry: per-class field tables and the identifier -> class lookup used
//! when reconstructing polymorphic nodes.

use crate::error::QuamError;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Any,
    Bool,
    Int,
    Float,
    Str,
    Component(String),
    List(Box<FieldType>),
    Dict(Box<FieldType>),
    Optional(Box<FieldType>),
}

impl FieldType {
    pub fn component(class: &str) -> Self {
        FieldType::Component(class.to_string())
    }

    pub fn list(element: FieldType) -> Self {
        FieldType::List(Box::new(element))
    }

    pub fn dict(element: FieldType) -> Self {
        FieldType::Dict(Box::new(element))
    }

    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    /// Strip any `Optional` wrappers.
    pub fn inner(&self) -> &FieldType {
        match self {
            FieldType::Optional(inner) => inner.inner(),
            other => other,
        }
    }

    /// The class a component at this position is declared as, if any.
    pub fn declared_class(&self) -> Option<&str> {
        match self.inner() {
            FieldType::Component(class) => Some(class),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Any => write!(f, "any"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Int => write!(f, "int"),
            FieldType::Float => write!(f, "float"),
            FieldType::Str => write!(f, "str"),
            FieldType::Component(class) => write!(f, "{}", class),
            FieldType::List(element) => write!(f, "list[{}]", element),
            FieldType::Dict(element) => write!(f, "dict[str, {}]", element),
            FieldType::Optional(inner) => write!(f, "optional[{}]", inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    Required,
    Value(JsonValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    pub default: FieldDefault,
}

impl FieldSpec {
    pub fn required(name: &str, ty: FieldType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            default: FieldDefault::Required,
        }
    }

    pub fn optional(name: &str, ty: FieldType, default: JsonValue) -> Self {
        Self {
            name: name.to_string(),
            ty,
            default: FieldDefault::Value(default),
        }
    }

    pub fn is_required(&self) -> bool {
        self.default == FieldDefault::Required
    }

    pub fn default_value(&self) -> Option<&JsonValue> {
        match &self.default {
            FieldDefault::Value(v) => Some(v),
            FieldDefault::Required => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassSpec {
    /// Stable identifier, `<module>.<ClassName>`.
    pub id: String,
    pub base: Option<String>,
    pub fields: Vec<FieldSpec>,
}

impl ClassSpec {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            base: None,
            fields: Vec::new(),
        }
    }

    pub fn extends(mut self, base: &str) -> Self {
        self.base = Some(base.to_string());
        self
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn required(self, name: &str, ty: FieldType) -> Self {
        self.field(FieldSpec::required(name, ty))
    }

    pub fn optional(self, name: &str, ty: FieldType, default: JsonValue) -> Self {
        self.field(FieldSpec::optional(name, ty, default))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    classes: BTreeMap<String, ClassSpec>,
    lenient: bool,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that treats unregistered class ids as dynamic classes without declared fields.
    pub fn lenient() -> Self {
        Self {
            classes: BTreeMap::new(),
            lenient: true,
        }
    }

    pub fn register(&mut self, spec: ClassSpec) -> Result<(), QuamError> {
        if let Some(base) = &spec.base {
            if !self.contains(base) {
                return Err(QuamError::UnknownClass(base.clone()));
            }
        }
        if self.contains(&spec.id) {
            return Err(QuamError::InvalidInput(format!(
                "class {} is already registered",
                spec.id
            )));
        }
        self.classes.insert(spec.id.clone(), spec);
        Ok(())
    }

    pub fn with(mut self, spec: ClassSpec) -> Result<Self, QuamError> {
        self.register(spec)?;
        Ok(self)
    }

    pub fn get(&self, id: &str) -> Option<&ClassSpec> {
        self.classes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.classes.contains_key(id)
    }

    /// Whether `id` may be instantiated at all.
    pub fn check(&self, id: &str) -> Result<(), QuamError> {
        if self.lenient || self.contains(id) {
            Ok(())
        } else {
            Err(QuamError::UnknownClass(id.to_string()))
        }
    }

    /// Whether `id` is a registered class without a field table of its own.
    pub fn is_dynamic(&self, id: &str) -> bool {
        self.lenient && !self.contains(id)
    }

    /// Effective field table of a class: inherited fields first, redeclarations replace in place.
    pub fn fields(&self, id: &str) -> Result<Vec<FieldSpec>, QuamError> {
        let Some(spec) = self.get(id) else {
            return if self.lenient {
                Ok(Vec::new())
            } else {
                Err(QuamError::UnknownClass(id.to_string()))
            };
        };

        let mut fields = match &spec.base {
            Some(base) => self.fields(base)?,
            None => Vec::new(),
        };
        for own in &spec.fields {
            match fields.iter_mut().find(|f| f.name == own.name) {
                Some(existing) => *existing = own.clone(),
                None => fields.push(own.clone()),
            }
        }
        Ok(fields)
    }

    pub fn field(&self, id: &str, name: &str) -> Result<Option<FieldSpec>, QuamError> {
        Ok(self.fields(id)?.into_iter().find(|f| f.name == name))
    }

    pub fn is_subclass(&self, id: &str, ancestor: &str) -> bool {
        let mut current = Some(id);
        while let Some(class) = current {
            if class == ancestor {
                return true;
            }
            current = self.get(class).and_then(|c| c.base.as_deref());
        }
        false
    }
}
