use std::fmt;

/// Names another resource by name.
///
/// The referenced type is not part of the value; it is carried by the
/// [`ReferenceField`](crate::ReferenceField) that declares the field.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
pub struct Reference {
    pub name: String,
}

/// A reference found on a resource, combined with the group, kind and API
/// version declared for the field it was found in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolvedReference {
    pub reference: Reference,
    pub group: String,
    pub kind: String,
    pub api_version: String,
}

// === impl Reference ===

impl Reference {
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

// === impl ResolvedReference ===

impl ResolvedReference {
    pub fn new(
        reference: Reference,
        group: impl ToString,
        kind: impl ToString,
        api_version: impl ToString,
    ) -> Self {
        Self {
            reference,
            group: group.to_string(),
            kind: kind.to_string(),
            api_version: api_version.to_string(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.reference.name
    }
}

impl fmt::Display for ResolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}.{}/{}", self.kind, self.api_version, self.reference.name)
        } else {
            write!(
                f,
                "{}.{}.{}/{}",
                self.kind, self.api_version, self.group, self.reference.name
            )
        }
    }
}
