//! Discovery of references declared on arbitrary resource types.
//!
//! Types opt in by implementing [`Referencing`]: they list the fields that
//! hold a [`Reference`] together with the group, kind and API version of the
//! referenced resource, and describe which nested values should be walked.
//! The [`Walker`] then collects every reference reachable from a value
//! without any type-specific discovery code.

use crate::{Reference, ResolvedReference};
use std::collections::HashSet;

/// Describes a single reference-typed field of `T`.
///
/// A field is only tracked when all three of `group`, `kind` and
/// `api_version` are declared. Fields with partial metadata are skipped.
pub struct ReferenceField<T: ?Sized> {
    name: &'static str,
    access: fn(&T) -> Option<&Reference>,
    group: Option<&'static str>,
    kind: Option<&'static str>,
    api_version: Option<&'static str>,
}

/// Implemented by types that may carry references to other resources.
pub trait Referencing: 'static {
    /// Reference fields declared directly on this type.
    const REFERENCE_FIELDS: &'static [ReferenceField<Self>] = &[];

    /// Visits nested values that may themselves carry references.
    fn walk_children(&self, walker: &mut Walker) {
        let _ = walker;
    }
}

/// Collects references while walking a value depth-first.
#[derive(Debug, Default)]
pub struct Walker {
    found: Vec<ResolvedReference>,
}

/// Returns every reference reachable from `value`, without duplicates.
pub fn find_references<T>(value: &T) -> Vec<ResolvedReference>
where
    T: Referencing + ?Sized,
{
    let mut walker = Walker::default();
    walker.visit(value);
    walker.finish()
}

// === impl ReferenceField ===

impl<T: ?Sized> ReferenceField<T> {
    pub const fn new(name: &'static str, access: fn(&T) -> Option<&Reference>) -> Self {
        Self {
            name,
            access,
            group: None,
            kind: None,
            api_version: None,
        }
    }

    pub const fn group(self, group: &'static str) -> Self {
        Self {
            group: Some(group),
            ..self
        }
    }

    pub const fn kind(self, kind: &'static str) -> Self {
        Self {
            kind: Some(kind),
            ..self
        }
    }

    pub const fn api_version(self, api_version: &'static str) -> Self {
        Self {
            api_version: Some(api_version),
            ..self
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Tag values are taken as declared, even when empty.
    fn resolve(&self, value: &T) -> Option<ResolvedReference> {
        let reference = (self.access)(value)?;
        let (group, kind, api_version) = match (self.group, self.kind, self.api_version) {
            (Some(group), Some(kind), Some(api_version)) => (group, kind, api_version),
            _ => return None,
        };
        Some(ResolvedReference::new(
            reference.clone(),
            group,
            kind,
            api_version,
        ))
    }
}

impl<T: ?Sized> Clone for ReferenceField<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for ReferenceField<T> {}

impl<T: ?Sized> std::fmt::Debug for ReferenceField<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceField")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("kind", &self.kind)
            .field("api_version", &self.api_version)
            .finish()
    }
}

// === impl Walker ===

impl Walker {
    pub fn visit<T>(&mut self, value: &T)
    where
        T: Referencing + ?Sized,
    {
        self.found
            .extend(T::REFERENCE_FIELDS.iter().filter_map(|field| field.resolve(value)));
        value.walk_children(self)
    }

    /// Consumes the walker, returning the references found in the order they
    /// were first seen.
    pub fn finish(self) -> Vec<ResolvedReference> {
        let mut seen = HashSet::with_capacity(self.found.len());
        self.found
            .into_iter()
            .filter(|reference| seen.insert(reference.clone()))
            .collect()
    }
}

// === impl Referencing ===

impl<T: Referencing> Referencing for Option<T> {
    fn walk_children(&self, walker: &mut Walker) {
        if let Some(value) = self {
            walker.visit(value);
        }
    }
}

impl<T: Referencing> Referencing for Box<T> {
    fn walk_children(&self, walker: &mut Walker) {
        walker.visit(&**self)
    }
}

impl<T: Referencing> Referencing for Vec<T> {
    fn walk_children(&self, walker: &mut Walker) {
        for value in self {
            walker.visit(value);
        }
    }
}
