// crates/query-relay-core/src/codec/registry.rs
// ============================================================================
// Module: Type Registry
// Description: Static (namespace, type name) -> struct schema table.
// Purpose: Resolve named descriptors to constructible struct definitions.
// Dependencies: crate::codec::{descriptor, value}, crate::identifiers, thiserror
// ============================================================================

//! ## Overview
//! The registry is populated once at startup and then shared read-only.
//! Lookups are plain map accesses keyed by `(namespace, name)`; the same
//! short name in two namespaces refers to two unrelated schemas.
//!
//! Invariants:
//! - A `(namespace, name)` pair is registered at most once.
//! - Field descriptors are parsed against the owning schema's namespace.
//! - [`TypeRegistry::validate`] proves every referenced named type resolves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;

use crate::codec::descriptor::DescriptorError;
use crate::codec::descriptor::TypeDescriptor;
use crate::codec::value::StructValue;
use crate::identifiers::Namespace;
use crate::identifiers::TypeName;

// ============================================================================
// SECTION: Schemas
// ============================================================================

/// Post-decode construction check for a struct type.
pub type ConstructHook = fn(&StructValue) -> Result<(), String>;

/// Declared field of a struct type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    /// Wire name of the field.
    pub name: String,
    /// Field type.
    pub descriptor: TypeDescriptor,
    /// Whether the field must be present on the wire.
    pub required: bool,
}

/// Declared struct type.
#[derive(Debug, Clone)]
pub struct TypeSchema {
    /// Owning namespace.
    pub namespace: Namespace,
    /// Type name.
    pub name: TypeName,
    /// Fields in declaration order.
    pub fields: Vec<FieldSchema>,
    /// Optional construction check run after all fields decode.
    pub construct: Option<ConstructHook>,
}

impl TypeSchema {
    /// Iterates over the required fields.
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|field| field.required)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry construction and resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Type registered twice in one namespace.
    #[error("type {namespace}.{name} is already registered")]
    Duplicate {
        /// Namespace.
        namespace: Namespace,
        /// Type name.
        name: TypeName,
    },
    /// Field declared twice on one type.
    #[error("field {field} is declared twice on {name}")]
    DuplicateField {
        /// Type name.
        name: TypeName,
        /// Field name.
        field: String,
    },
    /// Field descriptor string failed to parse.
    #[error("field {field} on {name} has an invalid descriptor: {source}")]
    Descriptor {
        /// Type name.
        name: TypeName,
        /// Field name.
        field: String,
        /// Parse failure.
        source: DescriptorError,
    },
    /// Named descriptor refers to an unregistered type.
    #[error("type {namespace}.{name} referenced by {referenced_by} is not registered")]
    Unresolved {
        /// Namespace of the missing type.
        namespace: Namespace,
        /// Name of the missing type.
        name: TypeName,
        /// Type whose field refers to it.
        referenced_by: TypeName,
    },
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Per-namespace struct schema table.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    /// Schemas keyed by `(namespace, name)`.
    types: BTreeMap<(Namespace, TypeName), TypeSchema>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts defining a struct type in `namespace`.
    pub fn define(
        &mut self,
        namespace: impl Into<Namespace>,
        name: impl Into<TypeName>,
    ) -> SchemaBuilder<'_> {
        SchemaBuilder {
            registry: self,
            schema: TypeSchema {
                namespace: namespace.into(),
                name: name.into(),
                fields: Vec::new(),
                construct: None,
            },
            error: None,
        }
    }

    /// Registers a fully built schema.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the pair is already taken.
    pub fn register(&mut self, schema: TypeSchema) -> Result<(), RegistryError> {
        let key = (schema.namespace.clone(), schema.name.clone());
        if self.types.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                namespace: key.0,
                name: key.1,
            });
        }
        self.types.insert(key, schema);
        Ok(())
    }

    /// Looks up a schema by namespace and name.
    #[must_use]
    pub fn lookup(&self, namespace: &Namespace, name: &TypeName) -> Option<&TypeSchema> {
        self.types.get(&(namespace.clone(), name.clone()))
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns the namespaces that have at least one registered type.
    #[must_use]
    pub fn namespaces(&self) -> BTreeSet<Namespace> {
        self.types.keys().map(|(namespace, _)| namespace.clone()).collect()
    }

    /// Verifies every named field type resolves.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError::Unresolved`] found.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for schema in self.types.values() {
            for field in &schema.fields {
                self.check_resolves(&field.descriptor, &schema.name)?;
            }
        }
        Ok(())
    }

    /// Walks a descriptor and checks named references.
    fn check_resolves(
        &self,
        descriptor: &TypeDescriptor,
        owner: &TypeName,
    ) -> Result<(), RegistryError> {
        match descriptor {
            TypeDescriptor::Scalar(_) => Ok(()),
            TypeDescriptor::Optional(inner) | TypeDescriptor::ListOf(inner) => {
                self.check_resolves(inner, owner)
            }
            TypeDescriptor::UnionOf(alternatives) => {
                alternatives.iter().try_for_each(|alt| self.check_resolves(alt, owner))
            }
            TypeDescriptor::Named {
                namespace,
                name,
            } => {
                if self.lookup(namespace, name).is_some() {
                    Ok(())
                } else {
                    Err(RegistryError::Unresolved {
                        namespace: namespace.clone(),
                        name: name.clone(),
                        referenced_by: owner.clone(),
                    })
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Schema Builder
// ============================================================================

/// Fluent builder for a struct schema; errors surface at [`SchemaBuilder::finish`].
pub struct SchemaBuilder<'a> {
    /// Registry receiving the schema.
    registry: &'a mut TypeRegistry,
    /// Schema under construction.
    schema: TypeSchema,
    /// First error encountered while declaring fields.
    error: Option<RegistryError>,
}

impl SchemaBuilder<'_> {
    /// Declares a field that must be present on the wire.
    #[must_use]
    pub fn required(self, field: &str, descriptor: &str) -> Self {
        self.field(field, descriptor, true)
    }

    /// Declares a field that may be omitted on the wire.
    #[must_use]
    pub fn optional(self, field: &str, descriptor: &str) -> Self {
        self.field(field, descriptor, false)
    }

    /// Attaches a construction check.
    #[must_use]
    pub fn construct(mut self, hook: ConstructHook) -> Self {
        self.schema.construct = Some(hook);
        self
    }

    /// Registers the schema.
    ///
    /// # Errors
    ///
    /// Returns the first declaration error, or a duplicate-type error.
    pub fn finish(self) -> Result<(), RegistryError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.registry.register(self.schema)
    }

    /// Parses and appends a field declaration.
    fn field(mut self, field: &str, descriptor: &str, required: bool) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.schema.fields.iter().any(|existing| existing.name == field) {
            self.error = Some(RegistryError::DuplicateField {
                name: self.schema.name.clone(),
                field: field.to_string(),
            });
            return self;
        }
        match TypeDescriptor::parse(descriptor, &self.schema.namespace) {
            Ok(descriptor) => self.schema.fields.push(FieldSchema {
                name: field.to_string(),
                descriptor,
                required,
            }),
            Err(source) => {
                self.error = Some(RegistryError::Descriptor {
                    name: self.schema.name.clone(),
                    field: field.to_string(),
                    source,
                });
            }
        }
        self
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
