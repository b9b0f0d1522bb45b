//! Per-type cache of [`EntityMetadata`].
//!
//! There is no process-global registry: create a [`MetadataRegistry`] at
//! startup and hand it to whatever builds repositories. Metadata is derived
//! either eagerly with [`register`](MetadataRegistry::register) or lazily on
//! the first [`get`](MetadataRegistry::get) for a type, and is immutable
//! afterwards.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::MetadataError;
use crate::metadata::{Entity, EntityMetadata};

/// Cache of validated entity metadata keyed by entity type.
///
/// # Examples
///
/// ```
/// # use tinyorm_core::*;
/// # struct Tag { id: i64 }
/// # impl Entity for Tag {
/// #     type Id = i64;
/// #     fn schema() -> EntitySchema {
/// #         EntitySchema::new("tags").column(ColumnSpec::id("id", "INTEGER"))
/// #     }
/// #     fn to_attributes(&self) -> Attributes { Attributes::new().with("id", self.id) }
/// #     fn from_attributes(a: &Attributes) -> Result<Self, ConversionError> {
/// #         Ok(Tag { id: a.get("id")? })
/// #     }
/// # }
/// let registry = MetadataRegistry::new();
/// let first = registry.get::<Tag>().unwrap();
/// let second = registry.get::<Tag>().unwrap();
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// ```
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entries: RwLock<HashMap<TypeId, Arc<EntityMetadata>>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the metadata of `E`, deriving and caching it on first use.
    ///
    /// # Errors
    ///
    /// Returns the [`MetadataError`] from validation. Failures are not
    /// cached, so every call for a malformed entity reports the error.
    pub fn get<E: Entity>(&self) -> Result<Arc<EntityMetadata>, MetadataError> {
        let key = TypeId::of::<E>();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(meta) = entries.get(&key) {
                return Ok(Arc::clone(meta));
            }
        }

        let derived = Arc::new(EntityMetadata::of::<E>()?);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have won the race; keep the first instance.
        let meta = entries.entry(key).or_insert_with(|| {
            debug!(
                entity = type_name::<E>(),
                table = derived.table_name(),
                columns = derived.columns().len(),
                "registered entity metadata"
            );
            Arc::clone(&derived)
        });
        Ok(Arc::clone(meta))
    }

    /// Derives the metadata of `E` now, so declaration errors surface at
    /// startup rather than on first use.
    pub fn register<E: Entity>(&self) -> Result<(), MetadataError> {
        self.get::<E>().map(|_| ())
    }

    /// Returns `true` if metadata for `E` has already been derived.
    pub fn contains<E: Entity>(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<E>())
    }

    /// Number of registered entity types.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;
    use crate::metadata::{Attributes, ColumnSpec, EntitySchema};

    struct Good {
        id: i64,
    }

    impl Entity for Good {
        type Id = i64;

        fn schema() -> EntitySchema {
            EntitySchema::new("good").column(ColumnSpec::id("id", "INTEGER"))
        }

        fn to_attributes(&self) -> Attributes {
            Attributes::new().with("id", self.id)
        }

        fn from_attributes(attrs: &Attributes) -> Result<Self, ConversionError> {
            Ok(Good { id: attrs.get("id")? })
        }
    }

    struct Keyless;

    impl Entity for Keyless {
        type Id = i64;

        fn schema() -> EntitySchema {
            EntitySchema::new("keyless").column(ColumnSpec::new("x", "TEXT"))
        }

        fn to_attributes(&self) -> Attributes {
            Attributes::new()
        }

        fn from_attributes(_: &Attributes) -> Result<Self, ConversionError> {
            Ok(Keyless)
        }
    }

    #[test]
    fn test_get_caches_one_instance_per_type() {
        let registry = MetadataRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.contains::<Good>());

        let a = registry.get::<Good>().unwrap();
        let b = registry.get::<Good>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.contains::<Good>());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_derivation_is_not_cached() {
        let registry = MetadataRegistry::new();
        assert!(registry.register::<Keyless>().is_err());
        assert!(registry.register::<Keyless>().is_err());
        assert!(!registry.contains::<Keyless>());
        assert!(registry.is_empty());
    }
}
