//! Archetype filters and typed row iteration.
//!
//! A [`Filter`] is three lists of component types: `all` (every one must be
//! present), `any` (at least one must be present, unconstrained when empty)
//! and `none` (every one must be absent). It resolves to a set of archetypes,
//! never to entities directly.
//!
//! Typed iteration is driven by [`QueryParams`], implemented for tuples of up
//! to six component types. Each row hands the visitor one [`Comp`] per
//! requested type, which is empty when the row's archetype lacks that type.
//! This is what makes `any` parameters usable:
//!
//! ```
//! use strata_ecs::prelude::*;
//! use bytemuck::{Pod, Zeroable};
//!
//! #[derive(Clone, Copy, Pod, Zeroable)]
//! #[repr(C)]
//! struct Hp(u32);
//!
//! #[derive(Clone, Copy, Pod, Zeroable)]
//! #[repr(C)]
//! struct Shield(u32);
//!
//! let mut world = World::new();
//! let a = world.create_entity();
//! world.add_component(a, Hp(10)).unwrap();
//! let b = world.create_entity();
//! world.add_component(b, Shield(5)).unwrap();
//!
//! let mut total = 0;
//! world.query::<(Hp, Shield), _>(&Filter::any::<(Hp, Shield)>(), |_, (hp, shield)| {
//!     total += hp.get().map_or(0, |h| h.0) + shield.get().map_or(0, |s| s.0);
//! });
//! assert_eq!(total, 15);
//! ```

use crate::archetype::ArchetypeId;
use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::entity::Entity;
use crate::graph::ArchetypeGraph;
use crate::storage::cast_rows_mut;

use std::any::TypeId;
use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// An All/Any/None predicate over component types.
///
/// Type lists keep insertion order. Types that were never registered match no
/// archetype.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    all: Vec<TypeId>,
    any: Vec<TypeId>,
    none: Vec<TypeId>,
}

impl Filter {
    /// A filter with no constraints. Resolves to nothing until `all` or
    /// `any` is given.
    pub fn new() -> Self {
        Self::default()
    }

    /// Archetypes containing every type in `S`.
    pub fn all<S: ComponentSet>() -> Self {
        Self::new().with_all::<S>()
    }

    /// Archetypes containing at least one type in `S`.
    pub fn any<S: ComponentSet>() -> Self {
        Self::new().with_any::<S>()
    }

    pub fn with_all<S: ComponentSet>(mut self) -> Self {
        self.all.extend(S::type_ids());
        self
    }

    pub fn with_any<S: ComponentSet>(mut self) -> Self {
        self.any.extend(S::type_ids());
        self
    }

    pub fn with_none<S: ComponentSet>(mut self) -> Self {
        self.none.extend(S::type_ids());
        self
    }

    /// Resolve to the matching archetypes, ascending.
    ///
    /// With both `all` and `any` empty the result is empty, whatever the
    /// world contains.
    pub fn resolve(&self, graph: &ArchetypeGraph, registry: &ComponentRegistry) -> BTreeSet<ArchetypeId> {
        let archetypes_for = |type_id: &TypeId| -> BTreeSet<ArchetypeId> {
            registry
                .lookup_type_id(*type_id)
                .and_then(|id| graph.archetypes_with(id))
                .cloned()
                .unwrap_or_default()
        };

        let mut result: Option<BTreeSet<ArchetypeId>> = None;
        for type_id in &self.all {
            let matching = archetypes_for(type_id);
            let narrowed = match result {
                None => matching,
                Some(current) => current.intersection(&matching).copied().collect(),
            };
            if narrowed.is_empty() {
                return BTreeSet::new();
            }
            result = Some(narrowed);
        }

        if !self.any.is_empty() {
            let union: BTreeSet<ArchetypeId> = self.any.iter().flat_map(archetypes_for).collect();
            result = Some(match result {
                None => union,
                Some(current) => current.intersection(&union).copied().collect(),
            });
        }

        let mut result = result.unwrap_or_default();
        for type_id in &self.none {
            for id in archetypes_for(type_id) {
                result.remove(&id);
            }
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Comp
// ---------------------------------------------------------------------------

/// One component of one row, or nothing if the row's archetype lacks it.
///
/// Dereferencing an empty `Comp` panics; use [`get`](Self::get) when the type
/// came from an `any` list.
pub struct Comp<'r, T> {
    value: Option<&'r mut T>,
}

impl<'r, T> Comp<'r, T> {
    #[inline]
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.value.as_deref()
    }

    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_deref_mut()
    }

    /// The underlying reference, keeping the row lifetime.
    #[inline]
    pub fn into_inner(self) -> Option<&'r mut T> {
        self.value
    }
}

impl<T> Deref for Comp<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
            .as_deref()
            .unwrap_or_else(|| panic!("component {} is absent on this row", std::any::type_name::<T>()))
    }
}

impl<T> DerefMut for Comp<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
            .as_deref_mut()
            .unwrap_or_else(|| panic!("component {} is absent on this row", std::any::type_name::<T>()))
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Comp<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Comp").field(&self.value).finish()
    }
}

/// Walks one column of one archetype, row by row.
pub struct ColumnCursor<'r, T> {
    rows: Option<std::slice::IterMut<'r, T>>,
}

impl<'r, T: Component> ColumnCursor<'r, T> {
    fn new(bytes: Option<&'r mut [u8]>, rows: usize) -> Self {
        Self {
            rows: bytes.map(|bytes| cast_rows_mut::<T>(bytes, rows).iter_mut()),
        }
    }

    #[inline]
    fn next(&mut self) -> Comp<'r, T> {
        Comp {
            value: self.rows.as_mut().and_then(Iterator::next),
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentSet / QueryParams
// ---------------------------------------------------------------------------

/// A tuple of component types, used to build [`Filter`]s.
pub trait ComponentSet {
    /// Rust type ids, in tuple order.
    fn type_ids() -> Vec<TypeId>;
}

/// A tuple of component types fetched per row by [`World::query`].
///
/// [`World::query`]: crate::world::World::query
pub trait QueryParams: ComponentSet {
    /// What the visitor receives for one row.
    type Item<'r>;
    /// Per-archetype iteration state.
    type Columns<'r>;

    /// Build cursors from column spans given in tuple order.
    fn columns<'r>(spans: Vec<Option<&'r mut [u8]>>, rows: usize) -> Self::Columns<'r>;

    /// Advance every cursor by one row.
    fn next<'r>(columns: &mut Self::Columns<'r>) -> Self::Item<'r>;
}

macro_rules! impl_query_params {
    ($($name:ident),*) => {
        impl<$($name: Component),*> ComponentSet for ($($name,)*) {
            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$name>()),*]
            }
        }

        impl<$($name: Component),*> QueryParams for ($($name,)*) {
            type Item<'r> = ($(Comp<'r, $name>,)*);
            type Columns<'r> = ($(ColumnCursor<'r, $name>,)*);

            #[allow(unused_mut, unused_variables, clippy::unused_unit)]
            fn columns<'r>(spans: Vec<Option<&'r mut [u8]>>, rows: usize) -> Self::Columns<'r> {
                let mut spans = spans.into_iter();
                ($(ColumnCursor::<$name>::new(spans.next().flatten(), rows),)*)
            }

            #[allow(non_snake_case, clippy::unused_unit)]
            fn next<'r>(columns: &mut Self::Columns<'r>) -> Self::Item<'r> {
                let ($($name,)*) = columns;
                ($($name.next(),)*)
            }
        }
    };
}

impl_query_params!();
impl_query_params!(A);
impl_query_params!(A, B);
impl_query_params!(A, B, C);
impl_query_params!(A, B, C, D);
impl_query_params!(A, B, C, D, E);
impl_query_params!(A, B, C, D, E, F);

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Panics if a type appears twice in one query tuple.
fn validate_no_duplicate_access(type_ids: &[TypeId]) {
    for (i, type_id) in type_ids.iter().enumerate() {
        if type_ids[..i].contains(type_id) {
            panic!("query contains duplicate access to the same component type");
        }
    }
}

/// Visit every row of every archetype matched by `filter`.
pub(crate) fn run<Q, F>(
    graph: &mut ArchetypeGraph,
    registry: &ComponentRegistry,
    filter: &Filter,
    mut visitor: F,
) where
    Q: QueryParams,
    F: for<'r> FnMut(Entity, Q::Item<'r>),
{
    let requested = Q::type_ids();
    validate_no_duplicate_access(&requested);
    let wanted: Vec<Option<ComponentTypeId>> = requested
        .iter()
        .map(|type_id| registry.lookup_type_id(*type_id))
        .collect();

    for id in filter.resolve(graph, registry) {
        let Ok(archetype) = graph.archetype_mut(id) else {
            continue;
        };
        let rows = archetype.len();
        let (entities, spans) = archetype.split_for_query(&wanted);
        let mut columns = Q::columns(spans, rows);
        for &entity in entities {
            visitor(entity, Q::next(&mut columns));
        }
    }
}

/// The entities of every archetype matched by `filter`, archetype by archetype.
pub(crate) fn matching_entities(
    graph: &ArchetypeGraph,
    registry: &ComponentRegistry,
    filter: &Filter,
) -> Vec<Entity> {
    let mut out = Vec::new();
    for id in filter.resolve(graph, registry) {
        if let Ok(archetype) = graph.archetype(id) {
            out.extend_from_slice(archetype.entities());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
