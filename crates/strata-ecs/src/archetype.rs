//! Archetype identity and per-archetype storage.
//!
//! An [`Archetype`] holds every entity that has exactly the component types
//! named by its [`ArchetypeDefinition`]. Component values live in a
//! [`ColumnSet`] (one column per type), and a parallel `Vec<Entity>` maps each
//! row back to the entity occupying it. Each archetype also caches its
//! outgoing [`ArchetypeEdge`]s so repeated add/remove transitions skip the
//! definition lookup.

use crate::component::{ComponentInfo, ComponentTypeId};
use crate::entity::Entity;
use crate::storage::ColumnSet;

use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Index of an archetype in the graph. Archetype `0` is always the empty one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    /// The archetype with no component types.
    pub const EMPTY: ArchetypeId = ArchetypeId(0);

    /// Position in creation order.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchetypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ArchetypeDefinition
// ---------------------------------------------------------------------------

/// An order-independent set of component types.
///
/// Stored sorted and deduplicated, so two definitions built from the same
/// types in any order compare and hash equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ArchetypeDefinition {
    types: Vec<ComponentTypeId>,
}

impl ArchetypeDefinition {
    /// The definition with no types.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a definition from any collection of types. Duplicates collapse.
    pub fn from_types(types: impl IntoIterator<Item = ComponentTypeId>) -> Self {
        let mut types: Vec<ComponentTypeId> = types.into_iter().collect();
        types.sort_unstable();
        types.dedup();
        Self { types }
    }

    /// This definition plus `type_id`.
    pub fn with(&self, type_id: ComponentTypeId) -> Self {
        let mut types = self.types.clone();
        if let Err(pos) = types.binary_search(&type_id) {
            types.insert(pos, type_id);
        }
        Self { types }
    }

    /// This definition minus `type_id`.
    pub fn without(&self, type_id: ComponentTypeId) -> Self {
        let mut types = self.types.clone();
        if let Ok(pos) = types.binary_search(&type_id) {
            types.remove(pos);
        }
        Self { types }
    }

    #[inline]
    pub fn contains(&self, type_id: ComponentTypeId) -> bool {
        self.types.binary_search(&type_id).is_ok()
    }

    /// The types, ascending.
    #[inline]
    pub fn types(&self) -> &[ComponentTypeId] {
        &self.types
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.types.iter().copied()
    }
}

// ---------------------------------------------------------------------------
// ArchetypeEdge / ArchetypeRecord
// ---------------------------------------------------------------------------

/// A single-type transition out of an archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchetypeEdge {
    Add(ComponentTypeId),
    Remove(ComponentTypeId),
}

/// Where an entity's components physically live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchetypeRecord {
    pub archetype: ArchetypeId,
    pub row: usize,
}

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// Storage for all entities sharing one [`ArchetypeDefinition`].
///
/// Invariant: `entities.len() == storage.count()`, and `entities[row]` is the
/// entity whose values sit at `row` in every column.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    definition: ArchetypeDefinition,
    storage: ColumnSet,
    entities: Vec<Entity>,
    edges: HashMap<ArchetypeEdge, ArchetypeId>,
}

impl Archetype {
    /// Create an empty archetype.
    ///
    /// `infos` must describe exactly the types in `definition`.
    pub fn new(
        id: ArchetypeId,
        definition: ArchetypeDefinition,
        infos: &[ComponentInfo],
        growth: usize,
    ) -> Self {
        debug_assert_eq!(infos.len(), definition.len());
        Self {
            id,
            definition,
            storage: ColumnSet::new(infos, growth),
            entities: Vec::new(),
            edges: HashMap::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    #[inline]
    pub fn definition(&self) -> &ArchetypeDefinition {
        &self.definition
    }

    /// The sorted set of component types stored here.
    #[inline]
    pub fn component_types(&self) -> &[ComponentTypeId] {
        self.definition.types()
    }

    #[inline]
    pub fn has_component(&self, type_id: ComponentTypeId) -> bool {
        self.definition.contains(type_id)
    }

    /// Number of entities stored in this archetype.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Row-ordered entities.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The column storage.
    #[inline]
    pub fn storage(&self) -> &ColumnSet {
        &self.storage
    }

    #[inline]
    pub(crate) fn storage_mut(&mut self) -> &mut ColumnSet {
        &mut self.storage
    }

    /// Append `entity` with zeroed components and return its row.
    pub(crate) fn push_entity(&mut self, entity: Entity) -> usize {
        let row = self.storage.register_new();
        self.entities.push(entity);
        debug_assert_eq!(row + 1, self.entities.len());
        row
    }

    /// Swap-remove `row`.
    ///
    /// Returns the entity that now occupies `row`, or `None` if `row` was
    /// the last one.
    pub(crate) fn remove_row(&mut self, row: usize) -> Option<Entity> {
        let moved_from = self.storage.free_position(row);
        self.entities.swap_remove(row);
        moved_from.map(|_| self.entities[row])
    }

    /// Cached target for `edge`.
    #[inline]
    pub fn edge(&self, edge: ArchetypeEdge) -> Option<ArchetypeId> {
        self.edges.get(&edge).copied()
    }

    pub(crate) fn cache_edge(&mut self, edge: ArchetypeEdge, target: ArchetypeId) {
        self.edges.insert(edge, target);
    }

    /// Number of cached edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Row-ordered entities together with mutable spans for the requested
    /// columns (see [`ColumnSet::rows_mut_many`]).
    pub(crate) fn split_for_query(
        &mut self,
        wanted: &[Option<ComponentTypeId>],
    ) -> (&[Entity], Vec<Option<&mut [u8]>>) {
        let spans = self.storage.rows_mut_many(wanted);
        (&self.entities, spans)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRegistry;
    use crate::storage::{cast_slot, cast_slot_mut};
    use bytemuck::{Pod, Zeroable};

    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Vel {
        dx: f32,
        dy: f32,
    }

    fn setup() -> (ComponentRegistry, ComponentTypeId, ComponentTypeId) {
        let mut reg = ComponentRegistry::new();
        let pos_id = reg.register::<Pos>("position");
        let vel_id = reg.register::<Vel>("velocity");
        (reg, pos_id, vel_id)
    }

    fn archetype(reg: &ComponentRegistry, def: ArchetypeDefinition) -> Archetype {
        let infos: Vec<_> = def
            .iter()
            .map(|id| reg.get_info(id).unwrap().clone())
            .collect();
        Archetype::new(ArchetypeId(1), def, &infos, 4)
    }

    #[test]
    fn definition_ignores_order_and_duplicates() {
        let (_, pos_id, vel_id) = setup();
        let a = ArchetypeDefinition::from_types([pos_id, vel_id]);
        let b = ArchetypeDefinition::from_types([vel_id, pos_id, vel_id]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.types(), &[pos_id, vel_id]);
    }

    #[test]
    fn definition_with_and_without() {
        let (_, pos_id, vel_id) = setup();
        let base = ArchetypeDefinition::from_types([vel_id]);
        let grown = base.with(pos_id);
        assert_eq!(grown, ArchetypeDefinition::from_types([pos_id, vel_id]));
        assert_eq!(grown.with(pos_id), grown);
        assert_eq!(grown.without(vel_id), ArchetypeDefinition::from_types([pos_id]));
        assert!(grown.without(vel_id).without(pos_id).is_empty());
    }

    #[test]
    fn push_and_read_component() {
        let (reg, pos_id, _) = setup();
        let mut arch = archetype(&reg, ArchetypeDefinition::from_types([pos_id]));

        let entity = Entity::new(0, 0);
        let row = arch.push_entity(entity);
        *cast_slot_mut::<Pos>(arch.storage_mut().slot_mut(pos_id, row).unwrap()) =
            Pos { x: 1.0, y: 2.0 };

        assert_eq!(arch.len(), 1);
        assert_eq!(arch.entities(), &[entity]);
        let got: &Pos = cast_slot(arch.storage().slot(pos_id, row).unwrap());
        assert_eq!(got, &Pos { x: 1.0, y: 2.0 });
    }

    #[test]
    fn remove_row_reports_moved_entity() {
        let (reg, pos_id, vel_id) = setup();
        let mut arch = archetype(&reg, ArchetypeDefinition::from_types([pos_id, vel_id]));

        let e0 = Entity::new(0, 0);
        let e1 = Entity::new(1, 0);
        let e2 = Entity::new(2, 0);
        for (i, e) in [e0, e1, e2].into_iter().enumerate() {
            let row = arch.push_entity(e);
            *cast_slot_mut::<Vel>(arch.storage_mut().slot_mut(vel_id, row).unwrap()) =
                Vel { dx: i as f32, dy: 0.0 };
        }

        assert_eq!(arch.remove_row(0), Some(e2));
        assert_eq!(arch.entities(), &[e2, e1]);
        let moved: &Vel = cast_slot(arch.storage().slot(vel_id, 0).unwrap());
        assert_eq!(moved.dx, 2.0);

        assert_eq!(arch.remove_row(1), None);
        assert_eq!(arch.len(), 1);
        assert_eq!(arch.storage().count(), 1);
    }

    #[test]
    fn edges_are_cached_per_archetype() {
        let (reg, pos_id, vel_id) = setup();
        let mut arch = archetype(&reg, ArchetypeDefinition::from_types([pos_id]));
        assert_eq!(arch.edge(ArchetypeEdge::Add(vel_id)), None);

        arch.cache_edge(ArchetypeEdge::Add(vel_id), ArchetypeId(2));
        arch.cache_edge(ArchetypeEdge::Remove(pos_id), ArchetypeId::EMPTY);

        assert_eq!(arch.edge(ArchetypeEdge::Add(vel_id)), Some(ArchetypeId(2)));
        assert_eq!(arch.edge(ArchetypeEdge::Remove(pos_id)), Some(ArchetypeId::EMPTY));
        assert_eq!(arch.edge(ArchetypeEdge::Remove(vel_id)), None);
        assert_eq!(arch.edge_count(), 2);
    }
}
