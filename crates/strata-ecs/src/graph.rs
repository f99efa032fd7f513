//! The archetype graph.
//!
//! [`ArchetypeGraph`] owns every archetype, the definition → archetype table,
//! the reverse index from component type to the archetypes containing it, and
//! the entity → [`ArchetypeRecord`] map. It is the only place that moves
//! entities between archetypes.
//!
//! Archetypes are created on first use and never destroyed, so an
//! [`ArchetypeId`] and any edge pointing at it stay valid for the life of the
//! graph.

use crate::archetype::{Archetype, ArchetypeDefinition, ArchetypeEdge, ArchetypeId, ArchetypeRecord};
use crate::component::{ComponentInfo, ComponentRegistry, ComponentTypeId};
use crate::entity::Entity;
use crate::EcsError;

use std::collections::{BTreeSet, HashMap};

/// Archetype manager: placement, migration, and lookup of entities.
#[derive(Debug)]
pub struct ArchetypeGraph {
    /// Indexed by `ArchetypeId.0`; `archetypes[0]` is the empty archetype.
    archetypes: Vec<Archetype>,
    definition_index: HashMap<ArchetypeDefinition, ArchetypeId>,
    /// For each component type, every archetype that stores it.
    component_index: HashMap<ComponentTypeId, BTreeSet<ArchetypeId>>,
    /// Indexed by `Entity::index()`.
    records: Vec<Option<ArchetypeRecord>>,
    column_growth: usize,
}

impl ArchetypeGraph {
    /// Create a graph holding only the empty archetype.
    pub fn new(column_growth: usize) -> Self {
        let empty = Archetype::new(
            ArchetypeId::EMPTY,
            ArchetypeDefinition::empty(),
            &[],
            column_growth,
        );
        let mut definition_index = HashMap::new();
        definition_index.insert(ArchetypeDefinition::empty(), ArchetypeId::EMPTY);
        Self {
            archetypes: vec![empty],
            definition_index,
            component_index: HashMap::new(),
            records: Vec::new(),
            column_growth,
        }
    }

    // -- archetypes ---------------------------------------------------------

    /// Number of archetypes created so far (always at least one).
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// All archetypes in index order.
    #[inline]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// The archetype at `id`.
    pub fn archetype(&self, id: ArchetypeId) -> Result<&Archetype, EcsError> {
        let count = self.archetypes.len();
        self.archetypes
            .get(id.index())
            .ok_or(EcsError::InvalidArchetypeIndex {
                index: id.index(),
                count,
            })
    }

    pub(crate) fn archetype_mut(&mut self, id: ArchetypeId) -> Result<&mut Archetype, EcsError> {
        let count = self.archetypes.len();
        self.archetypes
            .get_mut(id.index())
            .ok_or(EcsError::InvalidArchetypeIndex {
                index: id.index(),
                count,
            })
    }

    /// The archetype with exactly `definition`, if it exists yet.
    pub fn find(&self, definition: &ArchetypeDefinition) -> Option<ArchetypeId> {
        self.definition_index.get(definition).copied()
    }

    /// Archetypes that store `type_id`, ascending.
    pub fn archetypes_with(&self, type_id: ComponentTypeId) -> Option<&BTreeSet<ArchetypeId>> {
        self.component_index.get(&type_id)
    }

    /// The archetype for `definition`, creating it if needed.
    pub fn get_or_create(
        &mut self,
        registry: &ComponentRegistry,
        definition: &ArchetypeDefinition,
    ) -> Result<ArchetypeId, EcsError> {
        if let Some(id) = self.find(definition) {
            return Ok(id);
        }

        let infos: Vec<ComponentInfo> = definition
            .iter()
            .map(|type_id| {
                registry
                    .get_info(type_id)
                    .cloned()
                    .ok_or(EcsError::UnknownComponent { id: type_id })
            })
            .collect::<Result<_, _>>()?;

        let id = ArchetypeId(self.archetypes.len() as u32);
        tracing::debug!(
            archetype = id.0,
            types = ?infos.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            "created archetype"
        );
        self.archetypes.push(Archetype::new(
            id,
            definition.clone(),
            &infos,
            self.column_growth,
        ));
        self.definition_index.insert(definition.clone(), id);
        for type_id in definition.iter() {
            self.component_index.entry(type_id).or_default().insert(id);
        }
        Ok(id)
    }

    /// Follow `edge` out of `from`, computing and caching the target on a miss.
    fn resolve_edge(
        &mut self,
        registry: &ComponentRegistry,
        from: ArchetypeId,
        edge: ArchetypeEdge,
    ) -> Result<ArchetypeId, EcsError> {
        if let Some(target) = self.archetypes[from.index()].edge(edge) {
            return Ok(target);
        }
        tracing::trace!(archetype = from.0, ?edge, "archetype edge cache miss");
        let current = self.archetypes[from.index()].definition();
        let next = match edge {
            ArchetypeEdge::Add(type_id) => current.with(type_id),
            ArchetypeEdge::Remove(type_id) => current.without(type_id),
        };
        let target = self.get_or_create(registry, &next)?;
        self.archetypes[from.index()].cache_edge(edge, target);
        Ok(target)
    }

    // -- entity records -----------------------------------------------------

    /// Where `entity` lives.
    ///
    /// Fails with `StaleEntity` if the entity is not registered or the row no
    /// longer points back at it.
    pub fn record(&self, entity: Entity) -> Result<ArchetypeRecord, EcsError> {
        let record = self
            .records
            .get(entity.index() as usize)
            .copied()
            .flatten()
            .ok_or(EcsError::StaleEntity { entity })?;
        let archetype = &self.archetypes[record.archetype.index()];
        if archetype.entities().get(record.row) != Some(&entity) {
            return Err(EcsError::StaleEntity { entity });
        }
        Ok(record)
    }

    /// Whether `entity` is currently placed in some archetype.
    pub fn contains(&self, entity: Entity) -> bool {
        self.record(entity).is_ok()
    }

    fn set_record(&mut self, entity: Entity, record: Option<ArchetypeRecord>) {
        let idx = entity.index() as usize;
        if idx >= self.records.len() {
            self.records.resize(idx + 1, None);
        }
        self.records[idx] = record;
    }

    fn place(&mut self, entity: Entity, archetype: ArchetypeId) -> ArchetypeRecord {
        debug_assert!(!self.contains(entity), "{entity:?} is already placed");
        let row = self.archetypes[archetype.index()].push_entity(entity);
        let record = ArchetypeRecord { archetype, row };
        self.set_record(entity, Some(record));
        record
    }

    /// Place a new entity in the empty archetype.
    pub fn register_empty_entity(&mut self, entity: Entity) -> ArchetypeRecord {
        self.place(entity, ArchetypeId::EMPTY)
    }

    /// Place a new entity directly in the archetype for `definition`, with
    /// every component zeroed.
    pub fn register_entity(
        &mut self,
        registry: &ComponentRegistry,
        entity: Entity,
        definition: &ArchetypeDefinition,
    ) -> Result<ArchetypeRecord, EcsError> {
        let archetype = self.get_or_create(registry, definition)?;
        Ok(self.place(entity, archetype))
    }

    /// Remove `entity` from its archetype and forget its record.
    pub fn unregister(&mut self, entity: Entity) -> Result<ArchetypeRecord, EcsError> {
        let record = self.record(entity)?;
        self.vacate(record);
        self.set_record(entity, None);
        Ok(record)
    }

    /// Swap-remove `record.row` and repoint the entity that moved into it.
    fn vacate(&mut self, record: ArchetypeRecord) {
        if let Some(moved) = self.archetypes[record.archetype.index()].remove_row(record.row) {
            self.set_record(moved, Some(record));
        }
    }

    // -- migration ----------------------------------------------------------

    /// Move `entity` from `from` into archetype `to`, carrying every shared
    /// component's bytes. Components only `to` has start zeroed.
    fn migrate(&mut self, entity: Entity, from: ArchetypeRecord, to: ArchetypeId) -> ArchetypeRecord {
        debug_assert_ne!(from.archetype, to);
        let (src, dst) = pair_mut(&mut self.archetypes, from.archetype.index(), to.index());
        let row = dst.push_entity(entity);
        src.storage().copy_to(from.row, dst.storage_mut(), row);
        self.vacate(from);

        let record = ArchetypeRecord { archetype: to, row };
        self.set_record(entity, Some(record));
        record
    }

    /// Add `type_id` to `entity` and write `bytes` into the new slot.
    ///
    /// Validation happens before anything moves: a failed call leaves the
    /// entity where it was.
    pub fn add_component(
        &mut self,
        registry: &ComponentRegistry,
        entity: Entity,
        type_id: ComponentTypeId,
        bytes: &[u8],
    ) -> Result<ArchetypeRecord, EcsError> {
        let record = self.record(entity)?;
        let info = registry
            .get_info(type_id)
            .ok_or(EcsError::UnknownComponent { id: type_id })?;
        if self.archetypes[record.archetype.index()].has_component(type_id) {
            return Err(EcsError::DuplicatedComponent {
                entity,
                component: info.name.clone(),
            });
        }
        if bytes.len() != info.size {
            return Err(EcsError::DataSizeMismatch {
                component: info.name.clone(),
                expected: info.size,
                actual: bytes.len(),
            });
        }

        let target = self.resolve_edge(registry, record.archetype, ArchetypeEdge::Add(type_id))?;
        let moved = self.migrate(entity, record, target);

        // The new row was zeroed on allocation; the value goes in last.
        if let Some(slot) = self.archetypes[target.index()]
            .storage_mut()
            .slot_mut(type_id, moved.row)
        {
            slot.copy_from_slice(bytes);
        }
        Ok(moved)
    }

    /// Remove `type_id` from `entity`, dropping its bytes.
    pub fn remove_component(
        &mut self,
        registry: &ComponentRegistry,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<ArchetypeRecord, EcsError> {
        let record = self.record(entity)?;
        if !self.archetypes[record.archetype.index()].has_component(type_id) {
            return Err(EcsError::MissingComponent {
                entity,
                component: registry.name_of(type_id),
            });
        }
        let target = self.resolve_edge(registry, record.archetype, ArchetypeEdge::Remove(type_id))?;
        Ok(self.migrate(entity, record, target))
    }

    // -- component access ---------------------------------------------------

    /// The type set of `entity`'s archetype.
    pub fn component_types(&self, entity: Entity) -> Result<&ArchetypeDefinition, EcsError> {
        let record = self.record(entity)?;
        Ok(self.archetypes[record.archetype.index()].definition())
    }

    /// Whether `entity` has `type_id`.
    pub fn has_component(&self, entity: Entity, type_id: ComponentTypeId) -> Result<bool, EcsError> {
        Ok(self.component_types(entity)?.contains(type_id))
    }

    /// Live bytes of `type_id` for `entity`.
    ///
    /// The slice is only valid until the next structural change to the
    /// entity's archetype.
    pub fn component_bytes(
        &self,
        registry: &ComponentRegistry,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<&[u8], EcsError> {
        let record = self.record(entity)?;
        self.archetypes[record.archetype.index()]
            .storage()
            .slot(type_id, record.row)
            .ok_or_else(|| EcsError::MissingComponent {
                entity,
                component: registry.name_of(type_id),
            })
    }

    /// Mutable live bytes of `type_id` for `entity`.
    pub fn component_bytes_mut(
        &mut self,
        registry: &ComponentRegistry,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<&mut [u8], EcsError> {
        let record = self.record(entity)?;
        self.archetypes[record.archetype.index()]
            .storage_mut()
            .slot_mut(type_id, record.row)
            .ok_or_else(|| EcsError::MissingComponent {
                entity,
                component: registry.name_of(type_id),
            })
    }
}

/// Two distinct elements of `items` borrowed mutably at once.
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "pair_mut requires distinct indices");
    if a < b {
        let (head, tail) = items.split_at_mut(b);
        (&mut head[a], &mut tail[0])
    } else {
        let (head, tail) = items.split_at_mut(a);
        (&mut tail[0], &mut head[b])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
