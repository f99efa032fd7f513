//! The [`World`] is the top-level container for the ECS. It owns the entity
//! allocator, the component registry, and the archetype graph, and is the
//! surface everything outside the crate talks to.

use serde::{Deserialize, Serialize};

use crate::archetype::{Archetype, ArchetypeDefinition, ArchetypeId};
use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::entity::{Entity, EntityAllocator};
use crate::graph::ArchetypeGraph;
use crate::query::{self, Filter, QueryParams};
use crate::storage::{cast_slot, cast_slot_mut, DEFAULT_COLUMN_GROWTH};
use crate::EcsError;

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// Tunables for a [`World`].
///
/// Missing fields take their defaults when deserialized, so a partial
/// document such as `{}` is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Rows added to an archetype's columns each time they fill up.
    pub column_growth: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            column_growth: DEFAULT_COLUMN_GROWTH,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw component data
// ---------------------------------------------------------------------------

/// One component's bytes, as reported by [`World::get_all_info`].
///
/// `bytes` is the host-native layout of the type; it only round-trips into a
/// world built by the same binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentData {
    pub type_id: ComponentTypeId,
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Every component of one entity, ascending by type id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub entity: Entity,
    pub components: Vec<ComponentData>,
}

// ---------------------------------------------------------------------------
// Destroy listeners
// ---------------------------------------------------------------------------

/// Handle returned by [`World::on_destroy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type DestroyListener = Box<dyn FnMut(Entity) + Send>;

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The ECS world: entities, their components, and queries over them.
pub struct World {
    allocator: EntityAllocator,
    registry: ComponentRegistry,
    graph: ArchetypeGraph,
    destroy_listeners: Vec<(ListenerId, DestroyListener)>,
    next_listener: u64,
    config: WorldConfig,
}

impl World {
    /// Create an empty world with the default configuration.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create an empty world. A `column_growth` of zero is raised to one.
    pub fn with_config(mut config: WorldConfig) -> Self {
        config.column_growth = config.column_growth.max(1);
        tracing::debug!(column_growth = config.column_growth, "configured world");
        Self {
            allocator: EntityAllocator::new(),
            registry: ComponentRegistry::new(),
            graph: ArchetypeGraph::new(config.column_growth),
            destroy_listeners: Vec::new(),
            next_listener: 0,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Read-only access to the component registry.
    #[inline]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Read-only access to the archetype graph.
    #[inline]
    pub fn graph(&self) -> &ArchetypeGraph {
        &self.graph
    }

    /// Register component type `T` under `name`.
    ///
    /// Typed operations register unknown types on their own, named after the
    /// Rust type; register explicitly to pick a stable name.
    ///
    /// # Panics
    ///
    /// Panics if `name` already belongs to a different type.
    pub fn register_component<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        self.registry.register::<T>(name)
    }

    /// Id of `T`, if registered.
    pub fn component_id<T: Component>(&self) -> Option<ComponentTypeId> {
        self.registry.lookup::<T>()
    }

    fn ensure_alive(&self, entity: Entity) -> Result<(), EcsError> {
        if self.allocator.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::StaleEntity { entity })
        }
    }

    fn missing<T>(entity: Entity) -> EcsError {
        EcsError::MissingComponent {
            entity,
            component: std::any::type_name::<T>().to_owned(),
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Create an entity with no components.
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.allocator.allocate();
        self.graph.register_empty_entity(entity);
        entity
    }

    /// Create an entity directly in the archetype for `types`, skipping the
    /// intermediate migrations. Duplicates collapse; every slot starts zeroed.
    pub fn create_entity_with_components(
        &mut self,
        types: &[ComponentTypeId],
    ) -> Result<Entity, EcsError> {
        let definition = ArchetypeDefinition::from_types(types.iter().copied());
        // Resolve first so an unknown id does not leak an allocated entity.
        self.graph.get_or_create(&self.registry, &definition)?;
        let entity = self.allocator.allocate();
        self.graph.register_entity(&self.registry, entity, &definition)?;
        Ok(entity)
    }

    /// Destroy `entity`.
    ///
    /// The entity leaves storage first, then every destroy listener runs in
    /// registration order, then the id is released for reuse.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        self.graph.unregister(entity)?;
        tracing::trace!(entity = %entity, "destroyed entity");
        for (_, listener) in &mut self.destroy_listeners {
            listener(entity);
        }
        self.allocator.deallocate(entity);
        Ok(())
    }

    /// Call `listener` with every entity destroyed from now on.
    pub fn on_destroy<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(Entity) + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.destroy_listeners.push((id, Box::new(listener)));
        id
    }

    /// Unregister a destroy listener. Returns `false` if `id` is unknown.
    pub fn remove_destroy_listener(&mut self, id: ListenerId) -> bool {
        let before = self.destroy_listeners.len();
        self.destroy_listeners.retain(|(listener_id, _)| *listener_id != id);
        self.destroy_listeners.len() != before
    }

    /// Whether `entity` is alive (and not a stale handle).
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of alive entities.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    /// Every alive entity, in index order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.allocator.iter_alive()
    }

    // -- typed component access --------------------------------------------

    /// Add `value` to `entity`, moving it to the archetype with `T` added.
    ///
    /// Fails with `DuplicatedComponent` if `entity` already has a `T`; the
    /// entity is left untouched. An unregistered `T` is registered under its
    /// Rust type name, which fails with `ComponentNameTaken` if a different
    /// type already holds that name.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        let type_id = self.registry.register_implicit::<T>()?;
        self.graph
            .add_component(&self.registry, entity, type_id, bytemuck::bytes_of(&value))?;
        Ok(())
    }

    /// Remove `T` from `entity`, moving it to the archetype without `T`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        let type_id = self
            .registry
            .lookup::<T>()
            .ok_or_else(|| Self::missing::<T>(entity))?;
        self.graph.remove_component(&self.registry, entity, type_id)?;
        Ok(())
    }

    /// Shared reference to `entity`'s `T`.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<&T, EcsError> {
        self.ensure_alive(entity)?;
        let type_id = self
            .registry
            .lookup::<T>()
            .ok_or_else(|| Self::missing::<T>(entity))?;
        let bytes = self.graph.component_bytes(&self.registry, entity, type_id)?;
        Ok(cast_slot(bytes))
    }

    /// Mutable reference to `entity`'s `T`.
    ///
    /// The borrow ends before any other entity can be added to or removed
    /// from the archetype, so it can never observe a swap-remove.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        self.ensure_alive(entity)?;
        let type_id = self
            .registry
            .lookup::<T>()
            .ok_or_else(|| Self::missing::<T>(entity))?;
        let bytes = self
            .graph
            .component_bytes_mut(&self.registry, entity, type_id)?;
        Ok(cast_slot_mut(bytes))
    }

    /// Whether `entity` is alive and has `T`.
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.registry
            .lookup::<T>()
            .is_some_and(|type_id| self.has_component(entity, type_id))
    }

    /// Whether `entity` is alive and has `type_id`.
    pub fn has_component(&self, entity: Entity, type_id: ComponentTypeId) -> bool {
        self.is_alive(entity) && self.graph.has_component(entity, type_id).unwrap_or(false)
    }

    /// The component types of `entity`, ascending.
    pub fn all_component_types(&self, entity: Entity) -> Result<&[ComponentTypeId], EcsError> {
        self.ensure_alive(entity)?;
        Ok(self.graph.component_types(entity)?.types())
    }

    // -- archetypes ---------------------------------------------------------

    /// Number of archetypes created so far, including the empty one.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.graph.archetype_count()
    }

    /// The archetype `entity` currently lives in.
    pub fn archetype_of(&self, entity: Entity) -> Result<ArchetypeId, EcsError> {
        self.ensure_alive(entity)?;
        Ok(self.graph.record(entity)?.archetype)
    }

    /// The archetype at `id`.
    pub fn archetype(&self, id: ArchetypeId) -> Result<&Archetype, EcsError> {
        self.graph.archetype(id)
    }

    // -- queries ------------------------------------------------------------

    /// Call `visitor` once per entity matched by `filter`, with one
    /// [`Comp`](crate::query::Comp) per type in `Q`.
    ///
    /// Archetypes are visited in ascending index order, rows in ascending
    /// order. A `Comp` is empty when the entity's archetype lacks that type,
    /// which happens for types matched through `any` or not in the filter.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names the same type twice.
    ///
    /// The world stays mutably borrowed while the visitor runs, so it cannot
    /// reshape storage mid-iteration:
    ///
    /// ```compile_fail
    /// use strata_ecs::prelude::*;
    /// use bytemuck::{Pod, Zeroable};
    ///
    /// #[derive(Clone, Copy, Pod, Zeroable)]
    /// #[repr(C)]
    /// struct Hp(u32);
    ///
    /// let mut world = World::new();
    /// let e = world.create_entity();
    /// world.add_component(e, Hp(1)).unwrap();
    /// world.query::<(Hp,), _>(&Filter::all::<(Hp,)>(), |entity, _| {
    ///     world.destroy_entity(entity).unwrap();
    /// });
    /// ```
    pub fn query<Q, F>(&mut self, filter: &Filter, visitor: F)
    where
        Q: QueryParams,
        F: for<'r> FnMut(Entity, Q::Item<'r>),
    {
        query::run::<Q, F>(&mut self.graph, &self.registry, filter, visitor);
    }

    /// The entities matched by `filter`, in visiting order.
    pub fn query_entities(&self, filter: &Filter) -> Vec<Entity> {
        query::matching_entities(&self.graph, &self.registry, filter)
    }

    // -- raw bytes ----------------------------------------------------------

    /// Snapshot of every entity and the bytes of each of its components.
    ///
    /// Ordered by archetype, then row; components ascend by type id.
    pub fn get_all_info(&self) -> Vec<EntityInfo> {
        let mut out = Vec::with_capacity(self.entity_count());
        for archetype in self.graph.archetypes() {
            let storage = archetype.storage();
            for (row, &entity) in archetype.entities().iter().enumerate() {
                let components = archetype
                    .component_types()
                    .iter()
                    .filter_map(|&type_id| {
                        let bytes = storage.slot(type_id, row)?;
                        Some(ComponentData {
                            type_id,
                            name: self.registry.name_of(type_id),
                            bytes: bytes.to_vec(),
                        })
                    })
                    .collect();
                out.push(EntityInfo { entity, components });
            }
        }
        out
    }

    /// Bytes of `entity`'s `type_id` component.
    pub fn component_bytes(&self, entity: Entity, type_id: ComponentTypeId) -> Result<&[u8], EcsError> {
        self.ensure_alive(entity)?;
        self.graph.component_bytes(&self.registry, entity, type_id)
    }

    /// Overwrite `entity`'s `type_id` component with `bytes`.
    ///
    /// `bytes` must be exactly the registered size of the type.
    pub fn set_data(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
        bytes: &[u8],
    ) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        let info = self
            .registry
            .get_info(type_id)
            .ok_or(EcsError::UnknownComponent { id: type_id })?;
        let (expected, name) = (info.size, info.name.clone());
        let slot = self
            .graph
            .component_bytes_mut(&self.registry, entity, type_id)?;
        if bytes.len() != expected {
            return Err(EcsError::DataSizeMismatch {
                component: name,
                expected,
                actual: bytes.len(),
            });
        }
        slot.copy_from_slice(bytes);
        Ok(())
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entity_count())
            .field("archetypes", &self.archetype_count())
            .field(
                "components",
                &self.registry.iter().map(|info| info.name.as_str()).collect::<Vec<_>>(),
            )
            .field("destroy_listeners", &self.destroy_listeners.len())
            .field("config", &self.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
