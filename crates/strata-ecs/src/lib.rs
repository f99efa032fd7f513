//! Strata ECS -- archetype-based Entity Component System over columnar byte
//! storage.
//!
//! Entities are grouped by their exact set of component types into
//! archetypes. Each archetype keeps one dense, zero-initialised byte column per
//! component type, so iteration walks contiguous memory and a migration
//! between archetypes is a handful of slot copies. Components are plain
//! [`bytemuck::Pod`] records, which is what lets the world hand out raw bytes
//! for serialization and accept them back.
//!
//! # Quick Start
//!
//! ```
//! use strata_ecs::prelude::*;
//! use bytemuck::{Pod, Zeroable};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
//! #[repr(C)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
//! #[repr(C)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut world = World::new();
//! world.register_component::<Position>("position");
//! world.register_component::<Velocity>("velocity");
//!
//! let entity = world.create_entity();
//! world.add_component(entity, Position { x: 0.0, y: 0.0 }).unwrap();
//! world.add_component(entity, Velocity { dx: 1.0, dy: 0.5 }).unwrap();
//!
//! world.query::<(Position, Velocity), _>(
//!     &Filter::all::<(Position, Velocity)>(),
//!     |_, (mut pos, vel)| {
//!         pos.x += vel.dx;
//!         pos.y += vel.dy;
//!     },
//! );
//!
//! assert_eq!(world.get_component::<Position>(entity).unwrap(), &Position { x: 1.0, y: 0.5 });
//! ```

#![deny(unsafe_code)]

pub mod archetype;
pub mod component;
pub mod entity;
pub mod graph;
pub mod query;
#[allow(unsafe_code)]
pub mod storage;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
///
/// Every operation validates before it mutates, so an `Err` means nothing
/// changed.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity already has a component of this type.
    #[error("entity {entity:?} already has component '{component}'")]
    DuplicatedComponent {
        entity: entity::Entity,
        component: String,
    },

    /// The entity has no component of this type.
    #[error("entity {entity:?} has no component '{component}'")]
    MissingComponent {
        entity: entity::Entity,
        component: String,
    },

    /// An archetype id past the end of the archetype list.
    #[error("archetype index {index} out of range ({count} archetypes)")]
    InvalidArchetypeIndex { index: usize, count: usize },

    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::Entity },

    /// A component type id that was never registered.
    #[error("component type {id:?} is not registered")]
    UnknownComponent { id: component::ComponentTypeId },

    /// A registration name already held by a different type.
    #[error("component name '{name}' is already registered for a different type")]
    ComponentNameTaken { name: String },

    /// Raw component bytes of the wrong length.
    #[error("component '{component}' is {expected} bytes, got {actual}")]
    DataSizeMismatch {
        component: String,
        expected: usize,
        actual: usize,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeDefinition, ArchetypeEdge, ArchetypeId, ArchetypeRecord};
    pub use crate::component::{Component, ComponentInfo, ComponentRegistry, ComponentTypeId};
    pub use crate::entity::Entity;
    pub use crate::query::{Comp, ComponentSet, Filter, QueryParams};
    pub use crate::world::{ComponentData, EntityInfo, ListenerId, World, WorldConfig};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use bytemuck::{Pod, Zeroable};

    // -- test component types -----------------------------------------------

    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Health(u32);

    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct A(u8);

    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct B(u16);

    fn setup_world() -> World {
        let mut world = World::new();
        world.register_component::<Position>("position");
        world.register_component::<Velocity>("velocity");
        world.register_component::<Health>("health");
        world
    }

    fn spawn_pos(world: &mut World, x: f32) -> Entity {
        let e = world.create_entity();
        world.add_component(e, Position { x, y: 0.0 }).unwrap();
        e
    }

    // -- archetype identity and migration -----------------------------------

    #[test]
    fn same_types_different_order_share_archetype() {
        let mut world = setup_world();
        let a = world.create_entity();
        world.add_component(a, Position { x: 0.0, y: 0.0 }).unwrap();
        world.add_component(a, Velocity { dx: 0.0, dy: 0.0 }).unwrap();

        let b = world.create_entity();
        world.add_component(b, Velocity { dx: 0.0, dy: 0.0 }).unwrap();
        world.add_component(b, Position { x: 0.0, y: 0.0 }).unwrap();

        assert_eq!(world.archetype_of(a).unwrap(), world.archetype_of(b).unwrap());
    }

    #[test]
    fn migration_preserves_values() {
        let mut world = setup_world();
        let e = world.create_entity();
        world.add_component(e, Position { x: 0.0, y: 3.0 }).unwrap();
        world.get_component_mut::<Position>(e).unwrap().x = 7.0;

        world.add_component(e, Velocity { dx: 1.0, dy: 1.0 }).unwrap();
        assert_eq!(world.get_component::<Position>(e).unwrap().x, 7.0);

        world.remove_component::<Velocity>(e).unwrap();
        assert_eq!(
            world.get_component::<Position>(e).unwrap(),
            &Position { x: 7.0, y: 3.0 }
        );
        assert!(!world.has::<Velocity>(e));
    }

    #[test]
    fn new_entities_start_in_empty_archetype() {
        let mut world = setup_world();
        let e = world.create_entity();
        assert_eq!(world.archetype_of(e).unwrap(), ArchetypeId::EMPTY);
        assert!(world.all_component_types(e).unwrap().is_empty());
    }

    #[test]
    fn destroy_keeps_other_entities_intact() {
        let mut world = setup_world();
        let e1 = spawn_pos(&mut world, 1.0);
        let e2 = spawn_pos(&mut world, 2.0);
        let e3 = spawn_pos(&mut world, 3.0);

        world.destroy_entity(e1).unwrap();
        assert_eq!(world.entity_count(), 2);
        assert!(!world.is_alive(e1));
        assert_eq!(world.get_component::<Position>(e2).unwrap().x, 2.0);
        assert_eq!(world.get_component::<Position>(e3).unwrap().x, 3.0);
    }

    #[test]
    fn destroyed_ids_are_reused_with_new_generation() {
        let mut world = setup_world();
        let e = world.create_entity();
        world.destroy_entity(e).unwrap();
        let again = world.create_entity();
        assert_eq!(again.index(), e.index());
        assert_ne!(again, e);
    }

    #[test]
    fn archetypes_persist_when_empty() {
        let mut world = setup_world();
        let e = spawn_pos(&mut world, 0.0);
        let arch = world.archetype_of(e).unwrap();
        world.destroy_entity(e).unwrap();

        let count = world.archetype_count();
        assert!(world.archetype(arch).unwrap().is_empty());
        let again = spawn_pos(&mut world, 1.0);
        assert_eq!(world.archetype_of(again).unwrap(), arch);
        assert_eq!(world.archetype_count(), count);
    }

    // -- density ------------------------------------------------------------

    #[test]
    fn columns_stay_dense_under_churn() {
        let mut world = setup_world();
        let entities: Vec<Entity> = (0..50).map(|i| spawn_pos(&mut world, i as f32)).collect();
        for (i, &e) in entities.iter().enumerate() {
            if i % 3 == 0 {
                world.add_component(e, Health(i as u32)).unwrap();
            }
            if i % 5 == 0 {
                world.remove_component::<Position>(e).unwrap();
            }
        }
        for &e in entities.iter().step_by(7) {
            world.destroy_entity(e).unwrap();
        }

        for archetype in world.graph().archetypes() {
            assert_eq!(archetype.storage().count(), archetype.len());
            for (row, &entity) in archetype.entities().iter().enumerate() {
                let record = world.graph().record(entity).unwrap();
                assert_eq!(record.archetype, archetype.id());
                assert_eq!(record.row, row);
            }
        }
        for (i, &e) in entities.iter().enumerate() {
            if i % 7 != 0 && i % 5 != 0 {
                assert_eq!(world.get_component::<Position>(e).unwrap().x, i as f32);
            }
        }
    }

    // -- queries ------------------------------------------------------------

    /// Entities with {A}, {A, B}, {B} and {}.
    fn query_world() -> (World, [Entity; 4]) {
        let mut world = World::new();
        let only_a = world.create_entity();
        world.add_component(only_a, A(1)).unwrap();
        let both = world.create_entity();
        world.add_component(both, A(2)).unwrap();
        world.add_component(both, B(20)).unwrap();
        let only_b = world.create_entity();
        world.add_component(only_b, B(30)).unwrap();
        let nothing = world.create_entity();
        (world, [only_a, both, only_b, nothing])
    }

    fn sorted(mut entities: Vec<Entity>) -> Vec<Entity> {
        entities.sort();
        entities
    }

    #[test]
    fn query_set_algebra() {
        let (world, [only_a, both, only_b, _]) = query_world();
        assert_eq!(sorted(world.query_entities(&Filter::all::<(A,)>())), vec![only_a, both]);
        assert_eq!(
            world.query_entities(&Filter::all::<(A,)>().with_none::<(B,)>()),
            vec![only_a]
        );
        assert_eq!(
            sorted(world.query_entities(&Filter::any::<(A, B)>())),
            vec![only_a, both, only_b]
        );
        assert!(world.query_entities(&Filter::new()).is_empty());
    }

    #[test]
    fn typed_query_reports_absent_components() {
        let (mut world, [only_a, both, only_b, _]) = query_world();
        let mut seen = Vec::new();
        world.query::<(A, B), _>(&Filter::any::<(A, B)>(), |entity, (a, b)| {
            seen.push((entity, a.get().map(|a| a.0), b.get().map(|b| b.0)));
        });
        seen.sort_by_key(|(e, _, _)| *e);
        assert_eq!(
            seen,
            vec![
                (only_a, Some(1), None),
                (both, Some(2), Some(20)),
                (only_b, None, Some(30)),
            ]
        );
    }

    #[test]
    fn mutable_query_modifies_components() {
        let mut world = setup_world();
        let e = world.create_entity();
        world.add_component(e, Position { x: 0.0, y: 0.0 }).unwrap();
        world.add_component(e, Velocity { dx: 1.0, dy: 2.0 }).unwrap();

        world.query::<(Position, Velocity), _>(
            &Filter::all::<(Position, Velocity)>(),
            |_, (mut pos, vel)| {
                pos.x += vel.dx;
                pos.y += vel.dy;
            },
        );

        assert_eq!(
            world.get_component::<Position>(e).unwrap(),
            &Position { x: 1.0, y: 2.0 }
        );
    }

    #[test]
    fn six_component_query() {
        #[derive(Clone, Copy, Pod, Zeroable)]
        #[repr(C)]
        struct C(u8);
        #[derive(Clone, Copy, Pod, Zeroable)]
        #[repr(C)]
        struct D(u8);
        #[derive(Clone, Copy, Pod, Zeroable)]
        #[repr(C)]
        struct Frozen;

        let mut world = setup_world();
        let e = world.create_entity();
        world.add_component(e, Position { x: 1.0, y: 0.0 }).unwrap();
        world.add_component(e, Velocity { dx: 2.0, dy: 0.0 }).unwrap();
        world.add_component(e, Health(3)).unwrap();
        world.add_component(e, A(4)).unwrap();
        world.add_component(e, B(5)).unwrap();
        world.add_component(e, C(6)).unwrap();
        world.add_component(e, D(0)).unwrap();

        let mut sum = 0.0;
        world.query::<(Position, Velocity, Health, A, B, C), _>(
            &Filter::all::<(Position,)>().with_none::<(Frozen,)>(),
            |_, (p, v, h, a, b, c)| {
                sum = p.x + v.dx + h.0 as f32 + a.0 as f32 + b.0 as f32 + c.0 as f32;
            },
        );
        assert_eq!(sum, 21.0);
    }

    #[test]
    fn scale_10k_entities() {
        let mut world = setup_world();

        let mut entities = Vec::with_capacity(10_000);
        for i in 0..10_000u32 {
            let e = world.create_entity();
            world
                .add_component(e, Position { x: i as f32, y: i as f32 * 2.0 })
                .unwrap();
            world.add_component(e, Velocity { dx: 1.0, dy: -1.0 }).unwrap();
            entities.push(e);
        }

        let filter = Filter::all::<(Position, Velocity)>();
        assert_eq!(world.query_entities(&filter).len(), 10_000);

        world.query::<(Velocity,), _>(&filter, |_, (mut vel,)| {
            vel.dx *= 2.0;
            vel.dy *= 2.0;
        });
        let vel = world.get_component::<Velocity>(entities[0]).unwrap();
        assert_eq!(vel.dx, 2.0);
        assert_eq!(vel.dy, -2.0);

        for e in entities.iter().take(5_000) {
            world.destroy_entity(*e).unwrap();
        }
        assert_eq!(world.query_entities(&filter).len(), 5_000);
        assert_eq!(world.entity_count(), 5_000);
    }

    // -- error contracts ----------------------------------------------------

    #[test]
    fn duplicated_component_leaves_entity_unchanged() {
        let mut world = setup_world();
        let e = spawn_pos(&mut world, 5.0);
        let arch = world.archetype_of(e).unwrap();
        let archetypes = world.archetype_count();

        let err = world.add_component(e, Position { x: 9.0, y: 9.0 }).unwrap_err();
        assert!(matches!(err, EcsError::DuplicatedComponent { .. }));
        assert!(err.to_string().contains("position"));
        assert_eq!(world.archetype_of(e).unwrap(), arch);
        assert_eq!(world.archetype_count(), archetypes);
        assert_eq!(world.get_component::<Position>(e).unwrap().x, 5.0);
    }

    #[test]
    fn missing_component_on_remove_and_get() {
        let mut world = setup_world();
        let e = world.create_entity();
        assert!(matches!(
            world.remove_component::<Health>(e),
            Err(EcsError::MissingComponent { .. })
        ));
        assert!(matches!(
            world.get_component::<Health>(e),
            Err(EcsError::MissingComponent { .. })
        ));
    }

    #[test]
    fn invalid_archetype_index() {
        let world = setup_world();
        let err = world.archetype(ArchetypeId(1000)).unwrap_err();
        assert!(matches!(err, EcsError::InvalidArchetypeIndex { index: 1000, .. }));
    }

    // -- raw bytes ----------------------------------------------------------

    #[test]
    fn raw_bytes_round_trip() {
        let mut world = setup_world();
        let e = world.create_entity();
        world.add_component(e, Position { x: 1.5, y: -2.5 }).unwrap();
        world.add_component(e, Health(77)).unwrap();

        let mut copy = setup_world();
        for info in world.get_all_info() {
            let types: Vec<ComponentTypeId> = info.components.iter().map(|c| c.type_id).collect();
            let clone = copy.create_entity_with_components(&types).unwrap();
            for component in &info.components {
                copy.set_data(clone, component.type_id, &component.bytes).unwrap();
            }
            assert_eq!(
                copy.get_component::<Position>(clone).unwrap(),
                world.get_component::<Position>(info.entity).unwrap()
            );
            assert_eq!(
                copy.get_component::<Health>(clone).unwrap(),
                world.get_component::<Health>(info.entity).unwrap()
            );
        }
    }
}
