//! Component bounds, type ids and the registry.
//!
//! Components are fixed-layout value records: anything that is
//! [`bytemuck::Pod`]. Each Rust type is assigned a dense [`ComponentTypeId`]
//! the first time it is registered, and that id is what archetype
//! definitions, columns, and queries are keyed by.

use serde::{Deserialize, Serialize};

use crate::EcsError;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Marker for types that can be stored in a column.
///
/// `Pod` rules out padding, pointers and invalid bit patterns, so a value can
/// be copied slot-to-slot as raw bytes and an all-zero slot is always a valid
/// value. Implemented for every eligible type; never implement it by hand.
///
/// ```
/// use bytemuck::{Pod, Zeroable};
///
/// #[derive(Clone, Copy, Pod, Zeroable)]
/// #[repr(C)]
/// struct Position {
///     x: f32,
///     y: f32,
/// }
///
/// fn assert_component<T: strata_ecs::component::Component>() {}
/// assert_component::<Position>();
/// ```
pub trait Component: bytemuck::Pod + Send + Sync + 'static {}

impl<T: bytemuck::Pod + Send + Sync + 'static> Component for T {}

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Dense identifier of a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    /// Position of this type in registration order.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Layout and naming metadata for a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Id assigned at registration.
    pub id: ComponentTypeId,
    /// Registered name, used in error messages and by name lookups.
    pub name: String,
    /// `std::mem::size_of::<T>()`
    pub size: usize,
    /// `std::mem::align_of::<T>()`
    pub align: usize,
    /// Rust `TypeId` of the registered type.
    pub type_id: TypeId,
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Maps Rust types to [`ComponentTypeId`]s and keeps their metadata.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    by_name: HashMap<String, ComponentTypeId>,
    /// Indexed by `ComponentTypeId.0`.
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `name`.
    ///
    /// Registering a type again returns its existing id and ignores `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already taken by a different type.
    pub fn register<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        match self.try_register::<T>(name) {
            Ok(id) => id,
            Err(err) => panic!("{err}"),
        }
    }

    /// Like [`register`](Self::register), but reports a name clash as
    /// [`EcsError::ComponentNameTaken`].
    pub fn try_register<T: Component>(&mut self, name: &str) -> Result<ComponentTypeId, EcsError> {
        let rust_type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&rust_type_id) {
            return Ok(existing);
        }
        if self.by_name.contains_key(name) {
            return Err(EcsError::ComponentNameTaken {
                name: name.to_owned(),
            });
        }

        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            id,
            name: name.to_owned(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            type_id: rust_type_id,
        });
        self.by_type.insert(rust_type_id, id);
        self.by_name.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Register `T` under its Rust type name unless it is already known.
    ///
    /// Fails if another type was explicitly registered under that name.
    pub fn register_implicit<T: Component>(&mut self) -> Result<ComponentTypeId, EcsError> {
        match self.lookup::<T>() {
            Some(id) => Ok(id),
            None => self.try_register::<T>(std::any::type_name::<T>()),
        }
    }

    /// Id of `T`, if registered.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.lookup_type_id(TypeId::of::<T>())
    }

    /// Id for a Rust `TypeId`, if registered.
    pub fn lookup_type_id(&self, type_id: TypeId) -> Option<ComponentTypeId> {
        self.by_type.get(&type_id).copied()
    }

    /// Id registered under `name`.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    /// Metadata for `id`.
    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    /// Registered name of `id`, or a placeholder for unknown ids.
    pub(crate) fn name_of(&self, id: ComponentTypeId) -> String {
        match self.get_info(id) {
            Some(info) => info.name.clone(),
            None => format!("{id:?}"),
        }
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// All registered metadata, in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[derive(Debug, Clone, Copy, Pod, Zeroable)]
    #[repr(C)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, Pod, Zeroable)]
    #[repr(C)]
    struct Vel {
        dx: f64,
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>("position");
        assert_eq!(reg.lookup::<Pos>(), Some(id));
        assert_eq!(reg.lookup_by_name("position"), Some(id));
        assert_eq!(reg.lookup::<Vel>(), None);
    }

    #[test]
    fn same_type_same_id() {
        let mut reg = ComponentRegistry::new();
        let id1 = reg.register::<Pos>("position");
        let id2 = reg.register::<Pos>("position_again");
        assert_eq!(id1, id2);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup_by_name("position_again"), None);
    }

    #[test]
    fn ids_are_dense() {
        let mut reg = ComponentRegistry::new();
        let p = reg.register::<Pos>("position");
        let v = reg.register::<Vel>("velocity");
        assert_eq!(p.index(), 0);
        assert_eq!(v.index(), 1);
    }

    #[test]
    fn info_records_layout() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Vel>("velocity");
        let info = reg.get_info(id).unwrap();
        assert_eq!(info.name, "velocity");
        assert_eq!(info.size, 8);
        assert_eq!(info.align, std::mem::align_of::<f64>());
        assert_eq!(info.type_id, TypeId::of::<Vel>());
    }

    #[test]
    fn implicit_registration_uses_type_name() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register_implicit::<Pos>().unwrap();
        assert_eq!(reg.register_implicit::<Pos>().unwrap(), id);
        assert_eq!(reg.get_info(id).unwrap().name, std::any::type_name::<Pos>());
    }

    #[test]
    #[should_panic(expected = "already registered for a different type")]
    fn name_collision_panics() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Pos>("shared");
        reg.register::<Vel>("shared");
    }

    #[test]
    fn implicit_registration_reports_name_clash() {
        let mut reg = ComponentRegistry::new();
        let taken = reg.register::<Vel>(std::any::type_name::<Pos>());
        assert!(matches!(
            reg.register_implicit::<Pos>(),
            Err(EcsError::ComponentNameTaken { .. })
        ));
        assert_eq!(reg.lookup::<Pos>(), None);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup_by_name(std::any::type_name::<Pos>()), Some(taken));
    }

    #[test]
    fn iter_walks_infos_in_id_order() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Vel>("velocity");
        reg.register::<Pos>("position");
        let names: Vec<&str> = reg.iter().map(|info| info.name.as_str()).collect();
        assert_eq!(names, vec!["velocity", "position"]);
        assert!(reg.iter().enumerate().all(|(i, info)| info.id.index() == i));
    }
}
