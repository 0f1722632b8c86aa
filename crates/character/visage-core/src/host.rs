//! Host-mesh query interface.
//!
//! Adapters (engine skinned-mesh components) implement [`HostMesh`]; the
//! character only ever holds a weak reference to it.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::space::Transform;

pub trait HostMesh {
    fn has_morph_target(&self, name: &str) -> bool;
    fn set_morph_target(&mut self, name: &str, weight: f32);

    fn material_count(&self) -> usize;
    fn has_material_scalar(&self, material: usize, name: &str) -> bool;
    /// Authored default of a material scalar parameter.
    fn material_scalar_default(&self, material: usize, name: &str) -> Option<f32>;
    fn set_material_scalar(&mut self, material: usize, name: &str, value: f32);

    /// Skeleton bone index for a bone name.
    fn bone_index(&self, _name: &str) -> Option<usize> {
        None
    }

    /// Reference (bind) pose of a skeleton bone in local space.
    fn reference_pose(&self, _bone: usize) -> Option<Transform> {
        None
    }
}

/// Non-owning handle to the host mesh.
#[derive(Clone, Default)]
pub struct MeshRef(Option<Weak<RefCell<dyn HostMesh>>>);

impl MeshRef {
    pub fn new<M: HostMesh + 'static>(mesh: &Rc<RefCell<M>>) -> Self {
        let mesh: Rc<RefCell<dyn HostMesh>> = mesh.clone();
        Self(Some(Rc::downgrade(&mesh)))
    }

    pub fn is_attached(&self) -> bool {
        self.0.as_ref().is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Run `f` against the mesh if it is still alive and not borrowed elsewhere.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn HostMesh) -> R) -> Option<R> {
        let mesh = self.0.as_ref()?.upgrade()?;
        let Ok(mut guard) = mesh.try_borrow_mut() else {
            log::warn!("host mesh is borrowed elsewhere; skipping update");
            return None;
        };
        Some(f(&mut *guard))
    }
}

impl fmt::Debug for MeshRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshRef")
            .field("attached", &self.is_attached())
            .finish()
    }
}
