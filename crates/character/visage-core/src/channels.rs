//! Track -> host output bindings.
//!
//! Built once per load from the rig's track ids and the host mesh, then
//! reused every tick to push track values onto morph targets and material
//! scalar parameters.

use hashbrown::{HashMap, HashSet};

use crate::config::Config;
use crate::host::HostMesh;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MorphBinding {
    pub track_index: usize,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialBinding {
    pub track_index: usize,
    pub name: String,
}

#[derive(Clone, Debug, Default)]
pub struct ChannelMapper {
    morphs: Vec<MorphBinding>,
    materials: Vec<MaterialBinding>,
}

impl ChannelMapper {
    /// Bind each track to a morph target, else to a material scalar parameter.
    ///
    /// A name is driven by at most one track; names the mesh does not expose
    /// are skipped.
    pub fn build(
        track_ids: &[u64],
        id_table: &HashMap<u64, String>,
        mesh: &dyn HostMesh,
        config: &Config,
    ) -> Self {
        let mut mapper = Self::default();
        let mut claimed: HashSet<&str> = HashSet::new();
        let material_count = mesh.material_count();

        for (track_index, id) in track_ids.iter().enumerate() {
            let Some(name) = id_table.get(id) else {
                continue;
            };
            if claimed.contains(name.as_str()) {
                continue;
            }
            if !config.disable_morph_targets && mesh.has_morph_target(name) {
                claimed.insert(name.as_str());
                mapper.morphs.push(MorphBinding {
                    track_index,
                    name: name.clone(),
                });
                continue;
            }
            if !config.disable_material_parameters
                && (0..material_count).any(|m| mesh.has_material_scalar(m, name))
            {
                claimed.insert(name.as_str());
                mapper.materials.push(MaterialBinding {
                    track_index,
                    name: name.clone(),
                });
            }
        }
        log::debug!(
            "bound {} morph targets and {} material parameters",
            mapper.morphs.len(),
            mapper.materials.len()
        );
        mapper
    }

    pub fn morphs(&self) -> &[MorphBinding] {
        &self.morphs
    }

    pub fn materials(&self) -> &[MaterialBinding] {
        &self.materials
    }

    pub fn is_empty(&self) -> bool {
        self.morphs.is_empty() && self.materials.is_empty()
    }

    pub fn clear(&mut self) {
        self.morphs.clear();
        self.materials.clear();
    }

    /// Push one frame of track values to the mesh.
    pub fn distribute(&self, values: &[f32], mesh: &mut dyn HostMesh) {
        for binding in &self.morphs {
            if let Some(&value) = values.get(binding.track_index) {
                mesh.set_morph_target(&binding.name, value);
            }
        }
        if self.materials.is_empty() {
            return;
        }
        let material_count = mesh.material_count();
        for binding in &self.materials {
            let Some(&value) = values.get(binding.track_index) else {
                continue;
            };
            for m in 0..material_count {
                if mesh.has_material_scalar(m, &binding.name) {
                    mesh.set_material_scalar(m, &binding.name, value);
                }
            }
        }
    }

    /// Restore bound material parameters to their authored defaults.
    /// Morph targets keep their last values.
    pub fn reset_material_defaults(&self, mesh: &mut dyn HostMesh) {
        let material_count = mesh.material_count();
        for binding in &self.materials {
            for m in 0..material_count {
                if let Some(default) = mesh.material_scalar_default(m, &binding.name) {
                    mesh.set_material_scalar(m, &binding.name, default);
                }
            }
        }
    }
}
