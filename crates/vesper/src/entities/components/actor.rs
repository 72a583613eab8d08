use crate::entities::Component;
use serde::Deserialize;
use vesper_utils::PoolHandle;

/// Size description of an actor's mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(default)]
pub struct MeshDesc {
    pub name: String,
    pub vertex_count: u32,
    pub index_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorData {
    pub mesh: MeshDesc,
    /// Skeleton size. Ignored for plain mesh actors.
    pub bone_count: u32,
    /// Handle of a [`super::MaterialComponent`] in the universe's store.
    pub material: Option<PoolHandle>,
    pub visible: bool,
}

impl Component for ActorData {}

impl Default for ActorData {
    fn default() -> Self {
        Self {
            mesh: MeshDesc::default(),
            bone_count: 0,
            material: None,
            visible: true,
        }
    }
}
