use crate::entities::{
    components::*, ActorType, CameraType, DirtyFlags, Entity, EntityBuilder, EntityKind, LightType,
    Universe,
};
use ahash::{AHashMap, AHashSet};
use glam::*;
use log::*;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use vesper_utils::{ok, AnyResult, PoolHandle};

#[derive(Debug, Error)]
pub enum MapError {
    #[error("couldn't read map `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid map `{path}`")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("material `{0}` is defined twice")]
    DuplicateMaterial(String),
    #[error("entity `{entity}` uses an unknown material `{material}`")]
    UnknownMaterial { entity: String, material: String },
}

/// Entity kind names used by map files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindDesc {
    PointLight,
    SunLight,
    AreaLight,
    GlobalProbe,
    MeshActor,
    SkinnedActor,
    PerspectiveCamera,
    OrthographicCamera,
}

impl From<KindDesc> for EntityKind {
    fn from(kind: KindDesc) -> Self {
        match kind {
            KindDesc::PointLight => EntityKind::Light(LightType::Point),
            KindDesc::SunLight => EntityKind::Light(LightType::Sun),
            KindDesc::AreaLight => EntityKind::Light(LightType::Area),
            KindDesc::GlobalProbe => EntityKind::Light(LightType::GlobalProbe),
            KindDesc::MeshActor => EntityKind::Actor(ActorType::Mesh),
            KindDesc::SkinnedActor => EntityKind::Actor(ActorType::Skinned),
            KindDesc::PerspectiveCamera => EntityKind::Camera(CameraType::Perspective),
            KindDesc::OrthographicCamera => EntityKind::Camera(CameraType::Orthographic),
        }
    }
}

/// Actor section of a map entity. Materials are referenced by name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ActorDesc {
    pub mesh: MeshDesc,
    pub bone_count: u32,
    pub material: Option<String>,
    pub visible: bool,
}

impl Default for ActorDesc {
    fn default() -> Self {
        Self {
            mesh: MeshDesc::default(),
            bone_count: 0,
            material: None,
            visible: true,
        }
    }
}

/// A single `[[entity]]` of a map.
///
/// Only the data section matching the kind is used, a missing one means default data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityDesc {
    pub kind: KindDesc,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: Vec3,
    /// Euler angles in degrees.
    #[serde(default)]
    pub rotation: Vec3,

    pub point_light: Option<PointLightData>,
    pub sun_light: Option<SunLightData>,
    pub area_light: Option<AreaLightData>,
    pub probe: Option<LightProbeData>,
    pub actor: Option<ActorDesc>,
    pub camera: Option<CameraData>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapDesc {
    pub name: String,
    #[serde(default, rename = "material")]
    pub materials: Vec<MaterialComponent>,
    #[serde(default, rename = "entity")]
    pub entities: Vec<EntityDesc>,
}

impl MapDesc {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| MapError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parses a map already in memory. `path` is only used for error messages.
    pub fn parse(text: &str, path: impl AsRef<Path>) -> Result<Self, MapError> {
        let map: Self = toml::from_str(text).map_err(|source| MapError::Parse {
            path: path.as_ref().to_owned(),
            source,
        })?;
        map.validate()?;
        Ok(map)
    }

    fn validate(&self) -> Result<(), MapError> {
        let mut names = AHashSet::with_capacity(self.materials.len());
        for material in &self.materials {
            if !names.insert(material.name.as_str()) {
                return Err(MapError::DuplicateMaterial(material.name.clone()));
            }
        }

        for entity in &self.entities {
            let Some(material) = entity.actor.as_ref().and_then(|actor| actor.material.as_ref())
            else {
                continue;
            };
            if !names.contains(material.as_str()) {
                return Err(MapError::UnknownMaterial {
                    entity: entity.name.clone(),
                    material: material.clone(),
                });
            }
        }
        Ok(())
    }

    /// Creates every material and entity of the map in `universe`.
    ///
    /// If anything fails, whatever was already spawned is unloaded before the error is returned.
    pub fn spawn(&self, universe: &mut Universe) -> AnyResult<LoadedMap> {
        info!(
            "loading map `{}` ({} materials, {} entities)",
            self.name,
            self.materials.len(),
            self.entities.len()
        );

        let mut loaded = LoadedMap {
            name: self.name.clone(),
            entities: Vec::with_capacity(self.entities.len()),
            materials: AHashMap::with_capacity(self.materials.len()),
        };

        if let Err(error) = self.spawn_into(universe, &mut loaded) {
            warn!("couldn't load map `{}`: {error:#}", self.name);
            if let Err(cleanup) = loaded.unload(universe) {
                warn!("couldn't unload the partially loaded map: {cleanup:#}");
            }
            return Err(error);
        }
        Ok(loaded)
    }

    fn spawn_into(&self, universe: &mut Universe, loaded: &mut LoadedMap) -> AnyResult {
        for material in &self.materials {
            let handle = universe.add_component(None, material.clone());
            loaded.materials.insert(material.name.clone(), handle);
            universe.mark_component_as_dirty::<MaterialComponent>(handle, DirtyFlags::CREATE)?;
        }

        for desc in &self.entities {
            let entity = spawn_entity(universe, desc, &loaded.materials)?;
            trace!("spawned `{}` as {entity}", desc.name);
            loaded.entities.push(entity);
        }
        ok()
    }
}

fn spawn_entity(
    universe: &mut Universe,
    desc: &EntityDesc,
    materials: &AHashMap<String, PoolHandle>,
) -> AnyResult<Entity> {
    let kind = EntityKind::from(desc.kind);
    let mut builder = EntityBuilder::new(universe, kind);
    builder.with_transform(Transform::from_position_euler(desc.position, desc.rotation));
    if !desc.name.is_empty() {
        builder.with_label(desc.name.clone());
    }

    match desc.kind {
        KindDesc::PointLight => builder.with_data(desc.point_light.clone().unwrap_or_default()),
        KindDesc::SunLight => builder.with_data(desc.sun_light.clone().unwrap_or_default()),
        KindDesc::AreaLight => builder.with_data(desc.area_light.clone().unwrap_or_default()),
        KindDesc::GlobalProbe => builder.with_data(desc.probe.clone().unwrap_or_default()),
        KindDesc::MeshActor | KindDesc::SkinnedActor => {
            let actor = desc.actor.clone().unwrap_or_default();
            builder.with_data(ActorData {
                mesh: actor.mesh,
                bone_count: actor.bone_count,
                material: actor
                    .material
                    .and_then(|name| materials.get(&name).copied()),
                visible: actor.visible,
            })
        }
        KindDesc::PerspectiveCamera | KindDesc::OrthographicCamera => {
            builder.with_data(desc.camera.clone().unwrap_or_default())
        }
    };

    builder.finish()
}

/// What a [`MapDesc::spawn`] created, so it can be taken down again.
#[derive(Debug, Clone)]
pub struct LoadedMap {
    pub name: String,
    pub entities: Vec<Entity>,
    /// Material component handles by name.
    pub materials: AHashMap<String, PoolHandle>,
}

impl LoadedMap {
    pub fn material(&self, name: &str) -> Option<PoolHandle> {
        self.materials.get(name).copied()
    }

    /// Destroys the map's entities, then its materials. Entities destroyed in the meantime are
    /// skipped.
    pub fn unload(self, universe: &mut Universe) -> AnyResult {
        info!("unloading map `{}`", self.name);

        for entity in self.entities {
            if universe.is_alive(entity) {
                universe.destroy_entity(entity)?;
            }
        }
        for (_, handle) in self.materials {
            if universe.component::<MaterialComponent>(handle).is_some() {
                universe.remove_component::<MaterialComponent>(handle)?;
            }
        }
        ok()
    }
}
