use super::{
    components::Transform, Component, DirtyFlags, Entity, EntityKind, FacetCategory, Universe,
    UniverseError,
};
use log::*;
use vesper_utils::AnyResult;

/// Sets up a new entity, then announces it with a single `CREATE` dispatch.
///
/// ## Example
/// ```
/// # use vesper::entities::{*, components::*};
/// let mut universe = Universe::new();
/// let light = EntityBuilder::new(&mut universe, EntityKind::Light(LightType::Point))
///     .with_label("lamp")
///     .with_data(PointLightData::default())
///     .finish()
///     .unwrap();
/// assert!(universe.data_facet::<PointLightData>(light).is_some());
/// ```
pub struct EntityBuilder<'uni> {
    universe: &'uni mut Universe,
    entity: Entity,
    error: Option<UniverseError>,
}

impl<'uni> EntityBuilder<'uni> {
    pub fn new(universe: &'uni mut Universe, kind: EntityKind) -> Self {
        Self {
            entity: universe.create_entity(kind),
            universe,
            error: None,
        }
    }

    fn record(&mut self, result: Result<(), UniverseError>) {
        if let Err(error) = result {
            self.error.get_or_insert(error);
        }
    }

    pub fn with_label(&mut self, label: impl Into<String>) -> &mut Self {
        let result = self.universe.set_label(self.entity, label);
        self.record(result);
        self
    }

    pub fn with_transform(&mut self, transform: Transform) -> &mut Self {
        let result = self.universe.set_transform(self.entity, transform);
        self.record(result);
        self
    }

    pub fn with_data(&mut self, value: impl Component) -> &mut Self {
        let result = self.universe.add_data_facet(self.entity, value).map(drop);
        self.record(result);
        self
    }

    pub fn with_logic(&mut self, value: impl Component) -> &mut Self {
        let result = self
            .universe
            .attach_facet(self.entity, FacetCategory::Logic, value)
            .map(drop);
        self.record(result);
        self
    }

    /// Marks the entity `CREATE`, which hands it over to every registered handler.
    ///
    /// If a step or the dispatch failed, the entity is destroyed before the error is returned.
    pub fn finish(&mut self) -> AnyResult<Entity> {
        let result = match self.error.take() {
            Some(error) => Err(error.into()),
            None => self
                .universe
                .mark_entity_as_dirty(self.entity, DirtyFlags::CREATE),
        };

        if result.is_err() && self.universe.is_alive(self.entity) {
            if let Err(error) = self.universe.destroy_entity(self.entity) {
                warn!("couldn't destroy the half-built {}: {error:#}", self.entity);
            }
        }
        result.map(|()| self.entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{components::*, handler_fn, LightType};
    use anyhow::bail;
    use vesper_utils::ok;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn failed_creates_leave_nothing_behind() {
        let mut universe = Universe::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        universe.register_dirty_handler(
            "picky",
            handler_fn(move |_, entity, flags| {
                log.borrow_mut().push((entity, flags));
                if flags.contains(DirtyFlags::CREATE) {
                    bail!("no lights allowed");
                }
                ok()
            }),
        );

        let error = EntityBuilder::new(&mut universe, EntityKind::Light(LightType::Point))
            .with_label("lamp")
            .with_data(PointLightData::default())
            .finish()
            .unwrap_err();
        assert!(format!("{error:#}").contains("no lights allowed"));

        let lamp = seen.borrow()[0].0;
        assert_eq!(*seen.borrow(), [
            (lamp, DirtyFlags::CREATE),
            (lamp, DirtyFlags::DESTROY)
        ]);
        assert_eq!(universe.entity_count(), 0);
        assert_eq!(universe.facets().len::<PointLightData>(), 0);
    }

    #[test]
    fn failed_steps_skip_the_dispatch() {
        let mut universe = Universe::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        universe.register_dirty_handler(
            "log",
            handler_fn(move |_, _, flags| {
                log.borrow_mut().push(flags);
                ok()
            }),
        );

        let mut builder = EntityBuilder::new(&mut universe, EntityKind::Light(LightType::Point));
        let entity = builder.entity;
        builder.universe.destroy_entity(entity).unwrap();
        assert!(builder.with_label("gone").finish().is_err());

        assert_eq!(*seen.borrow(), [DirtyFlags::DESTROY]);
        assert_eq!(universe.entity_count(), 0);
    }
}
