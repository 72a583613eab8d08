/// Tracks the parameters an expensive resource was last built from.
///
/// Managers split every facet update in two: an expensive part (GPU allocations, shader
/// setup) that only depends on a few parameters, and a cheap part re-derived on every update.
/// The gate runs the expensive build only when those parameters differ from the last
/// successful build.
///
/// ## Example
/// ```
/// # use vesper::graphics::RebuildGate;
/// let mut gate = RebuildGate::default();
/// let mut builds = 0;
/// let mut build = |_: &u32| -> Result<(), ()> { builds += 1; Ok(()) };
///
/// assert_eq!(gate.refresh(256, &mut build), Ok(true));
/// assert_eq!(gate.refresh(256, &mut build), Ok(false));
/// assert_eq!(gate.refresh(1024, &mut build), Ok(true));
/// assert_eq!(builds, 2);
/// ```
#[derive(Debug, Clone)]
pub struct RebuildGate<K> {
    built_from: Option<K>,
    rebuilds: u32,
}

impl<K> Default for RebuildGate<K> {
    fn default() -> Self {
        Self {
            built_from: None,
            rebuilds: 0,
        }
    }
}

impl<K: PartialEq> RebuildGate<K> {
    /// Runs `build` unless the last successful build used equal parameters. Returns whether
    /// `build` ran.
    ///
    /// A failed build leaves the gate untouched, so the next refresh tries again.
    pub fn refresh<E>(
        &mut self,
        params: K,
        build: impl FnOnce(&K) -> Result<(), E>,
    ) -> Result<bool, E> {
        if self.built_from.as_ref() == Some(&params) {
            return Ok(false);
        }

        build(&params)?;
        self.built_from = Some(params);
        self.rebuilds += 1;
        Ok(true)
    }

    /// Forces the next refresh to rebuild.
    pub fn invalidate(&mut self) {
        self.built_from = None;
    }

    pub fn built_from(&self) -> Option<&K> {
        self.built_from.as_ref()
    }

    /// Amount of successful builds so far.
    pub fn rebuilds(&self) -> u32 {
        self.rebuilds
    }
}

#[cfg(test)]
mod tests {
    use super::RebuildGate;

    #[test]
    fn failed_builds_are_retried() {
        let mut gate = RebuildGate::default();
        assert_eq!(gate.refresh(1, |_| Err("no memory")), Err("no memory"));
        assert_eq!(gate.built_from(), None);

        assert_eq!(gate.refresh(1, |_| Ok::<_, &str>(())), Ok(true));
        assert_eq!(gate.built_from(), Some(&1));
        assert_eq!(gate.rebuilds(), 1);

        gate.invalidate();
        assert_eq!(gate.refresh(1, |_| Ok::<_, &str>(())), Ok(true));
        assert_eq!(gate.rebuilds(), 2);
    }
}
