use bitflags::bitflags;

bitflags! {
    /// Kinds of change an entity or component can be marked with.
    #[derive(Default)]
    pub struct DirtyFlags: u8 {
        /// The entity came into existence. Delivered at most once.
        const CREATE = 1 << 0;
        /// Only the transform changed.
        const MOVE = 1 << 1;
        /// Parameters other than the transform changed.
        const DETAIL = 1 << 2;
        /// The entity is about to be freed. Only ever issued by the universe itself.
        const DESTROY = 1 << 3;
    }
}

/// Where an entity or component is in its life, derived from the flags delivered so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Allocated, `CREATE` not delivered yet.
    Fresh,
    /// `CREATE` was delivered.
    Created,
    /// `CREATE` and at least one later change were delivered.
    Live,
    /// `DESTROY` was delivered.
    Destroyed,
}

/// Pending and already-delivered dirty flags of a single entity or component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyState {
    pending: DirtyFlags,
    serviced: DirtyFlags,
}

impl DirtyState {
    /// State of a freshly allocated object, with its `CREATE` still waiting for a dispatch.
    pub fn pending_create() -> Self {
        Self {
            pending: DirtyFlags::CREATE,
            serviced: DirtyFlags::empty(),
        }
    }

    /// Flags accumulated since the last dispatch.
    #[inline]
    pub fn pending(&self) -> DirtyFlags {
        self.pending
    }

    /// Union of every mask delivered so far.
    #[inline]
    pub fn serviced(&self) -> DirtyFlags {
        self.serviced
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.serviced.contains(DirtyFlags::DESTROY) {
            Lifecycle::Destroyed
        } else if !self.serviced.contains(DirtyFlags::CREATE) {
            Lifecycle::Fresh
        } else if self.serviced.intersects(DirtyFlags::MOVE | DirtyFlags::DETAIL) {
            Lifecycle::Live
        } else {
            Lifecycle::Created
        }
    }

    /// ORs `flags` into the pending mask and returns the mask to deliver.
    ///
    /// `CREATE` is dropped once it was delivered, and `DESTROY` is never accumulated, it only
    /// travels through [`DirtyState::finish`].
    pub fn accumulate(&mut self, flags: DirtyFlags) -> DirtyFlags {
        let mut flags = flags - DirtyFlags::DESTROY;
        if self.serviced.contains(DirtyFlags::CREATE) {
            flags -= DirtyFlags::CREATE;
        }
        self.pending |= flags;
        self.pending
    }

    /// Records a finished dispatch and clears the pending mask.
    pub fn finish(&mut self, delivered: DirtyFlags) {
        self.serviced |= delivered;
        self.pending = DirtyFlags::empty();
    }
}
