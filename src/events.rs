use crate::paths::path_structs::{NodeId, ObserverId, PathId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathEvent {
    /// A new path node was finalized, either locally on the authority or via
    /// the creation notification on the requesting proxy.
    NodeCreated {
        path: PathId,
        node: NodeId,
        requester: Option<ObserverId>,
    },
}

#[derive(Default)]
pub struct PathEvents {
    queue: Vec<PathEvent>,
}

impl PathEvents {
    pub fn new() -> Self {
        Self { queue: Vec::new() }
    }

    pub fn send(&mut self, event: PathEvent) {
        self.queue.push(event);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = PathEvent> + '_ {
        self.queue.drain(..)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
