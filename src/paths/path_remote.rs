//! Remote call payloads for the distributed edit protocol. The transport is
//! external and assumed reliable, ordered and at-most-once in both
//! directions; payloads are node identities plus plain transform and integer
//! fields.

use crate::paths::path_structs::{NodeId, ObserverId, PathId};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Proxy -> authority calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerCall {
    CreatePathNode {
        requester: ObserverId,
        path: PathId,
        after_node: NodeId,
        location: Vec3,
        rotation: Quat,
        target_speed: i32,
    },
    RemovePathNode {
        requester: ObserverId,
        path: PathId,
        node: NodeId,
    },
    /// Position committed by a predicting proxy, for re-validation.
    EditPathNode {
        requester: ObserverId,
        path: PathId,
        node: NodeId,
        location: Vec3,
        rotation: Quat,
    },
    SetPathNodeTargetSpeed {
        requester: ObserverId,
        path: PathId,
        node: NodeId,
        target_speed: i32,
    },
}

/// Authority -> proxy calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientCall {
    /// A creation requested by this proxy was finalized.
    NotifyNodeCreated { path: PathId, node: NodeId },
    /// The authority rejected a committed move; the proxy must overwrite its
    /// local state with this transform.
    ForceNodeCorrection {
        path: PathId,
        node: NodeId,
        location: Vec3,
        rotation: Quat,
    },
}

/// Reliable ordered channel between the roles. Hosts bridge this onto their
/// actual transport.
pub trait PathRemoteChannel {
    fn send_to_authority(&mut self, call: ServerCall);
    fn send_to_proxy(&mut self, target: ObserverId, call: ClientCall);
}

/// Channel that drops everything; an authority with no connected proxies.
pub struct NullChannel;

impl PathRemoteChannel for NullChannel {
    fn send_to_authority(&mut self, _call: ServerCall) {}
    fn send_to_proxy(&mut self, _target: ObserverId, _call: ClientCall) {}
}

#[cfg(test)]
pub(crate) mod loopback {
    //! In-memory queue channel for driving both roles in one test.

    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    pub struct LoopbackChannel {
        pub to_authority: VecDeque<ServerCall>,
        pub to_proxy: VecDeque<(ObserverId, ClientCall)>,
    }

    impl LoopbackChannel {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl PathRemoteChannel for LoopbackChannel {
        fn send_to_authority(&mut self, call: ServerCall) {
            self.to_authority.push_back(call);
        }

        fn send_to_proxy(&mut self, target: ObserverId, call: ClientCall) {
            self.to_proxy.push_back((target, call));
        }
    }
}
