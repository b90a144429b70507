//! Edit coordinator: validates and applies the four node operations, in
//! both roles. A proxy forwards requests over the remote channel; the
//! authority mutates the containers and pushes corrections back when a
//! committed move fails its independent re-validation. All validation runs
//! before any mutation, so rejected operations never leave partial state.

use crate::events::PathEvent;
use crate::paths::path_remote::{ClientCall, PathRemoteChannel, ServerCall};
use crate::paths::path_structs::{NodeId, ObserverId, PathEditError, PathId, PathSegmentHit};
use crate::paths::path_subsystem::PathSubsystem;
use crate::paths::paths::{PathManager, PathNode, MAX_TARGET_SPEED};
use glam::{Quat, Vec3};

impl PathSubsystem {
    /// Create a new node on the segment described by `hit`, speed defaulted
    /// by interpolating the two neighbors at the hit's progress. Proxies
    /// forward and report success without touching local state; the node
    /// arrives through replication and the creation notification.
    pub fn create_path_node(
        &mut self,
        manager: &mut PathManager,
        requester: Option<ObserverId>,
        hit: &PathSegmentHit,
        channel: &mut dyn PathRemoteChannel,
    ) -> Result<(), PathEditError> {
        let container = manager.path(hit.path).ok_or(PathEditError::InvalidTarget)?;
        let spline = container.path().ok_or(PathEditError::InvalidTarget)?;
        let after = container
            .node(hit.point_after)
            .ok_or(PathEditError::InvalidTarget)?;
        let next = container
            .next_of(hit.point_after)
            .ok_or(PathEditError::InvalidTarget)?;

        let location = spline.location_at_key(hit.progress);
        let direction = spline.direction_at_key(hit.progress);
        let rotation = Quat::from_rotation_arc(Vec3::X, direction);

        // Interpolate the default speed at the hit's fraction along its
        // span. The authority re-clamps; this value is advisory on a proxy.
        let span_start = spline.point_index_for_key(hit.progress) as f32;
        let fraction = (hit.progress - span_start).clamp(0.0, 1.0);
        let target_speed = (after.target_speed() as f32
            + (next.target_speed() - after.target_speed()) as f32 * fraction)
            as i32;

        if !self.check_distance_between_points(location, after.position())
            || !self.check_distance_between_points(location, next.position())
        {
            return Err(PathEditError::CreateTooFar);
        }

        if !self.net_mode.is_authority() {
            let requester = requester.ok_or(PathEditError::NoChannel)?;
            channel.send_to_authority(ServerCall::CreatePathNode {
                requester,
                path: hit.path,
                after_node: hit.point_after,
                location,
                rotation,
                target_speed,
            });
            return Ok(());
        }

        let node = self
            .create_path_node_internal(manager, hit.path, hit.point_after, location, rotation, target_speed)
            .ok_or(PathEditError::InvalidTarget)?;

        self.events.send(PathEvent::NodeCreated {
            path: hit.path,
            node,
            requester,
        });
        Ok(())
    }

    /// Authority-side insertion. Callers have validated the topology; the
    /// speed clamp here is the authoritative one.
    fn create_path_node_internal(
        &mut self,
        manager: &mut PathManager,
        path: PathId,
        after_node: NodeId,
        location: Vec3,
        rotation: Quat,
        target_speed: i32,
    ) -> Option<NodeId> {
        debug_assert!(self.net_mode.is_authority());

        let node_id = manager.alloc_node_id();
        let container = manager.path_mut(path)?;

        let after = container.node(after_node)?;
        let next = container.next_of(after_node)?;
        let max_speed = after.target_speed().max(next.target_speed());

        let node = PathNode::new(node_id, location, rotation, target_speed.clamp(0, max_speed));
        if !container.insert_after(after_node, node) {
            return None;
        }

        container.calculate_node_count();
        if container.is_complete() && container.has_data() {
            container.rebuild_curve();
        }

        log::debug!("created path node {node_id:?} on {path:?} after {after_node:?}");
        Some(node_id)
    }

    /// Move a node, applying immediately on whichever side calls it. This is
    /// the one operation a proxy predicts; a non-predicted proxy move also
    /// notifies the authority, which corrects us later if it disagrees.
    pub fn move_path_node(
        &mut self,
        manager: &mut PathManager,
        requester: Option<ObserverId>,
        path: PathId,
        node: NodeId,
        location: Vec3,
        rotation: Quat,
        client_prediction: bool,
        channel: &mut dyn PathRemoteChannel,
    ) -> Result<(), PathEditError> {
        self.check_can_move_path_node(manager, path, node, location)?;

        let container = manager.path_mut(path).ok_or(PathEditError::InvalidTarget)?;
        container.set_node_transform(node, location, rotation);
        if container.is_complete() && container.has_data() {
            container.rebuild_curve();
        }

        if !client_prediction && !self.net_mode.is_authority() {
            if let Some(requester) = requester {
                channel.send_to_authority(ServerCall::EditPathNode {
                    requester,
                    path,
                    node,
                    location,
                    rotation,
                });
            }
        }
        Ok(())
    }

    /// Remove a node. Proxies forward without speculating.
    pub fn remove_path_node(
        &mut self,
        manager: &mut PathManager,
        requester: Option<ObserverId>,
        path: PathId,
        node: NodeId,
        channel: &mut dyn PathRemoteChannel,
    ) -> Result<(), PathEditError> {
        self.check_can_remove_path_node(manager, path, node)?;

        if !self.net_mode.is_authority() {
            let requester = requester.ok_or(PathEditError::NoChannel)?;
            channel.send_to_authority(ServerCall::RemovePathNode {
                requester,
                path,
                node,
            });
            return Ok(());
        }

        let container = manager.path_mut(path).ok_or(PathEditError::InvalidTarget)?;
        container.remove_node(node).ok_or(PathEditError::InvalidTarget)?;
        container.calculate_node_count();
        if container.is_complete() && container.has_data() {
            container.rebuild_curve();
        }
        log::debug!("removed path node {node:?} from {path:?}");
        Ok(())
    }

    /// Set a node's target speed, clamped to the engine ceiling. Topology is
    /// unaffected, so there is no distance re-check.
    pub fn set_path_node_target_speed(
        &mut self,
        manager: &mut PathManager,
        requester: Option<ObserverId>,
        path: PathId,
        node: NodeId,
        target_speed: i32,
        channel: &mut dyn PathRemoteChannel,
    ) -> Result<(), PathEditError> {
        if !self.net_mode.is_authority() {
            let requester = requester.ok_or(PathEditError::NoChannel)?;
            channel.send_to_authority(ServerCall::SetPathNodeTargetSpeed {
                requester,
                path,
                node,
                target_speed,
            });
            return Ok(());
        }

        let container = manager.path_mut(path).ok_or(PathEditError::InvalidTarget)?;
        if !container.set_node_target_speed(node, target_speed.clamp(0, MAX_TARGET_SPEED)) {
            return Err(PathEditError::InvalidTarget);
        }
        Ok(())
    }

    /// Authority-side delivery of a forwarded request. Failures are silent
    /// towards the proxy except for move, which answers with a correction.
    pub fn handle_server_call(
        &mut self,
        manager: &mut PathManager,
        call: ServerCall,
        channel: &mut dyn PathRemoteChannel,
    ) {
        debug_assert!(self.net_mode.is_authority());

        match call {
            ServerCall::CreatePathNode {
                requester,
                path,
                after_node,
                location,
                rotation,
                target_speed,
            } => {
                // Never trust the proxy's validation.
                let valid = manager.path(path).is_some_and(|container| {
                    let Some(after) = container.node(after_node) else {
                        return false;
                    };
                    let Some(next) = container.next_of(after_node) else {
                        return false;
                    };
                    self.check_distance_between_points(location, after.position())
                        && self.check_distance_between_points(location, next.position())
                });
                if !valid {
                    log::debug!("rejected remote node creation on {path:?}");
                    return;
                }

                if let Some(node) =
                    self.create_path_node_internal(manager, path, after_node, location, rotation, target_speed)
                {
                    channel.send_to_proxy(requester, ClientCall::NotifyNodeCreated { path, node });
                }
            }
            ServerCall::RemovePathNode { path, node, .. } => {
                if let Err(err) = self.remove_path_node(manager, None, path, node, channel) {
                    log::debug!("rejected remote node removal on {path:?}: {err}");
                }
            }
            ServerCall::EditPathNode {
                requester,
                path,
                node,
                location,
                rotation,
            } => {
                if self
                    .move_path_node(manager, None, path, node, location, rotation, false, channel)
                    .is_err()
                {
                    // The proxy already committed; force it back to the
                    // authoritative transform.
                    if let Some(current) = manager.path(path).and_then(|c| c.node(node)) {
                        log::debug!("correcting predicted move of {node:?} on {path:?}");
                        channel.send_to_proxy(
                            requester,
                            ClientCall::ForceNodeCorrection {
                                path,
                                node,
                                location: current.position(),
                                rotation: current.rotation(),
                            },
                        );
                    }
                }
            }
            ServerCall::SetPathNodeTargetSpeed {
                path,
                node,
                target_speed,
                ..
            } => {
                if target_speed > 0 {
                    let _ = self.set_path_node_target_speed(manager, None, path, node, target_speed, channel);
                }
            }
        }
    }

    /// Proxy-side delivery of an authority call. `target` is the observer
    /// the transport addressed, i.e. the original requester.
    pub fn handle_client_call(
        &mut self,
        manager: &mut PathManager,
        target: ObserverId,
        call: ClientCall,
    ) {
        match call {
            ClientCall::NotifyNodeCreated { path, node } => {
                self.events.send(PathEvent::NodeCreated {
                    path,
                    node,
                    requester: Some(target),
                });
            }
            ClientCall::ForceNodeCorrection {
                path,
                node,
                location,
                rotation,
            } => {
                let Some(container) = manager.path_mut(path) else {
                    return;
                };
                log::debug!("applying authoritative correction for {node:?} on {path:?}");
                container.set_node_transform(node, location, rotation);
                if container.is_complete() && container.has_data() {
                    container.rebuild_curve();
                }
            }
        }
    }

    fn check_distance_between_points(&self, a: Vec3, b: Vec3) -> bool {
        a.distance(b) <= self.settings.max_distance_between_nodes
    }

    fn check_can_move_path_node(
        &self,
        manager: &PathManager,
        path: PathId,
        node: NodeId,
        new_location: Vec3,
    ) -> Result<(), PathEditError> {
        let container = manager.path(path).ok_or(PathEditError::InvalidTarget)?;
        container.node(node).ok_or(PathEditError::InvalidTarget)?;
        let prev = container.prev_of(node).ok_or(PathEditError::InvalidTarget)?;
        let next = container.next_of(node).ok_or(PathEditError::InvalidTarget)?;

        if !self.check_distance_between_points(new_location, prev.position())
            || !self.check_distance_between_points(new_location, next.position())
        {
            return Err(PathEditError::MoveTooFar);
        }
        Ok(())
    }

    fn check_can_remove_path_node(
        &self,
        manager: &PathManager,
        path: PathId,
        node: NodeId,
    ) -> Result<(), PathEditError> {
        let container = manager.path(path).ok_or(PathEditError::InvalidTarget)?;
        container.node(node).ok_or(PathEditError::InvalidTarget)?;
        let prev = container.prev_of(node).ok_or(PathEditError::InvalidTarget)?;
        let next = container.next_of(node).ok_or(PathEditError::InvalidTarget)?;

        if !self.check_distance_between_points(prev.position(), next.position()) {
            return Err(PathEditError::RemoveTooFar);
        }
        Ok(())
    }
}
