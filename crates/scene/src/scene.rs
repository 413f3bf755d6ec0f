use crate::geometry::Geometry;
use crate::light::Light;
use glam::Mat4;
use lumen_common::{MaterialId, NodeId, Transform};
use std::collections::BTreeMap;

/// Errors from scene edits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("unknown material {0}")]
    UnknownMaterial(MaterialId),
    #[error("{0} is not a mesh")]
    NotAMesh(NodeId),
}

/// Drawable payload of a mesh node.
#[derive(Debug, Clone)]
pub struct Mesh {
    geometry: Geometry,
    material: MaterialId,
    content_dirty: bool,
}

impl Mesh {
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn material(&self) -> MaterialId {
        self.material
    }

    /// True until a consumer that uploaded the geometry clears it.
    pub fn is_content_dirty(&self) -> bool {
        self.content_dirty
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    Mesh(Mesh),
    Light(Light),
}

/// A node of the scene tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    local: Transform,
    world: Mat4,
    visible: bool,
    kind: NodeKind,
}

impl Node {
    fn new(parent: Option<NodeId>, local: Transform, kind: NodeKind) -> Self {
        Self {
            name: None,
            parent,
            children: Vec::new(),
            local,
            world: local.matrix(),
            visible: true,
            kind,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn local_transform(&self) -> &Transform {
        &self.local
    }

    /// World matrix as of the last [`Scene::update_world_transforms`].
    pub fn world_matrix(&self) -> Mat4 {
        self.world
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn as_mesh(&self) -> Option<&Mesh> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn as_light(&self) -> Option<&Light> {
        match &self.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        }
    }
}

/// Scene tree plus the material arena its meshes reference.
///
/// Generic over the material type so the scene stays independent of any
/// renderer; renderers instantiate it with their material trait object.
pub struct Scene<M: ?Sized> {
    nodes: BTreeMap<NodeId, Node>,
    roots: Vec<NodeId>,
    materials: BTreeMap<MaterialId, Box<M>>,
    environment: Option<MaterialId>,
}

impl<M: ?Sized> Default for Scene<M> {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            roots: Vec::new(),
            materials: BTreeMap::new(),
            environment: None,
        }
    }
}

impl<M: ?Sized> Scene<M> {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- materials ----

    pub fn add_material(&mut self, material: Box<M>) -> MaterialId {
        let id = MaterialId::allocate();
        self.materials.insert(id, material);
        id
    }

    pub fn material(&self, id: MaterialId) -> Option<&M> {
        self.materials.get(&id).map(Box::as_ref)
    }

    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut M> {
        self.materials.get_mut(&id).map(Box::as_mut)
    }

    /// Remove a material from the arena. Meshes still pointing at it fail to
    /// render until reassigned.
    pub fn remove_material(&mut self, id: MaterialId) -> Option<Box<M>> {
        if self.environment == Some(id) {
            self.environment = None;
        }
        self.materials.remove(&id)
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    // ---- environment ----

    pub fn set_environment(&mut self, material: Option<MaterialId>) -> Result<(), SceneError> {
        if let Some(id) = material {
            if !self.materials.contains_key(&id) {
                return Err(SceneError::UnknownMaterial(id));
            }
        }
        self.environment = material;
        Ok(())
    }

    pub fn environment(&self) -> Option<MaterialId> {
        self.environment
    }

    // ---- nodes ----

    pub fn add_group(
        &mut self,
        parent: Option<NodeId>,
        transform: Transform,
    ) -> Result<NodeId, SceneError> {
        self.insert(parent, transform, NodeKind::Group)
    }

    pub fn add_mesh(
        &mut self,
        parent: Option<NodeId>,
        geometry: Geometry,
        material: MaterialId,
        transform: Transform,
    ) -> Result<NodeId, SceneError> {
        if !self.materials.contains_key(&material) {
            return Err(SceneError::UnknownMaterial(material));
        }
        let mesh = Mesh {
            geometry,
            material,
            content_dirty: true,
        };
        self.insert(parent, transform, NodeKind::Mesh(mesh))
    }

    pub fn add_light(
        &mut self,
        parent: Option<NodeId>,
        light: Light,
        transform: Transform,
    ) -> Result<NodeId, SceneError> {
        self.insert(parent, transform, NodeKind::Light(light))
    }

    fn insert(
        &mut self,
        parent: Option<NodeId>,
        transform: Transform,
        kind: NodeKind,
    ) -> Result<NodeId, SceneError> {
        let id = NodeId::allocate();
        match parent {
            Some(parent_id) => {
                let parent_node = self
                    .nodes
                    .get_mut(&parent_id)
                    .ok_or(SceneError::UnknownNode(parent_id))?;
                parent_node.children.push(id);
            }
            None => self.roots.push(id),
        }
        self.nodes.insert(id, Node::new(parent, transform, kind));
        Ok(id)
    }

    /// Remove a node and its whole subtree. Returns every removed id so the
    /// caller can release resources a renderer holds for them.
    pub fn remove(&mut self, id: NodeId) -> Result<Vec<NodeId>, SceneError> {
        let node = self.nodes.get(&id).ok_or(SceneError::UnknownNode(id))?;
        match node.parent {
            Some(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.retain(|&c| c != id);
                }
            }
            None => self.roots.retain(|&r| r != id),
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children.iter().copied());
                removed.push(current);
            }
        }
        tracing::debug!(root = %id, count = removed.len(), "removed subtree");
        Ok(removed)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn mesh(&self, id: NodeId) -> Option<&Mesh> {
        self.nodes.get(&id).and_then(Node::as_mesh)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn set_local_transform(&mut self, id: NodeId, transform: Transform) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(&id).ok_or(SceneError::UnknownNode(id))?;
        node.local = transform;
        Ok(())
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(&id).ok_or(SceneError::UnknownNode(id))?;
        node.visible = visible;
        Ok(())
    }

    pub fn set_light(&mut self, id: NodeId, light: Light) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(&id).ok_or(SceneError::UnknownNode(id))?;
        node.kind = NodeKind::Light(light);
        Ok(())
    }

    fn mesh_mut(&mut self, id: NodeId) -> Result<&mut Mesh, SceneError> {
        match self.nodes.get_mut(&id) {
            Some(Node {
                kind: NodeKind::Mesh(mesh),
                ..
            }) => Ok(mesh),
            Some(_) => Err(SceneError::NotAMesh(id)),
            None => Err(SceneError::UnknownNode(id)),
        }
    }

    /// Replace a mesh's geometry and mark it content-dirty.
    pub fn set_geometry(&mut self, id: NodeId, geometry: Geometry) -> Result<(), SceneError> {
        let mesh = self.mesh_mut(id)?;
        mesh.geometry = geometry;
        mesh.content_dirty = true;
        Ok(())
    }

    pub fn set_mesh_material(&mut self, id: NodeId, material: MaterialId) -> Result<(), SceneError> {
        if !self.materials.contains_key(&material) {
            return Err(SceneError::UnknownMaterial(material));
        }
        self.mesh_mut(id)?.material = material;
        Ok(())
    }

    pub fn mark_content_dirty(&mut self, id: NodeId) -> Result<(), SceneError> {
        self.mesh_mut(id)?.content_dirty = true;
        Ok(())
    }

    pub fn clear_content_dirty(&mut self, id: NodeId) -> Result<(), SceneError> {
        self.mesh_mut(id)?.content_dirty = false;
        Ok(())
    }

    // ---- frame helpers ----

    /// Recompute every node's world matrix from the roots down.
    pub fn update_world_transforms(&mut self) {
        let mut stack: Vec<(NodeId, Mat4)> = self
            .roots
            .iter()
            .rev()
            .map(|&id| (id, Mat4::IDENTITY))
            .collect();
        while let Some((id, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            node.world = parent_world * node.local.matrix();
            let world = node.world;
            stack.extend(node.children.iter().rev().map(|&c| (c, world)));
        }
    }

    /// Depth-first traversal in child insertion order, skipping invisible
    /// subtrees.
    pub fn visit(&self, mut f: impl FnMut(NodeId, &Node)) {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            f(id, node);
            stack.extend(node.children.iter().rev().copied());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use lumen_common::Color;

    type TestScene = Scene<str>;

    fn geometry() -> Geometry {
        Geometry::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![Vec3::Z; 3]).unwrap()
    }

    fn material(scene: &mut TestScene) -> MaterialId {
        scene.add_material("flat".into())
    }

    #[test]
    fn scene_starts_empty() {
        let scene = TestScene::new();
        assert_eq!(scene.node_count(), 0);
        assert_eq!(scene.material_count(), 0);
        assert!(scene.environment().is_none());
    }

    #[test]
    fn mesh_requires_known_material() {
        let mut scene = TestScene::new();
        let err = scene
            .add_mesh(None, geometry(), MaterialId(u64::MAX), Transform::default())
            .unwrap_err();
        assert_eq!(err, SceneError::UnknownMaterial(MaterialId(u64::MAX)));
    }

    #[test]
    fn new_mesh_is_content_dirty() {
        let mut scene = TestScene::new();
        let m = material(&mut scene);
        let id = scene.add_mesh(None, geometry(), m, Transform::default()).unwrap();
        assert!(scene.mesh(id).unwrap().is_content_dirty());
        scene.clear_content_dirty(id).unwrap();
        assert!(!scene.mesh(id).unwrap().is_content_dirty());
        scene.set_geometry(id, geometry()).unwrap();
        assert!(scene.mesh(id).unwrap().is_content_dirty());
    }

    #[test]
    fn world_transforms_compose_parent_chain() {
        let mut scene = TestScene::new();
        let m = material(&mut scene);
        let group = scene
            .add_group(None, Transform::from_position(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        let child = scene
            .add_mesh(
                Some(group),
                geometry(),
                m,
                Transform::from_position(Vec3::new(0.0, 2.0, 0.0)),
            )
            .unwrap();
        scene.update_world_transforms();
        let p = scene
            .node(child)
            .unwrap()
            .world_matrix()
            .transform_point3(Vec3::ZERO);
        assert_eq!(p, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn traversal_is_depth_first_in_insertion_order() {
        let mut scene = TestScene::new();
        let a = scene.add_group(None, Transform::default()).unwrap();
        let a1 = scene.add_group(Some(a), Transform::default()).unwrap();
        let b = scene.add_group(None, Transform::default()).unwrap();
        let a2 = scene.add_group(Some(a), Transform::default()).unwrap();
        let mut order = Vec::new();
        scene.visit(|id, _| order.push(id));
        assert_eq!(order, vec![a, a1, a2, b]);
    }

    #[test]
    fn invisible_subtree_skipped() {
        let mut scene = TestScene::new();
        let a = scene.add_group(None, Transform::default()).unwrap();
        scene
            .add_light(Some(a), Light::ambient(Color::WHITE, 1.0), Transform::default())
            .unwrap();
        scene.set_visible(a, false).unwrap();
        let mut count = 0;
        scene.visit(|_, _| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn remove_returns_whole_subtree() {
        let mut scene = TestScene::new();
        let m = material(&mut scene);
        let a = scene.add_group(None, Transform::default()).unwrap();
        let child = scene.add_mesh(Some(a), geometry(), m, Transform::default()).unwrap();
        let mut removed = scene.remove(a).unwrap();
        removed.sort();
        assert_eq!(removed, vec![a, child]);
        assert_eq!(scene.node_count(), 0);
        assert!(scene.roots().is_empty());
    }

    #[test]
    fn ids_are_not_reused() {
        let mut scene = TestScene::new();
        let a = scene.add_group(None, Transform::default()).unwrap();
        scene.remove(a).unwrap();
        let b = scene.add_group(None, Transform::default()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn environment_must_exist_and_clears_on_removal() {
        let mut scene = TestScene::new();
        assert!(scene.set_environment(Some(MaterialId(u64::MAX))).is_err());
        let m = material(&mut scene);
        scene.set_environment(Some(m)).unwrap();
        scene.remove_material(m);
        assert!(scene.environment().is_none());
    }

    #[test]
    fn set_mesh_material_rejects_non_mesh() {
        let mut scene = TestScene::new();
        let m = material(&mut scene);
        let g = scene.add_group(None, Transform::default()).unwrap();
        assert_eq!(scene.set_mesh_material(g, m), Err(SceneError::NotAMesh(g)));
    }
}
