use std::collections::HashMap;

use thiserror::Error;

use meshpose_geometry::atlas::VertexAtlas;
use meshpose_geometry::mesh::TriMesh;
use meshpose_geometry::transforms::{self, IDENTITY, MIRROR_X};
use meshpose_render::camera::Camera;

/// Maximum number of poses retained per mesh for undo.
const UNDO_DEPTH: usize = 20;

/// Error types for session bookkeeping.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No mesh is registered under the given name.
    #[error("no mesh named {0:?} in the session")]
    UnknownMesh(String),

    /// No reference mesh has been selected.
    #[error("no reference mesh selected")]
    NoReference,

    /// The pose history for the mesh is empty.
    #[error("no earlier pose recorded for mesh {0:?}")]
    NothingToUndo(String),
}

/// The surface color encoding to use for a pose evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingKind {
    /// Normalized-coordinate-space colors.
    Nocs,
    /// Angular (longitude, latitude) atlas colors.
    LatLon,
}

/// A mesh registered in a session: geometry, optional angular atlas, the
/// current pose, and a bounded pose history.
#[derive(Debug, Clone)]
pub struct MeshEntry {
    mesh: TriMesh,
    atlas: Option<VertexAtlas>,
    transform: [[f64; 4]; 4],
    history: Vec<[[f64; 4]; 4]>,
}

impl MeshEntry {
    /// The mesh geometry.
    pub fn mesh(&self) -> &TriMesh {
        &self.mesh
    }

    /// The angular atlas, when one was registered.
    pub fn atlas(&self) -> Option<&VertexAtlas> {
        self.atlas.as_ref()
    }

    /// The current pose of the mesh.
    pub fn transform(&self) -> [[f64; 4]; 4] {
        self.transform
    }
}

/// Explicit evaluation context: the camera, named meshes with their current
/// poses, and the selected reference mesh.
///
/// All pose state lives here as plain values; nothing is read back out of a
/// renderer.
#[derive(Debug)]
pub struct Session {
    camera: Camera,
    meshes: HashMap<String, MeshEntry>,
    reference: Option<String>,
}

impl Session {
    /// Create an empty session for a camera.
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            meshes: HashMap::new(),
            reference: None,
        }
    }

    /// The session camera.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Register a mesh under a name with the identity pose.
    ///
    /// Re-registering a name replaces the mesh and resets its pose history.
    pub fn insert_mesh(&mut self, name: impl Into<String>, mesh: TriMesh) {
        self.insert_entry(name.into(), mesh, None);
    }

    /// Register a mesh together with its angular atlas.
    pub fn insert_mesh_with_atlas(
        &mut self,
        name: impl Into<String>,
        mesh: TriMesh,
        atlas: VertexAtlas,
    ) {
        self.insert_entry(name.into(), mesh, Some(atlas));
    }

    fn insert_entry(&mut self, name: String, mesh: TriMesh, atlas: Option<VertexAtlas>) {
        self.meshes.insert(
            name,
            MeshEntry {
                mesh,
                atlas,
                transform: IDENTITY,
                history: Vec::new(),
            },
        );
    }

    /// Look up a mesh entry by name.
    pub fn entry(&self, name: &str) -> Result<&MeshEntry, SessionError> {
        self.meshes
            .get(name)
            .ok_or_else(|| SessionError::UnknownMesh(name.to_string()))
    }

    /// Names of all registered meshes.
    pub fn mesh_names(&self) -> impl Iterator<Item = &str> {
        self.meshes.keys().map(String::as_str)
    }

    /// Select the reference mesh for pose evaluation.
    pub fn set_reference(&mut self, name: &str) -> Result<(), SessionError> {
        if !self.meshes.contains_key(name) {
            return Err(SessionError::UnknownMesh(name.to_string()));
        }
        self.reference = Some(name.to_string());
        Ok(())
    }

    /// The currently selected reference entry.
    pub fn reference(&self) -> Result<&MeshEntry, SessionError> {
        let name = self.reference.as_deref().ok_or(SessionError::NoReference)?;
        self.entry(name)
    }

    /// Set a mesh's pose, recording the previous pose for undo.
    ///
    /// The history is bounded; the oldest pose is dropped once the undo depth
    /// is reached.
    pub fn set_transform(
        &mut self,
        name: &str,
        pose: [[f64; 4]; 4],
    ) -> Result<(), SessionError> {
        let entry = self
            .meshes
            .get_mut(name)
            .ok_or_else(|| SessionError::UnknownMesh(name.to_string()))?;
        if entry.history.len() == UNDO_DEPTH {
            entry.history.remove(0);
        }
        entry.history.push(entry.transform);
        entry.transform = pose;
        Ok(())
    }

    /// Restore the mesh's previous pose.
    pub fn undo_transform(&mut self, name: &str) -> Result<(), SessionError> {
        let entry = self
            .meshes
            .get_mut(name)
            .ok_or_else(|| SessionError::UnknownMesh(name.to_string()))?;
        match entry.history.pop() {
            Some(previous) => {
                entry.transform = previous;
                Ok(())
            }
            None => Err(SessionError::NothingToUndo(name.to_string())),
        }
    }

    /// Mirror a mesh across the YZ plane by composing an X flip into its pose.
    ///
    /// The flip applies in object space, before the current pose. Mirroring
    /// twice restores the original pose (up to the recorded history).
    pub fn mirror(&mut self, name: &str) -> Result<(), SessionError> {
        let current = self.entry(name)?.transform();
        self.set_transform(name, transforms::compose(&current, &MIRROR_X))
    }
}
