#![warn(missing_docs)]

//! The mesh kernel: a non-manifold polygon-mesh representation supporting
//! the Euler-style edits the parameterization pipeline needs.
//!
//! Vertices, edges, and faces live in per-entity arenas (`slotmap::SlotMap`)
//! keyed by stable, never-reused ids. A mesh additionally keeps an explicit
//! *ordering* of each entity kind (`Vec<Id>` plus a `SecondaryMap` position
//! cache) so that "index" — an entity's position in the mesh's sequence,
//! which changes under `swap_vertex` and removal — stays distinct from
//! "unique id" — the stable slotmap key, which never changes across the
//! entity's lifetime. This replaces the bidirectional shared-pointer graph
//! of the original C++ `mesh<Traits>` kernel with an arena-and-index model.

use log::warn;
use param_geom::{ear_clip_triangulate, point_in_triangle_2d, triangle_area_signed_x2};
use param_math::{Point2, Point3, Vec3};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::HashMap;
use thiserror::Error;

slotmap::new_key_type! {
    /// Stable identifier for a vertex. Never reused, never renumbered.
    pub struct VertexId;
    /// Stable identifier for an edge.
    pub struct EdgeId;
    /// Stable identifier for a face.
    pub struct FaceId;
}

/// Errors raised by mesh-editing operations.
#[derive(Debug, Error)]
pub enum MeshError {
    /// The operation referenced a vertex that is not a member of this mesh.
    #[error("vertex is not a member of this mesh")]
    UnknownVertex,
    /// The operation referenced an edge that is not a member of this mesh.
    #[error("edge is not a member of this mesh")]
    UnknownEdge,
    /// The operation referenced a face that is not a member of this mesh.
    #[error("face is not a member of this mesh")]
    UnknownFace,
    /// A face must have at least 3 edges.
    #[error("face must have at least 3 vertices, got {0}")]
    DegenerateFace(usize),
    /// `split_face` requires two vertices of `f` that are not already adjacent.
    #[error("split_face requires two non-adjacent vertices of the face")]
    VerticesAlreadyAdjacent,
    /// `split_face` requires both vertices to belong to the face.
    #[error("split_face requires both vertices to belong to the face")]
    VertexNotOnFace,
}

/// A vertex: 3D position, parameter-domain `(u, v)`, pin state, and the
/// insertion-ordered list of incident edges.
#[derive(Debug, Clone)]
pub struct Vertex {
    /// Position in the 3D reference mesh.
    pub position: Point3,
    /// Current parameterization coordinates.
    pub uv: Point2,
    /// Held fixed during optimization when `true`.
    pub pinned: bool,
    edges: Vec<EdgeId>,
    /// Per-vertex weights over incident edges (barycentric/conformal),
    /// normalized to sum to 1. Populated by [`Mesh::compute_vertex_weights`].
    pub weights: Vec<(VertexId, f64)>,
}

impl Vertex {
    fn new(position: Point3) -> Self {
        Self {
            position,
            uv: Point2::origin(),
            pinned: false,
            edges: Vec::new(),
            weights: Vec::new(),
        }
    }

    /// Incident edges, in insertion order.
    pub fn incident_edges(&self) -> &[EdgeId] {
        &self.edges
    }
}

/// An edge: an unordered vertex pair stored in canonical form (`v0 <= v1` by
/// unique id), with the incident-face list.
#[derive(Debug, Clone)]
pub struct Edge {
    v0: VertexId,
    v1: VertexId,
    faces: Vec<FaceId>,
}

impl Edge {
    /// The canonical first endpoint.
    pub fn v0(&self) -> VertexId {
        self.v0
    }

    /// The canonical second endpoint.
    pub fn v1(&self) -> VertexId {
        self.v1
    }

    /// Faces incident to this edge, in insertion order.
    pub fn incident_faces(&self) -> &[FaceId] {
        &self.faces
    }
}

/// One edge reference within a face's traversal cycle.
#[derive(Debug, Clone, Copy)]
pub struct FaceEdgeRef {
    /// The referenced edge.
    pub edge: EdgeId,
    /// `true` if the edge's canonical `v0` coincides with the face's
    /// traversal direction at this position.
    pub forward: bool,
}

/// A face: an ordered cycle of edges of length >= 3.
#[derive(Debug, Clone)]
pub struct Face {
    refs: Vec<FaceEdgeRef>,
}

impl Face {
    /// The face's edge cycle, in traversal order.
    pub fn edge_refs(&self) -> &[FaceEdgeRef] {
        &self.refs
    }
}

/// Arena-backed non-manifold mesh: vertices, edges, and faces with
/// Euler-style editing operations.
#[derive(Default)]
pub struct Mesh {
    vertices: SlotMap<VertexId, Vertex>,
    edges: SlotMap<EdgeId, Edge>,
    faces: SlotMap<FaceId, Face>,
    vertex_order: Vec<VertexId>,
    edge_order: Vec<EdgeId>,
    face_order: Vec<FaceId>,
    vertex_pos: SecondaryMap<VertexId, usize>,
    edge_pos: SecondaryMap<EdgeId, usize>,
    face_pos: SecondaryMap<FaceId, usize>,
    edge_by_verts: HashMap<(VertexId, VertexId), EdgeId>,
}

fn canonical_pair(a: VertexId, b: VertexId) -> (VertexId, VertexId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl Mesh {
    /// An empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices currently in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.vertex_order.len()
    }

    /// Number of edges currently in the mesh.
    pub fn edge_count(&self) -> usize {
        self.edge_order.len()
    }

    /// Number of faces currently in the mesh.
    pub fn face_count(&self) -> usize {
        self.face_order.len()
    }

    /// Iterate vertex ids in mesh order (index == position in this sequence).
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertex_order.iter().copied()
    }

    /// Iterate edge ids in mesh order.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edge_order.iter().copied()
    }

    /// Iterate face ids in mesh order.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.face_order.iter().copied()
    }

    /// This vertex's position within the mesh's vertex sequence.
    pub fn vertex_index(&self, v: VertexId) -> Option<usize> {
        self.vertex_pos.get(v).copied()
    }

    /// This edge's position within the mesh's edge sequence.
    pub fn edge_index(&self, e: EdgeId) -> Option<usize> {
        self.edge_pos.get(e).copied()
    }

    /// This face's position within the mesh's face sequence.
    pub fn face_index(&self, f: FaceId) -> Option<usize> {
        self.face_pos.get(f).copied()
    }

    /// Read access to a vertex.
    pub fn vertex(&self, v: VertexId) -> Option<&Vertex> {
        self.vertices.get(v)
    }

    /// Mutable access to a vertex (for writing `position`/`uv`/`pinned`).
    pub fn vertex_mut(&mut self, v: VertexId) -> Option<&mut Vertex> {
        self.vertices.get_mut(v)
    }

    /// Read access to an edge.
    pub fn edge(&self, e: EdgeId) -> Option<&Edge> {
        self.edges.get(e)
    }

    /// Read access to a face.
    pub fn face(&self, f: FaceId) -> Option<&Face> {
        self.faces.get(f)
    }

    /// Create a free-standing vertex and transfer it into the mesh, assigning
    /// it an index. A `VertexId` can only be produced by this call, so the
    /// "idempotent if already a member" postcondition of the source
    /// operation holds trivially: there is no way to call this twice for the
    /// same vertex.
    pub fn add_vertex(&mut self, position: Point3) -> VertexId {
        let id = self.vertices.insert(Vertex::new(position));
        self.vertex_pos.insert(id, self.vertex_order.len());
        self.vertex_order.push(id);
        id
    }

    /// Look up (or create) the canonical edge between `a` and `b`.
    fn get_or_create_edge(&mut self, a: VertexId, b: VertexId) -> EdgeId {
        let (v0, v1) = canonical_pair(a, b);
        if let Some(&id) = self.edge_by_verts.get(&(v0, v1)) {
            return id;
        }
        let id = self.edges.insert(Edge {
            v0,
            v1,
            faces: Vec::new(),
        });
        self.edge_pos.insert(id, self.edge_order.len());
        self.edge_order.push(id);
        self.edge_by_verts.insert((v0, v1), id);
        if let Some(vert) = self.vertices.get_mut(v0) {
            vert.edges.push(id);
        }
        if let Some(vert) = self.vertices.get_mut(v1) {
            vert.edges.push(id);
        }
        id
    }

    /// Build a face from an ordered cycle of at least 3 vertices, reusing any
    /// existing canonical edge between consecutive vertices and creating new
    /// edges otherwise. Appends the face to each edge's face list and each
    /// new edge to each endpoint's edge list.
    pub fn add_face(&mut self, verts: &[VertexId]) -> Result<FaceId, MeshError> {
        if verts.len() < 3 {
            return Err(MeshError::DegenerateFace(verts.len()));
        }
        for &v in verts {
            if !self.vertices.contains_key(v) {
                return Err(MeshError::UnknownVertex);
            }
        }

        let n = verts.len();
        let mut refs = Vec::with_capacity(n);
        for i in 0..n {
            let a = verts[i];
            let b = verts[(i + 1) % n];
            let edge = self.get_or_create_edge(a, b);
            let canonical_v0 = self.edges[edge].v0;
            refs.push(FaceEdgeRef {
                edge,
                forward: canonical_v0 == a,
            });
        }

        let face_id = self.faces.insert(Face { refs });
        self.face_pos.insert(face_id, self.face_order.len());
        self.face_order.push(face_id);

        for r in &self.faces[face_id].refs {
            self.edges[r.edge].faces.push(face_id);
        }
        Ok(face_id)
    }

    /// Swap the mesh-sequence positions of two vertices. Unique ids are
    /// unchanged; only `index()` is affected. Used to partition vertices
    /// into `[free | pinned]` before optimization.
    pub fn swap_vertex(&mut self, a: VertexId, b: VertexId) {
        if a == b {
            return;
        }
        let (Some(&pa), Some(&pb)) = (self.vertex_pos.get(a), self.vertex_pos.get(b)) else {
            return;
        };
        self.vertex_order.swap(pa, pb);
        self.vertex_pos.insert(a, pb);
        self.vertex_pos.insert(b, pa);
    }

    fn swap_remove_vertex_order(&mut self, v: VertexId) {
        let Some(pos) = self.vertex_pos.remove(v) else {
            return;
        };
        self.vertex_order.swap_remove(pos);
        if let Some(&moved) = self.vertex_order.get(pos) {
            self.vertex_pos.insert(moved, pos);
        }
    }

    fn swap_remove_edge_order(&mut self, e: EdgeId) {
        let Some(pos) = self.edge_pos.remove(e) else {
            return;
        };
        self.edge_order.swap_remove(pos);
        if let Some(&moved) = self.edge_order.get(pos) {
            self.edge_pos.insert(moved, pos);
        }
    }

    fn swap_remove_face_order(&mut self, f: FaceId) {
        let Some(pos) = self.face_pos.remove(f) else {
            return;
        };
        self.face_order.swap_remove(pos);
        if let Some(&moved) = self.face_order.get(pos) {
            self.face_pos.insert(moved, pos);
        }
    }

    /// Remove a vertex. No-op if the vertex has incident edges still
    /// referencing it (callers should remove edges/faces first); this
    /// mirrors the source kernel's "delete only when edge-less" cascade
    /// terminus.
    pub fn remove_vertex(&mut self, v: VertexId) {
        let Some(vertex) = self.vertices.get(v) else {
            return;
        };
        if !vertex.edges.is_empty() {
            warn!("remove_vertex called on vertex with {} incident edge(s); ignoring", vertex.edges.len());
            return;
        }
        self.vertices.remove(v);
        self.swap_remove_vertex_order(v);
    }

    /// Remove an edge: detaches it from its two endpoint vertices' edge
    /// lists, cascading into [`Mesh::remove_vertex`] for any endpoint left
    /// edge-less, then removes the edge itself. Does nothing if the edge
    /// still has incident faces.
    pub fn remove_edge(&mut self, e: EdgeId) {
        let Some(edge) = self.edges.get(e).cloned() else {
            return;
        };
        if !edge.faces.is_empty() {
            warn!("remove_edge called on edge with {} incident face(s); ignoring", edge.faces.len());
            return;
        }
        for v in [edge.v0, edge.v1] {
            if let Some(vertex) = self.vertices.get_mut(v) {
                vertex.edges.retain(|&eid| eid != e);
            }
        }
        self.edge_by_verts.remove(&(edge.v0, edge.v1));
        self.edges.remove(e);
        self.swap_remove_edge_order(e);
        for v in [edge.v0, edge.v1] {
            if self.vertices.get(v).is_some_and(|vx| vx.edges.is_empty()) {
                self.remove_vertex(v);
            }
        }
    }

    /// Remove a face: detaches it from each incident edge's face list,
    /// cascading into [`Mesh::remove_edge`] for any edge left face-less.
    pub fn remove_face(&mut self, f: FaceId) {
        let Some(face) = self.faces.get(f).cloned() else {
            return;
        };
        for r in &face.refs {
            if let Some(edge) = self.edges.get_mut(r.edge) {
                edge.faces.retain(|&fid| fid != f);
            }
        }
        self.faces.remove(f);
        self.swap_remove_face_order(f);
        for r in &face.refs {
            if self.edges.get(r.edge).is_some_and(|e| e.faces.is_empty()) {
                self.remove_edge(r.edge);
            }
        }
    }

    /// `true` if `e` has at most one incident face (a boundary edge).
    pub fn is_free(&self, e: EdgeId) -> bool {
        self.edges.get(e).is_some_and(|edge| edge.faces.len() <= 1)
    }

    /// `true` if `e` has 3 or more incident faces (a non-manifold t-join).
    pub fn is_tjoin(&self, e: EdgeId) -> bool {
        self.edges.get(e).is_some_and(|edge| edge.faces.len() >= 3)
    }

    /// `true` if every edge incident to `v` is free or a t-join (i.e. `v`
    /// has no regular 2-face-manifold edge), or `v` has no edges at all.
    pub fn is_locked(&self, v: VertexId) -> bool {
        let Some(vertex) = self.vertices.get(v) else {
            return false;
        };
        vertex
            .edges
            .iter()
            .all(|&e| self.is_free(e) || self.is_tjoin(e))
    }

    /// Faces incident to `v`, each visited exactly once even if multiple
    /// shared edges connect it to the same face.
    pub fn vertex_incident_faces(&self, v: VertexId) -> Vec<FaceId> {
        let mut seen = Vec::new();
        let Some(vertex) = self.vertices.get(v) else {
            return seen;
        };
        for &e in &vertex.edges {
            if let Some(edge) = self.edges.get(e) {
                for &f in &edge.faces {
                    if !seen.contains(&f) {
                        seen.push(f);
                    }
                }
            }
        }
        seen
    }

    /// Faces adjacent to `f` across any of its incident edges, excluding `f`
    /// itself.
    pub fn face_neighbors(&self, f: FaceId) -> Vec<FaceId> {
        let mut out = Vec::new();
        let Some(face) = self.faces.get(f) else {
            return out;
        };
        for r in &face.refs {
            if let Some(edge) = self.edges.get(r.edge) {
                for &nf in &edge.faces {
                    if nf != f && !out.contains(&nf) {
                        out.push(nf);
                    }
                }
            }
        }
        out
    }

    /// Oriented vertex cycle of a face (the traversal order its edges were
    /// built with).
    pub fn face_vertices(&self, f: FaceId) -> Vec<VertexId> {
        let Some(face) = self.faces.get(f) else {
            return Vec::new();
        };
        face.refs
            .iter()
            .map(|r| {
                let e = &self.edges[r.edge];
                if r.forward {
                    e.v0
                } else {
                    e.v1
                }
            })
            .collect()
    }

    /// Oriented 3D points of a face, in traversal order.
    pub fn face_points(&self, f: FaceId) -> Vec<Point3> {
        self.face_vertices(f)
            .into_iter()
            .filter_map(|v| self.vertices.get(v).map(|vx| vx.position))
            .collect()
    }

    /// Weighted-Newell face normal (unnormalized magnitude is twice the
    /// polygon's area).
    pub fn face_normal(&self, f: FaceId) -> Vec3 {
        let pts = self.face_points(f);
        if pts.len() < 3 {
            return Vec3::zeros();
        }
        let v0 = pts[0];
        let mut sum = Vec3::zeros();
        for i in 1..pts.len() - 1 {
            sum += (pts[i] - v0).cross(&(pts[i + 1] - v0));
        }
        sum
    }

    /// Reverse every edge-orientation bit of `f`. Applying this twice
    /// restores the original orientation bits.
    pub fn flip_face(&mut self, f: FaceId) {
        if let Some(face) = self.faces.get_mut(f) {
            for r in &mut face.refs {
                r.forward = !r.forward;
            }
            face.refs.reverse();
        }
    }

    /// Ear-clip a face into triangles in its own parameter-domain `(u, v)`
    /// coordinates, returning triangles as `[VertexId; 3]`.
    pub fn triangulate_face_uv(&self, f: FaceId) -> Vec<[VertexId; 3]> {
        let verts = self.face_vertices(f);
        if verts.len() == 3 {
            return vec![[verts[0], verts[1], verts[2]]];
        }
        let pts_2d: Vec<Point2> = verts
            .iter()
            .filter_map(|&v| self.vertices.get(v).map(|vx| vx.uv))
            .collect();
        if pts_2d.len() != verts.len() {
            return Vec::new();
        }
        let indices: Vec<usize> = (0..verts.len()).collect();
        ear_clip_triangulate(&pts_2d, &indices, false)
            .into_iter()
            .map(|[a, b, c]| [verts[a], verts[b], verts[c]])
            .collect()
    }

    /// Split edge `e` at parameter `t` along `P(v0) + t*(P(v1)-P(v0))`,
    /// rebuilding every incident face either with the new vertex inserted
    /// between the edge's endpoints or, if `triangulate`, as a fan of
    /// triangles anchored at the new vertex.
    pub fn split_edge(&mut self, e: EdgeId, t: f64, triangulate: bool) -> Result<VertexId, MeshError> {
        let edge = self.edges.get(e).ok_or(MeshError::UnknownEdge)?.clone();
        let p0 = self.vertices[edge.v0].position;
        let p1 = self.vertices[edge.v1].position;
        let new_pos = p0 + (p1 - p0) * t;
        let uv0 = self.vertices[edge.v0].uv;
        let uv1 = self.vertices[edge.v1].uv;

        let v_new = self.add_vertex(new_pos);
        self.vertices[v_new].uv = Point2::from(uv0.coords + (uv1.coords - uv0.coords) * t);

        let incident_faces = edge.faces.clone();
        for f in incident_faces {
            let old_verts = self.face_vertices(f);
            self.remove_face(f);
            let pos_v0 = old_verts.iter().position(|&v| v == edge.v0);
            let pos_v1 = old_verts.iter().position(|&v| v == edge.v1);
            let (Some(i0), Some(i1)) = (pos_v0, pos_v1) else {
                continue;
            };
            let n = old_verts.len();
            let consecutive_forward = (i0 + 1) % n == i1;
            let mut new_cycle = Vec::with_capacity(n + 1);
            for (idx, &v) in old_verts.iter().enumerate() {
                new_cycle.push(v);
                if consecutive_forward && idx == i0 {
                    new_cycle.push(v_new);
                } else if !consecutive_forward && idx == i1 {
                    new_cycle.push(v_new);
                }
            }

            if triangulate && new_cycle.len() > 3 {
                let anchor = new_cycle[0];
                for w in 1..new_cycle.len() - 1 {
                    let _ = self.add_face(&[anchor, new_cycle[w], new_cycle[w + 1]]);
                }
            } else {
                let _ = self.add_face(&new_cycle);
            }
        }

        Ok(v_new)
    }

    /// Collapse `e` onto vertex `v` (one of its endpoints, or a
    /// previously-split new vertex): faces incident to the other endpoint
    /// but not incident to `e` are rebuilt with `v` substituted in; faces
    /// incident to `e` are removed outright.
    pub fn join_edge(&mut self, e: EdgeId, v: VertexId) -> Result<(), MeshError> {
        let edge = self.edges.get(e).ok_or(MeshError::UnknownEdge)?.clone();
        let other = if edge.v0 == v {
            edge.v1
        } else if edge.v1 == v {
            edge.v0
        } else {
            return Err(MeshError::UnknownVertex);
        };

        let e_faces = edge.faces.clone();
        let other_faces: Vec<FaceId> = self
            .vertices
            .get(other)
            .map(|vx| vx.edges.clone())
            .unwrap_or_default()
            .iter()
            .flat_map(|&inc_e| self.edges.get(inc_e).map(|ed| ed.faces.clone()).unwrap_or_default())
            .filter(|f| !e_faces.contains(f))
            .collect();

        let mut rebuilt = Vec::new();
        for f in other_faces {
            if rebuilt.contains(&f) {
                continue;
            }
            rebuilt.push(f);
            let verts = self.face_vertices(f);
            let substituted: Vec<VertexId> = verts
                .into_iter()
                .map(|w| if w == other { v } else { w })
                .collect();
            self.remove_face(f);
            if substituted.len() >= 3 {
                let _ = self.add_face(&substituted);
            }
        }

        for f in e_faces {
            self.remove_face(f);
        }

        Ok(())
    }

    /// Split face `f` into two along the chord `(v0, v1)`, where both
    /// vertices belong to `f` and are not already adjacent on it.
    pub fn split_face(&mut self, f: FaceId, v0: VertexId, v1: VertexId) -> Result<EdgeId, MeshError> {
        let verts = self.face_vertices(f);
        let i0 = verts.iter().position(|&v| v == v0).ok_or(MeshError::VertexNotOnFace)?;
        let i1 = verts.iter().position(|&v| v == v1).ok_or(MeshError::VertexNotOnFace)?;
        let n = verts.len();
        if (i0 + 1) % n == i1 || (i1 + 1) % n == i0 {
            return Err(MeshError::VerticesAlreadyAdjacent);
        }

        let (lo, hi) = if i0 < i1 { (i0, i1) } else { (i1, i0) };
        let mut cycle_a = verts[lo..=hi].to_vec();
        let mut cycle_b: Vec<VertexId> = verts[hi..].iter().chain(verts[..=lo].iter()).copied().collect();
        cycle_a.dedup();
        cycle_b.dedup();

        self.remove_face(f);
        self.add_face(&cycle_a)?;
        self.add_face(&cycle_b)?;
        let (c0, c1) = canonical_pair(v0, v1);
        Ok(*self.edge_by_verts.get(&(c0, c1)).expect("chord edge just created"))
    }

    /// Merge two faces sharing exactly one edge. The joined face inherits
    /// `f0`'s starting point; if both faces traverse the shared edge in the
    /// same direction, `f1`'s extra vertices are spliced in reverse,
    /// otherwise forward. Returns `f0` unchanged (as an error) if the faces
    /// don't share exactly one edge.
    pub fn join_face(&mut self, f0: FaceId, f1: FaceId) -> Result<FaceId, MeshError> {
        let refs0 = self.faces.get(f0).ok_or(MeshError::UnknownFace)?.refs.clone();
        let refs1 = self.faces.get(f1).ok_or(MeshError::UnknownFace)?.refs.clone();
        let edges0: Vec<EdgeId> = refs0.iter().map(|r| r.edge).collect();
        let edges1: Vec<EdgeId> = refs1.iter().map(|r| r.edge).collect();
        let shared: Vec<EdgeId> = edges0.iter().filter(|e| edges1.contains(e)).copied().collect();
        if shared.len() != 1 {
            return Err(MeshError::VerticesAlreadyAdjacent);
        }
        let shared_edge = shared[0];

        let verts0 = self.face_vertices(f0);
        let verts1 = self.face_vertices(f1);
        let pos0 = edges0.iter().position(|&e| e == shared_edge).unwrap();
        let pos1 = edges1.iter().position(|&e| e == shared_edge).unwrap();

        let shared_same_direction = refs0[pos0].forward == refs1[pos1].forward;

        let mut merged = verts0.clone();
        let insert_at = (pos0 + 1) % verts0.len();
        let mut extra: Vec<VertexId> = verts1
            .iter()
            .cycle()
            .skip(pos1 + 1)
            .take(verts1.len() - 2)
            .copied()
            .collect();
        if shared_same_direction {
            extra.reverse();
        }
        for (k, v) in extra.into_iter().enumerate() {
            merged.insert(insert_at + k, v);
        }

        self.remove_face(f0);
        self.remove_face(f1);
        self.add_face(&merged)
    }

    /// Per-vertex weights over incident neighbors, normalized to sum to 1.
    /// `conformal=false` gives uniform (Tutte) weights `1/valence`;
    /// `conformal=true` gives cotangent-weighted (discrete harmonic)
    /// weights computed from the opposite angles in each incident triangle.
    pub fn compute_vertex_weights(&mut self, conformal: bool) {
        let ids: Vec<VertexId> = self.vertex_order.clone();
        for v in ids {
            let weights = self.vertex_weights_for(v, conformal);
            if let Some(vertex) = self.vertices.get_mut(v) {
                vertex.weights = weights;
            }
        }
    }

    fn vertex_weights_for(&self, v: VertexId, conformal: bool) -> Vec<(VertexId, f64)> {
        let Some(vertex) = self.vertices.get(v) else {
            return Vec::new();
        };
        let mut raw: HashMap<VertexId, f64> = HashMap::new();
        for &e in &vertex.edges {
            let edge = &self.edges[e];
            let other = if edge.v0 == v { edge.v1 } else { edge.v0 };
            let w = if conformal {
                self.cotangent_weight(e, v, other)
            } else {
                1.0
            };
            *raw.entry(other).or_insert(0.0) += w.max(0.0);
        }
        let total: f64 = raw.values().sum();
        if total.abs() < 1e-14 {
            let n = raw.len().max(1) as f64;
            return raw.into_keys().map(|k| (k, 1.0 / n)).collect();
        }
        raw.into_iter().map(|(k, w)| (k, w / total)).collect()
    }

    fn cotangent_weight(&self, e: EdgeId, a: VertexId, b: VertexId) -> f64 {
        let edge = &self.edges[e];
        let mut sum = 0.0;
        for &f in &edge.faces {
            let verts = self.face_vertices(f);
            if let Some(opposite) = verts.iter().find(|&&v| v != a && v != b) {
                let pa = self.vertices[a].position;
                let pb = self.vertices[b].position;
                let po = self.vertices[*opposite].position;
                sum += cotangent_at(po, pa, pb);
            }
        }
        sum.max(0.0)
    }
}

/// Cotangent of the angle at `apex` in triangle `(apex, a, b)`.
fn cotangent_at(apex: Point3, a: Point3, b: Point3) -> f64 {
    let u = a - apex;
    let v = b - apex;
    let cos_theta = u.dot(&v);
    let sin_theta = u.cross(&v).norm();
    if sin_theta.abs() < 1e-14 {
        0.0
    } else {
        cos_theta / sin_theta
    }
}

/// Compute `min(det, 0)` over the given per-primitive signed areas: the
/// starting untangling delta. Zero means no inverted primitives.
pub fn compute_untangle_delta(signed_areas: impl IntoIterator<Item = f64>) -> f64 {
    signed_areas.into_iter().fold(0.0, f64::min)
}

/// Signed area of a face in its current `(u, v)` parameterization, via a fan
/// triangulation from the face's first vertex (matches [`Mesh::triangulate_face_uv`]
/// for triangles and generalizes `polygon_area_2d` for larger faces).
pub fn face_signed_area_uv(mesh: &Mesh, f: FaceId) -> f64 {
    let verts = mesh.face_vertices(f);
    if verts.len() < 3 {
        return 0.0;
    }
    let pts: Vec<Point2> = verts.iter().map(|&v| mesh.vertices[v].uv).collect();
    let mut area = 0.0;
    for i in 1..pts.len() - 1 {
        area += triangle_area_signed_x2(pts[0], pts[i], pts[i + 1]) / 2.0;
    }
    area
}

/// `true` if `p` lies strictly inside the triangle `(a, b, c)` in `(u, v)`
/// space (re-exported convenience over [`point_in_triangle_2d`] for callers
/// that only depend on `param-mesh`).
pub fn point_in_triangle(p: Point2, a: Point2, b: Point2, c: Point2) -> bool {
    point_in_triangle_2d(p, a, b, c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quad() -> (Mesh, [VertexId; 4]) {
        let mut mesh = Mesh::new();
        let v0 = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let v1 = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
        let v2 = mesh.add_vertex(Point3::new(1.0, 1.0, 0.0));
        let v3 = mesh.add_vertex(Point3::new(0.0, 1.0, 0.0));
        mesh.add_face(&[v0, v1, v2, v3]).unwrap();
        (mesh, [v0, v1, v2, v3])
    }

    fn two_triangles() -> (Mesh, [VertexId; 4], FaceId, FaceId) {
        let mut mesh = Mesh::new();
        let v0 = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let v1 = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
        let v2 = mesh.add_vertex(Point3::new(1.0, 1.0, 0.0));
        let v3 = mesh.add_vertex(Point3::new(0.0, 1.0, 0.0));
        let f0 = mesh.add_face(&[v0, v1, v2]).unwrap();
        let f1 = mesh.add_face(&[v0, v2, v3]).unwrap();
        (mesh, [v0, v1, v2, v3], f0, f1)
    }

    #[test]
    fn add_face_creates_shared_edges() {
        let (mesh, _) = two_triangles();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
        // 5 edges: 4 boundary + 1 diagonal shared by both triangles.
        assert_eq!(mesh.edge_count(), 5);
    }

    #[test]
    fn shared_diagonal_has_two_incident_faces() {
        let (mesh, verts, f0, f1) = two_triangles();
        let diag = mesh
            .edge_ids()
            .find(|&e| {
                let edge = mesh.edge(e).unwrap();
                let pair = (edge.v0(), edge.v1());
                pair == canonical_pair(verts[0], verts[2])
            })
            .unwrap();
        let faces = mesh.edge(diag).unwrap().incident_faces();
        assert_eq!(faces.len(), 2);
        assert!(faces.contains(&f0) && faces.contains(&f1));
        assert!(!mesh.is_free(diag));
        assert!(!mesh.is_tjoin(diag));
    }

    #[test]
    fn boundary_edges_are_free() {
        let (mesh, verts, ..) = two_triangles();
        let boundary = mesh
            .edge_ids()
            .find(|&e| {
                let edge = mesh.edge(e).unwrap();
                (edge.v0(), edge.v1()) == canonical_pair(verts[0], verts[1])
            })
            .unwrap();
        assert!(mesh.is_free(boundary));
    }

    #[test]
    fn index_matches_position_after_swap() {
        let (mut mesh, verts) = unit_quad();
        mesh.swap_vertex(verts[0], verts[3]);
        assert_eq!(mesh.vertex_index(verts[0]), Some(3));
        assert_eq!(mesh.vertex_index(verts[3]), Some(0));
        for (i, v) in mesh.vertex_ids().enumerate() {
            assert_eq!(mesh.vertex_index(v), Some(i));
        }
    }

    #[test]
    fn remove_face_cascades_to_unshared_edges_and_vertices() {
        let (mut mesh, _, f0, f1) = two_triangles();
        mesh.remove_face(f0);
        assert_eq!(mesh.face_count(), 1);
        mesh.remove_face(f1);
        assert_eq!(mesh.face_count(), 0);
        assert_eq!(mesh.edge_count(), 0);
        assert_eq!(mesh.vertex_count(), 0);
    }

    #[test]
    fn split_edge_then_join_edge_restores_topology() {
        let (mut mesh, verts) = unit_quad();
        let before_faces = mesh.face_count();
        let before_edges = mesh.edge_count();
        let e01 = mesh
            .edge_ids()
            .find(|&e| mesh.edge(e).unwrap().v0() == canonical_pair(verts[0], verts[1]).0
                && mesh.edge(e).unwrap().v1() == canonical_pair(verts[0], verts[1]).1)
            .unwrap();
        let v_new = mesh.split_edge(e01, 0.5, false).unwrap();
        assert_eq!(mesh.vertex_count(), 5);
        assert_eq!(mesh.face_count(), before_faces);

        let new_edge = mesh
            .edge_ids()
            .find(|&e| {
                let edge = mesh.edge(e).unwrap();
                edge.v0() == v_new || edge.v1() == v_new
            })
            .unwrap();
        mesh.join_edge(new_edge, verts[0]).unwrap();
        assert_eq!(mesh.face_count(), before_faces);
        assert_eq!(mesh.edge_count(), before_edges);
    }

    #[test]
    fn flip_face_twice_is_identity() {
        let (mut mesh, _, f0, _) = two_triangles();
        let before: Vec<bool> = mesh.face(f0).unwrap().edge_refs().iter().map(|r| r.forward).collect();
        mesh.flip_face(f0);
        mesh.flip_face(f0);
        let after: Vec<bool> = mesh.face(f0).unwrap().edge_refs().iter().map(|r| r.forward).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn is_locked_true_for_isolated_vertex() {
        let mut mesh = Mesh::new();
        let v = mesh.add_vertex(Point3::origin());
        assert!(mesh.is_locked(v));
    }

    #[test]
    fn compute_untangle_delta_reports_most_negative() {
        let d = compute_untangle_delta([1.0, -0.5, 2.0, -3.0]);
        assert!((d + 3.0).abs() < 1e-12);
        assert_eq!(compute_untangle_delta([1.0, 2.0]), 0.0);
    }

    #[test]
    fn uniform_vertex_weights_sum_to_one() {
        let (mut mesh, _, ..) = two_triangles();
        mesh.compute_vertex_weights(false);
        for v in mesh.vertex_ids().collect::<Vec<_>>() {
            let total: f64 = mesh.vertex(v).unwrap().weights.iter().map(|(_, w)| w).sum();
            if !mesh.vertex(v).unwrap().weights.is_empty() {
                assert!((total - 1.0).abs() < 1e-9);
            }
        }
    }
}
