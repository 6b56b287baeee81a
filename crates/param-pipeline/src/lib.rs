#![warn(missing_docs)]

//! The pipeline driver (PD): wires initial projection, the untangler, and
//! the NLO minimizer over a [`param_mesh::Mesh`], matching the CLI surface
//! described by the binary crate.
//!
//! The driver itself never talks to a backend's device buffers directly
//! except through [`param_optimizer::minimize`]; everything before and
//! after that call operates on the mesh's own `(u, v)` fields, copying them
//! into and out of a flat buffer only for the duration of the optimization.

use log::{info, warn};
use param_backend::{Backend, CpuBackend};
use param_energy::{
    evaluate_knupp_quad, evaluate_knupp_triangle, evaluate_triangle, EnergyKind, TriangleConstants,
};
use param_geom::triangle_area_signed_2d;
use param_linesearch::LineSearch;
use param_math::{Point2, Vec2};
use param_mesh::{FaceId, Mesh, VertexId};
use param_optimizer::{minimize, EnergyFunction, NloConfig, NloResult};
use param_untangle::{untangle, UntangleConfig, UntangleResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Initial-projection strategy selected by the CLI's `proj` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    /// Project `(x, y)` from the 3D reference and scale by `1 / planar_scale`.
    Planar,
    /// Map the longest free boundary loop to a circle, then Tutte/conformal
    /// smooth the interior.
    Circular,
    /// Use the mesh's current `(u, v)`, reversing global orientation if most
    /// triangles come out inverted.
    Uv,
}

/// Pipeline configuration, mirroring the CLI's option table.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum NLO outer iterations; `0` skips optimization entirely.
    pub opt_iters: usize,
    /// Maximum untangler iterations (also the Tutte-smoothing step count
    /// for circular projection).
    pub un_iters: usize,
    /// NLO iterations between rescales; `0` disables rescaling.
    pub scale_iters: usize,
    /// Backend parallel group size.
    pub workgroup: usize,
    /// Initial projection strategy.
    pub projection: Projection,
    /// Whether boundary vertices are free to move (as opposed to locked).
    pub free_boundaries: bool,
    /// Which energy family to minimize.
    pub energy: EnergyKind,
    /// Reference scale used by planar projection (`m_Scale`).
    pub planar_scale: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            opt_iters: 1000,
            un_iters: 1000,
            scale_iters: 300,
            workgroup: 512,
            projection: Projection::Uv,
            free_boundaries: true,
            energy: EnergyKind::Isometric { theta: 1.0 },
            planar_scale: 1.0,
        }
    }
}

/// Outcome of a [`run`] call.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// The untangler's result, if it ran (only when the initial mesh had
    /// inverted triangles).
    pub untangle: Option<UntangleResult>,
    /// The NLO minimizer's result, if it ran (`opt_iters > 0`).
    pub nlo: Option<NloResult>,
}

/// Apply a pinned-vertex list (produced by `param_io::read_pinned_vertices`)
/// to a mesh: marks the referenced vertices pinned. The file's `(u, v)`
/// tokens are read but not otherwise applied to the mesh (matching the
/// original's `read_map_file`, which only ever sets the `pinned` flag — its
/// corresponding `u`/`v` assignment is dead code in the source it was
/// distilled from).
///
/// `id` is interpreted as a position in the mesh's current vertex sequence
/// (`Mesh::vertex_ids()` order), taken directly with no translation.
pub fn apply_pinned_vertices(mesh: &mut Mesh, pinned: &[param_io::PinnedVertex]) {
    let ids: Vec<VertexId> = mesh.vertex_ids().collect();
    for p in pinned {
        let Some(&id) = ids.get(p.id) else {
            warn!(
                "pinned vertex index {} is out of range for a mesh of {} vertices",
                p.id,
                ids.len()
            );
            continue;
        };
        if let Some(v) = mesh.vertex_mut(id) {
            v.pinned = true;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TriRecord {
    idx: [usize; 3],
    consts: Option<TriangleConstants>,
}

/// The merit function and analytical gradient over a mesh's free-vertex
/// `(u, v)` buffer, bridging [`param_mesh::Mesh`]'s face records to
/// [`param_optimizer::EnergyFunction`].
struct MeshEnergy {
    kind: EnergyKind,
    triangles: Vec<TriRecord>,
    quads: Vec<[usize; 4]>,
    n_free: usize,
    fixed: Vec<Vec2>,
    delta: f64,
}

impl MeshEnergy {
    fn has_primitives(&self) -> bool {
        !self.triangles.is_empty() || !self.quads.is_empty()
    }

    fn position(&self, x: &[f64], idx: usize, scale: f64) -> Vec2 {
        if idx < self.n_free {
            Vec2::new(x[2 * idx], x[2 * idx + 1]) * scale
        } else {
            self.fixed[idx - self.n_free]
        }
    }

    /// Evaluate the scaled-problem global cost and its gradient with every
    /// free vertex's position first multiplied by `scale` (`scale = 1.0`
    /// during ordinary NLO evaluations; the rescale probe sweeps `scale`).
    fn evaluate(&self, x: &[f64], scale: f64) -> (f64, Vec<f64>) {
        let mut grad_t = vec![0.0; 2 * self.n_free];
        let mut tri_sum = 0.0;
        for t in &self.triangles {
            let [i, j, k] = t.idx;
            let a = self.position(x, i, scale);
            let b = self.position(x, j, scale);
            let c = self.position(x, k, scale);
            let result = match (&self.kind, &t.consts) {
                (EnergyKind::Knupp, _) => evaluate_knupp_triangle(a, b, c, self.delta),
                (kind, Some(consts)) => evaluate_triangle(a, b, c, consts, *kind, self.delta),
                (_, None) => unreachable!("mips/isometric triangle record missing its reference constants"),
            };
            tri_sum += result.value;
            for (slot, &idx) in [i, j, k].iter().enumerate() {
                if idx < self.n_free {
                    grad_t[2 * idx] += result.grad[slot].x;
                    grad_t[2 * idx + 1] += result.grad[slot].y;
                }
            }
        }

        let mut grad_q = vec![0.0; 2 * self.n_free];
        let mut quad_sum = 0.0;
        for &[i, j, k, l] in &self.quads {
            let a = self.position(x, i, scale);
            let b = self.position(x, j, scale);
            let c = self.position(x, k, scale);
            let d = self.position(x, l, scale);
            let (value, grad) = evaluate_knupp_quad(a, b, c, d, self.delta);
            quad_sum += value;
            for (slot, &idx) in [i, j, k, l].iter().enumerate() {
                if idx < self.n_free {
                    grad_q[2 * idx] += grad[slot].x;
                    grad_q[2 * idx + 1] += grad[slot].y;
                }
            }
        }

        let n_t = self.triangles.len();
        let n_q = self.quads.len();
        let mut cost = 0.0;
        let mut grad = vec![0.0; 2 * self.n_free];
        if n_t > 0 {
            cost += tri_sum / n_t as f64 - 1.0;
            for (g, gt) in grad.iter_mut().zip(grad_t.iter()) {
                *g += gt / n_t as f64;
            }
        }
        if n_q > 0 {
            cost += quad_sum / n_q as f64 - 1.0;
            for (g, gq) in grad.iter_mut().zip(grad_q.iter()) {
                *g += gq / n_q as f64;
            }
        }
        (cost, grad)
    }

    /// Average, over all triangles, of `sqrt(reference_area / current_area)`
    /// — an initial guess for the rescale search's bracket center.
    fn estimate_scale(&self, x: &[f64]) -> f64 {
        let mut sum = 0.0;
        let mut n = 0usize;
        for t in &self.triangles {
            let Some(consts) = &t.consts else { continue };
            let [i, j, k] = t.idx;
            let a = self.position(x, i, 1.0);
            let b = self.position(x, j, 1.0);
            let c = self.position(x, k, 1.0);
            let current_area = triangle_area_signed_2d(Point2::new(a.x, a.y), Point2::new(b.x, b.y), Point2::new(c.x, c.y))
                .abs()
                .max(1e-14);
            let reference_area = consts.area0_x2 / 2.0;
            sum += (reference_area / current_area).sqrt();
            n += 1;
        }
        if n == 0 {
            1.0
        } else {
            sum / n as f64
        }
    }
}

impl EnergyFunction<CpuBackend> for MeshEnergy {
    fn eval(&mut self, x: &Vec<f64>) -> f64 {
        self.evaluate(x, 1.0).0
    }

    fn eval_grad(&mut self, x: &Vec<f64>) -> (f64, Vec<f64>) {
        self.evaluate(x, 1.0)
    }

    fn rescale(&mut self, x: &mut Vec<f64>) -> f64 {
        if self.triangles.is_empty() {
            return 1.0;
        }
        let s0 = self.estimate_scale(x).max(1e-8);
        let probe = LineSearch::new(-1.0, 1.0);
        let mut f = |scale: f64| self.evaluate(x, scale).0;
        let (alpha, _) = probe.brent(&mut f, 0.1 * s0, s0, 5.0 * s0, 1e-6, 30);
        for v in x.iter_mut() {
            *v *= alpha;
        }
        alpha
    }
}

fn vertex_index(mesh: &Mesh, v: VertexId) -> usize {
    mesh.vertex_index(v).expect("vertex belongs to this mesh")
}

fn uv_of(mesh: &Mesh, v: VertexId) -> Vec2 {
    let p = mesh.vertex(v).expect("vertex belongs to this mesh").uv;
    Vec2::new(p.x, p.y)
}

fn project_planar(mesh: &mut Mesh, free: &[VertexId], scale: f64) {
    let inv_scale = 1.0 / scale.abs().max(1e-12);
    for &v in free {
        if let Some(vx) = mesh.vertex_mut(v) {
            let pos = vx.position;
            vx.uv = Point2::new(pos.x * inv_scale, pos.y * inv_scale);
        }
    }
}

fn bounding_box_xy(mesh: &Mesh) -> (f64, f64) {
    let mut min = (f64::INFINITY, f64::INFINITY);
    let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for v in mesh.vertex_ids() {
        if let Some(vx) = mesh.vertex(v) {
            min.0 = min.0.min(vx.position.x);
            min.1 = min.1.min(vx.position.y);
            max.0 = max.0.max(vx.position.x);
            max.1 = max.1.max(vx.position.y);
        }
    }
    (max.0 - min.0, max.1 - min.1)
}

/// Walk free boundary edges (incident to at most one face, both endpoints
/// free) into simple loops and return the longest one.
fn longest_free_boundary_loop(mesh: &Mesh, free: &[VertexId]) -> Vec<VertexId> {
    let free_set: HashSet<VertexId> = free.iter().copied().collect();
    let mut adjacency: std::collections::HashMap<VertexId, Vec<VertexId>> = std::collections::HashMap::new();
    for e in mesh.edge_ids() {
        if !mesh.is_free(e) {
            continue;
        }
        let edge = mesh.edge(e).expect("edge id came from this mesh");
        let (a, b) = (edge.v0(), edge.v1());
        if !free_set.contains(&a) || !free_set.contains(&b) {
            continue;
        }
        adjacency.entry(a).or_default().push(b);
        adjacency.entry(b).or_default().push(a);
    }

    let mut visited: HashSet<VertexId> = HashSet::new();
    let mut best: Vec<VertexId> = Vec::new();
    for &start in free {
        if visited.contains(&start) || !adjacency.contains_key(&start) {
            continue;
        }
        let mut loop_verts = vec![start];
        visited.insert(start);
        let mut prev = None;
        let mut current = start;
        loop {
            let neighbors = adjacency.get(&current).cloned().unwrap_or_default();
            let next = neighbors
                .into_iter()
                .find(|&n| Some(n) != prev && (n == start || !visited.contains(&n)));
            match next {
                Some(n) if n == start && loop_verts.len() > 2 => break,
                Some(n) if n == start => break,
                Some(n) => {
                    loop_verts.push(n);
                    visited.insert(n);
                    prev = Some(current);
                    current = n;
                }
                None => break,
            }
        }
        if loop_verts.len() > best.len() {
            best = loop_verts;
        }
    }
    best
}

fn project_circular(mesh: &mut Mesh, free: &[VertexId], un_iters: usize) {
    let boundary = longest_free_boundary_loop(mesh, free);
    if boundary.len() < 3 {
        warn!("circular projection requested but no free boundary loop was found; keeping current (u, v)");
        return;
    }

    let (width, height) = bounding_box_xy(mesh);
    let radius = width.max(height).max(1e-9);
    let n = boundary.len();
    for (i, &v) in boundary.iter().enumerate() {
        let theta = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
        if let Some(vx) = mesh.vertex_mut(v) {
            vx.uv = Point2::new(radius * theta.cos(), radius * theta.sin());
        }
    }

    let boundary_set: HashSet<VertexId> = boundary.iter().copied().collect();
    let interior: Vec<VertexId> = free.iter().copied().filter(|v| !boundary_set.contains(v)).collect();
    for &v in &interior {
        if let Some(vx) = mesh.vertex_mut(v) {
            vx.uv = Point2::origin();
        }
    }

    mesh.compute_vertex_weights(true);
    let damping = 0.5;
    for _ in 0..un_iters {
        let updates: Vec<(VertexId, Point2)> = interior
            .iter()
            .map(|&v| {
                let vertex = mesh.vertex(v).expect("interior vertex belongs to this mesh");
                let mut acc = Vec2::zeros();
                for &(neighbor, w) in &vertex.weights {
                    if let Some(nv) = mesh.vertex(neighbor) {
                        acc += nv.uv.coords * w;
                    }
                }
                let blended = vertex.uv.coords * (1.0 - damping) + acc * damping;
                (v, Point2::from(blended))
            })
            .collect();
        for (v, uv) in updates {
            if let Some(vx) = mesh.vertex_mut(v) {
                vx.uv = uv;
            }
        }
    }
    info!(
        "circular projection: {} boundary vertices, {} interior vertices smoothed over {un_iters} iterations",
        boundary.len(),
        interior.len()
    );
}

fn maybe_flip_uv_orientation(mesh: &mut Mesh, free: &[VertexId]) {
    let face_ids: Vec<FaceId> = mesh.face_ids().collect();
    let mut total = 0usize;
    let mut reversed = 0usize;
    for f in face_ids {
        for [a, b, c] in mesh.triangulate_face_uv(f) {
            total += 1;
            let pa = mesh.vertex(a).unwrap().uv;
            let pb = mesh.vertex(b).unwrap().uv;
            let pc = mesh.vertex(c).unwrap().uv;
            if triangle_area_signed_2d(pa, pb, pc) < 0.0 {
                reversed += 1;
            }
        }
    }
    if total > 0 && reversed * 2 >= total {
        info!("uv projection: {reversed}/{total} triangles are reversed, flipping global orientation");
        for &v in free {
            if let Some(vx) = mesh.vertex_mut(v) {
                vx.uv.x = -vx.uv.x;
            }
        }
    }
}

/// Run the full pipeline driver over `mesh` in place: initial projection,
/// the untangler (if needed), and the NLO minimizer (if `opt_iters > 0`).
///
/// Callers are expected to have already applied any pinned-vertex list via
/// [`apply_pinned_vertices`].
pub fn run(mesh: &mut Mesh, config: &PipelineConfig) -> PipelineResult {
    // Step 1: faces whose every vertex is pinned or locked are left
    // untouched rather than physically removed and reinserted — none of
    // their vertices are ever written to by the steps below, which is
    // functionally equivalent to "set aside, then reinsert verbatim" while
    // avoiding remove_face's edge/vertex cascade.
    let excluded_faces: HashSet<FaceId> = if !config.free_boundaries {
        mesh.face_ids()
            .filter(|&f| {
                mesh.face_vertices(f)
                    .iter()
                    .all(|&v| mesh.vertex(v).is_some_and(|vx| vx.pinned) || mesh.is_locked(v))
            })
            .collect()
    } else {
        HashSet::new()
    };
    if !excluded_faces.is_empty() {
        info!("{} fully pinned/locked face(s) set aside from optimization", excluded_faces.len());
    }

    // Step 2: partition vertices [free | pinned] via swap_vertex.
    let mut order: Vec<VertexId> = mesh.vertex_ids().collect();
    let mut free_end = 0usize;
    for i in 0..order.len() {
        let v = order[i];
        let pinned = mesh.vertex(v).is_some_and(|vx| vx.pinned) || (!config.free_boundaries && mesh.is_locked(v));
        if !pinned {
            if i != free_end {
                mesh.swap_vertex(v, order[free_end]);
                order.swap(i, free_end);
            }
            free_end += 1;
        }
    }
    let n_free = free_end;
    let total = order.len();
    info!("partitioned {total} vertices: {n_free} free, {} pinned", total - n_free);

    // Step 3: initial projection.
    match config.projection {
        Projection::Planar => project_planar(mesh, &order[..n_free], config.planar_scale),
        Projection::Circular => project_circular(mesh, &order[..n_free], config.un_iters),
        Projection::Uv => maybe_flip_uv_orientation(mesh, &order[..n_free]),
    }

    // Steps 4/5: per-face triangle/quad records with precomputed reference
    // constants. The vertex-to-incident-primitive scatter the spec's CSR
    // tables would serve is realized directly: each triangle/quad scatters
    // its gradient into the shared accumulator as it is visited, which is
    // the same result a separate gather pass over an ia/ja table would
    // produce for this single-threaded reference driver.
    let face_ids: Vec<FaceId> = mesh.face_ids().collect();
    let mut triangles = Vec::new();
    let mut quads = Vec::new();
    let mut ut_triangles: Vec<[usize; 3]> = Vec::new();

    for &f in &face_ids {
        if excluded_faces.contains(&f) {
            continue;
        }
        for [a, b, c] in mesh.triangulate_face_uv(f) {
            ut_triangles.push([vertex_index(mesh, a), vertex_index(mesh, b), vertex_index(mesh, c)]);
        }

        let verts = mesh.face_vertices(f);
        match config.energy {
            EnergyKind::Knupp if verts.len() == 4 => {
                quads.push([
                    vertex_index(mesh, verts[0]),
                    vertex_index(mesh, verts[1]),
                    vertex_index(mesh, verts[2]),
                    vertex_index(mesh, verts[3]),
                ]);
            }
            EnergyKind::Knupp => {
                for [a, b, c] in mesh.triangulate_face_uv(f) {
                    triangles.push(TriRecord {
                        idx: [vertex_index(mesh, a), vertex_index(mesh, b), vertex_index(mesh, c)],
                        consts: None,
                    });
                }
            }
            _ if verts.len() == 3 => {
                let pts = mesh.face_points(f);
                let consts = TriangleConstants::from_reference(pts[0], pts[1], pts[2]);
                triangles.push(TriRecord {
                    idx: [vertex_index(mesh, verts[0]), vertex_index(mesh, verts[1]), vertex_index(mesh, verts[2])],
                    consts: Some(consts),
                });
            }
            _ => {
                for [a, b, c] in mesh.triangulate_face_uv(f) {
                    let pa = mesh.vertex(a).unwrap().position;
                    let pb = mesh.vertex(b).unwrap().position;
                    let pc = mesh.vertex(c).unwrap().position;
                    let consts = TriangleConstants::from_reference(pa, pb, pc);
                    triangles.push(TriRecord {
                        idx: [vertex_index(mesh, a), vertex_index(mesh, b), vertex_index(mesh, c)],
                        consts: Some(consts),
                    });
                }
            }
        }
    }

    // Step 6: untangle if the initial projection left inverted triangles.
    let positions_now = || -> Vec<Vec2> { order.iter().map(|&v| uv_of(mesh, v)).collect() };
    let mut delta = param_untangle::delta(&positions_now(), &ut_triangles);
    let mut untangle_result = None;
    if delta > 0.0 {
        info!("mesh has inverted triangles (delta = {delta}), running the untangler");
        let mut positions = positions_now();
        let mut incident_degree = vec![0usize; total];
        for &[i, j, k] in &ut_triangles {
            for w in [i, j, k] {
                if w < n_free {
                    incident_degree[w] += 1;
                }
            }
        }
        let ut_config = UntangleConfig {
            max_iters: config.un_iters.max(1),
            eval_every: config.un_iters.max(1).min(1000),
            ..Default::default()
        };
        let result = untangle(&mut positions, &ut_triangles, &incident_degree, &ut_config);
        for (&v, &p) in order.iter().zip(positions.iter()) {
            if let Some(vx) = mesh.vertex_mut(v) {
                vx.uv = Point2::new(p.x, p.y);
            }
        }
        delta = result.final_delta;
        untangle_result = Some(result);
    }

    // Step 7: optional initial rescale, then NLO.
    let mut nlo_result = None;
    if config.opt_iters > 0 && n_free > 0 {
        let backend = CpuBackend::with_workgroup(config.workgroup);
        let fixed: Vec<Vec2> = order[n_free..].iter().map(|&v| uv_of(mesh, v)).collect();
        let mut energy = MeshEnergy {
            kind: config.energy,
            triangles,
            quads,
            n_free,
            fixed,
            delta,
        };

        let mut x_host = vec![0.0; 2 * n_free];
        for (i, &v) in order[..n_free].iter().enumerate() {
            let uv = uv_of(mesh, v);
            x_host[2 * i] = uv.x;
            x_host[2 * i + 1] = uv.y;
        }
        let mut x = backend.alloc(&x_host).expect("allocate initial point buffer");

        if config.scale_iters > 0 && energy.has_primitives() {
            let applied = energy.rescale(&mut x);
            info!("initial rescale factor: {applied}");
        }

        let mut ls = LineSearch::default();
        let nlo_config = NloConfig {
            history: 5,
            max_iters: config.opt_iters,
            scale_iters: config.scale_iters,
            wolfe_c1: 0.3,
        };
        let result = minimize(&backend, &mut energy, &mut ls, &mut x, 2 * n_free, &nlo_config);

        let solved = backend.read(&x);
        for (i, &v) in order[..n_free].iter().enumerate() {
            if let Some(vx) = mesh.vertex_mut(v) {
                vx.uv = Point2::new(solved[2 * i], solved[2 * i + 1]);
            }
        }
        nlo_result = Some(result);
    }

    // Step 8: (u, v) has already been written back to `mesh` incrementally
    // above; set-aside faces were never touched, so no reinsertion is
    // needed.
    PipelineResult {
        untangle: untangle_result,
        nlo: nlo_result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use param_math::Point3;

    fn unit_square_mesh() -> Mesh {
        let mut mesh = Mesh::new();
        let v0 = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let v1 = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
        let v2 = mesh.add_vertex(Point3::new(1.0, 1.0, 0.0));
        let v3 = mesh.add_vertex(Point3::new(0.0, 1.0, 0.0));
        mesh.add_face(&[v0, v1, v2, v3]).unwrap();
        for v in [v0, v1, v2, v3] {
            let pos = mesh.vertex(v).unwrap().position;
            mesh.vertex_mut(v).unwrap().uv = Point2::new(pos.x, pos.y);
        }
        mesh
    }

    #[test]
    fn planar_projection_scales_free_vertex_uv() {
        let mut mesh = unit_square_mesh();
        let free: Vec<VertexId> = mesh.vertex_ids().collect();
        project_planar(&mut mesh, &free, 2.0);
        for v in free {
            let uv = mesh.vertex(v).unwrap().uv;
            let pos = mesh.vertex(v).unwrap().position;
            assert!((uv.x - pos.x / 2.0).abs() < 1e-12);
            assert!((uv.y - pos.y / 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn run_resolves_an_already_valid_square_to_low_cost() {
        let mut mesh = unit_square_mesh();
        // Perturb the interior slightly so the optimizer has work to do.
        let ids: Vec<VertexId> = mesh.vertex_ids().collect();
        mesh.vertex_mut(ids[2]).unwrap().uv = Point2::new(1.3, 0.8);

        let config = PipelineConfig {
            opt_iters: 200,
            un_iters: 200,
            scale_iters: 0,
            workgroup: 64,
            projection: Projection::Uv,
            free_boundaries: true,
            energy: EnergyKind::Isometric { theta: 1.0 },
            planar_scale: 1.0,
        };
        // Pin three of the four corners so the problem is well posed.
        for &v in &ids[..3] {
            mesh.vertex_mut(v).unwrap().pinned = true;
        }
        let result = run(&mut mesh, &config);
        assert!(result.nlo.is_some());
        let nlo = result.nlo.unwrap();
        assert!(nlo.final_value < 1.0, "final value = {}", nlo.final_value);
    }

    #[test]
    fn run_untangles_an_inverted_initial_map() {
        let mut mesh = unit_square_mesh();
        let ids: Vec<VertexId> = mesh.vertex_ids().collect();
        // Cross two opposite corners' uv to invert both triangles of the fan.
        mesh.vertex_mut(ids[2]).unwrap().uv = Point2::new(0.0, 0.0);
        mesh.vertex_mut(ids[0]).unwrap().uv = Point2::new(1.0, 1.0);
        for &v in &ids[..2] {
            mesh.vertex_mut(v).unwrap().pinned = true;
        }

        let config = PipelineConfig {
            opt_iters: 0,
            un_iters: 2000,
            scale_iters: 0,
            workgroup: 64,
            projection: Projection::Uv,
            free_boundaries: true,
            energy: EnergyKind::Mips,
            planar_scale: 1.0,
        };
        let result = run(&mut mesh, &config);
        let ut = result.untangle.expect("mesh started inverted, untangler should run");
        assert!(ut.untangled, "final_delta = {}", ut.final_delta);
    }

    #[test]
    fn fully_pinned_faces_are_excluded_when_boundaries_are_locked() {
        let mut mesh = unit_square_mesh();
        let ids: Vec<VertexId> = mesh.vertex_ids().collect();
        for &v in &ids {
            mesh.vertex_mut(v).unwrap().pinned = true;
        }
        let config = PipelineConfig {
            opt_iters: 10,
            un_iters: 10,
            scale_iters: 0,
            free_boundaries: false,
            ..PipelineConfig::default()
        };
        let result = run(&mut mesh, &config);
        // n_free == 0, so NLO never runs.
        assert!(result.nlo.is_none());
    }
}
