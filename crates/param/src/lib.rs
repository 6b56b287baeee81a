#![warn(missing_docs)]

//! param — constrained surface parameterization engine.
//!
//! Loads a 3D mesh, optionally pins a subset of its vertices to fixed
//! `(u, v)` positions, and drives the pipeline ([`param_pipeline::run`]) to
//! produce a low-distortion flattening. This crate is a thin facade over the
//! engine crates (`param-math`, `param-geom`, `param-mesh`, `param-backend`,
//! `param-energy`, `param-linesearch`, `param-optimizer`, `param-untangle`,
//! `param-io`, `param-pipeline`), re-exporting their public surface and
//! adding [`Parameterizer`], a single entry point that sequences load →
//! pin → run → write.
//!
//! ```rust,no_run
//! use param::{Parameterizer, PipelineConfig};
//!
//! let mut job = Parameterizer::from_obj("input.obj").unwrap();
//! job.run(&PipelineConfig::default()).unwrap();
//! job.write_obj("output.obj").unwrap();
//! ```

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

pub use param_backend::{Backend, CpuBackend};
pub use param_energy::EnergyKind;
pub use param_geom;
pub use param_io::{IoError, PinnedVertex, RawMesh};
pub use param_math::{Point2, Point3, Tolerance, Vec2, Vec3};
pub use param_mesh::{EdgeId, FaceId, Mesh, MeshError, VertexId};
pub use param_optimizer::{NloConfig, NloResult, StopReason};
pub use param_pipeline::{apply_pinned_vertices, run, PipelineConfig, PipelineResult, Projection};
pub use param_untangle::UntangleResult;

/// Errors a [`Parameterizer`] call can fail with, implementing spec.md §7's
/// `InputError` / `ConfigError` taxonomy (the remaining taxonomy members,
/// `TopologyWarning` / `NumericalFailure` / `BackendFailure`, are non-fatal
/// and surface only through `log` records and [`PipelineResult`]).
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The source or target mesh file could not be read or written.
    #[error("input error: {0}")]
    Input(#[from] IoError),

    /// The options given to [`Parameterizer::run`] are mutually
    /// inconsistent and could not be resolved by falling back to a default.
    #[error("config error: {0}")]
    Config(String),

    /// The mesh has no faces to parameterize.
    #[error("mesh is empty (no faces)")]
    EmptyMesh,
}

/// Converts a [`RawMesh`] read by `param-io` into a [`Mesh`], in position
/// order (the file's vertex order becomes `Mesh::vertex_ids()` order, which
/// is what [`apply_pinned_vertices`]'s file-index convention expects).
fn mesh_from_raw(raw: &RawMesh) -> Result<Mesh, PipelineError> {
    let mut mesh = Mesh::new();
    let ids: Vec<VertexId> = raw.positions.iter().map(|&p| mesh.add_vertex(p)).collect();
    if !raw.uvs.is_empty() {
        for (&id, &uv) in ids.iter().zip(raw.uvs.iter()) {
            if let Some(v) = mesh.vertex_mut(id) {
                v.uv = uv;
            }
        }
    }
    for face in &raw.faces {
        let verts: Vec<VertexId> = face
            .iter()
            .filter_map(|&i| ids.get(i).copied())
            .collect();
        if verts.len() == face.len() && verts.len() >= 3 {
            mesh.add_face(&verts).map_err(|e| PipelineError::Config(e.to_string()))?;
        }
    }
    if mesh.face_count() == 0 {
        return Err(PipelineError::EmptyMesh);
    }
    Ok(mesh)
}

/// Converts a [`Mesh`] back into the flat [`RawMesh`] form `param-io`
/// writes, triangulating every face via its current `(u, v)`.
fn mesh_to_raw(mesh: &Mesh) -> RawMesh {
    let ids: Vec<VertexId> = mesh.vertex_ids().collect();
    let index_of: std::collections::HashMap<VertexId, usize> =
        ids.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    let positions = ids.iter().map(|&v| mesh.vertex(v).expect("id from this mesh").position).collect();
    let uvs = ids.iter().map(|&v| mesh.vertex(v).expect("id from this mesh").uv).collect();
    let faces = mesh
        .face_ids()
        .flat_map(|f| mesh.triangulate_face_uv(f))
        .map(|[a, b, c]| vec![index_of[&a], index_of[&b], index_of[&c]])
        .collect();
    RawMesh { positions, uvs, faces }
}

/// Diagnostic summary of a [`Parameterizer::run`] call, round-trippable to
/// JSON for external tooling (the Rust analog of the original solver's
/// `Stats` struct).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PipelineReport {
    /// Wall-clock time spent inside [`param_pipeline::run`].
    pub elapsed: Duration,
    /// Number of vertices in the mesh at the time of the run.
    pub vertex_count: usize,
    /// Number of faces in the mesh at the time of the run.
    pub face_count: usize,
    /// Untangler iterations actually performed, if it ran.
    pub untangle_iterations: Option<usize>,
    /// `true` if the untangler left the mesh free of inverted triangles.
    pub untangled: Option<bool>,
    /// NLO outer iterations actually performed, if it ran.
    pub nlo_iterations: Option<usize>,
    /// Final merit-function value, if NLO ran.
    pub final_value: Option<f64>,
    /// Why NLO stopped, if it ran.
    pub stop_reason: Option<String>,
}

/// A single parameterization job: an owned [`Mesh`] plus the last run's
/// report, if any.
///
/// Mirrors the teacher's `Part` facade (construct → transform → export) but
/// for the parameterization domain: load → pin → run → write.
pub struct Parameterizer {
    mesh: Mesh,
    last_report: Option<PipelineReport>,
}

impl Parameterizer {
    /// Load a mesh from an already-parsed [`RawMesh`].
    pub fn from_raw(raw: &RawMesh) -> Result<Self, PipelineError> {
        Ok(Self { mesh: mesh_from_raw(raw)?, last_report: None })
    }

    /// Load a mesh from an OBJ file (§6.2).
    pub fn from_obj(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let raw = param_io::read_obj(path)?;
        Self::from_raw(&raw)
    }

    /// Load a mesh from an OFF file (§6.2).
    pub fn from_off(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let raw = param_io::read_off(path)?;
        Self::from_raw(&raw)
    }

    /// Wrap an already-built [`Mesh`] (e.g. assembled programmatically by an
    /// embedding caller rather than loaded from disk).
    pub fn from_mesh(mesh: Mesh) -> Self {
        Self { mesh, last_report: None }
    }

    /// The underlying mesh, for callers that want to inspect or edit it
    /// directly between loading and running.
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// The underlying mesh, mutably.
    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    /// Apply a pinned-vertex file (§6.2) to the mesh: lines of
    /// `ignored id u v`, `id` addressing `Mesh::vertex_ids()` order.
    pub fn load_pinned_vertices(&mut self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let pinned = param_io::read_pinned_vertices(path)?;
        apply_pinned_vertices(&mut self.mesh, &pinned);
        Ok(())
    }

    /// Run the pipeline driver (projection → untangle → NLO) over the
    /// mesh in place, recording a [`PipelineReport`] for [`Self::report`].
    pub fn run(&mut self, config: &PipelineConfig) -> Result<&PipelineReport, PipelineError> {
        if self.mesh.face_count() == 0 {
            return Err(PipelineError::EmptyMesh);
        }
        let start = std::time::Instant::now();
        let result = run(&mut self.mesh, config);
        let elapsed = start.elapsed();
        self.last_report = Some(PipelineReport {
            elapsed,
            vertex_count: self.mesh.vertex_count(),
            face_count: self.mesh.face_count(),
            untangle_iterations: result.untangle.as_ref().map(|u| u.iterations),
            untangled: result.untangle.as_ref().map(|u| u.untangled),
            nlo_iterations: result.nlo.as_ref().map(|n| n.iterations),
            final_value: result.nlo.as_ref().map(|n| n.final_value),
            stop_reason: result.nlo.as_ref().map(|n| format!("{:?}", n.stop)),
        });
        Ok(self.last_report.as_ref().expect("just assigned"))
    }

    /// The most recent [`PipelineReport`], if [`Self::run`] has been called.
    pub fn report(&self) -> Option<&PipelineReport> {
        self.last_report.as_ref()
    }

    /// Write the mesh's `(u, v)` out as an OBJ file (§6.2).
    pub fn write_obj(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let raw = mesh_to_raw(&self.mesh);
        param_io::write_obj(path, &raw)?;
        Ok(())
    }

    /// Write the mesh's `(u, v)` out as an OFF file (§6.2).
    pub fn write_off(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let raw = mesh_to_raw(&self.mesh);
        param_io::write_off(path, &raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use param_math::{Point2 as P2, Point3 as P3};

    fn unit_square_raw() -> RawMesh {
        RawMesh {
            positions: vec![
                P3::new(0.0, 0.0, 0.0),
                P3::new(1.0, 0.0, 0.0),
                P3::new(1.0, 1.0, 0.0),
                P3::new(0.0, 1.0, 0.0),
            ],
            uvs: vec![
                P2::new(0.0, 0.0),
                P2::new(1.0, 0.0),
                P2::new(1.3, 0.8),
                P2::new(0.0, 1.0),
            ],
            faces: vec![vec![0, 1, 2, 3]],
        }
    }

    #[test]
    fn from_raw_rejects_an_empty_mesh() {
        let raw = RawMesh::default();
        let err = Parameterizer::from_raw(&raw).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyMesh));
    }

    #[test]
    fn run_reports_converged_statistics() {
        let mut job = Parameterizer::from_raw(&unit_square_raw()).unwrap();
        for &v in &[0usize, 1, 3] {
            job.mesh_mut().vertex_mut(job.mesh().vertex_ids().nth(v).unwrap()).unwrap().pinned = true;
        }
        let config = PipelineConfig {
            opt_iters: 200,
            un_iters: 200,
            scale_iters: 0,
            ..PipelineConfig::default()
        };
        let report = job.run(&config).unwrap();
        assert_eq!(report.vertex_count, 4);
        assert_eq!(report.face_count, 1);
        assert!(report.final_value.unwrap() < 1.0);
        assert!(job.report().is_some());
    }

    #[test]
    fn report_round_trips_through_json() {
        let mut job = Parameterizer::from_raw(&unit_square_raw()).unwrap();
        let config = PipelineConfig { opt_iters: 0, un_iters: 0, scale_iters: 0, ..PipelineConfig::default() };
        let report = job.run(&config).unwrap().clone();
        let json = serde_json::to_string(&report).unwrap();
        let back: PipelineReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.vertex_count, report.vertex_count);
    }
}
