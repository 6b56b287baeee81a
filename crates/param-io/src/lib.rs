#![warn(missing_docs)]

//! File formats consumed and produced by the pipeline driver: OBJ and OFF
//! meshes, and the pinned-vertex list format.

use std::fmt::Write as _;
use std::path::Path;

use log::warn;
use param_math::{Point2, Point3};
use thiserror::Error;

/// Errors raised while reading or writing a mesh or pinned-vertex file.
#[derive(Error, Debug)]
pub enum IoError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed line in an OBJ/OFF file.
    #[error("malformed {format} line {line}: {message}")]
    Malformed {
        /// `"OBJ"` or `"OFF"`.
        format: &'static str,
        /// 1-based line number.
        line: usize,
        /// Description of what was expected.
        message: String,
    },

    /// A face referenced a vertex index out of range.
    #[error("face on line {line} references out-of-range vertex index {index}")]
    VertexIndexOutOfRange {
        /// 1-based line number.
        line: usize,
        /// The offending (0-based, after translation) index.
        index: usize,
    },

    /// The OFF header's declared vertex/face counts didn't match the file.
    #[error("OFF header declared {declared} but the file had {actual}")]
    CountMismatch {
        /// What the header declared (`"N vertices"` or `"N faces"`).
        declared: String,
        /// What was actually present.
        actual: usize,
    },
}

/// A vertex pinned to a fixed parameter-domain position, read from a pinned
/// vertex file (§6.2): `ignored id u v` per line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinnedVertex {
    /// Vertex index into `Mesh::vertex_ids()` order, taken directly from the
    /// file's `id` token with no translation.
    pub id: usize,
    /// Pinned `(u, v)` position.
    pub uv: Point2,
}

/// A mesh as read from or written to disk: 3D positions, optional per-vertex
/// `(u, v)`, and polygonal faces as 0-based vertex index lists.
#[derive(Debug, Clone, Default)]
pub struct RawMesh {
    /// Vertex positions.
    pub positions: Vec<Point3>,
    /// Per-vertex parameter-domain coordinates; empty if the file had none.
    pub uvs: Vec<Point2>,
    /// Polygonal faces as 0-based vertex indices.
    pub faces: Vec<Vec<usize>>,
}

/// Read an OBJ file's `v`/`vt`/`f` lines into a [`RawMesh`].
///
/// Only the vertex-index component of each `f` line's `i[/t][/n]` tokens is
/// used; texture and normal indices are accepted but discarded.
pub fn read_obj(path: impl AsRef<Path>) -> Result<RawMesh, IoError> {
    let text = std::fs::read_to_string(path)?;
    let mut mesh = RawMesh::default();

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = lineno + 1;
        let line_text = raw_line.trim();
        if line_text.is_empty() || line_text.starts_with('#') {
            continue;
        }
        let mut tokens = line_text.split_whitespace();
        let Some(tag) = tokens.next() else { continue };

        match tag {
            "v" => {
                let coords: Vec<f64> = parse_floats(tokens, 3, "OBJ", line)?;
                mesh.positions.push(Point3::new(coords[0], coords[1], coords[2]));
            }
            "vt" => {
                let coords: Vec<f64> = parse_floats(tokens, 2, "OBJ", line)?;
                mesh.uvs.push(Point2::new(coords[0], coords[1]));
            }
            "f" => {
                let mut face = Vec::new();
                for token in tokens {
                    let first = token.split('/').next().unwrap_or(token);
                    let one_based: i64 = first.parse().map_err(|_| IoError::Malformed {
                        format: "OBJ",
                        line,
                        message: format!("expected an integer vertex index, found {first:?}"),
                    })?;
                    if one_based <= 0 {
                        return Err(IoError::VertexIndexOutOfRange {
                            line,
                            index: one_based as usize,
                        });
                    }
                    face.push(one_based as usize - 1);
                }
                if face.len() < 3 {
                    return Err(IoError::Malformed {
                        format: "OBJ",
                        line,
                        message: "face has fewer than 3 vertices".to_string(),
                    });
                }
                for &index in &face {
                    if index >= mesh.positions.len() {
                        return Err(IoError::VertexIndexOutOfRange { line, index });
                    }
                }
                mesh.faces.push(face);
            }
            _ => {}
        }
    }

    Ok(mesh)
}

fn parse_floats(
    tokens: std::str::SplitWhitespace<'_>,
    count: usize,
    format: &'static str,
    line: usize,
) -> Result<Vec<f64>, IoError> {
    let values: Vec<f64> = tokens
        .take(count)
        .map(|t| t.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| IoError::Malformed {
            format,
            line,
            message: format!("expected {count} numeric fields"),
        })?;
    if values.len() != count {
        return Err(IoError::Malformed {
            format,
            line,
            message: format!("expected {count} numeric fields, found {}", values.len()),
        });
    }
    Ok(values)
}

/// Write a mesh to OBJ: `v` lines, `vt` lines if `uvs` is populated, then
/// `f i/i ...` triplets (OBJ's 1-based indexing).
pub fn write_obj(path: impl AsRef<Path>, mesh: &RawMesh) -> Result<(), IoError> {
    let mut out = String::new();
    for p in &mesh.positions {
        writeln!(out, "v {} {} {}", p.x, p.y, p.z).ok();
    }
    for uv in &mesh.uvs {
        writeln!(out, "vt {} {}", uv.x, uv.y).ok();
    }
    for face in &mesh.faces {
        out.push('f');
        for &index in face {
            let i = index + 1;
            if mesh.uvs.is_empty() {
                write!(out, " {i}").ok();
            } else {
                write!(out, " {i}/{i}").ok();
            }
        }
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// Read an OFF file: `OFF` header, `n_v n_f n_e`, then `n_v` `x y z` lines,
/// then `n_f` `k i1 ... ik` lines.
pub fn read_off(path: impl AsRef<Path>) -> Result<RawMesh, IoError> {
    let text = std::fs::read_to_string(path)?;
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (header_line, header) = lines.next().ok_or_else(|| IoError::Malformed {
        format: "OFF",
        line: 1,
        message: "empty file".to_string(),
    })?;
    if header.trim() != "OFF" {
        return Err(IoError::Malformed {
            format: "OFF",
            line: header_line + 1,
            message: format!("expected 'OFF' header, found {:?}", header.trim()),
        });
    }

    let (counts_line, counts) = lines.next().ok_or_else(|| IoError::Malformed {
        format: "OFF",
        line: header_line + 2,
        message: "missing vertex/face/edge counts".to_string(),
    })?;
    let counts: Vec<usize> = counts
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|_| IoError::Malformed {
            format: "OFF",
            line: counts_line + 1,
            message: "expected 3 integer counts".to_string(),
        })?;
    if counts.len() != 3 {
        return Err(IoError::Malformed {
            format: "OFF",
            line: counts_line + 1,
            message: format!("expected 'n_v n_f n_e', found {} fields", counts.len()),
        });
    }
    let (n_verts, n_faces) = (counts[0], counts[1]);

    let mut mesh = RawMesh::default();
    for _ in 0..n_verts {
        let (line, text) = lines.next().ok_or_else(|| IoError::CountMismatch {
            declared: format!("{n_verts} vertices"),
            actual: mesh.positions.len(),
        })?;
        let coords = parse_floats(text.split_whitespace(), 3, "OFF", line + 1)?;
        mesh.positions.push(Point3::new(coords[0], coords[1], coords[2]));
    }

    for _ in 0..n_faces {
        let (line, text) = lines.next().ok_or_else(|| IoError::CountMismatch {
            declared: format!("{n_faces} faces"),
            actual: mesh.faces.len(),
        })?;
        let mut tokens = text.split_whitespace();
        let k: usize = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| IoError::Malformed {
                format: "OFF",
                line: line + 1,
                message: "expected a vertex count for the face".to_string(),
            })?;
        let mut face = Vec::with_capacity(k);
        for token in tokens.by_ref().take(k) {
            let index: usize = token.parse().map_err(|_| IoError::Malformed {
                format: "OFF",
                line: line + 1,
                message: format!("expected an integer vertex index, found {token:?}"),
            })?;
            if index >= mesh.positions.len() {
                return Err(IoError::VertexIndexOutOfRange { line: line + 1, index });
            }
            face.push(index);
        }
        if face.len() != k {
            return Err(IoError::Malformed {
                format: "OFF",
                line: line + 1,
                message: format!("face declared {k} vertices but only {} were present", face.len()),
            });
        }
        mesh.faces.push(face);
    }

    Ok(mesh)
}

/// Write a mesh to OFF: header, counts, positions, then faces.
pub fn write_off(path: impl AsRef<Path>, mesh: &RawMesh) -> Result<(), IoError> {
    let mut out = String::new();
    writeln!(out, "OFF").ok();
    writeln!(out, "{} {} 0", mesh.positions.len(), mesh.faces.len()).ok();
    for p in &mesh.positions {
        writeln!(out, "{} {} {}", p.x, p.y, p.z).ok();
    }
    for face in &mesh.faces {
        write!(out, "{}", face.len()).ok();
        for index in face {
            write!(out, " {index}").ok();
        }
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// Read a pinned-vertex file: whitespace-separated `ignored id u v` per
/// line. Lines without exactly 4 tokens are silently skipped; lines with 4
/// tokens but non-numeric `id`/`u`/`v` are skipped with a logged warning.
pub fn read_pinned_vertices(path: impl AsRef<Path>) -> Result<Vec<PinnedVertex>, IoError> {
    let text = std::fs::read_to_string(path)?;
    let mut pinned = Vec::new();

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = lineno + 1;
        let tokens: Vec<&str> = raw_line.split_whitespace().collect();
        if tokens.len() != 4 {
            continue;
        }
        let parsed: Option<(usize, f64, f64)> = (|| {
            let id: usize = tokens[1].parse().ok()?;
            let u: f64 = tokens[2].parse().ok()?;
            let v: f64 = tokens[3].parse().ok()?;
            Some((id, u, v))
        })();

        match parsed {
            Some((id, u, v)) => pinned.push(PinnedVertex { id, uv: Point2::new(u, v) }),
            None => warn!("pinned vertex file line {line}: non-numeric id/u/v, skipping"),
        }
    }

    Ok(pinned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TempFile(std::path::PathBuf);

    impl TempFile {
        fn new(contents: &str) -> Self {
            static COUNTER: AtomicUsize = AtomicUsize::new(0);
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!("param-io-test-{}-{n}", std::process::id()));
            std::fs::write(&path, contents).unwrap();
            Self(path)
        }

        fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn write_temp(contents: &str) -> TempFile {
        TempFile::new(contents)
    }

    #[test]
    fn reads_a_minimal_obj_triangle() {
        let file = write_temp("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n");
        let mesh = read_obj(file.path()).unwrap();
        assert_eq!(mesh.positions.len(), 3);
        assert_eq!(mesh.faces, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn obj_rejects_out_of_range_face_index() {
        let file = write_temp("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 4\n");
        assert!(matches!(read_obj(file.path()), Err(IoError::VertexIndexOutOfRange { .. })));
    }

    #[test]
    fn reads_a_minimal_off_triangle() {
        let file = write_temp("OFF\n3 1 0\n0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n");
        let mesh = read_off(file.path()).unwrap();
        assert_eq!(mesh.positions.len(), 3);
        assert_eq!(mesh.faces, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn off_round_trips_through_write_and_read() {
        let mut mesh = RawMesh::default();
        mesh.positions = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        mesh.faces = vec![vec![0, 1, 2]];
        let file = TempFile::new("");
        write_off(file.path(), &mesh).unwrap();
        let back = read_off(file.path()).unwrap();
        assert_eq!(back.positions.len(), 3);
        assert_eq!(back.faces, mesh.faces);
    }

    #[test]
    fn pinned_vertices_skip_short_lines_and_parse_valid_ones() {
        let file = write_temp("# comment\nignored 1 0.5 0.25\nbad line here\nignored 3 1.0 1.0\n");
        let pinned = read_pinned_vertices(file.path()).unwrap();
        assert_eq!(pinned.len(), 2);
        assert_eq!(pinned[0].id, 1);
        assert!((pinned[0].uv.x - 0.5).abs() < 1e-12);
        assert_eq!(pinned[1].id, 3);
    }

    #[test]
    fn pinned_vertices_skip_non_numeric_fields_with_a_warning() {
        let file = write_temp("ignored notanumber 0.5 0.25\nignored 2 0.1 0.2\n");
        let pinned = read_pinned_vertices(file.path()).unwrap();
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned[0].id, 2);
    }
}
