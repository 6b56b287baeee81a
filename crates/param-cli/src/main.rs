//! param CLI — batch command-line driver for the parameterization engine.
//!
//! A single invocation loads a 3D mesh, optionally pins a subset of its
//! vertices, runs the pipeline driver, and writes the resulting `(u, v)`
//! mesh back out. There is no interactive mode; this is a batch tool.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use param::{EnergyKind, Parameterizer, PipelineConfig, Projection};

/// Command-line surface matching the option table (§6.1).
#[derive(Parser)]
#[command(name = "param")]
#[command(about = "Constrained surface parameterization engine", long_about = None)]
struct Cli {
    /// Input 3D mesh (.obj or .off).
    source: PathBuf,

    /// Output mesh, written with the resolved (u, v) (.obj or .off).
    target: PathBuf,

    /// Optional pinned-vertex file: lines of `ignored id u v`.
    #[arg(long)]
    map: Option<PathBuf>,

    /// Maximum NLO outer iterations.
    #[arg(long, default_value_t = 1000)]
    opt_iters: usize,

    /// Maximum untangler iterations.
    #[arg(long, default_value_t = 1000)]
    un_iters: usize,

    /// NLO iterations between rescales; 0 disables rescaling.
    #[arg(long, default_value_t = 300)]
    scale_iters: usize,

    /// Target residual (informational; recorded in the JSON report but not
    /// used as a solver stopping criterion beyond `opt_iters`).
    #[arg(long, default_value_t = 1e-7)]
    res: f64,

    /// Backend parallel group size.
    #[arg(long, default_value_t = 512)]
    workgroup: usize,

    /// Initial projection: 0 = planar, 1 = circular, 2 = uv.
    #[arg(long, default_value_t = 2)]
    proj: u8,

    /// Free boundaries? 0 = locked, 1 = free.
    #[arg(long, default_value_t = 1)]
    free: u8,

    /// Energy family: mips, isometric, or smooth (Knupp).
    #[arg(long, default_value = "isometric")]
    r#type: String,

    /// Post-script export level (external; accepted for CLI compatibility
    /// but PostScript export is a collaborator-only feature not built here).
    #[arg(long, default_value_t = 0)]
    ps: u8,

    /// Write the run's diagnostic report as JSON to this path.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn parse_energy(kind: &str) -> Result<EnergyKind> {
    match kind {
        "mips" => Ok(EnergyKind::Mips),
        "isometric" => Ok(EnergyKind::Isometric { theta: 1.0 }),
        "smooth" => Ok(EnergyKind::Knupp),
        other => bail!("unrecognized energy type '{other}' (expected mips, isometric, or smooth)"),
    }
}

fn parse_projection(proj: u8) -> Projection {
    match proj {
        0 => Projection::Planar,
        1 => Projection::Circular,
        // An out-of-range value falls back to the default projection
        // (§7's ConfigError policy: fall back rather than fail outright).
        2 => Projection::Uv,
        other => {
            log::warn!("proj={other} is out of range (expected 0, 1, or 2); falling back to planar (0)");
            Projection::Planar
        }
    }
}

fn load(path: &PathBuf) -> Result<Parameterizer> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "off" => Ok(Parameterizer::from_off(path)?),
        "obj" => Ok(Parameterizer::from_obj(path)?),
        other => bail!("unrecognized input mesh extension '.{other}' (expected .obj or .off)"),
    }
}

fn write(job: &Parameterizer, path: &PathBuf) -> Result<()> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "off" => job.write_off(path)?,
        "obj" => job.write_obj(path)?,
        other => bail!("unrecognized output mesh extension '.{other}' (expected .obj or .off)"),
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.ps != 0 {
        log::warn!("ps={} requested but PostScript export is not implemented by this build", cli.ps);
    }

    let mut job = load(&cli.source)?;
    log::info!(
        "loaded {:?}: {} vertices, {} faces",
        cli.source,
        job.mesh().vertex_count(),
        job.mesh().face_count()
    );

    if let Some(map) = &cli.map {
        job.load_pinned_vertices(map)?;
    }

    let free_boundaries = match cli.free {
        0 => false,
        1 => true,
        other => {
            log::warn!("free={other} is out of range (expected 0 or 1); defaulting to free (1)");
            true
        }
    };

    let config = PipelineConfig {
        opt_iters: cli.opt_iters,
        un_iters: cli.un_iters,
        scale_iters: cli.scale_iters,
        workgroup: cli.workgroup,
        projection: parse_projection(cli.proj),
        free_boundaries,
        energy: parse_energy(&cli.r#type)?,
        ..PipelineConfig::default()
    };

    let report = job.run(&config)?;
    println!(
        "done: {} iteration(s), final value = {}",
        report.nlo_iterations.unwrap_or(0),
        report.final_value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
    );
    if report.final_value.map(|v| v > cli.res).unwrap_or(false) {
        log::warn!("final value {} did not reach the target residual {}", report.final_value.unwrap(), cli.res);
    }

    if let Some(report_path) = &cli.report {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(report_path, json)?;
    }

    write(&job, &cli.target)?;
    Ok(())
}
