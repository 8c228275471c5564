use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ndarray::Array3;
use ndarray_npy::{write_npy, NpzReader};

use recon_ctf::{
    correct_projections, ctf_stack, defocus_range, defocus_steps, make_corrector, Config,
    CtfParams, Device,
};

/// Phase-flip CTF correction of a projection stack.
///
/// Expected NPZ file structure:
///   - key "projections": 3D array (THETA, Y, X) of f32
///
/// Output is a 4D array (THETA, DEFOCUS, Y, X) of f32, one corrected copy of
/// every projection per defocus value.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to NPZ file containing projections
    #[arg(long)]
    projections: PathBuf,

    /// Optional JSON config; supplies device, gpu_index, pixel_size, angles and defocus
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend: cpu or gpu
    #[arg(long)]
    device: Option<Device>,

    /// Adapter index for the gpu backend (-1 for the default adapter)
    #[arg(long, allow_negative_numbers = true)]
    gpu_index: Option<i32>,

    /// Pixel size in Å
    #[arg(long)]
    pixel_size: Option<f32>,

    /// Explicit defocus values in Å, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    defocus: Vec<f64>,

    /// Centre of a stepped defocus range in Å
    #[arg(long)]
    defocus_centre: Option<f64>,

    /// Number of stepped defocus values
    #[arg(long, default_value_t = 1)]
    num_defocus: usize,

    /// Step between defocus values in Å
    #[arg(long, default_value_t = 0.0)]
    step_defocus: f64,

    /// Beam energy in keV
    #[arg(long, default_value_t = 300.0)]
    energy: f64,

    /// Spherical aberration in mm
    #[arg(long, default_value_t = 2.7)]
    spherical_aberration: f64,

    /// Astigmatism in Å
    #[arg(long, default_value_t = 0.0)]
    astigmatism: f64,

    /// Astigmatism angle in radians
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    astigmatism_angle: f64,

    /// Phase shift in radians
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    phase_shift: f64,

    /// Output path for corrected projections (.npy)
    #[arg(long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // --- Load projections from NPZ ---
    let file = File::open(&args.projections)
        .with_context(|| format!("Failed to open NPZ {:?}", args.projections))?;
    let mut npz = NpzReader::new(file)
        .with_context(|| format!("Failed to read NPZ {:?}", args.projections))?;
    let projections: Array3<f32> = npz
        .by_name("projections")
        .context("Missing or invalid 'projections' array in NPZ")?;
    let (num_angles, ysize, xsize) = projections.dim();

    // --- Resolve configuration ---
    let mut config = match &args.config {
        Some(path) => Config::from_json_file_unchecked(path)
            .with_context(|| format!("Failed to load config {path:?}"))?,
        None => Config::default(),
    };
    if let Some(device) = args.device {
        config.device = device;
    }
    if let Some(index) = args.gpu_index {
        config.gpu_index = index;
    }
    if let Some(pixel_size) = args.pixel_size {
        config.pixel_size = pixel_size;
    }

    let defoci: Vec<f64> = if !args.defocus.is_empty() {
        args.defocus.clone()
    } else if let Some(centre) = args.defocus_centre {
        defocus_steps(centre, args.num_defocus, args.step_defocus)
    } else {
        config.defocus.iter().map(|&d| f64::from(d)).collect()
    };
    if defoci.is_empty() {
        bail!("No defocus values: pass --defocus, --defocus-centre or a config with defocus");
    }
    let config = config.with_stack_geometry(num_angles, xsize, &defoci)?;

    let params = CtfParams {
        energy: args.energy,
        spherical_aberration: args.spherical_aberration,
        astigmatism: args.astigmatism,
        astigmatism_angle: args.astigmatism_angle,
        phase_shift: args.phase_shift,
    };

    log::info!(
        "Correcting {} projections of {}x{}, {} defocus value(s) in {:?}, device = {}",
        num_angles,
        xsize,
        ysize,
        defoci.len(),
        defocus_range(&defoci),
        config.device
    );

    // --- Build CTFs and correct ---
    let ctf = ctf_stack::<f32>(xsize, ysize, f64::from(config.pixel_size), &defoci, &params)?;
    let corrector = make_corrector(&config)?;
    let corrected = correct_projections(&corrector, projections.view(), ctf.view())?;

    // --- Save corrected stack as .npy ---
    write_npy(&args.output, &corrected)
        .with_context(|| format!("Failed to write output NPY {:?}", args.output))?;

    log::info!("Corrected projections written to {:?}", args.output);

    Ok(())
}
