//! 小胶质细胞形态学批处理程序.
//!
//! 处理一个文件夹下的所有双通道图像, 结果写入 `<文件夹>/analysis_v9/`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

mod result;
mod runner;

#[derive(Parser, Debug)]
#[command(name = "glia-batch")]
#[command(about = "Microglia morphometry for a folder of two-channel z-stacks")]
pub struct Cli {
    /// Folder with `.tif`/`.nd2` images (defaults to $GLIA_INPUT_DIR or ~/microglia/images)
    pub input: Option<PathBuf>,

    /// ilastik pixel classification project (defaults to $GLIA_MODEL_FILE or ~/microglia/membrane.ilp)
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// ilastik launcher (defaults to $ILASTIK_EXECUTABLE or ~/microglia/ilastik/run_ilastik.sh)
    #[arg(long)]
    pub ilastik: Option<PathBuf>,

    /// Classify membranes by per-slice Otsu threshold instead of ilastik
    #[arg(long)]
    pub threshold_only: bool,

    /// Bridge gaps between microglia fragments (off by default); without a value, 0.8 calibrated units
    #[arg(long, num_args = 0..=1, value_name = "GAP")]
    pub connect_gap: Option<Option<f64>>,

    /// Minimum nucleus area inside a cell
    #[arg(long)]
    pub nucleus_intersection: Option<f64>,

    /// Minimum 2D microglia area
    #[arg(long)]
    pub min_size: Option<f64>,

    /// Maximum 2D microglia area
    #[arg(long)]
    pub max_size: Option<f64>,

    /// Minimum voxel count of a 3D object
    #[arg(long)]
    pub min_size_3d: Option<usize>,

    /// Rolling ball radius for nucleus background subtraction, in pixels
    #[arg(long)]
    pub rolling_ball: Option<f64>,

    /// Keep going when an image fails, report failures at the end
    #[arg(long)]
    pub isolate: bool,

    /// Cache classifier output as `<name>_seg.npy` and reuse it
    #[arg(long)]
    pub cache: bool,

    /// More logging (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("Cannot install logger: {e}");
    }

    match runner::run(&cli) {
        Ok(result) => {
            result.analyze();
            if result.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            log::error!("{e}");
            eprintln!("Batch aborted: {e}");
            ExitCode::FAILURE
        }
    }
}
