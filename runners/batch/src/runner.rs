//! 程序运行函数.

use std::error::Error;
use std::path::PathBuf;

use glia_berry::config::{Config, FailurePolicy};
use glia_berry::consts::defaults::CONNECT_MICROGLIA;
use glia_berry::segment::{ChannelThreshold, IlastikHeadless, PixelClassifier};
use glia_berry::batch::BatchRunner;
use utils::loader;

use crate::result::BatchResult;
use crate::Cli;

/// 命令行参数覆盖默认参数.
pub fn config_from(cli: &Cli) -> Config {
    let mut config = Config::default();
    if let Some(gap) = cli.connect_gap {
        config = config.with_connect_gap(Some(gap.unwrap_or(CONNECT_MICROGLIA)));
    }
    if let Some(area) = cli.nucleus_intersection {
        config = config.with_nucleus_intersection(area);
    }
    let (min, max) = (
        cli.min_size.unwrap_or(config.microglia_min_size),
        cli.max_size.unwrap_or(config.microglia_max_size),
    );
    config = config.with_size_band(min, max);
    if let Some(voxels) = cli.min_size_3d {
        config = config.with_min_size_3d(voxels);
    }
    if let Some(radius) = cli.rolling_ball {
        config = config.with_rolling_ball_radius(radius);
    }
    if let Some(model) = cli.model.clone().or_else(loader::model_file_from_env_or_home) {
        config = config.with_model_file(model);
    }
    if cli.isolate {
        config = config.with_failure_policy(FailurePolicy::Isolate);
    }
    config.with_cache_segmentation(cli.cache)
}

fn required(path: Option<PathBuf>, what: &str) -> Result<PathBuf, Box<dyn Error>> {
    path.ok_or_else(|| format!("no {what} given and no home directory to fall back to").into())
}

/// 实际运行.
pub fn run(cli: &Cli) -> Result<BatchResult, Box<dyn Error>> {
    let config = config_from(cli);
    let input = required(
        cli.input.clone().or_else(loader::input_dir_from_env_or_home),
        "input folder",
    )?;

    let classifier: Box<dyn PixelClassifier> = if cli.threshold_only {
        log::warn!("Membranes are classified by Otsu threshold, the model is ignored");
        Box::new(ChannelThreshold)
    } else {
        let ilastik = required(
            cli.ilastik.clone().or_else(loader::ilastik_from_env_or_home),
            "ilastik launcher",
        )?;
        Box::new(IlastikHeadless::new(ilastik, &config.model_file)?)
    };

    println!("Processing {} ...", input.display());
    let report = BatchRunner::new(config, &*classifier).run(&input)?;
    Ok(BatchResult::from(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("glia-batch").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let c = config_from(&parse(&["--model", "/m.ilp", "/data"]));
        assert_eq!(c.connect_gap, None);
        assert_eq!(c.model_file, PathBuf::from("/m.ilp"));
        assert_eq!(c.failure_policy, FailurePolicy::Abort);
        assert!(!c.cache_segmentation);
    }

    #[test]
    fn test_overrides() {
        let c = config_from(&parse(&[
            "--connect-gap",
            "--min-size",
            "5",
            "--max-size",
            "50",
            "--min-size-3d",
            "3",
            "--isolate",
            "--cache",
        ]));
        assert_eq!(c.connect_gap, Some(CONNECT_MICROGLIA));
        assert_eq!((c.microglia_min_size, c.microglia_max_size), (5.0, 50.0));
        assert_eq!(c.microglia_min_size_3d, 3);
        assert_eq!(c.failure_policy, FailurePolicy::Isolate);
        assert!(c.cache_segmentation);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_connect_gap_with_length() {
        let c = config_from(&parse(&["--connect-gap", "1.5", "/data"]));
        assert_eq!(c.connect_gap, Some(1.5));
    }

    #[test]
    fn test_missing_model_aborts_before_any_image() {
        let dir = tempfile::tempdir().unwrap();
        let cli = parse(&[
            "--model",
            "/definitely/not/here.ilp",
            "--ilastik",
            "/bin/true",
            dir.path().to_str().unwrap(),
        ]);
        assert!(run(&cli).is_err());
        assert!(!dir.path().join("analysis_v9").exists());
    }
}
