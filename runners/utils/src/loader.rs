//! 对 `glia-berry::dataset` 的更一层封装. 从环境变量或用户主目录获得默认路径.

use glia_berry::dataset::home_microglia_dir_with;
use std::env;
use std::path::PathBuf;

/// 从环境变量 `key` 读取路径; 为空或未设置时返回 `$HOME/microglia/{rest}`.
fn from_env_or_home(key: &str, rest: &[&str]) -> Option<PathBuf> {
    match env::var(key) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_microglia_dir_with(rest),
    }
}

/// 获取像素分类器模型文件路径.
///
/// 1. 若环境变量 `$GLIA_MODEL_FILE` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/microglia/membrane.ilp`.
pub fn model_file_from_env_or_home() -> Option<PathBuf> {
    from_env_or_home("GLIA_MODEL_FILE", &["membrane.ilp"])
}

/// 获取 ilastik 启动脚本路径.
///
/// 1. 若环境变量 `$ILASTIK_EXECUTABLE` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/microglia/ilastik/run_ilastik.sh`.
pub fn ilastik_from_env_or_home() -> Option<PathBuf> {
    from_env_or_home("ILASTIK_EXECUTABLE", &["ilastik", "run_ilastik.sh"])
}

/// 获取待处理的图像文件夹.
///
/// 1. 若环境变量 `$GLIA_INPUT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/microglia/images`.
pub fn input_dir_from_env_or_home() -> Option<PathBuf> {
    from_env_or_home("GLIA_INPUT_DIR", &["images"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_fallback_layout() {
        if let Some(p) = from_env_or_home("GLIA_SURELY_UNSET_VARIABLE", &["a", "b.ilp"]) {
            assert!(p.ends_with("microglia/a/b.ilp"));
        }
    }
}
