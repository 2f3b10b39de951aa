//! 运行配置校验
//!
//! 校验规则：
//! - instances 在 1..=MAX_INSTANCES 之间
//! - prefix 若给出则非空
//! - files 模式下 prefix 不能以路径分隔符结尾

use contracts::protocol::MAX_INSTANCES;
use contracts::{RunConfig, RunError, StderrMode, StdoutMode};

/// 校验 RunConfig
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &RunConfig) -> Result<(), RunError> {
    validate_instances(config)?;
    validate_prefix(config)?;
    Ok(())
}

/// 校验实例数量
fn validate_instances(config: &RunConfig) -> Result<(), RunError> {
    if config.instances == 0 || config.instances > MAX_INSTANCES {
        return Err(RunError::configuration(
            "instances",
            format!(
                "must be between 1 and {MAX_INSTANCES}, got {}",
                config.instances
            ),
        ));
    }
    Ok(())
}

/// 校验输出文件前缀
fn validate_prefix(config: &RunConfig) -> Result<(), RunError> {
    let Some(prefix) = &config.prefix else {
        return Ok(());
    };

    if prefix.trim().is_empty() {
        return Err(RunError::configuration("prefix", "prefix cannot be empty"));
    }

    let uses_files = config.stdout == StdoutMode::Files || config.stderr == StderrMode::Files;
    if uses_files && prefix.ends_with(std::path::MAIN_SEPARATOR) {
        return Err(RunError::configuration(
            "prefix",
            format!("'{prefix}' names a directory, expected a filename stem"),
        ));
    }
    Ok(())
}
