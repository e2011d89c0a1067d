//! Built-in defaults (layer 1)

use super::effective::BuildConfig;
use crate::coverage::CoverageFormat;
use crate::target::{BuildEnvironment, Operation, Platform, TargetSpec};

/// Repo config consulted when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "msal-build.toml";

/// The targets built on every CI run
pub fn builtin_targets() -> Vec<TargetSpec> {
    vec![
        TargetSpec::new("iOS Framework", "MSAL (iOS Framework)", Platform::Ios)
            .with_operations(&[Operation::Build, Operation::Test, Operation::Codecov])
            .with_thresholds(Some(70.0), None),
        TargetSpec::new("iOS Test App", "MSAL Test App (iOS)", Platform::Ios)
            .with_operations(&[Operation::Build]),
        TargetSpec::new("Mac Framework", "MSAL (Mac Framework)", Platform::Mac)
            .with_operations(&[Operation::Build, Operation::Test, Operation::Codecov])
            .with_thresholds(Some(70.0), None),
        TargetSpec::new("Mac Test App", "MSAL Test App (Mac)", Platform::Mac)
            .with_operations(&[Operation::Build]),
    ]
}

pub fn builtin_config() -> BuildConfig {
    let env = BuildEnvironment::default();
    BuildConfig {
        default_workspace: env.default_workspace,
        configuration: env.configuration,
        simulator_device: env.simulator_device,
        use_xcpretty: env.use_xcpretty,
        clean: true,
        derived_data_prefix: "MSAL".to_string(),
        coverage_format: CoverageFormat::Report,
        targets: builtin_targets(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = builtin_config();
        assert_eq!(config.default_workspace, "MSAL.xcworkspace");
        assert_eq!(config.configuration, "Debug");
        assert_eq!(config.simulator_device, "iPhone 6");
        assert!(config.use_xcpretty);
        assert!(config.clean);
        assert_eq!(config.targets.len(), 4);
    }

    #[test]
    fn test_builtin_targets_are_valid() {
        builtin_config().validate().unwrap();
    }

    #[test]
    fn test_to_value_uses_target_key() {
        let value = serde_json::to_value(builtin_config()).unwrap();
        assert_eq!(value["target"][0]["name"], "iOS Framework");
        assert_eq!(value["target"][0]["platform"], "iOS");
        assert_eq!(value["coverage_format"], "report");
    }
}
