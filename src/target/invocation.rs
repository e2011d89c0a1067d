//! xcodebuild command derivation for a target

use serde::{Deserialize, Serialize};

use super::{BuildTarget, Operation, Platform};
use crate::runner::Invocation;

/// Simulator SDK and code-signing bypass, iOS only
pub const IOS_SIM_SDK_FLAGS: &[&str] = &[
    "-sdk",
    "iphonesimulator",
    "CODE_SIGN_IDENTITY=",
    "CODE_SIGNING_REQUIRED=NO",
];

/// The clang static analyzer pass produces spurious failures on CI
pub const ANALYZER_OFF: &str = "RUN_CLANG_STATIC_ANALYZER=NO";

/// Run-wide inputs to command derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEnvironment {
    /// Workspace used when a target names neither project nor workspace
    pub default_workspace: String,

    /// Build configuration passed to -configuration
    pub configuration: String,

    /// Simulator device name for iOS destinations
    pub simulator_device: String,

    /// Pipe xcodebuild output through xcpretty
    pub use_xcpretty: bool,
}

impl Default for BuildEnvironment {
    fn default() -> Self {
        Self {
            default_workspace: "MSAL.xcworkspace".to_string(),
            configuration: "Debug".to_string(),
            simulator_device: "iPhone 6".to_string(),
            use_xcpretty: true,
        }
    }
}

impl BuildEnvironment {
    pub fn ios_destination(&self) -> String {
        format!("platform=iOS Simulator,name={},OS=latest", self.simulator_device)
    }

    /// Output post-processor, if enabled
    pub fn output_filter(&self) -> Option<Invocation> {
        self.use_xcpretty.then(|| Invocation::new("xcpretty"))
    }
}

impl BuildTarget {
    /// xcodebuild action for `op`, or None for operations that are not an
    /// xcodebuild action (codecov).
    ///
    /// A target that both builds and tests builds once for testing and then
    /// tests without rebuilding.
    pub fn xcode_action(&self, op: Operation) -> Option<&'static str> {
        let split = self.spec.has_operation(Operation::Build) && self.spec.has_operation(Operation::Test);
        match op {
            Operation::Build if split => Some("build-for-testing"),
            Operation::Build => Some("build"),
            Operation::Test if split => Some("test-without-building"),
            Operation::Test => Some("test"),
            Operation::Codecov => None,
        }
    }

    /// `-project <p>` or `-workspace <w>`
    pub fn location_args(&self, env: &BuildEnvironment) -> Vec<String> {
        match (&self.spec.project, &self.spec.workspace) {
            (Some(project), _) => vec!["-project".to_string(), project.clone()],
            (None, Some(workspace)) => vec!["-workspace".to_string(), workspace.clone()],
            (None, None) => vec!["-workspace".to_string(), env.default_workspace.clone()],
        }
    }

    fn platform_args(&self, env: &BuildEnvironment) -> Vec<String> {
        let mut args = Vec::new();
        match self.spec.platform {
            Platform::Ios => {
                args.extend(IOS_SIM_SDK_FLAGS.iter().map(|s| s.to_string()));
                args.push("-destination".to_string());
                args.push(env.ios_destination());
            }
            Platform::Mac => {
                if let Some(ref arch) = self.spec.arch {
                    args.push("-destination".to_string());
                    args.push(format!("arch={}", arch));
                }
            }
        }
        args
    }

    fn common_args(&self, env: &BuildEnvironment) -> Vec<String> {
        let mut args = self.location_args(env);
        args.extend([
            "-scheme".to_string(),
            self.spec.scheme.clone(),
            "-configuration".to_string(),
            env.configuration.clone(),
        ]);
        args.extend(self.platform_args(env));
        args
    }

    /// The xcodebuild invocation for a build or test operation
    pub fn operation_invocation(&self, op: Operation, env: &BuildEnvironment) -> Option<Invocation> {
        let action = self.xcode_action(op)?;
        let mut inv = Invocation::new("xcodebuild").arg(action).args(self.common_args(env));

        if self.spec.has_operation(Operation::Codecov) {
            inv = inv.args(["-enableCodeCoverage", "YES"]);
        }
        if op == Operation::Build {
            inv = inv.arg(ANALYZER_OFF);
        }
        Some(inv)
    }

    /// The xcodebuild invocation that dumps build settings
    pub fn settings_invocation(&self, env: &BuildEnvironment) -> Invocation {
        Invocation::new("xcodebuild")
            .arg("-showBuildSettings")
            .args(self.common_args(env))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetSpec;

    fn target(platform: Platform, ops: &[Operation]) -> BuildTarget {
        BuildTarget::new(TargetSpec::new("T", "MSAL (iOS Framework)", platform).with_operations(ops))
    }

    #[test]
    fn test_build_and_test_are_split() {
        let t = target(Platform::Ios, &[Operation::Build, Operation::Test]);
        assert_eq!(t.xcode_action(Operation::Build), Some("build-for-testing"));
        assert_eq!(t.xcode_action(Operation::Test), Some("test-without-building"));
        assert_eq!(t.xcode_action(Operation::Codecov), None);
    }

    #[test]
    fn test_single_operations_pass_through() {
        let b = target(Platform::Ios, &[Operation::Build]);
        assert_eq!(b.xcode_action(Operation::Build), Some("build"));
        let t = target(Platform::Mac, &[Operation::Test]);
        assert_eq!(t.xcode_action(Operation::Test), Some("test"));
    }

    #[test]
    fn test_default_workspace_fallback() {
        let env = BuildEnvironment::default();
        let t = target(Platform::Mac, &[Operation::Build]);
        assert_eq!(t.location_args(&env), vec!["-workspace", "MSAL.xcworkspace"]);
    }

    #[test]
    fn test_project_wins_over_workspace() {
        let env = BuildEnvironment::default();
        let mut spec = TargetSpec::new("T", "S", Platform::Mac).with_operations(&[Operation::Build]);
        spec.project = Some("MSAL/MSAL.xcodeproj".to_string());
        spec.workspace = Some("Other.xcworkspace".to_string());
        let t = BuildTarget::new(spec);
        assert_eq!(t.location_args(&env), vec!["-project", "MSAL/MSAL.xcodeproj"]);
    }

    #[test]
    fn test_ios_build_invocation() {
        let env = BuildEnvironment::default();
        let t = target(Platform::Ios, &[Operation::Build, Operation::Test, Operation::Codecov]);
        let inv = t.operation_invocation(Operation::Build, &env).unwrap();

        assert_eq!(inv.program, "xcodebuild");
        assert_eq!(
            inv.args,
            vec![
                "build-for-testing",
                "-workspace",
                "MSAL.xcworkspace",
                "-scheme",
                "MSAL (iOS Framework)",
                "-configuration",
                "Debug",
                "-sdk",
                "iphonesimulator",
                "CODE_SIGN_IDENTITY=",
                "CODE_SIGNING_REQUIRED=NO",
                "-destination",
                "platform=iOS Simulator,name=iPhone 6,OS=latest",
                "-enableCodeCoverage",
                "YES",
                "RUN_CLANG_STATIC_ANALYZER=NO",
            ]
        );
    }

    #[test]
    fn test_test_step_keeps_analyzer_and_adds_coverage() {
        let env = BuildEnvironment::default();
        let t = target(Platform::Ios, &[Operation::Build, Operation::Test, Operation::Codecov]);
        let inv = t.operation_invocation(Operation::Test, &env).unwrap();
        assert_eq!(inv.args[0], "test-without-building");
        assert!(inv.args.contains(&"-enableCodeCoverage".to_string()));
        assert!(!inv.args.contains(&ANALYZER_OFF.to_string()));
    }

    #[test]
    fn test_mac_has_no_simulator_flags() {
        let env = BuildEnvironment::default();
        let t = target(Platform::Mac, &[Operation::Build]);
        let inv = t.operation_invocation(Operation::Build, &env).unwrap();
        assert!(!inv.args.iter().any(|a| a == "-sdk" || a == "-destination"));
        assert!(!inv.args.contains(&"-enableCodeCoverage".to_string()));
    }

    #[test]
    fn test_mac_arch_destination() {
        let env = BuildEnvironment::default();
        let mut spec = TargetSpec::new("T", "S", Platform::Mac).with_operations(&[Operation::Build]);
        spec.arch = Some("x86_64".to_string());
        let inv = BuildTarget::new(spec).operation_invocation(Operation::Build, &env).unwrap();
        assert!(inv.command_line().contains("-destination arch=x86_64"));
    }

    #[test]
    fn test_codecov_has_no_invocation() {
        let env = BuildEnvironment::default();
        let t = target(Platform::Ios, &[Operation::Codecov]);
        assert!(t.operation_invocation(Operation::Codecov, &env).is_none());
    }

    #[test]
    fn test_settings_invocation() {
        let env = BuildEnvironment::default();
        let t = target(Platform::Ios, &[Operation::Build]);
        let inv = t.settings_invocation(&env);
        assert_eq!(inv.args[0], "-showBuildSettings");
        assert!(inv.args.contains(&"iphonesimulator".to_string()));
    }

    #[test]
    fn test_output_filter() {
        let mut env = BuildEnvironment::default();
        assert_eq!(env.output_filter().unwrap().program, "xcpretty");
        env.use_xcpretty = false;
        assert!(env.output_filter().is_none());
    }
}
