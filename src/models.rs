use std::{collections::BTreeMap as Map, path::PathBuf};

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ServiceName(pub String);

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ImageName(pub String);

/// An entrypoint or command as the manifest declares it: either one shell
/// line or a sequence of argument tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandLine {
    Line(String),
    Tokens(Vec<String>),
}

/// Build arguments keep the shape they were declared in. Bare names are
/// passed to the runtime untouched so it inherits their values from its own
/// environment; pairs carry a value that may be absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildArgs {
    Names(Vec<String>),
    Pairs(Vec<(String, Option<String>)>),
}

impl Default for BuildArgs {
    fn default() -> Self {
        BuildArgs::Names(Vec::new())
    }
}

#[derive(Clone, Debug)]
pub struct ImageBuildSpec {
    pub context: PathBuf,
    pub args: BuildArgs,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum RestartPolicy {
    No,
    OnFailure,
    Always,
    UnlessStopped,
}

impl RestartPolicy {
    pub fn parse(value: &str) -> Option<RestartPolicy> {
        match value {
            "no" => Some(RestartPolicy::No),
            "on-failure" => Some(RestartPolicy::OnFailure),
            "always" => Some(RestartPolicy::Always),
            "unless-stopped" => Some(RestartPolicy::UnlessStopped),
            _ => None,
        }
    }

    /// The supervisord `autorestart` value for this policy. `unless-stopped`
    /// has no supervisord counterpart and maps to the same value as `always`.
    pub fn autorestart(self) -> &'static str {
        match self {
            RestartPolicy::No => "false",
            RestartPolicy::OnFailure => "unexpected",
            RestartPolicy::Always => "true",
            RestartPolicy::UnlessStopped => "true",
        }
    }
}

/// How to proceed when an image cannot be built or pulled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Fail the whole run. The default.
    Abort,
    /// Log, give the service empty image metadata and keep going.
    Degrade,
}

#[derive(Clone, Debug)]
pub struct ServiceSpec {
    pub name: ServiceName,
    pub image: ImageName,
    pub build: Option<ImageBuildSpec>,
    pub entrypoint: Option<CommandLine>,
    pub command: Option<CommandLine>,
    /// Declaration order matters for the serialized environment string.
    pub environment: Vec<(String, Option<String>)>,
    pub restart: RestartPolicy,
    pub depends_on: Vec<ServiceName>,
}

/// Baseline entrypoint and command tokens reported by the runtime for a
/// resolved image. Fields the runtime leaves out are empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    pub entrypoint: Vec<String>,
    pub command: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ProgramRecord {
    pub name: ServiceName,
    pub command: String,
    pub environment: Option<String>,
    pub priority: u32,
    pub autorestart: &'static str,
}

#[derive(Clone, Debug, Default)]
pub struct Composition {
    pub services: Vec<ServiceSpec>,
}

impl Composition {
    pub fn service(&self, name: &ServiceName) -> Option<&ServiceSpec> {
        self.services.iter().find(|spec| spec.name == *name)
    }
}

pub type DependencyDepths = Map<ServiceName, u32>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_policy_parses_the_four_known_values() {
        assert_eq!(RestartPolicy::parse("no"), Some(RestartPolicy::No));
        assert_eq!(
            RestartPolicy::parse("on-failure"),
            Some(RestartPolicy::OnFailure)
        );
        assert_eq!(RestartPolicy::parse("always"), Some(RestartPolicy::Always));
        assert_eq!(
            RestartPolicy::parse("unless-stopped"),
            Some(RestartPolicy::UnlessStopped)
        );
    }

    #[test]
    fn restart_policy_rejects_anything_else() {
        assert_eq!(RestartPolicy::parse("sometimes"), None);
        assert_eq!(RestartPolicy::parse(""), None);
        assert_eq!(RestartPolicy::parse("On-Failure"), None);
    }

    #[test]
    fn autorestart_mapping() {
        assert_eq!(RestartPolicy::No.autorestart(), "false");
        assert_eq!(RestartPolicy::OnFailure.autorestart(), "unexpected");
        assert_eq!(RestartPolicy::Always.autorestart(), "true");
        assert_eq!(RestartPolicy::UnlessStopped.autorestart(), "true");
    }
}
