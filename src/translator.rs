use log::{info, warn};
use std::collections::BTreeMap as Map;

use crate::{
    environment::{placeholder, EnvFile, EnvSnapshot, EnvVarRewriter},
    error::TranslateError,
    models::{
        BuildArgs, CommandLine, Composition, ImageMetadata, ImageName, ProgramRecord,
        ResolutionPolicy, ServiceName, ServiceSpec,
    },
    priority,
    services::ContainerBackend,
    supervisord::{json_string, GlobalSection, SupervisordConfig},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImageOperation {
    Build,
    Pull,
}

/// What became of one service's image resolution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImageOutcome {
    Resolved,
    /// The image failed to resolve and the degrade policy substituted empty
    /// metadata for it.
    Degraded,
}

pub struct Translator {
    backend: Box<dyn ContainerBackend>,
    composition: Composition,
    env: EnvSnapshot,
    rewriter: EnvVarRewriter,
    metadata: Map<ServiceName, ImageMetadata>,
}

impl Translator {
    pub fn init<B>(backend: B, composition: Composition, env: EnvSnapshot) -> Translator
    where
        B: 'static + ContainerBackend,
    {
        Translator {
            backend: Box::new(backend),
            composition,
            env,
            rewriter: EnvVarRewriter::new(),
            metadata: Map::new(),
        }
    }

    /// One build-or-pull operation per service, in manifest order.
    pub fn image_operations(&self) -> Vec<(ServiceName, ImageOperation)> {
        self.composition
            .services
            .iter()
            .map(|spec| {
                let operation = if spec.build.is_some() {
                    ImageOperation::Build
                } else {
                    ImageOperation::Pull
                };
                (spec.name.clone(), operation)
            })
            .collect()
    }

    /// Makes the service's image present in the runtime and memoizes its
    /// baseline metadata. Variable references in the image name and in
    /// build-arg values are resolved against the snapshot before the runtime
    /// sees them.
    pub fn image_apply(
        &mut self,
        name: &ServiceName,
        operation: ImageOperation,
        policy: ResolutionPolicy,
    ) -> Result<ImageOutcome, TranslateError> {
        let spec = self
            .composition
            .service(name)
            .ok_or_else(|| TranslateError::manifest(format!("unknown service name: {:?}", name)))?;

        let image = ImageName(self.rewriter.immediate(&spec.image.0, &self.env));

        let resolved = match operation {
            ImageOperation::Build => {
                let build = spec.build.as_ref().ok_or_else(|| {
                    TranslateError::manifest(format!(
                        "service {} has no build configuration",
                        name.0
                    ))
                })?;
                let build_args = resolve_build_args(&build.args, &self.rewriter, &self.env);
                self.backend.build_image(&image, &build.context, &build_args)
            }
            ImageOperation::Pull => self.backend.pull_image(&image),
        };
        let metadata = resolved.and_then(|()| self.backend.inspect_image(&image));

        match metadata {
            Ok(metadata) => {
                info!("resolved image {:?} for service {}", image.0, name.0);
                self.metadata.insert(name.clone(), metadata);
                Ok(ImageOutcome::Resolved)
            }
            Err(err) => match policy {
                ResolutionPolicy::Abort => Err(TranslateError::Resolution {
                    service: name.0.clone(),
                    source: err.into(),
                }),
                ResolutionPolicy::Degrade => {
                    warn!(
                        "could not resolve image {:?} for service {}, continuing without it: {}",
                        image.0, name.0, err
                    );
                    self.metadata.insert(name.clone(), ImageMetadata::default());
                    Ok(ImageOutcome::Degraded)
                }
            },
        }
    }

    /// Assembles the final configuration: startup priorities from the
    /// dependency graph, one program record per service in manifest order,
    /// and the env file serialized into the global section.
    pub fn into_supervisord(self, env_file: &EnvFile) -> Result<SupervisordConfig, TranslateError> {
        let depths = priority::dependency_depths(&self.composition.services)?;

        let mut programs = Vec::new();
        for spec in self.composition.services.iter() {
            let metadata = self.metadata.get(&spec.name).ok_or_else(|| {
                TranslateError::manifest(format!(
                    "the image for service {} was never resolved",
                    spec.name.0
                ))
            })?;
            let depth = depths.get(&spec.name).copied().unwrap_or(0);
            programs.push(build_program(spec, metadata, depth, &self.rewriter));
        }

        let environment = env_file
            .pairs
            .iter()
            .map(|(key, value)| format!("{}={}", key, json_string(value)))
            .collect::<Vec<_>>()
            .join(",");

        Ok(SupervisordConfig {
            global: GlobalSection { environment },
            programs,
        })
    }
}

fn resolve_build_args(
    args: &BuildArgs,
    rewriter: &EnvVarRewriter,
    env: &EnvSnapshot,
) -> Vec<String> {
    match args {
        // Bare names go through untouched; the runtime fills them in from
        // its own environment.
        BuildArgs::Names(names) => names.clone(),
        BuildArgs::Pairs(pairs) => pairs
            .iter()
            .map(|(name, value)| match value {
                Some(value) => format!("{}={}", name, rewriter.immediate(value, env)),
                None => name.clone(),
            })
            .collect(),
    }
}

fn build_program(
    spec: &ServiceSpec,
    metadata: &ImageMetadata,
    depth: u32,
    rewriter: &EnvVarRewriter,
) -> ProgramRecord {
    let entrypoint = stringify_command(spec.entrypoint.as_ref(), &metadata.entrypoint);
    let command = stringify_command(spec.command.as_ref(), &metadata.command);

    let command = match (entrypoint.trim(), command.trim()) {
        ("", command) => command.to_owned(),
        (entrypoint, "") => entrypoint.to_owned(),
        (entrypoint, command) => format!("{} {}", entrypoint, command),
    };

    let environment = if spec.environment.is_empty() {
        None
    } else {
        let entries = spec
            .environment
            .iter()
            .map(|(key, value)| match value {
                Some(value) => format!("{}={}", key, json_string(&rewriter.deferred(value))),
                // No declared value: let the supervisor hand down its own.
                None => format!("{}={}", key, placeholder(key)),
            })
            .collect::<Vec<_>>();
        Some(entries.join(","))
    };

    ProgramRecord {
        name: spec.name.clone(),
        command: rewriter.deferred(&command),
        environment,
        priority: depth + 1,
        autorestart: spec.restart.autorestart(),
    }
}

/// The declared entrypoint or command wins over the image baseline; a token
/// sequence joins on single spaces with whitespace-bearing tokens quoted so
/// they survive as one argument.
fn stringify_command(declared: Option<&CommandLine>, baseline: &[String]) -> String {
    match declared {
        Some(CommandLine::Line(line)) if !line.trim().is_empty() => line.clone(),
        Some(CommandLine::Tokens(tokens)) if !tokens.is_empty() => join_tokens(tokens),
        _ => join_tokens(baseline),
    }
}

fn join_tokens(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|token| {
            if token.chars().any(char::is_whitespace) {
                json_string(token)
            } else {
                token.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
