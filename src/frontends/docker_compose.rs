use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::{
    collections::BTreeSet as Set,
    fs::File,
    path::{Path, PathBuf},
};

use crate::{
    error::TranslateError,
    models::{
        BuildArgs, CommandLine, Composition, ImageBuildSpec, ImageName, RestartPolicy, ServiceName,
        ServiceSpec,
    },
    services::ComposerFrontend,
};

// `services` and the per-service `environment` stay as raw mappings so the
// document order survives deserialization.

#[derive(Clone, Debug, Serialize, Deserialize)]
struct DockerComposeFile {
    services: Mapping,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Service {
    image: Option<String>,

    build: Option<Build>,

    entrypoint: Option<CommandField>,

    command: Option<CommandField>,

    environment: Option<Mapping>,

    restart: Option<String>,

    restart_policy: Option<String>,

    depends_on: Option<DependsOn>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Build {
    Short(String),
    Extended {
        context: String,

        #[serde(default)]
        args: ArgsField,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ArgsField {
    Map(Mapping),
    List(Vec<String>),
}

impl Default for ArgsField {
    fn default() -> Self {
        ArgsField::List(Vec::new())
    }
}

impl ArgsField {
    fn into_build_args(self) -> Result<BuildArgs, TranslateError> {
        match self {
            ArgsField::List(names) => Ok(BuildArgs::Names(names)),
            ArgsField::Map(mapping) => {
                let mut pairs = Vec::new();
                for (key, value) in mapping {
                    pairs.push((key_string(&key)?, scalar_string(&value)?));
                }
                Ok(BuildArgs::Pairs(pairs))
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum CommandField {
    Line(String),
    Tokens(Vec<String>),
}

impl CommandField {
    fn into_command_line(self) -> CommandLine {
        match self {
            CommandField::Line(line) => CommandLine::Line(line),
            CommandField::Tokens(tokens) => CommandLine::Tokens(tokens),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum DependsOn {
    List(Vec<String>),
    Map(Mapping),
}

impl DependsOn {
    fn into_names(self) -> Result<Vec<ServiceName>, TranslateError> {
        match self {
            DependsOn::List(names) => Ok(names.into_iter().map(ServiceName).collect()),
            DependsOn::Map(mapping) => mapping
                .into_iter()
                .map(|(key, _)| key_string(&key).map(ServiceName))
                .collect(),
        }
    }
}

pub struct DockerComposeFrontend;

impl DockerComposeFrontend {
    pub fn new() -> DockerComposeFrontend {
        DockerComposeFrontend
    }
}

impl ComposerFrontend for DockerComposeFrontend {
    fn composition<P: AsRef<Path>>(
        &mut self,
        compose_file_path: P,
    ) -> Result<Composition, TranslateError> {
        let path = compose_file_path.as_ref();
        let compose_file = File::open(path).map_err(|err| {
            TranslateError::manifest(format!("could not open {:?}: {}", path, err))
        })?;

        let file: DockerComposeFile = serde_yaml::from_reader(compose_file)
            .map_err(|err| TranslateError::manifest(err.to_string()))?;

        let mut composition = Composition::default();
        for (key, value) in file.services {
            let service_name = key_string(&key)?;
            let service: Service = serde_yaml::from_value(value).map_err(|err| {
                TranslateError::manifest(format!("service {}: {}", service_name, err))
            })?;
            composition.services.push(service_spec(service_name, service)?);
        }

        // Dependencies may only name services declared in the same file.
        let names: Set<&ServiceName> = composition.services.iter().map(|spec| &spec.name).collect();
        for spec in composition.services.iter() {
            for dependency in spec.depends_on.iter() {
                if !names.contains(dependency) {
                    return Err(TranslateError::manifest(format!(
                        "service {} depends on unknown service {}",
                        spec.name.0, dependency.0
                    )));
                }
            }
        }

        Ok(composition)
    }
}

fn service_spec(name: String, service: Service) -> Result<ServiceSpec, TranslateError> {
    let image = service
        .image
        .ok_or_else(|| TranslateError::manifest(format!("service {} has no image", name)))?;

    let build = match service.build {
        Some(Build::Short(context)) => Some(ImageBuildSpec {
            context: PathBuf::from(context),
            args: BuildArgs::default(),
        }),
        Some(Build::Extended { context, args }) => Some(ImageBuildSpec {
            context: PathBuf::from(context),
            args: args.into_build_args()?,
        }),
        None => None,
    };

    let mut environment = Vec::new();
    if let Some(mapping) = service.environment {
        for (key, value) in mapping {
            environment.push((key_string(&key)?, scalar_string(&value)?));
        }
    }

    let restart_value = service
        .restart_policy
        .or(service.restart)
        .unwrap_or_else(|| "no".to_owned());
    let restart = match RestartPolicy::parse(&restart_value) {
        Some(restart) => restart,
        None => {
            return Err(TranslateError::Policy {
                service: name,
                value: restart_value,
            })
        }
    };

    let depends_on = match service.depends_on {
        Some(depends_on) => depends_on.into_names()?,
        None => Vec::new(),
    };

    Ok(ServiceSpec {
        name: ServiceName(name),
        image: ImageName(image),
        build,
        entrypoint: service.entrypoint.map(CommandField::into_command_line),
        command: service.command.map(CommandField::into_command_line),
        environment,
        restart,
        depends_on,
    })
}

fn key_string(key: &Value) -> Result<String, TranslateError> {
    key.as_str().map(str::to_owned).ok_or_else(|| {
        TranslateError::manifest(format!("expected a string key, found {:?}", key))
    })
}

/// Scalar values are taken as their string rendition; null and the empty
/// string both count as absent.
fn scalar_string(value: &Value) -> Result<Option<String>, TranslateError> {
    match value {
        Value::Null => Ok(None),
        Value::String(value) if value.is_empty() => Ok(None),
        Value::String(value) => Ok(Some(value.clone())),
        Value::Number(value) => Ok(Some(value.to_string())),
        Value::Bool(value) => Ok(Some(value.to_string())),
        other => Err(TranslateError::manifest(format!(
            "expected a scalar value, found {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(yaml: &str) -> Result<Composition, TranslateError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docker-compose.yml");
        fs::write(&path, yaml).unwrap();
        DockerComposeFrontend::new().composition(&path)
    }

    #[test]
    fn services_keep_manifest_order() {
        let composition = parse(
            "services:\n  zebra:\n    image: zebra:1\n  aardvark:\n    image: aardvark:1\n",
        )
        .unwrap();

        let names: Vec<&str> = composition
            .services
            .iter()
            .map(|spec| spec.name.0.as_str())
            .collect();
        assert_eq!(names, vec!["zebra", "aardvark"]);
    }

    #[test]
    fn parses_commands_in_both_shapes() {
        let composition = parse(
            "services:\n  web:\n    image: myapp:latest\n    entrypoint: /entry.sh\n    command: [\"serve\", \"--port\", \"80\"]\n",
        )
        .unwrap();

        let web = &composition.services[0];
        assert_eq!(
            web.entrypoint,
            Some(CommandLine::Line("/entry.sh".to_owned()))
        );
        assert_eq!(
            web.command,
            Some(CommandLine::Tokens(vec![
                "serve".to_owned(),
                "--port".to_owned(),
                "80".to_owned()
            ]))
        );
    }

    #[test]
    fn environment_preserves_order_and_absent_values() {
        let composition = parse(
            "services:\n  web:\n    image: myapp:latest\n    environment:\n      PORT: 8080\n      DEBUG:\n      EMPTY: \"\"\n",
        )
        .unwrap();

        assert_eq!(
            composition.services[0].environment,
            vec![
                ("PORT".to_owned(), Some("8080".to_owned())),
                ("DEBUG".to_owned(), None),
                ("EMPTY".to_owned(), None),
            ]
        );
    }

    #[test]
    fn build_args_parse_in_both_shapes() {
        let composition = parse(
            "services:\n  app:\n    image: app:latest\n    build:\n      context: ./app\n      args:\n        REGION: ${REGION}\n        FLAVOR:\n  proxy:\n    image: proxy:latest\n    build:\n      context: ./proxy\n      args:\n        - HTTP_PROXY\n",
        )
        .unwrap();

        let app = composition.services[0].build.as_ref().unwrap();
        assert_eq!(app.context, PathBuf::from("./app"));
        assert_eq!(
            app.args,
            BuildArgs::Pairs(vec![
                ("REGION".to_owned(), Some("${REGION}".to_owned())),
                ("FLAVOR".to_owned(), None),
            ])
        );

        let proxy = composition.services[1].build.as_ref().unwrap();
        assert_eq!(proxy.args, BuildArgs::Names(vec!["HTTP_PROXY".to_owned()]));
    }

    #[test]
    fn short_build_form_is_a_context_without_args() {
        let composition =
            parse("services:\n  app:\n    image: app:latest\n    build: ./app\n").unwrap();

        let build = composition.services[0].build.as_ref().unwrap();
        assert_eq!(build.context, PathBuf::from("./app"));
        assert_eq!(build.args, BuildArgs::Names(Vec::new()));
    }

    #[test]
    fn depends_on_accepts_lists_and_mappings() {
        let composition = parse(
            "services:\n  web:\n    image: web:1\n    depends_on:\n      - db\n  worker:\n    image: worker:1\n    depends_on:\n      db:\n        condition: service_started\n  db:\n    image: db:1\n",
        )
        .unwrap();

        assert_eq!(
            composition.services[0].depends_on,
            vec![ServiceName("db".to_owned())]
        );
        assert_eq!(
            composition.services[1].depends_on,
            vec![ServiceName("db".to_owned())]
        );
    }

    #[test]
    fn restart_defaults_to_no_and_restart_policy_wins() {
        let composition = parse(
            "services:\n  a:\n    image: a:1\n  b:\n    image: b:1\n    restart: always\n  c:\n    image: c:1\n    restart: always\n    restart_policy: on-failure\n",
        )
        .unwrap();

        assert_eq!(composition.services[0].restart, RestartPolicy::No);
        assert_eq!(composition.services[1].restart, RestartPolicy::Always);
        assert_eq!(composition.services[2].restart, RestartPolicy::OnFailure);
    }

    #[test]
    fn unknown_restart_values_are_policy_errors() {
        let err = parse("services:\n  a:\n    image: a:1\n    restart: sometimes\n").unwrap_err();
        match err {
            TranslateError::Policy { service, value } => {
                assert_eq!(service, "a");
                assert_eq!(value, "sometimes");
            }
            other => panic!("expected a policy error, got {:?}", other),
        }
    }

    #[test]
    fn missing_images_are_manifest_errors() {
        let err = parse("services:\n  a:\n    command: run\n").unwrap_err();
        match err {
            TranslateError::Manifest { message } => {
                assert!(message.contains("a has no image"), "got: {}", message)
            }
            other => panic!("expected a manifest error, got {:?}", other),
        }
    }

    #[test]
    fn unknown_dependencies_are_manifest_errors() {
        let err = parse(
            "services:\n  web:\n    image: web:1\n    depends_on:\n      - ghost\n",
        )
        .unwrap_err();
        match err {
            TranslateError::Manifest { message } => {
                assert!(message.contains("ghost"), "got: {}", message)
            }
            other => panic!("expected a manifest error, got {:?}", other),
        }
    }
}
