use anyhow::{anyhow, Result};
use crossterm::{
    cursor,
    style::{self, Colorize, Styler},
    QueueableCommand,
};
use log::info;
use std::{
    env,
    fs::File,
    io::{stdout, BufWriter, Write},
    path::{Path, PathBuf},
};
use structopt::StructOpt;

use backends::DockerBackend;
use environment::{EnvFile, EnvSnapshot};
use frontends::DockerComposeFrontend;
use models::{ResolutionPolicy, ServiceName};
use services::ComposerFrontend;
use translator::{ImageOperation, ImageOutcome, Translator};

mod backends;
mod environment;
mod error;
mod frontends;
mod models;
mod priority;
mod services;
mod supervisord;
mod translator;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "sup-compose",
    about = "Translates a docker-compose file into a supervisord configuration, so the services run as sibling processes under one supervisor."
)]
struct Opt {
    #[structopt(short, long)]
    /// Compose file to translate. Defaults to searching the current
    /// directory and its parents.
    file: Option<PathBuf>,

    #[structopt(long, default_value = ".env")]
    /// Environment file merged into the supervisor's global environment,
    /// relative to the compose file.
    env_file: PathBuf,

    #[structopt(short, long, default_value = "supervisord.conf")]
    /// Where to write the generated configuration, relative to the compose
    /// file.
    output: PathBuf,

    #[structopt(long)]
    /// Keep going when an image fails to build or pull; the affected
    /// service gets an empty command instead of failing the run.
    skip_failed_images: bool,
}

fn find_compose_file<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    for path in path.as_ref().ancestors() {
        let docker_file_path = path.join("docker-compose.yml");
        if docker_file_path.exists() {
            return Some(docker_file_path);
        }

        let docker_file_path = path.join("docker-compose.yaml");
        if docker_file_path.exists() {
            return Some(docker_file_path);
        }
    }

    None
}

fn main() -> Result<()> {
    pretty_env_logger::init_custom_env("LOG");

    let opt = Opt::from_args();

    let mut stdout = stdout();

    let compose_file_path = match opt.file {
        Some(path) => path.canonicalize()?,
        None => {
            let current_dir = env::current_dir()?;
            find_compose_file(current_dir).ok_or_else(|| {
                anyhow!("Couldn't find a docker-compose.yml file in the current working directory or any of its parents.")
            })?
        }
    };
    info!("found compose file {:?}", compose_file_path);

    let work_directory = compose_file_path
        .parent()
        .ok_or_else(|| anyhow!("Docker compose file has no parent."))?;
    info!("found work directory {:?}", work_directory);

    env::set_current_dir(work_directory)?;

    let env_file = EnvFile::load(&opt.env_file)?;
    let env = EnvSnapshot::capture(&env_file);
    info!(
        "merged {} entries from {:?}",
        env_file.pairs.len(),
        opt.env_file
    );

    let mut frontend = DockerComposeFrontend::new();
    let composition = frontend.composition(compose_file_path.as_path())?;
    info!("parsed composition");

    let backend = DockerBackend::new();
    let mut translator = Translator::init(backend, composition, env);

    let policy = if opt.skip_failed_images {
        ResolutionPolicy::Degrade
    } else {
        ResolutionPolicy::Abort
    };

    let operations = translator.image_operations();
    image_apply(&mut translator, &mut stdout, operations, policy)?;

    let config = translator.into_supervisord(&env_file)?;

    // Assembled in full before the file is touched, so a failed run never
    // leaves a partial configuration behind.
    let output_file = File::create(&opt.output)?;
    let mut writer = BufWriter::new(output_file);
    config.write_to(&mut writer)?;
    writer.flush()?;
    info!("wrote {:?}", opt.output);

    Ok(())
}

fn image_apply(
    translator: &mut Translator,
    stdout: &mut impl Write,
    operations: Vec<(ServiceName, ImageOperation)>,
    policy: ResolutionPolicy,
) -> Result<()> {
    fn operation_verb(operation: ImageOperation) -> &'static str {
        match operation {
            ImageOperation::Build => "Building",
            ImageOperation::Pull => "Pulling",
        }
    }

    let lines = operations
        .iter()
        .map(|(service_name, operation)| {
            let verb = operation_verb(*operation);
            format!("{} {}", verb, service_name.0)
        })
        .collect::<Vec<_>>();

    let longest_line = lines.iter().map(|line| line.len()).max().unwrap_or(0);

    for line in lines.iter() {
        stdout.queue(style::Print(line))?;

        let padding = longest_line - line.len() + 1;
        stdout
            .queue(cursor::MoveRight(padding as u16))?
            .queue(style::Print("...\n"))?;
    }

    stdout.flush()?;

    for (line, (service_name, operation)) in operations.into_iter().enumerate() {
        let outcome = translator.image_apply(&service_name, operation, policy)?;

        let status = match outcome {
            ImageOutcome::Resolved => "done".green().bold(),
            ImageOutcome::Degraded => "skipped".yellow().bold(),
        };

        stdout
            .queue(cursor::SavePosition)?
            .queue(cursor::MoveToPreviousLine((lines.len() - line) as u16))?
            .queue(cursor::MoveRight(longest_line as u16 + 5))?
            .queue(style::PrintStyledContent(status))?
            .queue(cursor::RestorePosition)?
            .flush()?;
    }

    Ok(())
}
