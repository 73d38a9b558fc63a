use anyhow::Result;
use std::path::Path;

use crate::{
    error::TranslateError,
    models::{Composition, ImageMetadata, ImageName},
};

pub trait ComposerFrontend {
    fn composition<P: AsRef<Path>>(
        &mut self,
        compose_file_path: P,
    ) -> Result<Composition, TranslateError>;
}

/// The container runtime the translator resolves images against. Every call
/// blocks until the runtime is done with it.
pub trait ContainerBackend {
    /// Builds `name` from the context directory. Each build arg is either a
    /// bare `NAME` or a `NAME=value` pair.
    fn build_image(&mut self, name: &ImageName, context: &Path, build_args: &[String])
        -> Result<()>;

    fn pull_image(&mut self, name: &ImageName) -> Result<()>;

    /// Reports the baseline entrypoint and command of a locally present
    /// image. Fields the image does not define come back empty.
    fn inspect_image(&mut self, name: &ImageName) -> Result<ImageMetadata>;
}
