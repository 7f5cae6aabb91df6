//! Named kernel containers and load-or-generate provisioning.

use crate::binary::{write_container, BinaryContainer};
use crate::{Error, Result};
use log::{info, warn};
use std::fs;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tempfile::NamedTempFile;
use uvwresponse_algorithms::KernelGenerator;
use uvwresponse_core::{KernelIdentity, ResponseConfig, ResponseKernels, StripGeometry, Table};

/// On-disk container format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Little-endian binary records, read through a memory mapping.
    #[default]
    Binary,
    /// HDF5 file with one dataset per table.
    #[cfg(feature = "hdf5")]
    Hdf5,
}

impl ContainerFormat {
    /// File extension of the format.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Binary => "uvwk",
            #[cfg(feature = "hdf5")]
            ContainerFormat::Hdf5 => "h5",
        }
    }
}

/// Directory of kernel containers named after their identity.
#[derive(Clone, Debug)]
pub struct KernelStore {
    dir: PathBuf,
    format: ContainerFormat,
}

impl KernelStore {
    /// Creates a store of binary containers in `dir`.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            format: ContainerFormat::default(),
        }
    }

    /// Sets the container format.
    #[must_use]
    pub fn with_format(mut self, format: ContainerFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    /// Path of the container holding the family `identity`.
    #[must_use]
    pub fn path_for(&self, identity: &KernelIdentity) -> PathBuf {
        self.dir.join(format!(
            "{}.{}",
            identity.container_stem(),
            self.format.extension()
        ))
    }

    /// True if a container for `identity` exists.
    #[must_use]
    pub fn contains(&self, identity: &KernelIdentity) -> bool {
        self.path_for(identity).exists()
    }

    /// Writes a new container for `kernels` and returns its path.
    ///
    /// The tables are written to a temporary file in the store directory,
    /// which is then moved into place without replacing an existing file.
    ///
    /// # Errors
    /// Returns [`Error::ContainerExists`] if the container is already present,
    /// in which case nothing is written.
    pub fn save(&self, kernels: &ResponseKernels) -> Result<PathBuf> {
        let path = self.path_for(kernels.identity());
        if path.exists() {
            return Err(Error::ContainerExists(path));
        }
        fs::create_dir_all(&self.dir)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        match self.format {
            ContainerFormat::Binary => {
                let mut writer = BufWriter::new(tmp.as_file_mut());
                write_container(&mut writer, kernels)?;
            }
            #[cfg(feature = "hdf5")]
            ContainerFormat::Hdf5 => crate::hdf5::write_container_hdf5(tmp.path(), kernels)?,
        }
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                Error::ContainerExists(path.clone())
            } else {
                Error::Io(e.error)
            }
        })?;
        info!("saved response kernels to {}", path.display());
        Ok(path)
    }

    /// Loads the family `config` produces on `geometry`.
    ///
    /// # Errors
    /// Returns an I/O error if the container is absent, or
    /// [`Error::IdentityMismatch`] / [`Error::MissingTable`] if it cannot
    /// serve the configured window.
    pub fn load(
        &self,
        config: &ResponseConfig,
        geometry: &dyn StripGeometry,
    ) -> Result<ResponseKernels> {
        self.load_identity(&config.identity(geometry))
    }

    /// Loads the family with the given identity.
    ///
    /// # Errors
    /// See [`KernelStore::load`].
    pub fn load_identity(&self, identity: &KernelIdentity) -> Result<ResponseKernels> {
        let path = self.path_for(identity);
        let kernels = match self.format {
            ContainerFormat::Binary => {
                let container = BinaryContainer::open(&path)?;
                let (stored, mut tables) = container.read()?;
                check_identity(identity, &stored)?;
                assemble(identity, |name| Ok(tables.remove(name)))?
            }
            #[cfg(feature = "hdf5")]
            ContainerFormat::Hdf5 => {
                if !path.exists() {
                    return Err(Error::Io(std::io::Error::new(
                        ErrorKind::NotFound,
                        format!("{} not found", path.display()),
                    )));
                }
                let file = ::hdf5::File::open(&path)?;
                let stored = crate::hdf5::read_identity_hdf5(&file)?;
                check_identity(identity, &stored)?;
                assemble(identity, |name| crate::hdf5::read_table_hdf5(&file, name))?
            }
        };
        info!("loaded response kernels from {}", path.display());
        Ok(kernels)
    }

    /// Loads the configured family, regenerating it if no usable container exists.
    ///
    /// Any load failure is logged and answered by generation. With `save_fresh`
    /// a regenerated family is written back unless a container of that name
    /// is already present.
    ///
    /// # Errors
    /// Returns an error if generation fails or is cancelled, or if saving
    /// fails for a reason other than an existing container.
    pub fn load_or_generate(
        &self,
        geometry: &dyn StripGeometry,
        config: &ResponseConfig,
        cancel: &AtomicBool,
        save_fresh: bool,
    ) -> Result<ResponseKernels> {
        match self.load(config, geometry) {
            Ok(kernels) => return Ok(kernels),
            Err(e) => warn!("cannot reuse response kernels ({e}), regenerating"),
        }
        let kernels = KernelGenerator::new(config.clone())?.generate(geometry, cancel)?;
        if save_fresh {
            match self.save(&kernels) {
                Ok(_) => {}
                Err(Error::ContainerExists(path)) => {
                    warn!("keeping existing container {}", path.display());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(kernels)
    }
}

fn check_identity(expected: &KernelIdentity, stored: &KernelIdentity) -> Result<()> {
    if expected == stored {
        return Ok(());
    }
    Err(Error::IdentityMismatch {
        expected: expected.container_stem(),
        found: stored.container_stem(),
    })
}

/// Fetches every table of `identity` by name, failing on the first absent one.
fn assemble<F>(identity: &KernelIdentity, mut fetch: F) -> Result<ResponseKernels>
where
    F: FnMut(&str) -> Result<Option<Table>>,
{
    let mut failure = None;
    let assembled = ResponseKernels::assemble(identity.clone(), |name| match fetch(name) {
        Ok(table) => table,
        Err(e) => {
            failure.get_or_insert(e);
            None
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    assembled.map_err(|e| match e {
        uvwresponse_core::Error::MissingTable(name) => Error::MissingTable(name),
        other => Error::CoreError(other),
    })
}
