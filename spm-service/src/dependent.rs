//! Reverse-dependency files.
//!
//! The platform's init scripts consult `/etc/sonic/<svc>_dependent` and
//! `/etc/sonic/<svc>_multi_inst_dependent` to know which features must be
//! started alongside a base service. The files are whitespace-separated
//! sets; writes de-duplicate.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use spm_manifest::Manifest;

use crate::Error;

/// The only base service currently accepting reverse-dependencies.
const ACCEPTED_BASE_SERVICE: &str = "swss";

/// Adds or removes a feature in the reverse-dependency files of every base
/// service named in the manifest's `dependent-of` list.
///
/// The feature is always tracked in `<svc>_dependent`; ASIC services are
/// additionally tracked in `<svc>_multi_inst_dependent`. On removal both
/// files are cleaned regardless of the ASIC flag, keeping the operation
/// idempotent across manifest changes.
///
/// # Errors
///
/// Returns [`Error::UnsupportedBaseService`] before touching any file if a
/// listed base service is not supported, or an error if a file cannot be
/// read or written.
pub(crate) fn update(etc_dir: &Path, manifest: &Manifest, install: bool) -> Result<(), Error> {
    for service in &manifest.service.dependent_of {
        if service != ACCEPTED_BASE_SERVICE {
            return Err(Error::UnsupportedBaseService {
                service: service.clone(),
            });
        }
    }

    let feature = &manifest.service.name;
    for service in &manifest.service.dependent_of {
        let dependent = dependent_file(etc_dir, service, false);
        let multi_inst = dependent_file(etc_dir, service, true);
        if install {
            update_set_file(&dependent, feature, true)?;
            if manifest.service.asic_service {
                update_set_file(&multi_inst, feature, true)?;
            }
        } else {
            update_set_file(&dependent, feature, false)?;
            update_set_file(&multi_inst, feature, false)?;
        }
    }
    Ok(())
}

/// The path of a reverse-dependency file.
fn dependent_file(etc_dir: &Path, service: &str, multi_inst: bool) -> PathBuf {
    if multi_inst {
        etc_dir.join(format!("{service}_multi_inst_dependent"))
    } else {
        etc_dir.join(format!("{service}_dependent"))
    }
}

/// Inserts `feature` into or removes it from the set file at `path`.
fn update_set_file(path: &Path, feature: &str, add: bool) -> Result<(), Error> {
    let mut entries: BTreeSet<String> = if path.exists() {
        fs::read_to_string(path)
            .map_err(|source| Error::IoPath {
                path: path.to_path_buf(),
                context: "reading a reverse-dependency file",
                source,
            })?
            .split_whitespace()
            .map(str::to_string)
            .collect()
    } else if !add {
        return Ok(());
    } else {
        BTreeSet::new()
    };

    if add {
        entries.insert(feature.to_string());
    } else {
        entries.remove(feature);
    }

    let rendered = entries.into_iter().collect::<Vec<_>>().join(" ");
    fs::write(path, rendered).map_err(|source| Error::IoPath {
        path: path.to_path_buf(),
        context: "writing a reverse-dependency file",
        source,
    })
}
