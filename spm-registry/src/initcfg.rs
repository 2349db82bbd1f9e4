//! Initial configuration loading.
//!
//! A package may ship an `initial-config` block in its manifest. On
//! installation it is merged into the configuration store partitions the
//! package runs in: the `host` partition for host services, the per-ASIC
//! partitions for ASIC services on multi-ASIC platforms.

use std::collections::BTreeMap;

use log::info;
use spm_manifest::{InitialConfig, Manifest};

use crate::{ConfigStore, Error};

/// The partition identifier of the host configuration store.
pub const HOST_PARTITION: &str = "host";

/// Merges the package initial configuration into the store partitions.
///
/// Existing store fields always win over shipped defaults, so operator
/// configuration survives reinstallation. All partitions are persisted
/// afterwards, including unchanged ones.
///
/// Packages without an `initial-config` block are a no-op.
///
/// # Errors
///
/// Returns an error if persisting a partition fails.
pub fn load_initial_config(
    stores: &mut BTreeMap<String, Box<dyn ConfigStore>>,
    manifest: &Manifest,
) -> Result<(), Error> {
    let Some(initial) = &manifest.package.initial_config else {
        return Ok(());
    };

    let multi_partition = stores.keys().any(|partition| partition != HOST_PARTITION);
    for (partition, store) in stores.iter_mut() {
        let merge_here = if partition == HOST_PARTITION {
            !multi_partition || manifest.service.host_service
        } else {
            multi_partition && manifest.service.asic_service
        };
        if merge_here {
            info!(
                "Loading initial configuration of {} into partition {partition}",
                manifest.service.name
            );
            merge(store.as_mut(), initial);
        }
        store.save()?;
    }
    Ok(())
}

/// Merges `initial` into `store`; fields already present in the store win.
fn merge(store: &mut dyn ConfigStore, initial: &InitialConfig) {
    for (table, keys) in initial {
        for (key, fields) in keys {
            let current = store.get_entry(table, key);
            let mut merged = fields.clone();
            merged.extend(current);
            store.set_entry(table, key, merged);
        }
    }
}
