//! Feature registration in the `FEATURE` table.

use log::info;
use spm_manifest::Manifest;

use crate::{ConfigStore, Error, FieldMap};

/// The configuration table features are registered in.
pub const FEATURE_TABLE: &str = "FEATURE";

/// Policy applied when a feature row is deregistered.
///
/// Historical variants of the platform disagree on whether an enabled
/// feature may be deregistered; the policy keeps both behaviors available.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DeregisterPolicy {
    /// Remove the row regardless of its state.
    #[default]
    Unconditional,
    /// Refuse removal while the row has `state = enabled`.
    RefuseWhenEnabled,
}

/// Renders a boolean the way the configuration store expects it.
fn bool_field(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}

/// Registers the feature of a package in the configuration store.
///
/// The resulting row merges three layers, later layers winning: the
/// configurable defaults (`state`, `auto_restart`, `high_mem_alert`), any
/// fields already present in the store (preserving operator changes such as
/// `state = enabled` across reinstallation), and the fixed fields derived
/// from the manifest (`has_per_asic_scope`, `has_global_scope`,
/// `has_timer`). The running configuration is persisted afterwards.
///
/// # Errors
///
/// Returns an error if persisting the configuration fails.
pub fn register(store: &mut dyn ConfigStore, manifest: &Manifest) -> Result<(), Error> {
    let feature = &manifest.service.name;
    let current = store.get_entry(FEATURE_TABLE, feature);

    let mut fields = FieldMap::from([
        ("state".to_string(), "disabled".to_string()),
        ("auto_restart".to_string(), "enabled".to_string()),
        ("high_mem_alert".to_string(), "disabled".to_string()),
    ]);
    fields.extend(current);
    fields.extend(FieldMap::from([
        (
            "has_per_asic_scope".to_string(),
            bool_field(manifest.service.asic_service),
        ),
        (
            "has_global_scope".to_string(),
            bool_field(manifest.service.host_service),
        ),
        ("has_timer".to_string(), bool_field(false)),
    ]));

    store.set_entry(FEATURE_TABLE, feature, fields);
    store.save()?;

    info!("Registered feature: {feature}");
    Ok(())
}

/// Deregisters the feature row of a package and persists the configuration.
///
/// # Errors
///
/// Returns [`Error::FeatureEnabled`] under
/// [`DeregisterPolicy::RefuseWhenEnabled`] if the row is still enabled, or
/// an error if persisting fails.
pub fn deregister(
    store: &mut dyn ConfigStore,
    feature: &str,
    policy: DeregisterPolicy,
) -> Result<(), Error> {
    if policy == DeregisterPolicy::RefuseWhenEnabled && is_enabled(store, feature) {
        return Err(Error::FeatureEnabled {
            feature: feature.to_string(),
        });
    }

    store.remove_entry(FEATURE_TABLE, feature);
    store.save()?;

    info!("Deregistered feature: {feature}");
    Ok(())
}

/// Returns whether the feature row has `state = enabled`.
pub fn is_enabled(store: &dyn ConfigStore, feature: &str) -> bool {
    store
        .get_entry(FEATURE_TABLE, feature)
        .get("state")
        .is_some_and(|state| state == "enabled")
}
