//! Well-known filesystem locations of the package manager.
//!
//! All of these are defaults; every component accepts overriding paths so
//! tests can run against temporary directories.

/// The directory holding the repository index and per-package metadata.
pub const PACKAGE_MANAGER_DIR: &str = "/var/lib/sonic-package-manager";

/// The repository index file name inside [`PACKAGE_MANAGER_DIR`].
pub const PACKAGES_FILE_NAME: &str = "packages.yml";

/// The well-known metadata directory inside a package image.
pub const IMAGE_METADATA_DIR: &str = "/var/lib/sonic-package";

/// The directory holding the rendered-artifact templates.
pub const TEMPLATES_DIR: &str = "/usr/share/sonic/templates";

/// The systemd unit directory.
pub const SYSTEMD_UNIT_DIR: &str = "/usr/lib/systemd/system";

/// The directory for generated service management scripts.
pub const SERVICE_MGMT_SCRIPT_DIR: &str = "/usr/local/bin";

/// The directory for generated container control scripts.
pub const CONTAINER_CTL_SCRIPT_DIR: &str = "/usr/bin";

/// The monit fragment directory.
pub const MONIT_CONF_DIR: &str = "/etc/monit/conf.d";

/// The directory holding reverse-dependency files and host configuration.
pub const ETC_SONIC_DIR: &str = "/etc/sonic";

/// The host version file describing the base OS.
pub const SONIC_VERSION_FILE: &str = "/etc/sonic/sonic_version.yml";

/// The persisted running configuration of the host partition.
pub const RUNNING_CONFIG_FILE: &str = "/etc/sonic/config_db.json";
