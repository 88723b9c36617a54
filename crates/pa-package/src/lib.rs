// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! pa-package
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod convergence;
mod info;
mod refresh;
mod wrapper;

pub use cache::{installed_key_variants, PackageCache, Table, INSTALLED_MARKER, INVENTORY_KEY};
pub use convergence::{absent, present, PackageRequest};
pub use info::{PackageInfo, PackageInfoError, PackageType};
pub use refresh::{refresh_installed_cache, refresh_updates_cache, RefreshOutcome, UpdatesSource};
pub use wrapper::{group_into_records, PackageModuleWrapper, TimeoutConfig, SUPPORTED_API_VERSION};
