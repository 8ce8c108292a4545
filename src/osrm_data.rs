//! Local OSRM dataset preparation: fetch a Geofabrik extract and run the
//! OSRM preprocessing pipeline through docker.
//!
//! Every step is skipped when its output is already on disk, so repeated
//! calls against the same data root are cheap.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

const OSRM_IMAGE: &str = "osrm/osrm-backend";

/// Extract covering the default service area (Jezreel Valley / Lower Galilee).
pub const DEFAULT_REGION: &str = "asia/israel-and-palestine";

#[derive(Debug, Error)]
pub enum OsrmDataError {
    #[error("dataset io error: {0}")]
    Io(#[from] io::Error),
    #[error("extract download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("`{step}` failed: {status}")]
    Process { step: String, status: String },
}

/// A Geofabrik extract path such as `asia/israel-and-palestine`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub path: String,
}

impl Region {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Last path segment; used for the data directory and file names.
    pub fn name(&self) -> &str {
        self.path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("region")
    }

    pub fn download_url(&self) -> String {
        format!("https://download.geofabrik.de/{}-latest.osm.pbf", self.path)
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::new(DEFAULT_REGION)
    }
}

/// Which OSRM routing algorithm the dataset is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preprocessing {
    /// Multi-level Dijkstra: `osrm-partition` + `osrm-customize`.
    #[default]
    Mld,
    /// Contraction hierarchies: `osrm-contract`.
    Ch,
}

impl Preprocessing {
    /// Value for `osrm-routed --algorithm`.
    pub fn algorithm(self) -> &'static str {
        match self {
            Preprocessing::Mld => "mld",
            Preprocessing::Ch => "ch",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub region: Region,
    pub data_root: PathBuf,
    /// Lua profile inside the OSRM image.
    pub profile: String,
    pub preprocessing: Preprocessing,
}

impl DatasetConfig {
    pub fn new(region: Region, data_root: impl Into<PathBuf>) -> Self {
        Self {
            region,
            data_root: data_root.into(),
            profile: "/opt/car.lua".to_string(),
            preprocessing: Preprocessing::default(),
        }
    }
}

/// Paths of a prepared dataset.
#[derive(Debug, Clone)]
pub struct OsrmDataset {
    pub data_dir: PathBuf,
    pub pbf_path: PathBuf,
    /// `<region>-latest.osrm`, the argument `osrm-routed` expects.
    pub osrm_base: PathBuf,
    pub preprocessing: Preprocessing,
}

impl OsrmDataset {
    /// Download and preprocess whatever is missing under `config.data_root`.
    pub fn ensure(config: &DatasetConfig) -> Result<Self, OsrmDataError> {
        let data_root = if config.data_root.is_absolute() {
            config.data_root.clone()
        } else {
            std::env::current_dir()?.join(&config.data_root)
        };
        let region = config.region.name();
        let data_dir = data_root.join(region);
        fs::create_dir_all(&data_dir)?;

        let pbf_path = data_dir.join(format!("{}-latest.osm.pbf", region));
        if pbf_path.exists() {
            debug!(path = %pbf_path.display(), "extract already present");
        } else {
            download(&config.region.download_url(), &pbf_path)?;
        }

        let osrm_base = data_dir.join(format!("{}-latest.osrm", region));
        if !osrm_base.exists() {
            run_in_container(
                &data_dir,
                &["osrm-extract", "-p", &config.profile, &container_path(&pbf_path)],
            )?;
        }

        let base = container_path(&osrm_base);
        match config.preprocessing {
            Preprocessing::Mld => {
                if !has_sidecars(&osrm_base, &["partition", "mldgr", "cells"]) {
                    run_in_container(&data_dir, &["osrm-partition", &base])?;
                    run_in_container(&data_dir, &["osrm-customize", &base])?;
                }
            }
            Preprocessing::Ch => {
                if !has_sidecars(&osrm_base, &["hsgr"]) {
                    run_in_container(&data_dir, &["osrm-contract", &base])?;
                }
            }
        }

        info!(region, data_dir = %data_dir.display(), "OSRM dataset ready");
        Ok(Self {
            data_dir,
            pbf_path,
            osrm_base,
            preprocessing: config.preprocessing,
        })
    }

    /// `osrm-routed` arguments for serving this dataset from `/data`.
    pub fn routed_args(&self) -> Vec<String> {
        vec![
            "osrm-routed".to_string(),
            "--algorithm".to_string(),
            self.preprocessing.algorithm().to_string(),
            container_path(&self.osrm_base),
        ]
    }
}

fn download(url: &str, dest: &Path) -> Result<(), OsrmDataError> {
    info!(%url, "downloading extract");
    let bytes = reqwest::blocking::get(url)?.error_for_status()?.bytes()?;
    let partial = dest.with_extension("part");
    let mut writer = BufWriter::new(File::create(&partial)?);
    writer.write_all(&bytes)?;
    writer.flush()?;
    fs::rename(partial, dest)?;
    Ok(())
}

fn has_sidecars(osrm_base: &Path, extensions: &[&str]) -> bool {
    osrm_base.exists()
        && extensions
            .iter()
            .all(|ext| osrm_base.with_extension(format!("osrm.{}", ext)).exists())
}

fn run_in_container(data_dir: &Path, args: &[&str]) -> Result<(), OsrmDataError> {
    info!(step = args[0], "running OSRM preprocessing");
    let status = Command::new("docker")
        .args(["run", "--rm", "-t", "-v"])
        .arg(format!("{}:/data", data_dir.display()))
        .arg(OSRM_IMAGE)
        .args(args)
        .status()?;

    if status.success() {
        Ok(())
    } else {
        Err(OsrmDataError::Process {
            step: args.join(" "),
            status: status.to_string(),
        })
    }
}

fn container_path(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    format!("/data/{}", name)
}
