extern crate log;
pub mod crs;
pub mod download;
pub mod engine;
pub mod geofile;
pub mod join;
use crate::crs::crs_utils::{epsg_4326, Crs, EpsgCode};
use crate::crs::projection::{reproject_bounding_box, utm_crs_for_collection};
use crate::download::archive::{extract_archive, find_geofile, sync_archive_to_file};
use crate::engine::{geo_engine::GeoEngine, GeometryEngine};
use crate::geofile::bbox::BoundingBox;
use crate::geofile::collection::FeatureCollection;
use crate::geofile::gdal_geofile::{
    geometry_to_wkt, read_features_from_geofile, write_features_to_geofile, GdalDriverType,
};
use crate::join::{attribute::join_attributes, lookup::LookupTable, spatial::spatial_predicate_join};
use anyhow::anyhow;
use clap::Parser;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::{fs, fs::read_to_string, path::Path};

/// Label line and polygon features by whether they intersect a second layer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input config file.
    #[arg(short, long)]
    config_filepath: String,
}

#[derive(Deserialize, Debug)]
enum LayerSource {
    /// Zip archive downloaded into the data directory. `file_name` picks the geofile inside it if the
    /// archive holds more than one shapefile.
    Archive {
        url: String,
        #[serde(default)]
        file_name: Option<String>,
    },
    Geofile {
        filepath: PathBuf,
    },
}

#[derive(Deserialize, Debug)]
struct LayerConfig {
    source: LayerSource,
    #[serde(default)]
    keep_attributes: Option<Vec<String>>,
    #[serde(default)]
    rename_attributes: BTreeMap<String, String>,
}

#[derive(Deserialize, Debug, PartialEq)]
enum WorkingCrsConfig {
    Epsg { code: EpsgCode },
    /// The WGS84 UTM zone of the candidate layer.
    Utm,
}

#[derive(Deserialize, Debug)]
struct CropConfig {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    crs: Crs,
}

impl CropConfig {
    fn to_bounding_box(&self) -> anyhow::Result<BoundingBox> {
        BoundingBox::new(self.min_x, self.min_y, self.max_x, self.max_y, self.crs.clone())
    }
}

#[derive(Deserialize, Debug)]
struct LookupConfig {
    csv_path: PathBuf,
    key_column: String,
    key_attribute: String,
}

#[derive(Deserialize, Debug)]
struct Config {
    data_dir: PathBuf,
    candidates: LayerConfig,
    targets: LayerConfig,
    working_crs: WorkingCrsConfig,
    #[serde(default)]
    crop: Option<CropConfig>,
    #[serde(default)]
    lookup: Option<LookupConfig>,
    output_name: String,
}

fn resolve_layer_filepath(source: &LayerSource, data_dir: &Path) -> anyhow::Result<PathBuf> {
    match source {
        LayerSource::Geofile { filepath } => Ok(filepath.clone()),
        LayerSource::Archive { url, file_name } => {
            let archive_filepath = sync_archive_to_file(url, data_dir)?;
            let extract_dir = archive_filepath.with_extension("");
            extract_archive(&archive_filepath, &extract_dir)?;
            find_geofile(&extract_dir, file_name.as_deref())
        }
    }
}

fn prepare_attributes(collection: &FeatureCollection, layer: &LayerConfig) -> FeatureCollection {
    let selected = match &layer.keep_attributes {
        Some(names) => collection.select_attributes(names.as_slice()),
        None => collection.clone(),
    };
    layer
        .rename_attributes
        .iter()
        .fold(selected, |renamed, (from, to)| renamed.rename_attribute(from, to))
}

fn load_layer(
    name: &str,
    layer: &LayerConfig,
    data_dir: &Path,
) -> anyhow::Result<FeatureCollection> {
    let filepath = resolve_layer_filepath(&layer.source, data_dir)?;
    log::info!("Reading {} features from {:?}", name, filepath);
    let features = read_features_from_geofile(&filepath)?;
    log::info!("Read {} {} features in {}", features.len(), name, features.crs());
    Ok(prepare_attributes(&features, layer))
}

fn resolve_working_crs(
    working_crs: &WorkingCrsConfig,
    reference: &FeatureCollection,
) -> anyhow::Result<Crs> {
    match working_crs {
        WorkingCrsConfig::Epsg { code } => Ok(Crs::from_epsg(*code)),
        WorkingCrsConfig::Utm => utm_crs_for_collection(reference),
    }
}

fn try_main() -> anyhow::Result<()> {
    let args = Args::try_parse()?;
    if !Path::new(&args.config_filepath).exists() {
        return Err(anyhow!("Config file {} not found", &args.config_filepath));
    }
    let config_contents = read_to_string(args.config_filepath)?;
    let config: Config = serde_yaml::from_str(&config_contents)?;
    fs::create_dir_all(&config.data_dir)?;

    let engine = GeoEngine;
    let candidates = load_layer("candidate", &config.candidates, &config.data_dir)?;
    let targets = load_layer("target", &config.targets, &config.data_dir)?;

    let working_crs = resolve_working_crs(&config.working_crs, &candidates)?;
    log::info!("Projecting candidates and targets to {}", working_crs);
    let projected_candidates = engine.reproject(&candidates, &working_crs)?;
    let projected_targets = engine.reproject(&targets, &working_crs)?;

    let (cropped_candidates, cropped_targets) = match &config.crop {
        Some(crop) => {
            let bbox = reproject_bounding_box(&crop.to_bounding_box()?, &working_crs)?;
            log::info!(
                "Cropping to ({}, {}) - ({}, {})",
                bbox.min_x(),
                bbox.min_y(),
                bbox.max_x(),
                bbox.max_y()
            );
            (projected_candidates.crop(&bbox)?, projected_targets.crop(&bbox)?)
        }
        None => (projected_candidates, projected_targets),
    };

    let enriched_candidates = match &config.lookup {
        Some(lookup) => {
            let table = LookupTable::from_csv(&lookup.csv_path, &lookup.key_column)?;
            join_attributes(&cropped_candidates, &table, &lookup.key_attribute)
        }
        None => cropped_candidates,
    };

    let labelled_candidates =
        spatial_predicate_join(&enriched_candidates, &cropped_targets, &engine)?;
    if let Some(first) = labelled_candidates.features().first() {
        log::debug!("First labelled geometry: {}", geometry_to_wkt(&first.geometry)?);
    }

    let geopackage_filepath = config.data_dir.join(format!("{}.gpkg", config.output_name));
    write_features_to_geofile(
        &labelled_candidates,
        &geopackage_filepath,
        GdalDriverType::GeoPackage,
    )?;
    let geojson_filepath = config.data_dir.join(format!("{}.geojson", config.output_name));
    log::info!("Writing labelled features to GeoJSON to {:?}", &geojson_filepath);
    let wgs84_candidates = engine.reproject(&labelled_candidates, &epsg_4326())?;
    geofile::geojson::write_collection_to_geojson(&wgs84_candidates, &geojson_filepath)?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::{
        crs::crs_utils::{epsg_4326, Crs},
        geofile::{collection::FeatureCollection, feature::Feature},
    };

    use super::{
        prepare_attributes, resolve_working_crs, Config, LayerConfig, LayerSource, WorkingCrsConfig,
    };

    const CONFIG: &str = r#"
data_dir: data
candidates:
  source: !Archive
    url: https://www2.census.gov/geo/tiger/TIGER2019/PRISECROADS/tl_2019_36_prisecroads.zip
  keep_attributes: [LINEARID, FULLNAME]
  rename_attributes:
    FULLNAME: name
targets:
  source: !Geofile
    filepath: data/parks.gpkg
working_crs: !Epsg
  code: 32118
crop:
  min_x: -74.05
  min_y: 40.68
  max_x: -73.90
  max_y: 40.88
  crs: EPSG:4326
lookup:
  csv_path: data/road_types.csv
  key_column: LINEARID
  key_attribute: LINEARID
output_name: roads_in_parks
"#;

    #[test]
    fn test_parse_config() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        assert_eq!(PathBuf::from("data"), config.data_dir);
        match &config.candidates.source {
            LayerSource::Archive { url, file_name } => {
                assert!(url.ends_with("tl_2019_36_prisecroads.zip"));
                assert!(file_name.is_none());
            }
            other => panic!("Unexpected source {:?}", other),
        }
        assert_eq!(
            Some(vec!["LINEARID".to_string(), "FULLNAME".to_string()]),
            config.candidates.keep_attributes
        );
        assert!(config.targets.keep_attributes.is_none());
        assert!(config.targets.rename_attributes.is_empty());
        assert_eq!(WorkingCrsConfig::Epsg { code: 32118 }, config.working_crs);
        let bbox = config.crop.unwrap().to_bounding_box().unwrap();
        assert_eq!(&epsg_4326(), bbox.crs());
        assert_eq!("LINEARID", config.lookup.unwrap().key_attribute);
        assert_eq!("roads_in_parks", config.output_name);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = serde_yaml::from_str(
            "data_dir: out\ncandidates:\n  source: !Geofile\n    filepath: a.shp\ntargets:\n  source: !Geofile\n    filepath: b.shp\nworking_crs: Utm\noutput_name: result\n",
        )
        .unwrap();
        assert_eq!(WorkingCrsConfig::Utm, config.working_crs);
        assert!(config.crop.is_none());
        assert!(config.lookup.is_none());
    }

    #[test]
    fn test_prepare_attributes() {
        let layer: LayerConfig = serde_yaml::from_str(
            "source: !Geofile\n  filepath: roads.shp\nkeep_attributes: [LINEARID, FULLNAME]\nrename_attributes:\n  FULLNAME: name\n",
        )
        .unwrap();
        let roads = FeatureCollection::new(
            epsg_4326(),
            vec![Feature::new(1, geo::LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]).into())
                .with_attribute("LINEARID", "110")
                .with_attribute("FULLNAME", "Main St")
                .with_attribute("RTTYP", "M")],
        );
        let prepared = prepare_attributes(&roads, &layer);
        assert_eq!(vec!["LINEARID", "name"], prepared.attribute_names());
    }

    #[test]
    fn test_resolve_working_crs() {
        let empty = FeatureCollection::empty(epsg_4326());
        assert_eq!(
            Crs::from_epsg(32147),
            resolve_working_crs(&WorkingCrsConfig::Epsg { code: 32147 }, &empty).unwrap()
        );
        assert!(resolve_working_crs(&WorkingCrsConfig::Utm, &empty).is_err());
    }
}
