use anyhow::{anyhow, Context};
use gdal::vector::{FieldValue, LayerAccess, OGRFieldType};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::{collections::BTreeMap, fs, path::Path};

use crate::crs::crs_utils::Crs;

use super::{
    collection::FeatureCollection,
    feature::{geometry_type_name, AttributeValue, Feature, FeatureMap},
};

pub enum GdalDriverType {
    GeoPackage,
    GeoJson,
}

impl GdalDriverType {
    pub fn name(&self) -> &'static str {
        match self {
            GdalDriverType::GeoPackage => "GPKG",
            GdalDriverType::GeoJson => "GeoJSON",
        }
    }
}

pub fn write_features_to_geofile(
    collection: &FeatureCollection,
    output_filepath: &Path,
    driver: GdalDriverType,
) -> anyhow::Result<()> {
    let driver =
        gdal::DriverManager::get_driver_by_name(driver.name()).context("Getting GDAL driver")?;

    if output_filepath.exists() {
        fs::remove_file(output_filepath)
            .with_context(|| format!("Removing previous output {:?}", output_filepath))?;
    }
    if collection.is_empty() {
        log::warn!("No features to write to {:?}", output_filepath);
        return Ok(());
    }
    let layer_type = layer_geometry_type(collection)?;

    let spatial_ref = collection.crs().to_spatial_ref()?;
    log::debug!("Using spatial ref {} for writing geofile", collection.crs());

    let layer_name = output_filepath
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("features");
    let mut dataset = driver.create_vector_only(output_filepath)?;
    let layer_options = gdal::LayerOptions {
        name: layer_name,
        srs: Some(&spatial_ref),
        ty: layer_type,
        options: None,
    };

    let mut layer = dataset.create_layer(layer_options)?;

    log::info!("Setting up fields");
    let field_types = get_field_types(collection);
    let field_definitions: Vec<(&str, OGRFieldType::Type)> = field_types
        .iter()
        .map(|(field_name, field_type)| (field_name as &str, *field_type))
        .collect();
    layer.create_defn_fields(&field_definitions)?;

    log::info!(
        "Writing {} features to {:?}",
        collection.len(),
        output_filepath
    );
    // Start a transaction in case the driver supports transactions, e.g. GeoPackage.
    // Committing all features once as opposed to per-feature is a massive speedup for these drivers.
    let in_transaction = unsafe { gdal_sys::OGR_L_StartTransaction(layer.c_layer()) }
        == gdal_sys::OGRErr::OGRERR_NONE;
    if !in_transaction {
        log::debug!("{} layers do not support transactions", driver.short_name());
    }
    let bar = ProgressBar::new(collection.len() as u64);
    let written = write_layer_features(&mut layer, collection, &field_types, &bar);
    bar.finish_and_clear();
    if in_transaction {
        match written {
            Ok(()) => {
                let result = unsafe { gdal_sys::OGR_L_CommitTransaction(layer.c_layer()) };
                if result != gdal_sys::OGRErr::OGRERR_NONE {
                    return Err(anyhow!(
                        "Committing features to {:?} failed with OGR error {}",
                        output_filepath,
                        result
                    ));
                }
            }
            Err(_) => {
                let result = unsafe { gdal_sys::OGR_L_RollbackTransaction(layer.c_layer()) };
                if result != gdal_sys::OGRErr::OGRERR_NONE {
                    log::error!(
                        "Rolling back {:?} failed with OGR error {}",
                        output_filepath,
                        result
                    );
                }
            }
        }
    }
    written
}

fn write_layer_features(
    layer: &mut gdal::vector::Layer<'_>,
    collection: &FeatureCollection,
    field_types: &BTreeMap<String, OGRFieldType::Type>,
    bar: &ProgressBar,
) -> anyhow::Result<()> {
    for feature in collection {
        let geometry = to_gdal_geometry(&feature.geometry)?;
        if feature.attributes.is_empty() {
            layer.create_feature(geometry)?;
        } else {
            let mut field_names = Vec::new();
            let mut values = Vec::new();
            for (key, value) in &feature.attributes {
                let field_type = field_types
                    .get(key)
                    .copied()
                    .unwrap_or(OGRFieldType::OFTString);
                field_names.push(key.as_str());
                values.push(to_field_value(value, field_type));
            }
            layer.create_feature_fields(geometry, &field_names, &values)?;
        }
        bar.inc(1);
    }
    Ok(())
}

/// Common geometry type of all features, or `wkbUnknown` for mixed layers.
fn layer_geometry_type(
    collection: &FeatureCollection,
) -> anyhow::Result<gdal::vector::OGRwkbGeometryType::Type> {
    use gdal::vector::OGRwkbGeometryType::*;
    let mut layer_type = None;
    for feature in collection {
        let feature_type = match &feature.geometry {
            geo::Geometry::Point(_) => wkbPoint,
            geo::Geometry::LineString(_) => wkbLineString,
            geo::Geometry::Polygon(_) => wkbPolygon,
            geo::Geometry::MultiPoint(_) => wkbMultiPoint,
            geo::Geometry::MultiLineString(_) => wkbMultiLineString,
            geo::Geometry::MultiPolygon(_) => wkbMultiPolygon,
            other => {
                return Err(anyhow!(
                    "Cannot write geometry type {} to file.",
                    geometry_type_name(other)
                ))
            }
        };
        layer_type = match layer_type {
            None => Some(feature_type),
            Some(current) if current == feature_type => Some(current),
            Some(_) => return Ok(wkbUnknown),
        };
    }
    Ok(layer_type.unwrap_or(wkbUnknown))
}

/// Field types for all attribute names. Integers widen to reals, anything else mixed becomes a string.
fn get_field_types(collection: &FeatureCollection) -> BTreeMap<String, OGRFieldType::Type> {
    collection
        .features()
        .par_iter()
        .flat_map_iter(|feature| {
            feature
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), field_type_of(value)))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .fold(BTreeMap::new(), |mut field_types, (name, field_type)| {
            field_types
                .entry(name)
                .and_modify(|current| *current = merge_field_types(*current, field_type))
                .or_insert(field_type);
            field_types
        })
}

fn field_type_of(value: &AttributeValue) -> OGRFieldType::Type {
    match value {
        AttributeValue::String(_) => OGRFieldType::OFTString,
        AttributeValue::Integer(_) | AttributeValue::Boolean(_) => OGRFieldType::OFTInteger64,
        AttributeValue::Real(_) => OGRFieldType::OFTReal,
    }
}

fn merge_field_types(a: OGRFieldType::Type, b: OGRFieldType::Type) -> OGRFieldType::Type {
    use OGRFieldType::*;
    match (a, b) {
        (a, b) if a == b => a,
        (OFTInteger64, OFTReal) | (OFTReal, OFTInteger64) => OFTReal,
        _ => OFTString,
    }
}

fn to_field_value(value: &AttributeValue, field_type: OGRFieldType::Type) -> FieldValue {
    match (value, field_type) {
        (AttributeValue::Integer(value), OGRFieldType::OFTReal) => {
            FieldValue::RealValue(*value as f64)
        }
        (AttributeValue::Boolean(value), OGRFieldType::OFTReal) => {
            FieldValue::RealValue(if *value { 1.0 } else { 0.0 })
        }
        (AttributeValue::Integer(value), OGRFieldType::OFTInteger64) => {
            FieldValue::Integer64Value(*value)
        }
        (AttributeValue::Boolean(value), OGRFieldType::OFTInteger64) => {
            FieldValue::Integer64Value(i64::from(*value))
        }
        (AttributeValue::Real(value), OGRFieldType::OFTReal) => FieldValue::RealValue(*value),
        (value, _) => FieldValue::StringValue(value.to_string()),
    }
}

fn to_attribute_value(value: FieldValue) -> AttributeValue {
    match value {
        FieldValue::IntegerValue(value) => AttributeValue::Integer(value.into()),
        FieldValue::Integer64Value(value) => AttributeValue::Integer(value),
        FieldValue::RealValue(value) => AttributeValue::Real(value),
        FieldValue::StringValue(value) => AttributeValue::String(value),
        other => AttributeValue::String(other.into_string().unwrap_or_default()),
    }
}

fn to_gdal_geometry(geometry: &geo::Geometry) -> anyhow::Result<gdal::vector::Geometry> {
    let wkb = wkb::geom_to_wkb(geometry)
        .map_err(|err| anyhow!("Could not write geometry to WKB, {:?}", err))?;
    Ok(gdal::vector::Geometry::from_wkb(&wkb)?)
}

/// Well-Known Text representation of a geometry.
pub fn geometry_to_wkt(geometry: &geo::Geometry) -> anyhow::Result<String> {
    Ok(to_gdal_geometry(geometry)?.wkt()?)
}

/// Read all features of a single-layer geofile, e.g. a shapefile or a GeoPackage.
pub fn read_features_from_geofile(filepath: &Path) -> anyhow::Result<FeatureCollection> {
    gdal::DriverManager::register_all();
    let mut open_options = gdal::DatasetOptions::default();
    open_options.open_flags = gdal::GdalOpenFlags::GDAL_OF_VECTOR;
    let dataset = gdal::Dataset::open_ex(filepath, open_options)
        .with_context(|| format!("Opening geofile {:?}", filepath))?;

    let layer_count = dataset.layer_count();
    if 0 == layer_count || 1 < layer_count {
        return Err(anyhow!(
            "Found {} layers, only one layer is supported.",
            layer_count
        ));
    }
    let mut layer = dataset.layer(0)?;
    let mut spatial_ref = layer
        .spatial_ref()
        .with_context(|| format!("Geofile {:?} has no spatial reference", filepath))?;
    // Shapefile .prj files carry a WKT definition without the authority code.
    if spatial_ref.auth_code().is_err() {
        spatial_ref.auto_identify_epsg()?;
    }
    let crs = Crs::try_from(&spatial_ref)?;

    let mut features = Vec::new();
    let mut num_without_geometry = 0;
    for (index, gdal_feature) in layer.features().enumerate() {
        let gdal_geometry = match gdal_feature.geometry_by_index(0) {
            Ok(gdal_geometry) if !unsafe { gdal_geometry.c_geometry() }.is_null() => gdal_geometry,
            _ => {
                num_without_geometry += 1;
                continue;
            }
        };
        let geometry = gdal_geometry.to_geo()?;
        let attributes: FeatureMap = gdal_feature
            .fields()
            .filter_map(|(name, value)| value.map(|value| (name, to_attribute_value(value))))
            .collect();
        features.push(Feature {
            id: gdal_feature.fid().unwrap_or(index as u64),
            geometry,
            attributes,
        });
    }
    if num_without_geometry > 0 {
        log::warn!(
            "Skipped {} features without geometry in {:?}",
            num_without_geometry,
            filepath
        );
    }
    Ok(FeatureCollection::new(crs, features))
}
