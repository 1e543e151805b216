use anyhow::{anyhow, Context};
use std::{fs, path::Path};

use crate::crs::crs_utils::epsg_4326;

use super::{
    collection::FeatureCollection,
    feature::{AttributeValue, Feature},
};

fn to_json_value(value: &AttributeValue) -> serde_json::Value {
    match value {
        AttributeValue::String(value) => serde_json::Value::from(value.as_str()),
        AttributeValue::Integer(value) => serde_json::Value::from(*value),
        AttributeValue::Real(value) => serde_json::Value::from(*value),
        AttributeValue::Boolean(value) => serde_json::Value::from(*value),
    }
}

fn to_geojson_feature(feature: &Feature) -> geojson::Feature {
    let properties: serde_json::Map<String, serde_json::Value> = feature
        .attributes
        .iter()
        .map(|(key, value)| (key.clone(), to_json_value(value)))
        .collect();
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&feature.geometry))),
        id: Some(geojson::feature::Id::Number(feature.id.into())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Write a WGS84 collection as a GeoJSON FeatureCollection. GeoJSON carries no CRS, so other CRSes are
/// rejected instead of being written with coordinates readers would misplace.
pub fn write_collection_to_geojson(
    collection: &FeatureCollection,
    output_filepath: &Path,
) -> anyhow::Result<()> {
    if collection.crs() != &epsg_4326() {
        return Err(anyhow!(
            "GeoJSON coordinates must be in {}, the collection is in {}",
            epsg_4326(),
            collection.crs()
        ));
    }
    let feature_collection: geojson::FeatureCollection =
        collection.iter().map(to_geojson_feature).collect();
    let geojson_contents: geojson::GeoJson = geojson::GeoJson::from(feature_collection);
    fs::write(output_filepath, geojson_contents.to_string())
        .with_context(|| format!("Writing GeoJSON to {:?}", output_filepath))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use testdir::testdir;

    use crate::{
        crs::crs_utils::{epsg_4326, Crs},
        engine::{geo_engine::GeoEngine, GeometryEngine},
        geofile::{collection::FeatureCollection, feature::Feature},
    };

    use super::write_collection_to_geojson;

    #[test]
    fn test_write_collection_to_geojson() {
        let collection = FeatureCollection::new(
            epsg_4326(),
            vec![
                Feature::new(3, geo::LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]).into())
                    .with_attribute("intersectsTarget", true)
                    .with_attribute("name", "Main St"),
                Feature::new(4, geo::Point::new(2.0, 2.0).into())
                    .with_attribute("intersectsTarget", false)
                    .with_attribute("lanes", 2i64),
            ],
        );
        let test_dir = testdir!();
        let output_filepath = test_dir.join("labelled.geojson");
        write_collection_to_geojson(&collection, &output_filepath).unwrap();

        let contents = std::fs::read_to_string(&output_filepath).unwrap();
        let geojson: geojson::GeoJson = contents.parse().unwrap();
        let feature_collection = match geojson {
            geojson::GeoJson::FeatureCollection(feature_collection) => feature_collection,
            other => panic!("Expected a feature collection, got {:?}", other),
        };
        assert_eq!(2, feature_collection.features.len());
        let first = &feature_collection.features[0];
        assert_eq!(
            Some(&serde_json::Value::Bool(true)),
            first.property("intersectsTarget")
        );
        assert_eq!(
            Some(geojson::feature::Id::Number(3.into())),
            first.id.clone()
        );
        let second = &feature_collection.features[1];
        assert_eq!(Some(&serde_json::Value::from(2)), second.property("lanes"));
    }

    #[test]
    fn test_projected_collection_is_written_as_wgs84() {
        let projected = FeatureCollection::new(
            Crs::from_epsg(32654),
            vec![Feature::new(1, geo::Point::new(390467.986, 3949820.494).into())],
        );
        let test_dir = testdir!();
        let output_filepath = test_dir.join("tokyo.geojson");
        assert!(write_collection_to_geojson(&projected, &output_filepath).is_err());
        assert!(!output_filepath.exists());

        let wgs84 = GeoEngine.reproject(&projected, &epsg_4326()).unwrap();
        write_collection_to_geojson(&wgs84, &output_filepath).unwrap();
        let contents = std::fs::read_to_string(&output_filepath).unwrap();
        let feature_collection = match contents.parse::<geojson::GeoJson>().unwrap() {
            geojson::GeoJson::FeatureCollection(feature_collection) => feature_collection,
            other => panic!("Expected a feature collection, got {:?}", other),
        };
        let geometry = feature_collection.features[0].geometry.clone().unwrap();
        match geometry.value {
            geojson::Value::Point(position) => {
                assert_abs_diff_eq!(139.7895073, position[0], epsilon = 1e-6);
                assert_abs_diff_eq!(35.6862101, position[1], epsilon = 1e-6);
            }
            other => panic!("Expected a point, got {:?}", other),
        }
    }
}
