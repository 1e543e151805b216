use anyhow::anyhow;
use geo::CoordsIter;
use proj::Transform;

use crate::geofile::{bbox::BoundingBox, collection::FeatureCollection, feature::Feature};

use super::crs_utils::{query_utm_crs_info, Crs};

/// Project all features into `to_crs`. Either every feature is projected or an error is returned.
pub fn reproject_collection(
    collection: &FeatureCollection,
    to_crs: &Crs,
) -> anyhow::Result<FeatureCollection> {
    if collection.crs() == to_crs {
        return Ok(collection.clone());
    }
    let projection = proj::Proj::new_known_crs(
        &collection.crs().to_string(),
        &to_crs.to_string(),
        None,
    )?;
    let features: anyhow::Result<Vec<Feature>> = collection
        .iter()
        .map(|feature| {
            let geometry = feature
                .geometry
                .transformed(&projection)
                .map_err(|err| anyhow!("Could not project feature {}, {}", feature.id, err))?;
            Ok(feature.with_geometry(geometry))
        })
        .collect();
    Ok(FeatureCollection::new(to_crs.clone(), features?))
}

/// Project a bounding box by its four corners. The result encloses the projected corners.
pub fn reproject_bounding_box(bbox: &BoundingBox, to_crs: &Crs) -> anyhow::Result<BoundingBox> {
    if bbox.crs() == to_crs {
        return Ok(bbox.clone());
    }
    let projection =
        proj::Proj::new_known_crs(&bbox.crs().to_string(), &to_crs.to_string(), None)?;
    let corners = bbox
        .corners()
        .into_iter()
        .map(|corner| projection.convert(corner))
        .collect::<Result<Vec<(f64, f64)>, _>>()
        .map_err(|err| anyhow!("Could not project bounding box, {}", err))?;
    let min_x = corners.iter().map(|(x, _)| *x).fold(f64::INFINITY, f64::min);
    let min_y = corners.iter().map(|(_, y)| *y).fold(f64::INFINITY, f64::min);
    let max_x = corners.iter().map(|(x, _)| *x).fold(f64::NEG_INFINITY, f64::max);
    let max_y = corners.iter().map(|(_, y)| *y).fold(f64::NEG_INFINITY, f64::max);
    BoundingBox::new(min_x, min_y, max_x, max_y, to_crs.clone())
}

/// WGS84 UTM zone containing the first coordinate of the collection.
pub fn utm_crs_for_collection(collection: &FeatureCollection) -> anyhow::Result<Crs> {
    if !collection.crs().is_geographic()? {
        return Err(anyhow!(
            "The collection is not in a geographic CRS ({}).",
            collection.crs()
        ));
    }
    let coord = collection
        .iter()
        .find_map(|feature| feature.geometry.coords_iter().next())
        .ok_or_else(|| {
            anyhow!("Could not determine UTM zone for a collection without coordinates")
        })?;
    let utm_zone_codes = query_utm_crs_info(coord.x, coord.y, Some("WGS84"))?;
    let utm_zone_code = utm_zone_codes
        .first()
        .ok_or_else(|| anyhow!("No UTM zones found at ({}, {})", coord.x, coord.y))?;
    Ok(Crs::from_epsg(*utm_zone_code))
}
