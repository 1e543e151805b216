use geo::Intersects;

use crate::{
    crs::{crs_utils::Crs, projection::reproject_collection},
    geofile::collection::FeatureCollection,
};

use super::GeometryEngine;

/// Geometry engine backed by the `geo` predicates and PROJ.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoEngine;

impl GeometryEngine for GeoEngine {
    fn intersects(&self, a: &geo::Geometry, b: &geo::Geometry) -> bool {
        a.intersects(b)
    }

    fn reproject(
        &self,
        collection: &FeatureCollection,
        to_crs: &Crs,
    ) -> anyhow::Result<FeatureCollection> {
        reproject_collection(collection, to_crs)
    }
}
