use crate::{crs::crs_utils::Crs, geofile::collection::FeatureCollection};

pub mod geo_engine;
pub mod validation;

/// The spatial algebra the joins and the pipeline rely on.
pub trait GeometryEngine: Sync {
    /// Whether the two geometries share at least one point. Touching boundaries count.
    fn intersects(&self, a: &geo::Geometry, b: &geo::Geometry) -> bool;

    /// Transform every geometry of the collection into `to_crs`. Fails as a whole if any feature fails.
    fn reproject(
        &self,
        collection: &FeatureCollection,
        to_crs: &Crs,
    ) -> anyhow::Result<FeatureCollection>;
}
