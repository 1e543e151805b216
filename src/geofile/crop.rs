use anyhow::anyhow;
use geo::{
    BooleanOps, BoundingRect, Geometry, Intersects, MultiLineString, MultiPoint, MultiPolygon,
};

use super::{
    bbox::BoundingBox,
    collection::FeatureCollection,
    feature::{geometry_type_name, Feature},
};

impl FeatureCollection {
    /// Clip every geometry to the bounding box. Features with nothing left inside the box are dropped.
    pub fn crop(&self, bbox: &BoundingBox) -> anyhow::Result<FeatureCollection> {
        if bbox.crs() != self.crs() {
            return Err(anyhow!(
                "Cannot crop a collection in {} with a bounding box in {}",
                self.crs(),
                bbox.crs()
            ));
        }
        let rect = bbox.to_rect();
        let mut features: Vec<Feature> = Vec::new();
        for feature in self.iter() {
            let cropped = crop_geometry(&feature.geometry, &rect)
                .map_err(|err| anyhow!("Could not crop feature {}, {}", feature.id, err))?;
            if let Some(geometry) = cropped {
                features.push(feature.with_geometry(geometry));
            }
        }
        log::debug!(
            "Cropping kept {} of {} features",
            features.len(),
            self.len()
        );
        Ok(FeatureCollection::new(self.crs().clone(), features))
    }
}

/// Clip a geometry to a rectangle. Returns `None` if no part of the geometry lies inside it.
pub fn crop_geometry(geometry: &Geometry, rect: &geo::Rect) -> anyhow::Result<Option<Geometry>> {
    match geometry.bounding_rect() {
        Some(bounds) if bounds.intersects(rect) => {}
        _ => return Ok(None),
    }
    let clip_polygon = rect.to_polygon();
    let cropped = match geometry {
        Geometry::Point(point) => rect.intersects(point).then(|| Geometry::Point(*point)),
        Geometry::MultiPoint(points) => {
            let kept: Vec<geo::Point> = points
                .iter()
                .filter(|point| rect.intersects(*point))
                .copied()
                .collect();
            match kept.len() {
                0 => None,
                1 => Some(Geometry::Point(kept[0])),
                _ => Some(Geometry::MultiPoint(MultiPoint::new(kept))),
            }
        }
        Geometry::LineString(line) => collapse_lines(
            clip_polygon.clip(&MultiLineString::new(vec![line.clone()]), false),
        ),
        Geometry::MultiLineString(lines) => collapse_lines(clip_polygon.clip(lines, false)),
        Geometry::Polygon(polygon) => collapse_polygons(polygon.intersection(&clip_polygon)),
        Geometry::MultiPolygon(polygons) => {
            collapse_polygons(polygons.intersection(&MultiPolygon::new(vec![clip_polygon])))
        }
        other => {
            return Err(anyhow!(
                "Cannot crop geometry type {}",
                geometry_type_name(other)
            ))
        }
    };
    Ok(cropped)
}

fn collapse_lines(lines: MultiLineString) -> Option<Geometry> {
    let mut parts: Vec<geo::LineString> = lines
        .0
        .into_iter()
        .filter(|line| line.0.len() > 1)
        .collect();
    match parts.len() {
        0 => None,
        1 => parts.pop().map(Geometry::LineString),
        _ => Some(Geometry::MultiLineString(MultiLineString::new(parts))),
    }
}

fn collapse_polygons(polygons: MultiPolygon) -> Option<Geometry> {
    let mut parts: Vec<geo::Polygon> = polygons
        .0
        .into_iter()
        .filter(|polygon| !polygon.exterior().0.is_empty())
        .collect();
    match parts.len() {
        0 => None,
        1 => parts.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon::new(parts))),
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use geo::{Area, Geometry};

    use crate::{
        crs::crs_utils::{epsg_4326, Crs},
        geofile::{bbox::BoundingBox, collection::FeatureCollection, feature::Feature},
    };

    use super::crop_geometry;

    fn unit_box() -> geo::Rect {
        geo::Rect::new(geo::coord! { x: 0.0, y: 0.0 }, geo::coord! { x: 1.0, y: 1.0 })
    }

    #[test]
    fn test_crop_polygon_keeps_overlap() {
        let polygon = geo::Rect::new(geo::coord! { x: 0.5, y: 0.5 }, geo::coord! { x: 2.0, y: 2.0 })
            .to_polygon();
        let cropped = crop_geometry(&polygon.into(), &unit_box()).unwrap().unwrap();
        match cropped {
            Geometry::Polygon(polygon) => {
                assert_relative_eq!(0.25, polygon.unsigned_area(), epsilon = 1e-9)
            }
            other => panic!("Expected a polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_crop_line_clips_to_box() {
        let line = geo::LineString::from(vec![(-1.0, 0.5), (2.0, 0.5)]);
        let cropped = crop_geometry(&line.into(), &unit_box()).unwrap().unwrap();
        match cropped {
            Geometry::LineString(line) => {
                let xs: Vec<f64> = line.coords().map(|coord| coord.x).collect();
                assert_relative_eq!(0.0, xs.iter().cloned().fold(f64::INFINITY, f64::min));
                assert_relative_eq!(1.0, xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max));
            }
            other => panic!("Expected a line string, got {:?}", other),
        }
    }

    #[test]
    fn test_crop_drops_outside_geometries() {
        let point: Geometry = geo::Point::new(5.0, 5.0).into();
        assert!(crop_geometry(&point, &unit_box()).unwrap().is_none());
        let line: Geometry = geo::LineString::from(vec![(3.0, 3.0), (4.0, 4.0)]).into();
        assert!(crop_geometry(&line, &unit_box()).unwrap().is_none());
    }

    #[test]
    fn test_crop_multipoint_keeps_inside_points() {
        let points: Geometry =
            geo::MultiPoint::from(vec![(0.5, 0.5), (3.0, 3.0), (0.25, 0.75)]).into();
        match crop_geometry(&points, &unit_box()).unwrap().unwrap() {
            Geometry::MultiPoint(points) => assert_eq!(2, points.0.len()),
            other => panic!("Expected a multipoint, got {:?}", other),
        }
    }

    #[test]
    fn test_crop_collection() {
        let collection = FeatureCollection::new(
            epsg_4326(),
            vec![
                Feature::new(1, geo::Point::new(0.5, 0.5).into()).with_attribute("name", "inside"),
                Feature::new(2, geo::Point::new(9.0, 9.0).into()).with_attribute("name", "outside"),
            ],
        );
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0, epsg_4326()).unwrap();
        let cropped = collection.crop(&bbox).unwrap();
        assert_eq!(1, cropped.len());
        assert_eq!(1, cropped.features()[0].id);
        assert_eq!(2, collection.len());
    }

    #[test]
    fn test_crop_rejects_other_crs() {
        let collection = FeatureCollection::empty(epsg_4326());
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0, Crs::from_epsg(32147)).unwrap();
        assert!(collection.crop(&bbox).is_err());
    }
}
