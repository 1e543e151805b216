use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use rstar::{
    primitives::{GeomWithData, Rectangle},
    RTree, AABB,
};
use thiserror::Error;

/// Why a polygon ring is not a simple closed ring.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RingDefect {
    #[error("ring is not closed")]
    NotClosed,
    #[error("ring has only {0} distinct vertices")]
    TooFewVertices(usize),
    #[error("ring segments {first} and {second} intersect")]
    SelfIntersection { first: usize, second: usize },
}

type SegmentEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

fn segment_envelope(segment: &geo::Line, index: usize) -> SegmentEnvelope {
    SegmentEnvelope::new(
        Rectangle::from_corners(
            [segment.start.x, segment.start.y],
            [segment.end.x, segment.end.y],
        ),
        index,
    )
}

/// Check that a ring is closed and does not touch or cross itself.
///
/// Consecutive duplicate vertices are ignored.
pub fn check_simple_ring(ring: &geo::LineString) -> Result<(), RingDefect> {
    if !ring.is_closed() {
        return Err(RingDefect::NotClosed);
    }
    let mut coords = ring.0.clone();
    coords.dedup();
    // A closed ring repeats its first vertex at the end.
    let num_distinct = coords.len().saturating_sub(1);
    if num_distinct < 3 {
        return Err(RingDefect::TooFewVertices(num_distinct));
    }

    let segments: Vec<geo::Line> = coords
        .windows(2)
        .map(|pair| geo::Line::new(pair[0], pair[1]))
        .collect();
    let num_segments = segments.len();
    let rtree = RTree::bulk_load(
        segments
            .iter()
            .enumerate()
            .map(|(index, segment)| segment_envelope(segment, index))
            .collect(),
    );

    for (first, segment) in segments.iter().enumerate() {
        let envelope = AABB::from_corners(
            [segment.start.x, segment.start.y],
            [segment.end.x, segment.end.y],
        );
        for neighbour in rtree.locate_in_envelope_intersecting(&envelope) {
            let second = neighbour.data;
            if second <= first {
                continue;
            }
            let adjacent = second == first + 1 || (first == 0 && second == num_segments - 1);
            let defect = match line_intersection(*segment, segments[second]) {
                None => false,
                // Adjacent segments meet at their shared vertex, anything more is an overlap.
                Some(LineIntersection::SinglePoint { .. }) => !adjacent,
                Some(LineIntersection::Collinear { intersection }) => {
                    !adjacent || intersection.start != intersection.end
                }
            };
            if defect {
                return Err(RingDefect::SelfIntersection { first, second });
            }
        }
    }
    Ok(())
}

/// First ring defect of a polygonal geometry, along with the index of the polygon and ring
/// (0 is the exterior). Non-polygonal geometries have no rings and pass.
pub fn polygon_ring_defect(geometry: &geo::Geometry) -> Option<(usize, usize, RingDefect)> {
    let polygons: Vec<&geo::Polygon> = match geometry {
        geo::Geometry::Polygon(polygon) => vec![polygon],
        geo::Geometry::MultiPolygon(polygons) => polygons.0.iter().collect(),
        _ => return None,
    };
    polygons
        .into_iter()
        .enumerate()
        .filter(|(_, polygon)| !polygon.exterior().0.is_empty())
        .find_map(|(polygon_index, polygon)| {
            std::iter::once(polygon.exterior())
                .chain(polygon.interiors().iter())
                .enumerate()
                .find_map(|(ring_index, ring)| {
                    check_simple_ring(ring)
                        .err()
                        .map(|defect| (polygon_index, ring_index, defect))
                })
        })
}
