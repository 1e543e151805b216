use std::fmt;

use geo::BoundingRect;
use rayon::prelude::*;
use rstar::{
    primitives::{GeomWithData, Rectangle},
    RTree, AABB,
};
use thiserror::Error;

use crate::{
    crs::crs_utils::Crs,
    engine::{validation::polygon_ring_defect, validation::RingDefect, GeometryEngine},
    geofile::{
        collection::FeatureCollection,
        feature::{AttributeValue, Feature, FeatureId},
    },
};

/// Name of the boolean attribute set by [`spatial_predicate_join`].
pub const INTERSECTS_TARGET: &str = "intersectsTarget";

/// Inputs the spatial join refuses to work with.
#[derive(Error, Debug)]
pub enum InvalidInputError {
    #[error("CRS mismatch between candidates ({candidates}) and targets ({targets})")]
    CrsMismatch { candidates: Crs, targets: Crs },
    #[error(
        "{role} feature {feature_id} has a malformed geometry in polygon {polygon_index}, ring {ring_index}: {defect}"
    )]
    MalformedGeometry {
        role: &'static str,
        feature_id: FeatureId,
        polygon_index: usize,
        ring_index: usize,
        defect: RingDefect,
    },
}

/// Conditions the join proceeds through but reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinWarning {
    EmptyTargets,
}

impl fmt::Display for JoinWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinWarning::EmptyTargets => {
                write!(f, "The target collection is empty, no candidate can intersect it")
            }
        }
    }
}

type TargetEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

fn rect_to_aabb(rect: &geo::Rect) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// Targets indexed by their bounding boxes.
struct TargetIndex<'a> {
    targets: &'a [Feature],
    rtree: RTree<TargetEnvelope>,
}

impl<'a> TargetIndex<'a> {
    fn new(targets: &'a [Feature]) -> Self {
        let envelopes = targets
            .iter()
            .enumerate()
            .filter_map(|(index, target)| {
                target.geometry.bounding_rect().map(|rect| {
                    TargetEnvelope::new(
                        Rectangle::from_corners(
                            [rect.min().x, rect.min().y],
                            [rect.max().x, rect.max().y],
                        ),
                        index,
                    )
                })
            })
            .collect();
        Self {
            targets,
            rtree: RTree::bulk_load(envelopes),
        }
    }

    /// Whether the geometry intersects any indexed target.
    fn intersects_any<E: GeometryEngine + ?Sized>(
        &self,
        geometry: &geo::Geometry,
        engine: &E,
    ) -> bool {
        let Some(rect) = geometry.bounding_rect() else {
            return false;
        };
        self.rtree
            .locate_in_envelope_intersecting(&rect_to_aabb(&rect))
            .any(|envelope| engine.intersects(geometry, &self.targets[envelope.data].geometry))
    }
}

fn validate_rings(
    collection: &FeatureCollection,
    role: &'static str,
) -> Result<(), InvalidInputError> {
    let defect = collection.features().par_iter().find_map_first(|feature| {
        polygon_ring_defect(&feature.geometry).map(|(polygon_index, ring_index, defect)| {
            (feature.id, polygon_index, ring_index, defect)
        })
    });
    match defect {
        Some((feature_id, polygon_index, ring_index, defect)) => {
            Err(InvalidInputError::MalformedGeometry {
                role,
                feature_id,
                polygon_index,
                ring_index,
                defect,
            })
        }
        None => Ok(()),
    }
}

/// Label every candidate with whether it intersects the union of the targets.
///
/// The result holds the candidates in their original order, each with the boolean attribute
/// [`INTERSECTS_TARGET`] set. A previous value of that attribute is replaced. Geometries that only
/// touch a target, e.g. at a shared vertex, count as intersecting.
///
/// Fails without looking at any geometry if the two collections are in different CRSes, and fails if a
/// polygon of either collection has a ring that is not simple and closed.
pub fn spatial_predicate_join<E: GeometryEngine + ?Sized>(
    candidates: &FeatureCollection,
    targets: &FeatureCollection,
    engine: &E,
) -> Result<FeatureCollection, InvalidInputError> {
    if candidates.crs() != targets.crs() {
        return Err(InvalidInputError::CrsMismatch {
            candidates: candidates.crs().clone(),
            targets: targets.crs().clone(),
        });
    }
    validate_rings(candidates, "Candidate")?;
    validate_rings(targets, "Target")?;
    if targets.is_empty() {
        log::warn!("{}", JoinWarning::EmptyTargets);
    }

    let index = TargetIndex::new(targets.features());
    let labelled: Vec<Feature> = candidates
        .features()
        .par_iter()
        .map(|candidate| {
            let intersects = index.intersects_any(&candidate.geometry, engine);
            candidate.clone().with_attribute(INTERSECTS_TARGET, intersects)
        })
        .collect();

    let num_intersecting = labelled
        .iter()
        .filter(|feature| {
            feature.attribute(INTERSECTS_TARGET) == Some(&AttributeValue::Boolean(true))
        })
        .count();
    log::info!(
        "{} of {} candidates intersect the {} targets",
        num_intersecting,
        labelled.len(),
        targets.len()
    );
    Ok(FeatureCollection::new(candidates.crs().clone(), labelled))
}
