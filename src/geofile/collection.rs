use std::collections::BTreeSet;

use geo::BoundingRect;

use crate::crs::crs_utils::Crs;

use super::{
    bbox::BoundingBox,
    feature::{Feature, FeatureMap},
};

/// Ordered features sharing one CRS.
///
/// A collection is never modified in place. Every operation returns a new collection, so each step of a
/// pipeline can be held under its own name.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection {
    crs: Crs,
    features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(crs: Crs, features: Vec<Feature>) -> Self {
        Self { crs, features }
    }

    pub fn empty(crs: Crs) -> Self {
        Self::new(crs, Vec::new())
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn into_features(self) -> Vec<Feature> {
        self.features
    }

    /// Sorted union of the attribute names of all features.
    pub fn attribute_names(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self
            .features
            .iter()
            .flat_map(|feature| feature.attributes.keys())
            .collect();
        names.into_iter().cloned().collect()
    }

    /// Bounding box of all geometries, `None` if there are no non-empty geometries.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.features
            .iter()
            .filter_map(|feature| feature.geometry.bounding_rect())
            .reduce(|acc, rect| {
                geo::Rect::new(
                    geo::coord! {
                        x: acc.min().x.min(rect.min().x),
                        y: acc.min().y.min(rect.min().y),
                    },
                    geo::coord! {
                        x: acc.max().x.max(rect.max().x),
                        y: acc.max().y.max(rect.max().y),
                    },
                )
            })
            .map(|rect| BoundingBox::from_rect(rect, self.crs.clone()))
    }

    /// Keep only the named attributes.
    pub fn select_attributes<S: AsRef<str>>(&self, names: &[S]) -> FeatureCollection {
        let known = self.attribute_names();
        for name in names {
            if !known.iter().any(|known_name| known_name == name.as_ref()) {
                log::warn!("Attribute '{}' does not exist and cannot be selected", name.as_ref());
            }
        }
        let features = self
            .features
            .iter()
            .map(|feature| {
                let attributes: FeatureMap = feature
                    .attributes
                    .iter()
                    .filter(|(key, _)| names.iter().any(|name| name.as_ref() == key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                Feature {
                    id: feature.id,
                    geometry: feature.geometry.clone(),
                    attributes,
                }
            })
            .collect();
        FeatureCollection::new(self.crs.clone(), features)
    }

    /// Rename an attribute on every feature. A value already stored under `to` is replaced.
    pub fn rename_attribute(&self, from: &str, to: &str) -> FeatureCollection {
        let features = self
            .features
            .iter()
            .map(|feature| {
                let mut renamed = feature.clone();
                if let Some(value) = renamed.attributes.remove(from) {
                    renamed.attributes.insert(to.to_string(), value);
                }
                renamed
            })
            .collect();
        FeatureCollection::new(self.crs.clone(), features)
    }

    pub fn filter<P>(&self, predicate: P) -> FeatureCollection
    where
        P: Fn(&Feature) -> bool,
    {
        let features = self
            .features
            .iter()
            .filter(|feature| predicate(feature))
            .cloned()
            .collect();
        FeatureCollection::new(self.crs.clone(), features)
    }
}

impl<'a> IntoIterator for &'a FeatureCollection {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use crate::{
        crs::crs_utils::epsg_4326,
        geofile::feature::{AttributeValue, Feature},
    };

    use super::FeatureCollection;

    #[fixture]
    fn roads() -> FeatureCollection {
        FeatureCollection::new(
            epsg_4326(),
            vec![
                Feature::new(1, geo::LineString::from(vec![(0.0, 0.0), (2.0, 1.0)]).into())
                    .with_attribute("LINEARID", "110")
                    .with_attribute("FULLNAME", "Main St")
                    .with_attribute("MTFCC", "S1400"),
                Feature::new(2, geo::LineString::from(vec![(-1.0, 3.0), (1.0, 4.0)]).into())
                    .with_attribute("LINEARID", "111")
                    .with_attribute("FULLNAME", "Oak Ave"),
            ],
        )
    }

    #[rstest]
    fn test_attribute_names(roads: FeatureCollection) {
        assert_eq!(vec!["FULLNAME", "LINEARID", "MTFCC"], roads.attribute_names());
    }

    #[rstest]
    fn test_select_attributes(roads: FeatureCollection) {
        let selected = roads.select_attributes(&["LINEARID", "MISSING"]);
        assert_eq!(roads.len(), selected.len());
        assert_eq!(vec!["LINEARID"], selected.attribute_names());
        assert_eq!(roads.features()[0].geometry, selected.features()[0].geometry);
        // The source collection is left untouched.
        assert_eq!(3, roads.attribute_names().len());
    }

    #[rstest]
    fn test_rename_attribute(roads: FeatureCollection) {
        let renamed = roads.rename_attribute("FULLNAME", "name");
        assert_eq!(
            Some(&AttributeValue::from("Oak Ave")),
            renamed.features()[1].attribute("name")
        );
        assert!(renamed.features()[1].attribute("FULLNAME").is_none());
    }

    #[rstest]
    fn test_filter(roads: FeatureCollection) {
        let filtered = roads.filter(|feature| feature.attribute("MTFCC").is_some());
        assert_eq!(1, filtered.len());
        assert_eq!(1, filtered.features()[0].id);
        assert_eq!(roads.crs(), filtered.crs());
    }

    #[rstest]
    fn test_bounding_box(roads: FeatureCollection) {
        let bbox = roads.bounding_box().unwrap();
        assert_eq!((-1.0, 0.0, 2.0, 4.0), (bbox.min_x(), bbox.min_y(), bbox.max_x(), bbox.max_y()));
        assert!(FeatureCollection::empty(epsg_4326()).bounding_box().is_none());
    }
}
