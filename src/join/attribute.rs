use crate::geofile::{collection::FeatureCollection, feature::Feature};

use super::lookup::LookupTable;

/// Left join of lookup rows onto the features, matching the text of `key_attribute` against the table keys.
///
/// Geometries, ids, order and CRS are kept, so the result is again a spatial collection. Attributes the
/// feature already has are never overwritten by the lookup row.
pub fn join_attributes(
    collection: &FeatureCollection,
    table: &LookupTable,
    key_attribute: &str,
) -> FeatureCollection {
    let mut num_unmatched = 0;
    let features: Vec<Feature> = collection
        .iter()
        .map(|feature| {
            let row = feature
                .attribute(key_attribute)
                .and_then(|key| table.get(key.to_string().trim()));
            let mut joined = feature.clone();
            match row {
                Some(row) => {
                    for (name, value) in row {
                        joined
                            .attributes
                            .entry(name.clone())
                            .or_insert_with(|| value.clone());
                    }
                }
                None => num_unmatched += 1,
            }
            joined
        })
        .collect();
    if num_unmatched > 0 {
        log::warn!(
            "{} of {} features have no '{}' match in column '{}' of the lookup table",
            num_unmatched,
            collection.len(),
            key_attribute,
            table.key_column()
        );
    }
    FeatureCollection::new(collection.crs().clone(), features)
}
