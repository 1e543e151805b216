pub mod bbox;
pub mod collection;
pub mod crop;
pub mod feature;
pub mod gdal_geofile;
pub mod geojson;
