pub mod attribute;
pub mod lookup;
pub mod spatial;
