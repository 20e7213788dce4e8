mod distance;
mod gps;

pub use crate::distance::Distance;
pub use crate::gps::LonLat;

/// Reduce the precision of an f64, keeping serialization and Display output
/// stable across platforms.
pub fn trim_f64(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

pub(crate) fn serialize_f64<S: serde::Serializer>(x: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(*x)
}

pub(crate) fn deserialize_f64<'de, D: serde::Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    use serde::Deserialize;
    let x = f64::deserialize(d)?;
    Ok(trim_f64(x))
}
