//! GPS coordinates from the extractor's degrees/minutes/seconds strings.
//!
//! The composite `GPSPosition` tag is preferred:
//!
//! ```text
//! 47 deg 37' 23.06" N, 122 deg 20' 59.08" W
//! ```
//!
//! When it is absent or malformed, the four separate EXIF tags are used
//! (`GPSLatitude`, `GPSLatitudeRef`, `GPSLongitude`, `GPSLongitudeRef`). A
//! location is all-or-nothing: a partial set of tags yields no location and a
//! single warning.

use super::decode;
use super::raw::{FieldValue, RawMetadata};
use crate::types::GeoPoint;

/// Convert `"47 deg 37' 23.06\""` to decimal degrees.
pub fn dms_to_decimal(dms: &str) -> Result<f64, String> {
    let tokens: Vec<&str> = dms.split_whitespace().collect();
    let [degrees, "deg", minutes, seconds] = tokens.as_slice() else {
        return Err(format!("Unexpected coordinate format ({dms})"));
    };
    let degrees = degrees
        .parse::<f64>()
        .map_err(|_| format!("Invalid degrees in {dms}"))?;
    let minutes = minutes
        .trim_end_matches('\'')
        .parse::<f64>()
        .map_err(|_| format!("Invalid minutes in {dms}"))?;
    let seconds = seconds
        .trim_end_matches('"')
        .parse::<f64>()
        .map_err(|_| format!("Invalid seconds in {dms}"))?;
    Ok(degrees + minutes / 60.0 + seconds / 3600.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hemisphere {
    Positive,
    Negative,
}

fn hemisphere(reference: &str, positive: &[&str], negative: &[&str]) -> Option<Hemisphere> {
    let matches = |names: &[&str]| names.iter().any(|n| n.eq_ignore_ascii_case(reference.trim()));
    if matches(positive) {
        Some(Hemisphere::Positive)
    } else if matches(negative) {
        Some(Hemisphere::Negative)
    } else {
        None
    }
}

fn signed(dms: &str, reference: Hemisphere) -> Result<f64, String> {
    let value = dms_to_decimal(dms)?;
    Ok(match reference {
        Hemisphere::Positive => value,
        Hemisphere::Negative => -value,
    })
}

/// Build a point from its four parts, validating hemispheres and ranges.
pub fn from_parts(
    latitude: &str,
    latitude_ref: &str,
    longitude: &str,
    longitude_ref: &str,
) -> Result<GeoPoint, String> {
    let lat_ref = hemisphere(latitude_ref, &["N", "North"], &["S", "South"])
        .ok_or_else(|| format!("Invalid latitude reference ({latitude_ref})"))?;
    let lon_ref = hemisphere(longitude_ref, &["E", "East"], &["W", "West"])
        .ok_or_else(|| format!("Invalid longitude reference ({longitude_ref})"))?;

    let point = GeoPoint {
        latitude: signed(latitude, lat_ref)?,
        longitude: signed(longitude, lon_ref)?,
    };
    if !(-90.0..=90.0).contains(&point.latitude) || !(-180.0..=180.0).contains(&point.longitude) {
        return Err(format!(
            "Ignoring out of range location: {}, {}",
            point.latitude, point.longitude
        ));
    }
    Ok(point)
}

/// Parse the composite `GPSPosition` form.
pub fn parse_position(position: &str) -> Result<GeoPoint, String> {
    let halves: Vec<&str> = position.split(',').collect();
    let [latitude, longitude] = halves.as_slice() else {
        return Err(format!("Unsupported GPSPosition format ({position})"));
    };
    let (lat, lat_ref) = split_hemisphere(latitude)
        .ok_or_else(|| format!("Unsupported GPSPosition latitude ({latitude})"))?;
    let (lon, lon_ref) = split_hemisphere(longitude)
        .ok_or_else(|| format!("Unsupported GPSPosition longitude ({longitude})"))?;
    from_parts(&lat, lat_ref, &lon, lon_ref)
}

/// `47 deg 37' 23.06" N` → (`47 deg 37' 23.06"`, `N`)
fn split_hemisphere(part: &str) -> Option<(String, &str)> {
    let tokens: Vec<&str> = part.split_whitespace().collect();
    match tokens.as_slice() {
        [d, deg, m, s, reference] => Some((format!("{d} {deg} {m} {s}"), *reference)),
        _ => None,
    }
}

fn text_or_warn(field: &str, value: Option<&FieldValue>, warnings: &mut Vec<String>) -> Option<String> {
    decode::text(field, value).unwrap_or_else(|w| {
        warnings.push(w.to_string());
        None
    })
}

/// Resolve the location of a file, adding at most one warning per source.
pub fn resolve_location(raw: &RawMetadata, warnings: &mut Vec<String>) -> Option<GeoPoint> {
    if let Some(position) = text_or_warn("GPSPosition", raw.composite.gps_position.as_ref(), warnings) {
        match parse_position(&position) {
            Ok(point) => return Some(point),
            Err(message) => warnings.push(message),
        }
    }

    let exif = &raw.exif;
    let parts = [
        text_or_warn("GPSLatitude", exif.gps_latitude.as_ref(), warnings),
        text_or_warn("GPSLatitudeRef", exif.gps_latitude_ref.as_ref(), warnings),
        text_or_warn("GPSLongitude", exif.gps_longitude.as_ref(), warnings),
        text_or_warn("GPSLongitudeRef", exif.gps_longitude_ref.as_ref(), warnings),
    ];
    match parts {
        [None, None, None, None] => None,
        [Some(lat), Some(lat_ref), Some(lon), Some(lon_ref)] => {
            match from_parts(&lat, &lat_ref, &lon, &lon_ref) {
                Ok(point) => Some(point),
                Err(message) => {
                    warnings.push(message);
                    None
                }
            }
        }
        [lat, lat_ref, lon, lon_ref] => {
            let show = |v: &Option<String>| v.clone().unwrap_or_default();
            warnings.push(format!(
                "Ignoring poorly formed location: lat={} {}, lon={} {}",
                show(&lat),
                show(&lat_ref),
                show(&lon),
                show(&lon_ref)
            ));
            None
        }
    }
}
