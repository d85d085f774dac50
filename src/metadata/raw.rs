//! The metadata extractor's output, decoded without losing its loose typing.
//!
//! ExifTool reports the same tag as an integer for one camera, a float for
//! another and a string for a third. Every tag the normalizer cares about is
//! therefore captured as a [`FieldValue`], and the normalizer decides per tag
//! which shapes it accepts.

use serde::Deserialize;

/// A single tag value, as produced by the extractor.
///
/// Variant order matters for `untagged` decoding: integers must be tried
/// before floats so `400` stays an integer, while `400.0` falls through to
/// [`FieldValue::Float`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
    Other(serde_json::Value),
}

impl FieldValue {
    /// Short name of the shape, for warnings.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "string",
            FieldValue::List(_) => "array",
            FieldValue::Other(_) => "object",
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Text(s) => write!(f, "{s:?}"),
            FieldValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            FieldValue::Other(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileGroup {
    #[serde(rename = "MIMEType")]
    pub mime_type: Option<FieldValue>,
    #[serde(rename = "ImageWidth")]
    pub image_width: Option<FieldValue>,
    #[serde(rename = "ImageHeight")]
    pub image_height: Option<FieldValue>,
    #[serde(rename = "FileModifyDate")]
    pub file_modify_date: Option<FieldValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExifGroup {
    #[serde(rename = "Make")]
    pub make: Option<FieldValue>,
    #[serde(rename = "Model")]
    pub model: Option<FieldValue>,
    #[serde(rename = "LensInfo")]
    pub lens_info: Option<FieldValue>,
    #[serde(rename = "LensModel")]
    pub lens_model: Option<FieldValue>,
    #[serde(rename = "ApertureValue")]
    pub aperture_value: Option<FieldValue>,
    #[serde(rename = "ExposureProgram")]
    pub exposure_program: Option<FieldValue>,
    #[serde(rename = "ExposureTime")]
    pub exposure_time: Option<FieldValue>,
    #[serde(rename = "Flash")]
    pub flash: Option<FieldValue>,
    #[serde(rename = "FNumber")]
    pub f_number: Option<FieldValue>,
    #[serde(rename = "FocalLength")]
    pub focal_length: Option<FieldValue>,
    #[serde(rename = "ISO")]
    pub iso: Option<FieldValue>,
    #[serde(rename = "WhiteBalance")]
    pub white_balance: Option<FieldValue>,
    #[serde(rename = "CreateDate")]
    pub create_date: Option<FieldValue>,
    #[serde(rename = "DateTimeOriginal")]
    pub date_time_original: Option<FieldValue>,
    #[serde(rename = "ModifyDate")]
    pub modify_date: Option<FieldValue>,
    #[serde(rename = "GPSLatitude")]
    pub gps_latitude: Option<FieldValue>,
    #[serde(rename = "GPSLatitudeRef")]
    pub gps_latitude_ref: Option<FieldValue>,
    #[serde(rename = "GPSLongitude")]
    pub gps_longitude: Option<FieldValue>,
    #[serde(rename = "GPSLongitudeRef")]
    pub gps_longitude_ref: Option<FieldValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct QuickTimeGroup {
    #[serde(rename = "CreateDate")]
    pub create_date: Option<FieldValue>,
    #[serde(rename = "ContentCreateDate")]
    pub content_create_date: Option<FieldValue>,
    #[serde(rename = "ImageWidth")]
    pub image_width: Option<FieldValue>,
    #[serde(rename = "ImageHeight")]
    pub image_height: Option<FieldValue>,
    #[serde(rename = "Duration")]
    pub duration: Option<FieldValue>,
    #[serde(rename = "Make")]
    pub make: Option<FieldValue>,
    #[serde(rename = "Model")]
    pub model: Option<FieldValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IptcGroup {
    #[serde(rename = "Keywords")]
    pub keywords: Option<FieldValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct XmpGroup {
    #[serde(rename = "Subject")]
    pub subject: Option<FieldValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompositeGroup {
    #[serde(rename = "GPSPosition")]
    pub gps_position: Option<FieldValue>,
}

/// Grouped extractor output for one file (`exiftool -json -g`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawMetadata {
    #[serde(rename = "SourceFile")]
    pub source_file: Option<String>,
    #[serde(rename = "File")]
    pub file: FileGroup,
    #[serde(rename = "EXIF")]
    pub exif: ExifGroup,
    #[serde(rename = "QuickTime")]
    pub quicktime: QuickTimeGroup,
    #[serde(rename = "IPTC")]
    pub iptc: IptcGroup,
    #[serde(rename = "XMP")]
    pub xmp: XmpGroup,
    #[serde(rename = "Composite")]
    pub composite: CompositeGroup,
}

impl RawMetadata {
    /// Parse the JSON array ExifTool prints for a single file.
    pub fn from_exiftool_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut records: Vec<RawMetadata> = serde_json::from_str(json)?;
        if records.is_empty() {
            return Err(serde::de::Error::custom("extractor returned no records"));
        }
        Ok(records.swap_remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_keeps_integers_and_floats_apart() {
        let v: FieldValue = serde_json::from_str("400").unwrap();
        assert_eq!(v, FieldValue::Int(400));
        let v: FieldValue = serde_json::from_str("400.0").unwrap();
        assert_eq!(v, FieldValue::Float(400.0));
        let v: FieldValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, FieldValue::Bool(true));
        let v: FieldValue = serde_json::from_str(r#"["a", 2]"#).unwrap();
        assert_eq!(
            v,
            FieldValue::List(vec![FieldValue::Text("a".into()), FieldValue::Int(2)])
        );
        let v: FieldValue = serde_json::from_str(r#"{"a": 1}"#).unwrap();
        assert_eq!(v.kind(), "object");
    }

    #[test]
    fn parses_grouped_exiftool_output() {
        let json = r#"[{
            "SourceFile": "/photos/a.jpg",
            "File": {"MIMEType": "image/jpeg", "ImageWidth": 4032, "ImageHeight": 3024,
                     "FileModifyDate": "2016:05:21 10:12:45-07:00"},
            "EXIF": {"Make": "Apple", "ISO": 25, "ExposureTime": "1/640",
                     "FocalLength": "4.2 mm", "CreateDate": "2016:05:21 10:12:44"},
            "IPTC": {"Keywords": ["beach", "sunset"]},
            "XMP": {"Subject": "beach"},
            "Composite": {"GPSPosition": "47 deg 37' 23.06\" N, 122 deg 20' 59.08\" W"},
            "ICC_Profile": {"ProfileVersion": "4.0.0"}
        }]"#;
        let raw = RawMetadata::from_exiftool_json(json).unwrap();
        assert_eq!(raw.source_file.as_deref(), Some("/photos/a.jpg"));
        assert_eq!(raw.file.image_width, Some(FieldValue::Int(4032)));
        assert_eq!(raw.exif.iso, Some(FieldValue::Int(25)));
        assert_eq!(raw.xmp.subject, Some(FieldValue::Text("beach".into())));
        assert!(raw.quicktime.create_date.is_none());
    }

    #[test]
    fn null_values_decode_as_absent() {
        let raw = RawMetadata::from_exiftool_json(r#"[{"EXIF": {"ISO": null}}]"#).unwrap();
        assert_eq!(raw.exif.iso, None);
    }

    #[test]
    fn empty_array_is_an_error() {
        assert!(RawMetadata::from_exiftool_json("[]").is_err());
        assert!(RawMetadata::from_exiftool_json("not json").is_err());
    }
}
