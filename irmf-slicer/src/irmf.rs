//! IRMF model parsing and validation.

use base64::Engine;
use flate2::read::GzDecoder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;

/// Error type for IRMF operations.
#[derive(Error, Debug)]
pub enum IrmfError {
    /// The leading '/*{' comment was not found.
    #[error("Unable to find leading '/*{{'")]
    MissingLeadingComment,
    /// The trailing '}*/' comment was not found.
    #[error("Unable to find trailing '}}*/'")]
    MissingTrailingComment,
    /// An error occurred during JSON parsing.
    #[error("Unable to parse JSON blob: {0}")]
    JsonError(#[from] serde_json::Error),
    /// An error occurred during Base64 decoding.
    #[error("uudecode error: {0}")]
    Base64Error(#[from] base64::DecodeError),
    /// An IO error occurred (e.g. while inflating a gzip payload).
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    /// The header failed validation. `line` is the 1-based line of the
    /// offending key within the JSON blob.
    #[error("invalid JSON blob on line {line}: {msg}")]
    Validation { line: usize, msg: String },

    /// A general renderer error occurred.
    #[error("Renderer error: {0}")]
    RendererError(String),
    /// Failed to find a suitable WGPU adapter.
    #[error("WGPU adapter error")]
    WgpuAdapterError,
    /// Failed to request a WGPU device.
    #[error("WGPU device error: {0}")]
    WgpuDeviceError(#[from] wgpu::RequestDeviceError),
    /// An error occurred with a WGPU buffer.
    #[error("WGPU buffer error: {0}")]
    WgpuBufferError(#[from] wgpu::BufferAsyncError),
    /// Failed to receive data from a channel.
    #[error("Receive error: {0}")]
    RecvError(#[from] std::sync::mpsc::RecvError),
    /// An error occurred during shader compilation or pipeline creation.
    #[error("Shader compilation error: {0}")]
    ShaderError(String),
}

/// The JSON header of an IRMF model.
///
/// Field order matches the canonical key order used by [`IrmfModel::format`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrmfHeader {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub copyright: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// IRMF format version; must be "1.0".
    #[serde(default)]
    pub irmf: String,
    /// Ordered material names; 1 to 16 entries.
    #[serde(default)]
    pub materials: Vec<String>,
    /// Maximum corner of the bounding box, in millimeters.
    #[serde(default)]
    pub max: Vec<f32>,
    /// Minimum corner of the bounding box, in millimeters.
    #[serde(default)]
    pub min: Vec<f32>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub version: String,
}

/// Keys that may appear unquoted in hand-written IRMF headers.
const JSON_KEYS: &[&str] = &[
    "author",
    "copyright",
    "date",
    "encoding",
    "irmf",
    "materials",
    "max",
    "min",
    "notes",
    "options",
    "title",
    "units",
    "version",
];

/// A parsed and validated IRMF model.
#[derive(Debug, Clone, PartialEq)]
pub struct IrmfModel {
    /// The model's header.
    pub header: IrmfHeader,
    /// The decompressed/decoded GLSL shader source.
    pub shader: String,
}

impl IrmfModel {
    /// Parses an IRMF model from a byte buffer.
    ///
    /// The buffer must start with `/*{`, contain the JSON header up to a
    /// `\n}*/\n` terminator, and carry the shader payload after it. The
    /// payload is decoded according to the header's `encoding` key.
    pub fn new(data: &[u8]) -> Result<Self, IrmfError> {
        if !data.starts_with(b"/*{") {
            return Err(IrmfError::MissingLeadingComment);
        }
        let end_json =
            find_subsequence(data, b"\n}*/\n").ok_or(IrmfError::MissingTrailingComment)?;

        let json_blob = String::from_utf8_lossy(&data[2..end_json + 2]).into_owned();
        let mut header = parse_json(&json_blob)?;
        // Absent options re-emit as {}, so normalize for stable round-trips.
        if header.options.is_none() {
            header.options = Some(serde_json::Value::Object(Default::default()));
        }

        let payload = &data[end_json + 5..];
        let shader = decode_shader(&mut header, payload)?;

        let model = IrmfModel { header, shader };
        model.validate(&json_blob)?;
        Ok(model)
    }

    /// Minimum corner of the bounding box. Valid after a successful parse.
    pub fn min(&self) -> [f32; 3] {
        [self.header.min[0], self.header.min[1], self.header.min[2]]
    }

    /// Maximum corner of the bounding box. Valid after a successful parse.
    pub fn max(&self) -> [f32; 3] {
        [self.header.max[0], self.header.max[1], self.header.max[2]]
    }

    /// Re-emits the model as IRMF source.
    ///
    /// The emitted header has one key per line, numeric arrays collapsed onto
    /// a single line, and `options: null` rewritten to `{}`. Parsing the
    /// result yields a model equal to `self`.
    pub fn format(&self) -> Result<String, IrmfError> {
        let json = serde_json::to_string_pretty(&self.header)?;
        let json = json.replacen("\"options\": null,", "\"options\": {},", 1);

        let array_re = Regex::new(r"\[([^\]]+)\]").unwrap();
        let whitespace_re = Regex::new(r"[\s\n]+").unwrap();
        let json = array_re
            .replace_all(&json, |caps: &regex::Captures| {
                whitespace_re.replace_all(&caps[0], "").into_owned()
            })
            .into_owned();

        Ok(format!("/*{}*/\n{}", json, self.shader))
    }

    /// Validates the header and shader against the IRMF 1.0 specification.
    fn validate(&self, json_blob: &str) -> Result<(), IrmfError> {
        let fail = |key: &str, msg: String| IrmfError::Validation {
            line: find_key_line(json_blob, key),
            msg,
        };

        let h = &self.header;
        if h.irmf != "1.0" {
            return Err(fail("irmf", format!("unsupported IRMF version: {}", h.irmf)));
        }
        if h.materials.is_empty() {
            return Err(fail(
                "materials",
                "must list at least one material name".into(),
            ));
        }
        if h.materials.len() > 16 {
            return Err(fail(
                "materials",
                format!(
                    "IRMF 1.0 only supports up to 16 materials, found {}",
                    h.materials.len()
                ),
            ));
        }
        if h.max.len() != 3 {
            return Err(fail(
                "max",
                format!("max must have only 3 values, found {}", h.max.len()),
            ));
        }
        if h.min.len() != 3 {
            return Err(fail(
                "min",
                format!("min must have only 3 values, found {}", h.min.len()),
            ));
        }
        if h.units.is_empty() {
            return Err(fail("units", "units are required by IRMF 1.0".into()));
        }
        for (i, axis) in ["x", "y", "z"].iter().enumerate() {
            if h.min[i] >= h.max[i] {
                return Err(fail(
                    "max",
                    format!(
                        "min.{} ({}) must be strictly less than max.{} ({})",
                        axis, h.min[i], axis, h.max[i]
                    ),
                ));
            }
        }

        let num = h.materials.len();
        if num <= 4 && !self.shader.contains("mainModel4") {
            return Err(fail(
                "materials",
                format!("found {} materials, but missing 'mainModel4' function", num),
            ));
        }
        if num > 4 && num <= 9 && !self.shader.contains("mainModel9") {
            return Err(fail(
                "materials",
                format!("found {} materials, but missing 'mainModel9' function", num),
            ));
        }
        if num > 9 && num <= 16 && !self.shader.contains("mainModel16") {
            return Err(fail(
                "materials",
                format!(
                    "found {} materials, but missing 'mainModel16' function",
                    num
                ),
            ));
        }

        if let Some(enc) = h.encoding.as_deref() {
            if !enc.is_empty() && enc != "gzip" && enc != "gzip+base64" {
                return Err(fail(
                    "encoding",
                    "unsupported encoding. Possible values are 'gzip' or 'gzip+base64'".into(),
                ));
            }
        }

        Ok(())
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parses the JSON blob, tolerating a trailing comma before the closing brace
/// and unquoted keys from the fixed IRMF key list.
fn parse_json(blob: &str) -> Result<IrmfHeader, IrmfError> {
    let trailing_comma_re = Regex::new(r",[\s\n]*\}").unwrap();
    let cleaned = trailing_comma_re.replace_all(blob, "}").into_owned();

    match serde_json::from_str(&cleaned) {
        Ok(header) => Ok(header),
        Err(_) => {
            let mut quoted = cleaned;
            for key in JSON_KEYS {
                quoted = quoted.replacen(&format!("{key}:"), &format!("\"{key}\":"), 1);
            }
            Ok(serde_json::from_str(&quoted)?)
        }
    }
}

/// Decodes the shader payload according to the header's `encoding`.
///
/// On a successful gzip decode the stored encoding is cleared so the model
/// round-trips through [`IrmfModel::format`] with a literal shader body.
fn decode_shader(header: &mut IrmfHeader, payload: &[u8]) -> Result<String, IrmfError> {
    let unzip = |data: &[u8]| -> Result<String, IrmfError> {
        let mut decoder = GzDecoder::new(data);
        let mut shader = String::new();
        decoder.read_to_string(&mut shader)?;
        Ok(shader)
    };

    match header.encoding.as_deref() {
        Some("gzip+base64") => {
            let payload_str = std::str::from_utf8(payload).unwrap_or("");
            let cleaned: String = payload_str.chars().filter(|c| !c.is_whitespace()).collect();
            let decoded = base64::engine::general_purpose::STANDARD_NO_PAD.decode(&cleaned)?;
            let shader = unzip(&decoded)?;
            header.encoding = None;
            Ok(shader)
        }
        Some("gzip") => {
            let shader = unzip(payload)?;
            header.encoding = None;
            Ok(shader)
        }
        _ => Ok(String::from_utf8_lossy(payload).into_owned()),
    }
}

/// Returns the 1-based line within the JSON blob where `key` appears.
fn find_key_line(blob: &str, key: &str) -> usize {
    let quoted = format!("\"{key}\":");
    let bare = format!("{key}:");
    for needle in [quoted.as_str(), bare.as_str(), key] {
        if let Some(i) = blob.find(needle) {
            return blob[..i].matches('\n').count() + 1;
        }
    }
    2 // Fall back to the top of the JSON blob.
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPHERE: &[u8] = b"/*{
  \"author\": \"Glenn M. Lewis\",
  \"copyright\": \"Apache-2.0\",
  \"date\": \"2019-06-30\",
  \"irmf\": \"1.0\",
  \"materials\": [\"AISI 1018 steel\"],
  \"max\": [5,5,5],
  \"min\": [-5,-5,-5],
  \"notes\": \"Simple IRMF shader - Hello, Sphere!\",
  \"options\": {},
  \"title\": \"10mm diameter Sphere\",
  \"units\": \"mm\",
  \"version\": \"1.0\"
}*/

void mainModel4(out vec4 materials, in vec3 xyz) {
  const float radius = 5.0;
  float r = length(xyz);
  materials[0] = r <= radius ? 1.0 : 0.0;
}";

    #[test]
    fn test_parse_sphere() {
        let model = IrmfModel::new(SPHERE).unwrap();
        assert_eq!(model.header.irmf, "1.0");
        assert_eq!(model.header.materials[0], "AISI 1018 steel");
        assert_eq!(model.header.units, "mm");
        assert_eq!(model.min(), [-5.0, -5.0, -5.0]);
        assert_eq!(model.max(), [5.0, 5.0, 5.0]);
        assert!(model.shader.contains("void mainModel4"));
    }

    #[test]
    fn test_parse_header_edge_cases() {
        let data = b"/*{
  irmf: \"1.0\",
  materials: [\"PLA\"],
  max: [1,1,1],
  min: [0,0,0],
  units: \"mm\",
  version: \"1.0\",
  title: \"Edge Case Test\",
}*/
void mainModel4(out vec4 m, in vec3 xyz) {}";
        let model = IrmfModel::new(data).unwrap();
        assert_eq!(model.header.irmf, "1.0");
        assert_eq!(model.header.title, "Edge Case Test");
        assert_eq!(model.header.materials, vec!["PLA".to_string()]);
    }

    #[test]
    fn test_missing_leading_comment() {
        assert!(matches!(
            IrmfModel::new(b"// not irmf"),
            Err(IrmfError::MissingLeadingComment)
        ));
    }

    #[test]
    fn test_missing_trailing_comment() {
        assert!(matches!(
            IrmfModel::new(b"/*{ \"irmf\": \"1.0\" "),
            Err(IrmfError::MissingTrailingComment)
        ));
    }

    fn header_with(num_materials: usize, shader_fn: &str) -> Vec<u8> {
        let materials: Vec<String> = (0..num_materials).map(|i| format!("\"m{i}\"")).collect();
        format!(
            "/*{{\n  \"irmf\": \"1.0\",\n  \"materials\": [{}],\n  \"max\": [1,1,1],\n  \"min\": [0,0,0],\n  \"units\": \"mm\",\n  \"version\": \"1.0\"\n}}*/\nvoid {}(...) {{}}",
            materials.join(","),
            shader_fn
        )
        .into_bytes()
    }

    #[test]
    fn test_extractor_function_enforcement() {
        // The extractor name must match the material count.
        assert!(IrmfModel::new(&header_with(4, "mainModel4")).is_ok());
        assert!(IrmfModel::new(&header_with(9, "mainModel9")).is_ok());
        assert!(IrmfModel::new(&header_with(16, "mainModel16")).is_ok());

        assert!(IrmfModel::new(&header_with(5, "mainModel4")).is_err());
        assert!(IrmfModel::new(&header_with(4, "mainModel9")).is_err());
        assert!(IrmfModel::new(&header_with(10, "mainModel9")).is_err());
    }

    #[test]
    fn test_validation_reports_key_line() {
        let data = b"/*{
  \"irmf\": \"0.9\",
  \"materials\": [\"PLA\"],
  \"max\": [1,1,1],
  \"min\": [0,0,0],
  \"units\": \"mm\"
}*/
void mainModel4() {}";
        match IrmfModel::new(data) {
            Err(IrmfError::Validation { line, msg }) => {
                assert_eq!(line, 2);
                assert!(msg.contains("unsupported IRMF version"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_mbb() {
        let data = b"/*{
  \"irmf\": \"1.0\",
  \"materials\": [\"PLA\"],
  \"max\": [0,1,1],
  \"min\": [0,0,0],
  \"units\": \"mm\"
}*/
void mainModel4() {}";
        match IrmfModel::new(data) {
            Err(IrmfError::Validation { msg, .. }) => {
                assert!(msg.contains("min.x"), "msg={msg}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_too_many_materials() {
        assert!(matches!(
            IrmfModel::new(&header_with(17, "mainModel16")),
            Err(IrmfError::Validation { .. })
        ));
    }

    #[test]
    fn test_format_round_trip() {
        let model = IrmfModel::new(&header_with(1, "mainModel4")).unwrap();
        let emitted = model.format().unwrap();
        let reparsed = IrmfModel::new(emitted.as_bytes()).unwrap();
        assert_eq!(model, reparsed);

        // Formatting is stable across a second pass.
        assert_eq!(emitted, reparsed.format().unwrap());
    }

    fn encode_round_trip(shader: &str, use_b64: bool) {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(shader.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let (encoding, payload) = if use_b64 {
            let b64 = base64::engine::general_purpose::STANDARD_NO_PAD.encode(&compressed);
            ("gzip+base64", b64.into_bytes())
        } else {
            ("gzip", compressed)
        };

        let mut data = format!(
            "/*{{\n  \"encoding\": \"{}\",\n  \"irmf\": \"1.0\",\n  \"materials\": [\"PLA\"],\n  \"max\": [1,1,1],\n  \"min\": [0,0,0],\n  \"units\": \"mm\"\n}}*/\n",
            encoding
        )
        .into_bytes();
        data.extend_from_slice(&payload);

        let model = IrmfModel::new(&data).unwrap();
        assert_eq!(model.shader, shader);
        // A successful decode clears the stored encoding.
        assert_eq!(model.header.encoding, None);
    }

    #[test]
    fn test_gzip_encodings() {
        let shader =
            "void mainModel4(out vec4 materials, in vec3 xyz) {\n  materials[0] = 1.0;\n}";
        encode_round_trip(shader, false);
        encode_round_trip(shader, true);
    }

    #[test]
    fn test_unknown_encoding() {
        let data = b"/*{
  \"encoding\": \"zstd\",
  \"irmf\": \"1.0\",
  \"materials\": [\"PLA\"],
  \"max\": [1,1,1],
  \"min\": [0,0,0],
  \"units\": \"mm\"
}*/
void mainModel4() {}";
        match IrmfModel::new(data) {
            Err(IrmfError::Validation { line, msg }) => {
                assert_eq!(line, 2);
                assert!(msg.contains("unsupported encoding"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
