//! # Parameter Registry Module
//!
//! A typed, validated, self-documenting configuration tree shared by the
//! feature finder and the deconvolution engine.
//!
//! Every configurable value is registered with a description, optional
//! numeric ranges or valid-string lists, and tags (`advanced`, `required`,
//! `input file`, `output file`). Values set later are validated against the
//! registered restrictions, and lookups of unknown or wrongly-typed keys
//! report the offending parameter name.
//!
//! The registry supports section descriptions, prefix copies for passing
//! subsets to sub-algorithms, inheritance from instance/common/global
//! sections, JSON self-serialization and TOML override files:
//!
//! ```toml
//! # overrides.toml
//! [feature]
//! min_score = 0.6
//!
//! [mass_trace]
//! mz_tolerance = 0.02
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors raised by the parameter registry
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    /// Lookup of a name that was never registered
    #[error("Unknown parameter: {0}")]
    Unknown(String),

    /// A value of the wrong kind was supplied or requested
    #[error("Parameter '{name}': expected {expected}, got {got}")]
    WrongType {
        /// Name of the offending parameter
        name: String,
        /// Expected type name
        expected: &'static str,
        /// Actual type name that was supplied
        got: &'static str,
    },

    /// A numeric value outside the registered range
    #[error("Parameter '{name}': value {value} outside allowed range [{min}, {max}]")]
    OutOfRange {
        /// Name of the offending parameter
        name: String,
        /// The value that was supplied
        value: String,
        /// Minimum allowed value
        min: String,
        /// Maximum allowed value
        max: String,
    },

    /// A string value not contained in the registered valid strings
    #[error("Parameter '{name}': '{value}' is not one of: {valid}")]
    InvalidString {
        /// Name of the offending parameter
        name: String,
        /// The value that was supplied
        value: String,
        /// Comma-separated list of valid strings
        valid: String,
    },

    /// Error parsing a TOML override file
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Error serializing the registry to JSON
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A parameter value: integer, float or string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Str(String),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

/// Tags attached to a parameter entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags {
    /// Only shown to expert users
    pub advanced: bool,
    /// Must be set before a run
    pub required: bool,
    /// Names an input file
    pub input_file: bool,
    /// Names an output file
    pub output_file: bool,
}

impl Tags {
    /// Tag set for an advanced parameter
    pub fn advanced() -> Self {
        Self {
            advanced: true,
            ..Self::default()
        }
    }
}

/// Registered value restrictions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Restrictions {
    /// Inclusive lower bound for numeric values
    pub min: Option<f64>,
    /// Inclusive upper bound for numeric values
    pub max: Option<f64>,
    /// Exhaustive list of allowed string values
    pub valid_strings: Option<Vec<String>>,
}

/// A single registered parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEntry {
    /// Fully qualified name, sections separated by ':'
    pub name: String,
    /// Current value (starts as the registered default)
    pub value: Value,
    /// Human readable documentation
    pub description: String,
    /// Entry tags
    pub tags: Tags,
    /// Value restrictions
    pub restrictions: Restrictions,
}

impl ParamEntry {
    fn validate(&self, value: &Value) -> Result<(), ParamError> {
        match (&self.value, value) {
            (Value::Int(_), Value::Int(v)) => self.check_range(*v as f64, value),
            (Value::Float(_), Value::Float(v)) => self.check_range(*v, value),
            // allow integer literals for float parameters (TOML writes `5` for 5.0)
            (Value::Float(_), Value::Int(v)) => self.check_range(*v as f64, value),
            (Value::Str(_), Value::Str(v)) => self.check_valid_strings(v),
            (expected, got) => Err(ParamError::WrongType {
                name: self.name.clone(),
                expected: expected.kind(),
                got: got.kind(),
            }),
        }
    }

    fn check_range(&self, v: f64, value: &Value) -> Result<(), ParamError> {
        let min = self.restrictions.min.unwrap_or(f64::NEG_INFINITY);
        let max = self.restrictions.max.unwrap_or(f64::INFINITY);
        if v < min || v > max {
            return Err(ParamError::OutOfRange {
                name: self.name.clone(),
                value: value.to_string(),
                min: if min.is_finite() {
                    min.to_string()
                } else {
                    "-inf".to_string()
                },
                max: if max.is_finite() {
                    max.to_string()
                } else {
                    "inf".to_string()
                },
            });
        }
        Ok(())
    }

    fn check_valid_strings(&self, v: &str) -> Result<(), ParamError> {
        if let Some(valid) = &self.restrictions.valid_strings {
            if !valid.iter().any(|s| s == v) {
                return Err(ParamError::InvalidString {
                    name: self.name.clone(),
                    value: v.to_string(),
                    valid: valid.join(","),
                });
            }
        }
        Ok(())
    }
}

/// The parameter registry
#[derive(Debug, Clone, Default, Serialize)]
pub struct Params {
    entries: BTreeMap<String, ParamEntry>,
    sections: BTreeMap<String, String>,
}

impl Params {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an integer parameter with its default value
    pub fn register_int(&mut self, name: &str, value: i64, description: &str, tags: Tags) {
        self.register(name, Value::Int(value), description, tags);
    }

    /// Register a float parameter with its default value
    pub fn register_float(&mut self, name: &str, value: f64, description: &str, tags: Tags) {
        self.register(name, Value::Float(value), description, tags);
    }

    /// Register a string parameter with its default value
    pub fn register_str(&mut self, name: &str, value: &str, description: &str, tags: Tags) {
        self.register(name, Value::Str(value.to_string()), description, tags);
    }

    fn register(&mut self, name: &str, value: Value, description: &str, tags: Tags) {
        self.entries.insert(
            name.to_string(),
            ParamEntry {
                name: name.to_string(),
                value,
                description: description.to_string(),
                tags,
                restrictions: Restrictions::default(),
            },
        );
    }

    /// Set the inclusive minimum of a numeric parameter
    pub fn set_min(&mut self, name: &str, min: f64) -> Result<(), ParamError> {
        self.entry_mut(name)?.restrictions.min = Some(min);
        Ok(())
    }

    /// Set the inclusive maximum of a numeric parameter
    pub fn set_max(&mut self, name: &str, max: f64) -> Result<(), ParamError> {
        self.entry_mut(name)?.restrictions.max = Some(max);
        Ok(())
    }

    /// Restrict a string parameter to a list of valid values
    pub fn set_valid_strings(&mut self, name: &str, valid: &[&str]) -> Result<(), ParamError> {
        self.entry_mut(name)?.restrictions.valid_strings =
            Some(valid.iter().map(|s| s.to_string()).collect());
        Ok(())
    }

    /// Attach a description to a section prefix
    pub fn set_section_description(&mut self, section: &str, description: &str) {
        self.sections
            .insert(section.to_string(), description.to_string());
    }

    /// Description of a section prefix, if registered
    pub fn section_description(&self, section: &str) -> Option<&str> {
        self.sections.get(section).map(String::as_str)
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut ParamEntry, ParamError> {
        self.entries
            .get_mut(name)
            .ok_or_else(|| ParamError::Unknown(name.to_string()))
    }

    /// Look up an entry
    pub fn entry(&self, name: &str) -> Result<&ParamEntry, ParamError> {
        self.entries
            .get(name)
            .ok_or_else(|| ParamError::Unknown(name.to_string()))
    }

    /// Number of registered parameters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no parameters are registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all registered entries in name order
    pub fn iter(&self) -> impl Iterator<Item = &ParamEntry> {
        self.entries.values()
    }

    /// Set a value, validating it against the registered restrictions
    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ParamError> {
        let value = value.into();
        let entry = self.entry_mut(name)?;
        entry.validate(&value)?;
        // keep the registered kind stable for float parameters set from ints
        entry.value = match (&entry.value, value) {
            (Value::Float(_), Value::Int(v)) => Value::Float(v as f64),
            (_, v) => v,
        };
        Ok(())
    }

    /// Integer value of a parameter
    pub fn get_int(&self, name: &str) -> Result<i64, ParamError> {
        match &self.entry(name)?.value {
            Value::Int(v) => Ok(*v),
            other => Err(ParamError::WrongType {
                name: name.to_string(),
                expected: "integer",
                got: other.kind(),
            }),
        }
    }

    /// Float value of a parameter (integer values coerce)
    pub fn get_float(&self, name: &str) -> Result<f64, ParamError> {
        match &self.entry(name)?.value {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(ParamError::WrongType {
                name: name.to_string(),
                expected: "float",
                got: other.kind(),
            }),
        }
    }

    /// String value of a parameter
    pub fn get_str(&self, name: &str) -> Result<&str, ParamError> {
        match &self.entry(name)?.value {
            Value::Str(v) => Ok(v),
            other => Err(ParamError::WrongType {
                name: name.to_string(),
                expected: "string",
                got: other.kind(),
            }),
        }
    }

    /// Copy of all entries under a prefix, optionally stripping it
    pub fn copy(&self, prefix: &str, strip_prefix: bool) -> Self {
        let mut out = Self::new();
        for (name, entry) in &self.entries {
            if let Some(rest) = name.strip_prefix(prefix) {
                let new_name = if strip_prefix { rest } else { name.as_str() };
                let mut new_entry = entry.clone();
                new_entry.name = new_name.to_string();
                out.entries.insert(new_name.to_string(), new_entry);
            }
        }
        for (section, description) in &self.sections {
            if let Some(rest) = section.strip_prefix(prefix) {
                let new_name = if strip_prefix { rest } else { section.as_str() };
                out.sections
                    .insert(new_name.to_string(), description.clone());
            }
        }
        out
    }

    /// Insert all entries of another registry under a prefix
    pub fn insert(&mut self, prefix: &str, other: &Self) {
        for (name, entry) in &other.entries {
            let new_name = format!("{prefix}{name}");
            let mut new_entry = entry.clone();
            new_entry.name = new_name.clone();
            self.entries.insert(new_name, new_entry);
        }
        for (section, description) in &other.sections {
            self.sections
                .insert(format!("{prefix}{section}"), description.clone());
        }
    }

    /// Resolve a value through the instance/common/global fallback chain.
    ///
    /// Lookup order: `<tool>:<instance>:<key>`, `common:<tool>:<key>`,
    /// `common:<key>`, then the plain key.
    pub fn resolve(&self, tool: &str, instance: u32, key: &str) -> Result<&Value, ParamError> {
        let candidates = [
            format!("{tool}:{instance}:{key}"),
            format!("common:{tool}:{key}"),
            format!("common:{key}"),
            key.to_string(),
        ];
        for candidate in &candidates {
            if let Some(entry) = self.entries.get(candidate) {
                return Ok(&entry.value);
            }
        }
        Err(ParamError::Unknown(key.to_string()))
    }

    /// Apply instance/common overrides to every plain (unprefixed) entry.
    pub fn apply_inherited(&mut self, tool: &str, instance: u32) -> Result<(), ParamError> {
        let plain: Vec<String> = self
            .entries
            .keys()
            .filter(|k| !k.starts_with("common:") && !k.starts_with(&format!("{tool}:")))
            .cloned()
            .collect();
        for key in plain {
            let resolved = match self.resolve(tool, instance, &key) {
                Ok(v) => v.clone(),
                Err(_) => continue,
            };
            if resolved != self.entry(&key)?.value {
                self.set_value(&key, resolved)?;
            }
        }
        Ok(())
    }

    /// Serialize the registry (values, docs, restrictions, tags) to JSON
    pub fn to_json(&self) -> Result<String, ParamError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Apply overrides from a TOML document.
    ///
    /// Nested tables map to ':'-separated parameter names; every override is
    /// validated against the registered restrictions.
    pub fn apply_toml(&mut self, content: &str) -> Result<(), ParamError> {
        let table: toml::Table = content.parse()?;
        let mut flat = Vec::new();
        flatten_toml("", &table, &mut flat);
        for (name, value) in flat {
            self.set_value(&name, value)?;
        }
        Ok(())
    }
}

fn flatten_toml(prefix: &str, table: &toml::Table, out: &mut Vec<(String, Value)>) {
    for (key, value) in table {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}:{key}")
        };
        match value {
            toml::Value::Table(inner) => flatten_toml(&name, inner, out),
            toml::Value::Integer(v) => out.push((name, Value::Int(*v))),
            toml::Value::Float(v) => out.push((name, Value::Float(*v))),
            toml::Value::String(v) => out.push((name, Value::Str(v.clone()))),
            // booleans, arrays and datetimes have no registered counterpart;
            // map them to strings so validation reports them by name
            other => out.push((name, Value::Str(other.to_string()))),
        }
    }
}

/// Default parameter registry of the picked feature finder
pub fn feature_finder_defaults() -> Params {
    let mut p = Params::new();
    let adv = Tags::advanced();
    let none = Tags::default();

    p.register_int(
        "intensity:bins",
        10,
        "Number of bins per dimension (RT and m/z). The higher this value, the more local the intensity significance score is.",
        none,
    );
    p.set_section_description(
        "intensity",
        "Settings for the calculation of a score indicating if a peak's intensity is significant in the local environment (between 0 and 1)",
    );

    p.register_float(
        "mass_trace:mz_tolerance",
        0.03,
        "Tolerated m/z deviation of peaks belonging to the same mass trace. It should be larger than the m/z resolution of the instrument.",
        none,
    );
    p.register_int(
        "mass_trace:min_spectra",
        10,
        "Number of spectra that have to show a similar peak mass in a mass trace.",
        none,
    );
    p.register_int(
        "mass_trace:max_missing",
        1,
        "Number of consecutive spectra where a high mass deviation or missing peak is acceptable. This parameter should be well below 'min_spectra'!",
        none,
    );
    p.register_float(
        "mass_trace:slope_bound",
        0.1,
        "The maximum slope of mass trace intensities when extending from the highest peak. This parameter is important to separate overlapping elution peaks.",
        none,
    );
    p.set_section_description(
        "mass_trace",
        "Settings for the calculation of a score indicating if a peak is part of a mass trace (between 0 and 1).",
    );

    p.register_int("isotopic_pattern:charge_low", 1, "Lowest charge to search for.", none);
    p.register_int("isotopic_pattern:charge_high", 4, "Highest charge to search for.", none);
    p.register_float(
        "isotopic_pattern:mz_tolerance",
        0.03,
        "Tolerated m/z deviation from the theoretical isotopic pattern. It should be larger than the m/z resolution of the instrument.",
        none,
    );
    p.register_float(
        "isotopic_pattern:intensity_percentage",
        10.0,
        "Isotopic peaks that contribute more than this percentage to the overall isotope pattern intensity must be present.",
        adv,
    );
    p.register_float(
        "isotopic_pattern:intensity_percentage_optional",
        0.1,
        "Isotopic peaks that contribute more than this percentage to the overall isotope pattern intensity can be missing.",
        adv,
    );
    p.register_float(
        "isotopic_pattern:optional_fit_improvement",
        2.0,
        "Minimal percental improvement of isotope fit to allow leaving out an optional peak.",
        adv,
    );
    p.register_float(
        "isotopic_pattern:mass_window_width",
        25.0,
        "Window width in Dalton for precalculation of estimated isotope distributions.",
        adv,
    );
    p.register_float(
        "isotopic_pattern:abundance_12C",
        98.93,
        "Rel. abundance of the light carbon. Modify if labeled.",
        adv,
    );
    p.register_float(
        "isotopic_pattern:abundance_14N",
        99.632,
        "Rel. abundance of the light nitrogen. Modify if labeled.",
        adv,
    );
    p.set_section_description(
        "isotopic_pattern",
        "Settings for the calculation of a score indicating if a peak is part of a isotopic pattern (between 0 and 1).",
    );

    p.register_float(
        "seed:min_score",
        0.8,
        "Minimum seed score a peak has to reach to be used as seed. The seed score is the geometric mean of intensity score, mass trace score and isotope pattern score.",
        none,
    );
    p.set_section_description("seed", "Settings that determine which peaks are considered a seed");

    p.register_int("fit:max_iterations", 500, "Maximum number of iterations of the fit.", adv);
    p.register_float("fit:epsilon_abs", 0.0001, "Absolute epsilon used for convergence of the fit.", adv);
    p.register_float("fit:epsilon_rel", 0.0001, "Relative epsilon used for convergence of the fit.", adv);
    p.set_section_description("fit", "Settings for the model fitting");

    p.register_float(
        "feature:min_score",
        0.7,
        "Feature score threshold for a feature to be reported. The feature score is the geometric mean of the average relative deviation and the correlation between the model and the observed peaks.",
        none,
    );
    p.register_float(
        "feature:min_isotope_fit",
        0.8,
        "Minimum isotope fit of the feature before model fitting.",
        adv,
    );
    p.register_float(
        "feature:min_trace_score",
        0.5,
        "Trace score threshold. Traces below this threshold are removed after the model fitting.",
        adv,
    );
    p.register_float(
        "feature:min_rt_span",
        0.333,
        "Minimum RT span in relation to extended area that has to remain after model fitting.",
        adv,
    );
    p.register_float(
        "feature:max_rt_span",
        2.5,
        "Maximum RT span in relation to extended area that the model is allowed to have.",
        adv,
    );
    p.register_str(
        "feature:rt_shape",
        "symmetric",
        "Choose model used for RT profile fitting. If set to symmetric a gauss shape is used, in case of asymmetric an EGH shape is used.",
        adv,
    );
    p.register_float("feature:max_intersection", 0.35, "Maximum allowed intersection of features.", adv);
    p.register_str(
        "feature:reported_mz",
        "monoisotopic",
        "The mass type that is reported for features. 'maximum' returns the m/z value of the highest mass trace. 'average' returns the intensity-weighted average m/z value of all contained peaks. 'monoisotopic' returns the monoisotopic m/z value derived from the fitted isotope model.",
        none,
    );
    p.set_section_description("feature", "Settings for the features (intensity, quality assessment, ...)");

    p.register_float(
        "user-seed:rt_tolerance",
        5.0,
        "Allowed RT deviation of seeds from the user-specified seed position.",
        none,
    );
    p.register_float(
        "user-seed:mz_tolerance",
        1.1,
        "Allowed m/z deviation of seeds from the user-specified seed position.",
        none,
    );
    p.register_float(
        "user-seed:min_score",
        0.5,
        "Overwrites 'seed:min_score' for user-specified seeds. The cutoff is typically a bit lower in this case.",
        none,
    );
    p.set_section_description("user-seed", "Settings for user-specified seeds.");

    // restrictions; the names above are all registered, so the lookups cannot fail
    let ranges: &[(&str, Option<f64>, Option<f64>)] = &[
        ("intensity:bins", Some(1.0), None),
        ("mass_trace:mz_tolerance", Some(0.0), None),
        ("mass_trace:min_spectra", Some(1.0), None),
        ("mass_trace:max_missing", Some(0.0), None),
        ("mass_trace:slope_bound", Some(0.0), None),
        ("isotopic_pattern:charge_low", Some(1.0), None),
        ("isotopic_pattern:charge_high", Some(1.0), None),
        ("isotopic_pattern:mz_tolerance", Some(0.0), None),
        ("isotopic_pattern:intensity_percentage", Some(0.0), Some(100.0)),
        ("isotopic_pattern:intensity_percentage_optional", Some(0.0), Some(100.0)),
        ("isotopic_pattern:optional_fit_improvement", Some(0.0), Some(100.0)),
        ("isotopic_pattern:mass_window_width", Some(1.0), Some(200.0)),
        ("isotopic_pattern:abundance_12C", Some(0.0), Some(100.0)),
        ("isotopic_pattern:abundance_14N", Some(0.0), Some(100.0)),
        ("seed:min_score", Some(0.0), Some(1.0)),
        ("fit:max_iterations", Some(1.0), None),
        ("fit:epsilon_abs", Some(0.0), None),
        ("fit:epsilon_rel", Some(0.0), None),
        ("feature:min_score", Some(0.0), Some(1.0)),
        ("feature:min_isotope_fit", Some(0.0), Some(1.0)),
        ("feature:min_trace_score", Some(0.0), Some(1.0)),
        ("feature:min_rt_span", Some(0.0), Some(1.0)),
        ("feature:max_rt_span", Some(0.5), None),
        ("feature:max_intersection", Some(0.0), Some(1.0)),
        ("user-seed:rt_tolerance", Some(0.0), None),
        ("user-seed:mz_tolerance", Some(0.0), None),
        ("user-seed:min_score", Some(0.0), Some(1.0)),
    ];
    for (name, min, max) in ranges {
        if let Some(min) = min {
            let _ = p.set_min(name, *min);
        }
        if let Some(max) = max {
            let _ = p.set_max(name, *max);
        }
    }
    let _ = p.set_valid_strings("feature:rt_shape", &["symmetric", "asymmetric"]);
    let _ = p.set_valid_strings("feature:reported_mz", &["maximum", "average", "monoisotopic"]);

    p
}

/// Default parameter registry of the deconvolution engine
pub fn deconvolution_defaults() -> Params {
    let mut p = Params::new();
    let adv = Tags::advanced();
    let none = Tags::default();

    p.register_int("minC", 2, "Minimum charge state.", none);
    p.register_int("maxC", 60, "Maximum charge state.", none);
    p.register_float("minM", 1000.0, "Minimum mass (Da).", none);
    p.register_float("maxM", 100000.0, "Maximum mass (Da).", none);
    p.register_float("tol", 5.0, "ppm tolerance.", none);
    p.register_float("minInt", 0.0, "Intensity threshold.", adv);
    p.register_int(
        "minCC",
        3,
        "Minimum number of peaks of continuous charges per mass.",
        adv,
    );
    p.register_int("minIC", 3, "Minimum continuous isotope count.", adv);
    p.register_int("maxIC", 100, "Maximum isotope count.", adv);
    p.register_int("maxMC", -1, "Maximum mass count per spectrum (-1 keeps all).", adv);
    p.register_float("minIsoScore", 0.5, "Minimum isotope cosine score threshold (0-1).", adv);
    p.register_int("minCDScore", 1, "Minimum charge distribution score threshold (>= 0).", adv);

    let _ = p.set_min("minC", 1.0);
    let _ = p.set_min("maxC", 1.0);
    let _ = p.set_min("minM", 0.0);
    let _ = p.set_min("maxM", 0.0);
    let _ = p.set_min("tol", 0.0);
    let _ = p.set_min("minInt", 0.0);
    let _ = p.set_min("minCC", 1.0);
    let _ = p.set_min("minIC", 1.0);
    let _ = p.set_min("maxIC", 1.0);
    let _ = p.set_min("minIsoScore", 0.0);
    let _ = p.set_max("minIsoScore", 1.0);
    let _ = p.set_min("minCDScore", 0.0);

    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let p = feature_finder_defaults();
        assert_eq!(p.get_int("intensity:bins").unwrap(), 10);
        assert_eq!(p.get_float("seed:min_score").unwrap(), 0.8);
        assert_eq!(p.get_str("feature:rt_shape").unwrap(), "symmetric");
        // integer coercion for float lookups
        assert_eq!(p.get_float("intensity:bins").unwrap(), 10.0);
    }

    #[test]
    fn test_unknown_parameter_reports_name() {
        let p = feature_finder_defaults();
        let err = p.get_int("no:such:thing").unwrap_err();
        assert!(err.to_string().contains("no:such:thing"));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut p = feature_finder_defaults();
        assert!(p.set_value("seed:min_score", 0.5).is_ok());
        let err = p.set_value("seed:min_score", 1.5).unwrap_err();
        assert!(matches!(err, ParamError::OutOfRange { .. }));
        // the old value survives a failed set
        assert_eq!(p.get_float("seed:min_score").unwrap(), 0.5);
    }

    #[test]
    fn test_valid_strings_rejected() {
        let mut p = feature_finder_defaults();
        assert!(p.set_value("feature:rt_shape", "asymmetric").is_ok());
        let err = p.set_value("feature:rt_shape", "triangular").unwrap_err();
        assert!(matches!(err, ParamError::InvalidString { .. }));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut p = feature_finder_defaults();
        let err = p.set_value("intensity:bins", "ten").unwrap_err();
        assert!(matches!(err, ParamError::WrongType { .. }));
    }

    #[test]
    fn test_int_accepted_for_float() {
        let mut p = feature_finder_defaults();
        p.set_value("mass_trace:mz_tolerance", 1i64).unwrap();
        assert_eq!(p.get_float("mass_trace:mz_tolerance").unwrap(), 1.0);
    }

    #[test]
    fn test_copy_and_insert() {
        let p = feature_finder_defaults();
        let sub = p.copy("mass_trace:", true);
        assert_eq!(sub.get_float("mz_tolerance").unwrap(), 0.03);
        assert_eq!(sub.get_int("min_spectra").unwrap(), 10);

        let mut target = Params::new();
        target.insert("algo:", &sub);
        assert_eq!(target.get_float("algo:mz_tolerance").unwrap(), 0.03);
    }

    #[test]
    fn test_inheritance_chain() {
        let mut p = feature_finder_defaults();
        p.register_float("common:seed:min_score", 0.6, "common override", Tags::default());
        p.register_float(
            "finder:1:seed:min_score",
            0.4,
            "instance override",
            Tags::default(),
        );

        // instance beats common beats plain
        let v = p.resolve("finder", 1, "seed:min_score").unwrap();
        assert_eq!(v, &Value::Float(0.4));
        let v = p.resolve("finder", 2, "seed:min_score").unwrap();
        assert_eq!(v, &Value::Float(0.6));

        p.apply_inherited("finder", 1).unwrap();
        assert_eq!(p.get_float("seed:min_score").unwrap(), 0.4);
    }

    #[test]
    fn test_toml_overrides() {
        let mut p = feature_finder_defaults();
        p.apply_toml(
            r#"
            [feature]
            min_score = 0.6
            rt_shape = "asymmetric"

            [mass_trace]
            min_spectra = 8
            "#,
        )
        .unwrap();
        assert_eq!(p.get_float("feature:min_score").unwrap(), 0.6);
        assert_eq!(p.get_str("feature:rt_shape").unwrap(), "asymmetric");
        assert_eq!(p.get_int("mass_trace:min_spectra").unwrap(), 8);
    }

    #[test]
    fn test_toml_override_out_of_range() {
        let mut p = feature_finder_defaults();
        let err = p
            .apply_toml("[seed]\nmin_score = 2.0\n")
            .unwrap_err();
        assert!(matches!(err, ParamError::OutOfRange { .. }));
    }

    #[test]
    fn test_json_serialization_contains_docs() {
        let p = deconvolution_defaults();
        let json = p.to_json().unwrap();
        assert!(json.contains("minIsoScore"));
        assert!(json.contains("Minimum isotope cosine score threshold"));
    }
}
