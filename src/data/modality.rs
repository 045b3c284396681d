//! Column modalities and the lookup table that loads stored values into
//! domain objects.
//!
//! The set of modalities is closed. Each one maps to a [`Decoder`] in a
//! [`ModalityRegistry`] built once and shared by reference; swapping in a real
//! chemistry or imaging toolkit is a matter of registering another decoder.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use super::value::{StorageKind, Value};
use crate::error::{Result, StorageError, ValidationError};

/// The semantic kind of data a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    Scalar,
    Molecule,
    #[serde(rename = "MOLECULE_3D")]
    Molecule3D,
    Image,
    Array,
}

impl Modality {
    pub const ALL: [Modality; 5] = [
        Modality::Scalar,
        Modality::Molecule,
        Modality::Molecule3D,
        Modality::Image,
        Modality::Array,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Scalar => "SCALAR",
            Self::Molecule => "MOLECULE",
            Self::Molecule3D => "MOLECULE_3D",
            Self::Image => "IMAGE",
            Self::Array => "ARRAY",
        }
    }

    /// Whether a column storing `kind` values may carry this modality.
    pub fn accepts(&self, kind: StorageKind) -> bool {
        match self {
            Self::Scalar => kind != StorageKind::Array,
            Self::Molecule => kind == StorageKind::Text,
            Self::Molecule3D | Self::Array => kind == StorageKind::Array,
            Self::Image => matches!(kind, StorageKind::Array | StorageKind::Text),
        }
    }

    /// Modality of a column nobody annotated.
    pub fn default_for(kind: StorageKind) -> Self {
        match kind {
            StorageKind::Array => Self::Array,
            _ => Self::Scalar,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for Modality {
    type Err = ValidationError;

    fn from_str(tag: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.tag().eq_ignore_ascii_case(tag.trim()))
            .ok_or_else(|| ValidationError::UnknownModality(tag.to_string()))
    }
}

/// A molecule given by its SMILES string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Molecule {
    smiles: String,
}

impl Molecule {
    /// Checks the SMILES syntax: legal characters, balanced branches and
    /// brackets, and closed ring bonds. Chemistry is not checked.
    pub fn parse(smiles: &str) -> std::result::Result<Self, String> {
        check_smiles(smiles)?;
        Ok(Self {
            smiles: smiles.to_string(),
        })
    }

    pub fn smiles(&self) -> &str {
        &self.smiles
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Image {
    Pixels(ArrayD<f64>),
    /// A path or URI the caller resolves.
    Path(String),
}

/// A materialized value, as handed out by `Dataset::get_data`.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Scalar(Value),
    Molecule(Molecule),
    /// 3D structure, e.g. a conformer's coordinates or a fingerprint of it.
    Structure(ArrayD<f64>),
    Image(Image),
    Array(ArrayD<f64>),
}

impl Datum {
    pub fn modality(&self) -> Modality {
        match self {
            Self::Scalar(_) => Modality::Scalar,
            Self::Molecule(_) => Modality::Molecule,
            Self::Structure(_) => Modality::Molecule3D,
            Self::Image(_) => Modality::Image,
            Self::Array(_) => Modality::Array,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => v.as_f64(),
            _ => None,
        }
    }
}

/// Turns a stored value into a domain object for one modality.
pub trait Decoder: fmt::Debug + Send + Sync {
    /// Whether `value` can be decoded, without building the domain object.
    fn validate(&self, value: &Value) -> bool;

    /// Decodes `value`, or explains why it cannot be.
    fn decode(&self, value: Value) -> std::result::Result<Datum, String>;
}

#[derive(Debug)]
struct ScalarDecoder;

impl Decoder for ScalarDecoder {
    fn validate(&self, value: &Value) -> bool {
        !matches!(value, Value::Array(_))
    }

    fn decode(&self, value: Value) -> std::result::Result<Datum, String> {
        match value {
            Value::Array(a) => Err(format!("expected a scalar, found an array of shape {:?}", a.shape())),
            v => Ok(Datum::Scalar(v)),
        }
    }
}

#[derive(Debug)]
struct SmilesDecoder;

impl Decoder for SmilesDecoder {
    fn validate(&self, value: &Value) -> bool {
        value.as_str().map_or(false, |s| check_smiles(s).is_ok())
    }

    fn decode(&self, value: Value) -> std::result::Result<Datum, String> {
        match value {
            Value::Text(s) => Molecule::parse(&s).map(Datum::Molecule),
            other => Err(format!("expected a SMILES string, found `{other}`")),
        }
    }
}

#[derive(Debug)]
struct StructureDecoder;

impl Decoder for StructureDecoder {
    fn validate(&self, value: &Value) -> bool {
        matches!(value, Value::Array(_))
    }

    fn decode(&self, value: Value) -> std::result::Result<Datum, String> {
        match value {
            Value::Array(a) => Ok(Datum::Structure(a)),
            other => Err(format!("expected a structure array, found `{other}`")),
        }
    }
}

#[derive(Debug)]
struct ImageDecoder;

impl Decoder for ImageDecoder {
    fn validate(&self, value: &Value) -> bool {
        match value {
            Value::Array(a) => a.ndim() > 0,
            Value::Text(s) => !s.is_empty(),
            _ => false,
        }
    }

    fn decode(&self, value: Value) -> std::result::Result<Datum, String> {
        match value {
            Value::Array(a) if a.ndim() > 0 => Ok(Datum::Image(Image::Pixels(a))),
            Value::Text(s) if !s.is_empty() => Ok(Datum::Image(Image::Path(s))),
            other => Err(format!("expected pixel data or an image path, found `{other}`")),
        }
    }
}

#[derive(Debug)]
struct ArrayDecoder;

impl Decoder for ArrayDecoder {
    fn validate(&self, value: &Value) -> bool {
        matches!(value, Value::Array(_))
    }

    fn decode(&self, value: Value) -> std::result::Result<Datum, String> {
        match value {
            Value::Array(a) => Ok(Datum::Array(a)),
            other => Err(format!("expected an array, found `{other}`")),
        }
    }
}

/// One modality's validation and loading rules, as resolved from the registry.
#[derive(Debug, Clone, Copy)]
pub struct ModalityRule<'a> {
    modality: Modality,
    decoder: &'a dyn Decoder,
}

impl<'a> ModalityRule<'a> {
    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn validate(&self, value: &Value) -> bool {
        self.decoder.validate(value)
    }

    /// Loads the value stored at (`column`, `row`).
    ///
    /// A decoder failure is reported as a `ModalityLoad` error naming the row
    /// and the column; no default is substituted.
    pub fn load(&self, value: Value, column: &str, row: usize) -> Result<Datum> {
        let datum = self.decoder.decode(value).map_err(|reason| StorageError::ModalityLoad {
            column: column.to_string(),
            row,
            reason,
        })?;
        if datum.modality() != self.modality {
            return Err(StorageError::ModalityLoad {
                column: column.to_string(),
                row,
                reason: format!("decoder produced a {} value for a {} column", datum.modality(), self.modality),
            }
            .into());
        }
        Ok(datum)
    }
}

/// Fixed lookup table from modality to decoder.
#[derive(Debug)]
pub struct ModalityRegistry {
    decoders: Vec<Box<dyn Decoder>>,
}

impl Default for ModalityRegistry {
    fn default() -> Self {
        Self {
            decoders: vec![
                Box::new(ScalarDecoder),
                Box::new(SmilesDecoder),
                Box::new(StructureDecoder),
                Box::new(ImageDecoder),
                Box::new(ArrayDecoder),
            ],
        }
    }
}

impl ModalityRegistry {
    /// Replaces the decoder used for `modality`.
    pub fn with_decoder<D: Decoder + 'static>(mut self, modality: Modality, decoder: D) -> Self {
        self.decoders[modality.slot()] = Box::new(decoder);
        self
    }

    /// Looks up the rules for a modality tag such as `"MOLECULE"`.
    pub fn resolve(&self, tag: &str) -> Result<ModalityRule<'_>> {
        let modality = tag.parse::<Modality>()?;
        Ok(self.rule(modality))
    }

    pub fn rule(&self, modality: Modality) -> ModalityRule<'_> {
        ModalityRule {
            modality,
            decoder: self.decoders[modality.slot()].as_ref(),
        }
    }
}

fn check_smiles(smiles: &str) -> std::result::Result<(), String> {
    if smiles.is_empty() {
        return Err("empty SMILES string".to_string());
    }

    let mut depth = 0_usize;
    let mut in_bracket = false;
    let mut open_rings = BTreeSet::new();
    let mut toggle_ring = |ring: u32| {
        if !open_rings.remove(&ring) {
            open_rings.insert(ring);
        }
    };

    let mut chars = smiles.chars();
    while let Some(c) = chars.next() {
        if in_bracket {
            match c {
                ']' => in_bracket = false,
                c if c.is_ascii_alphanumeric() || "+-@:#*.".contains(c) => {}
                other => return Err(format!("unexpected `{other}` inside an atom bracket")),
            }
            continue;
        }
        match c {
            '[' => in_bracket = true,
            ']' => return Err("unmatched `]`".to_string()),
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or_else(|| "unmatched `)`".to_string())?,
            '%' => {
                let digits = chars.by_ref().take(2).collect::<String>();
                let ring = digits
                    .parse::<u32>()
                    .ok()
                    .filter(|_| digits.len() == 2)
                    .ok_or_else(|| format!("bad ring bond number `%{digits}`"))?;
                toggle_ring(ring);
            }
            c if c.is_ascii_digit() => toggle_ring(c.to_digit(10).unwrap_or_default()),
            c if c.is_ascii_alphabetic() || "=#$:/\\.-+@*".contains(c) => {}
            other => return Err(format!("unexpected `{other}`")),
        }
    }

    if in_bracket {
        return Err("unclosed `[`".to_string());
    }
    if depth > 0 {
        return Err("unclosed `(`".to_string());
    }
    if !open_rings.is_empty() {
        return Err(format!("unclosed ring bonds {open_rings:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags() {
        assert_eq!("MOLECULE".parse::<Modality>(), Ok(Modality::Molecule));
        assert_eq!("molecule_3d".parse::<Modality>(), Ok(Modality::Molecule3D));
        assert_eq!(
            "PROTEIN".parse::<Modality>(),
            Err(ValidationError::UnknownModality("PROTEIN".into()))
        );
        for m in Modality::ALL {
            assert_eq!(m.tag().parse::<Modality>(), Ok(m));
            assert_eq!(serde_json::to_string(&m).unwrap(), format!("\"{}\"", m.tag()));
        }
    }

    #[test]
    fn smiles_syntax() {
        for ok in ["CCO", "c1ccccc1", "CN(C)C(=O)c1ccc(cc1)OC", "[NH4+]", "C%12CC%12", "ClC(Cl)(Cl)Br"] {
            assert!(Molecule::parse(ok).is_ok(), "{ok}");
        }
        for bad in ["", "C(C", "CC)", "c1cccc", "[NH4+", "C C", "C]"] {
            assert!(Molecule::parse(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn rules() {
        let registry = ModalityRegistry::default();
        let rule = registry.resolve("MOLECULE").unwrap();
        assert!(rule.validate(&Value::from("CCO")));
        assert!(!rule.validate(&Value::Float(1.)));

        let datum = rule.load(Value::from("CCO"), "smiles", 0).unwrap();
        assert_eq!(datum.modality(), Modality::Molecule);

        let err = rule.load(Value::from("C(C"), "smiles", 7).unwrap_err();
        assert!(err.is_storage());
        assert!(err.to_string().contains("row 7"));

        assert!(registry.resolve("VIDEO").unwrap_err().is_validation());
    }

    #[test]
    fn images_take_pixels_or_paths() {
        let registry = ModalityRegistry::default();
        let rule = registry.rule(Modality::Image);
        let pixels = rule.load(Value::Array(ArrayD::zeros(vec![4, 4])), "img", 0).unwrap();
        assert!(matches!(pixels, Datum::Image(Image::Pixels(_))));
        let path = rule.load(Value::from("img/0.png"), "img", 1).unwrap();
        assert_eq!(path, Datum::Image(Image::Path("img/0.png".into())));
        assert!(rule.load(Value::Null, "img", 2).is_err());
    }

    #[test]
    fn custom_decoder_replaces_builtin() {
        #[derive(Debug)]
        struct Anything;
        impl Decoder for Anything {
            fn validate(&self, _: &Value) -> bool {
                true
            }
            fn decode(&self, value: Value) -> std::result::Result<Datum, String> {
                Ok(Datum::Molecule(Molecule {
                    smiles: value.to_string(),
                }))
            }
        }

        let registry = ModalityRegistry::default().with_decoder(Modality::Molecule, Anything);
        let rule = registry.rule(Modality::Molecule);
        assert!(rule.load(Value::from("not smiles ((("), "smiles", 0).is_ok());

        // A decoder answering with the wrong modality is caught.
        let registry = ModalityRegistry::default().with_decoder(Modality::Array, Anything);
        assert!(registry.rule(Modality::Array).load(Value::Float(1.), "a", 0).is_err());
    }
}
